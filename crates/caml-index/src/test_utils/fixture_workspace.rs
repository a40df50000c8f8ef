//! Deterministic fixture workspace generator for benchmarks and tests.
//!
//! Generates synthetic OCaml projects with controlled characteristics:
//! number of interface files, values and types per file, nested
//! submodules, and how many files sit in a `lib/` subdirectory.
//!
//! Output has no randomness, so benchmarks are reproducible.

use std::fmt::Write;
use std::path::Path;
use tempfile::TempDir;

/// Configuration for generating a fixture workspace.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub file_count: usize,
    pub values_per_file: usize,
    pub types_per_file: usize,
    /// Files with an index below this also get a nested `module Sub : sig .. end`
    pub nested_modules: usize,
    /// Every n-th file goes to `lib/` instead of the root (0 disables)
    pub lib_every: usize,
}

/// Type expressions cycled through deterministically in generated values.
const TYPES: &[&str] = &[
    "int -> int",
    "'a list -> 'a option",
    "string -> ?sep:char -> string list",
    "('a -> 'b) -> 'a array -> 'b array",
    "unit -> unit",
    "float * float -> float",
];

impl FixtureConfig {
    /// Small workspace: 10 files, 5 values each.
    pub fn small() -> Self {
        Self {
            file_count: 10,
            values_per_file: 5,
            types_per_file: 1,
            nested_modules: 2,
            lib_every: 3,
        }
    }

    /// Medium workspace: 50 files, 20 values each.
    pub fn medium() -> Self {
        Self {
            file_count: 50,
            values_per_file: 20,
            types_per_file: 3,
            nested_modules: 10,
            lib_every: 4,
        }
    }

    /// Large workspace: 200 files, 60 values each (stdlib-sized).
    pub fn large() -> Self {
        Self {
            file_count: 200,
            values_per_file: 60,
            types_per_file: 5,
            nested_modules: 40,
            lib_every: 5,
        }
    }

    /// Relative path of the `index`-th generated file
    pub fn file_path(&self, index: usize) -> String {
        if self.lib_every > 0 && index % self.lib_every == self.lib_every - 1 {
            format!("lib/mod_{:03}.mli", index)
        } else {
            format!("mod_{:03}.mli", index)
        }
    }
}

/// Generate the content of a single interface file deterministically.
fn generate_interface_content(index: usize, config: &FixtureConfig) -> String {
    let mut content = String::new();

    for type_i in 0..config.types_per_file {
        writeln!(content, "(** Type {} of module {}. *)", type_i, index).unwrap();
        if type_i % 2 == 0 {
            writeln!(content, "type t{} = A{} | B{} of int * string", type_i, type_i, type_i).unwrap();
        } else {
            writeln!(content, "type t{} = {{ name{} : string; mutable size{} : int }}", type_i, type_i, type_i).unwrap();
        }
        content.push('\n');
    }

    for value_i in 0..config.values_per_file {
        let ty = TYPES[(index + value_i) % TYPES.len()];
        writeln!(content, "val value_{}_{} : {}", index, value_i, ty).unwrap();
        writeln!(content, "(** Generated value {}. *)", value_i).unwrap();
        content.push('\n');
    }

    writeln!(content, "exception Error_{} of string", index).unwrap();

    if index < config.nested_modules {
        content.push('\n');
        writeln!(content, "module Sub : sig").unwrap();
        writeln!(content, "  type t").unwrap();
        writeln!(content, "  val create : unit -> t").unwrap();
        writeln!(content, "  external unsafe_get : t -> int -> int = \"caml_sub_get\"").unwrap();
        writeln!(content, "end").unwrap();
    }

    content
}

/// Create a temporary fixture workspace from the given configuration.
///
/// The directory is cleaned up when the `TempDir` is dropped.
pub fn create_fixture_workspace(config: &FixtureConfig) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory for fixture workspace");
    write_fixture_workspace(temp_dir.path(), config);
    temp_dir
}

/// Write fixture files into an existing directory.
pub fn write_fixture_workspace(dir: &Path, config: &FixtureConfig) {
    if config.lib_every > 0 {
        std::fs::create_dir_all(dir.join("lib"))
            .unwrap_or_else(|e| panic!("Failed to create lib directory: {}", e));
    }
    for i in 0..config.file_count {
        let content = generate_interface_content(i, config);
        let filename = config.file_path(i);
        std::fs::write(dir.join(&filename), &content)
            .unwrap_or_else(|e| panic!("Failed to write fixture file {}: {}", filename, e));
    }
}
