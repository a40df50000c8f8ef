//
// scope.rs
//
// Modules in lexical scope for a source buffer
//

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Module opened implicitly in every OCaml source file
pub const DEFAULT_OPEN_MODULE: &str = "Pervasives";

fn open_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:\A|\n) *open +(\w*)").unwrap())
}

/// Collect the modules in scope for a buffer: its implicit module, every
/// module named by an `open` directive, and `default_module`.
///
/// The scan is purely textual. `open` inside comments or string literals is
/// picked up too.
pub fn open_modules_with_default(
    text: &str,
    implicit_module: Option<&str>,
    default_module: &str,
) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();

    if let Some(name) = implicit_module {
        modules.insert(name.to_string());
    }

    for caps in open_pattern().captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let mut name = m.as_str().trim();
        if let Some(stripped) = name.strip_suffix(";;") {
            name = stripped;
        }
        if name.is_empty() {
            continue;
        }
        log::trace!("Found open directive for module {}", name);
        modules.insert(name.to_string());
    }

    modules.insert(default_module.to_string());
    modules
}

/// [`open_modules_with_default`] with [`DEFAULT_OPEN_MODULE`]
pub fn open_modules(text: &str, implicit_module: Option<&str>) -> BTreeSet<String> {
    open_modules_with_default(text, implicit_module, DEFAULT_OPEN_MODULE)
}

/// Implicit module name of a source file: first letter upper-cased, extension
/// stripped. Only `.ml` and `.mli` files have one.
pub fn implicit_module_name(file_name: &str) -> Option<String> {
    let stem = file_name
        .strip_suffix(".ml")
        .or_else(|| file_name.strip_suffix(".mli"))?;
    if stem.is_empty() {
        return None;
    }
    Some(crate::definition::module_name_from_file(file_name))
}
