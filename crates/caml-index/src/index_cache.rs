//
// index_cache.rs
//
// Short-lived cache of the merged definition tree
//

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rayon::prelude::*;

use crate::config::IndexConfig;
use crate::definition::{Definition, DefinitionKind};
use crate::discovery::{list_interface_files, resolve_search_paths, Project};
use crate::interface_parser::InterfaceParser;
use crate::scope::{implicit_module_name, open_modules_with_default};

/// Source buffer a completion request comes from
#[derive(Debug, Clone)]
pub struct BufferContext {
    pub text: String,
    /// File name only, e.g. `main.ml`
    pub file_name: String,
}

impl BufferContext {
    pub fn new(text: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_name: file_name.into(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    identity: String,
    root: Arc<Definition>,
    built_at: Instant,
}

/// Single-slot cache of the aggregated index for one project.
///
/// Completion asks for the index on every keystroke. A built tree is reused
/// for the configured window as long as the same project asks for it;
/// anything else triggers a full rebuild that replaces the slot.
pub struct IndexCache {
    slot: Mutex<Option<CacheEntry>>,
    parser: Arc<InterfaceParser>,
    config: IndexConfig,
    builds: AtomicUsize,
}

impl IndexCache {
    pub fn new(config: IndexConfig) -> Self {
        let parser = Arc::new(InterfaceParser::with_capacity(config.memo_capacity));
        Self::with_parser(config, parser)
    }

    /// Cache sharing an existing parser (and its memo) with other users such
    /// as a background warm-up job
    pub fn with_parser(config: IndexConfig, parser: Arc<InterfaceParser>) -> Self {
        Self {
            slot: Mutex::new(None),
            parser,
            config,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn parser(&self) -> &Arc<InterfaceParser> {
        &self.parser
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Return the index for `project`, rebuilding it when the cached one is
    /// older than the window or belongs to another project.
    ///
    /// With a buffer, the members of every module in the buffer's scope are
    /// also promoted to the root. The buffer does not take part in cache
    /// validity: a hit returns the tree built for whichever buffer asked first.
    pub fn get_or_build(&self, project: &Project, buffer: Option<&BufferContext>) -> Arc<Definition> {
        if let Some(root) = self.lookup(project) {
            log::trace!("Index cache hit for {}", project.identity);
            return root;
        }

        // The slot lock is not held while building; concurrent builders
        // each produce a tree and the last one to finish owns the slot.
        let start = Instant::now();
        let root = Arc::new(self.build(project, buffer));
        self.builds.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "Built index for {}: {} top-level entries in {:?}",
            project.identity,
            root.len(),
            start.elapsed()
        );

        if let Ok(mut guard) = self.slot.lock() {
            *guard = Some(CacheEntry {
                identity: project.identity.clone(),
                root: root.clone(),
                built_at: Instant::now(),
            });
        }
        root
    }

    fn lookup(&self, project: &Project) -> Option<Arc<Definition>> {
        let guard = self.slot.lock().ok()?;
        let entry = guard.as_ref()?;
        if entry.identity == project.identity
            && entry.built_at.elapsed() < self.config.cache_window()
        {
            Some(entry.root.clone())
        } else {
            None
        }
    }

    fn build(&self, project: &Project, buffer: Option<&BufferContext>) -> Definition {
        let mut root = Definition::aggregation_root();
        let ext = self.config.interface_extension.as_str();

        for dir in resolve_search_paths(project) {
            let mut files = match list_interface_files(&dir, ext) {
                Ok(files) => files,
                Err(e) => {
                    log::trace!("Skipping search directory: {}", e);
                    continue;
                }
            };
            files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

            // `collect` on an indexed parallel iterator keeps input order
            let modules: Vec<Definition> = if self.config.parallel_parsing {
                files
                    .par_iter()
                    .map(|path| self.parser.parse_or_empty(path))
                    .collect()
            } else {
                files
                    .iter()
                    .map(|path| self.parser.parse_or_empty(path))
                    .collect()
            };
            for module in modules {
                root.add_child(module);
            }
        }

        if let Some(buffer) = buffer {
            let implicit = implicit_module_name(&buffer.file_name);
            let open = open_modules_with_default(
                &buffer.text,
                implicit.as_deref(),
                &self.config.default_open_module,
            );
            for name in &open {
                promote_module(&mut root, name);
            }
        }

        root
    }

    /// Drop the cached tree so the next request rebuilds
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.slot.lock() {
            *guard = None;
        }
    }

    /// When the cached tree was stored, if there is one
    pub fn last_built(&self) -> Option<Instant> {
        self.slot
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|e| e.built_at))
    }

    /// Number of full builds performed since construction
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

/// Append the children of the first root module named `name` to the root.
/// The module itself stays where it is.
fn promote_module(root: &mut Definition, name: &str) {
    let Some(module) = root.find(name, DefinitionKind::Module) else {
        log::trace!("Open module {} not found in index", name);
        return;
    };
    let members = module.children().to_vec();
    for member in members {
        root.add_child(member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn config_with_window(ms: u64) -> IndexConfig {
        IndexConfig {
            cache_window_ms: ms,
            ..IndexConfig::default()
        }
    }

    fn names(def: &Definition) -> Vec<&str> {
        def.children().iter().map(|c| c.name()).collect()
    }

    #[test]
    fn test_build_merges_directories_in_order() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir(&lib).unwrap();
        write(dir.path(), "zeta.mli", "val z : int\n");
        write(dir.path(), "alpha.mli", "val a : int\n");
        write(&lib, "beta.mli", "val b : int\n");
        write(&lib, "impl.ml", "let x = 1\n");

        let project = Project::new(dir.path()).with_search_paths(["lib", ".", "missing"]);
        let cache = IndexCache::new(IndexConfig::default());
        let root = cache.get_or_build(&project, None);
        assert_eq!(names(&root), vec!["Beta", "Alpha", "Zeta"]);
        assert_eq!(root.name(), "");
    }

    #[test]
    fn test_idempotent_within_window() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "list.mli", "val map : ('a -> 'b) -> 'a list -> 'b list\n");
        let project = Project::new(dir.path());
        let cache = IndexCache::new(config_with_window(60_000));

        let first = cache.get_or_build(&project, None);
        let built_at = cache.last_built();
        let parses = cache.parser().parse_count();
        let second = cache.get_or_build(&project, None);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.parser().parse_count(), parses);
        assert_eq!(cache.build_count(), 1);
        assert_eq!(cache.last_built(), built_at);
    }

    #[test]
    fn test_rebuild_after_window() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "list.mli", "val length : 'a list -> int\n");
        let project = Project::new(dir.path());
        let cache = IndexCache::new(config_with_window(20));

        let first = cache.get_or_build(&project, None);
        let first_built = cache.last_built().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        let second = cache.get_or_build(&project, None);

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.last_built().unwrap() > first_built);
        assert_eq!(cache.build_count(), 2);
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_other_project_evicts() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write(a.path(), "a.mli", "val a : int\n");
        write(b.path(), "b.mli", "val b : int\n");
        let pa = Project::new(a.path()).with_identity("a");
        let pb = Project::new(b.path()).with_identity("b");
        let cache = IndexCache::new(config_with_window(60_000));

        let first = cache.get_or_build(&pa, None);
        assert_eq!(names(&cache.get_or_build(&pb, None)), vec!["B"]);
        let again = cache.get_or_build(&pa, None);
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(cache.build_count(), 3);
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.mli", "val a : int\n");
        let project = Project::new(dir.path());
        let cache = IndexCache::new(config_with_window(60_000));

        cache.get_or_build(&project, None);
        cache.invalidate();
        assert!(cache.last_built().is_none());
        cache.get_or_build(&project, None);
        assert_eq!(cache.build_count(), 2);
    }

    #[test]
    fn test_open_modules_are_promoted() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "list.mli",
            "val map : ('a -> 'b) -> 'a list -> 'b list\nval filter : ('a -> bool) -> 'a list -> 'a list\n",
        );
        write(dir.path(), "array.mli", "val make : int -> 'a -> 'a array\n");
        write(dir.path(), "pervasives.mli", "val print_string : string -> unit\n");
        let project = Project::new(dir.path());
        let cache = IndexCache::new(IndexConfig::default());

        let buffer = BufferContext::new("open List\nlet () = ()\n", "main.ml");
        let root = cache.get_or_build(&project, Some(&buffer));

        assert!(root.find("List", DefinitionKind::Module).is_some());
        assert!(root.find("map", DefinitionKind::Value).is_some());
        assert!(root.find("filter", DefinitionKind::Value).is_some());
        assert!(root.find("print_string", DefinitionKind::Value).is_some());
        assert!(root.find("make", DefinitionKind::Value).is_none());
        assert_eq!(root.find("List", DefinitionKind::Module).unwrap().len(), 2);
    }

    #[test]
    fn test_implicit_module_is_promoted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "main.mli", "val run : unit -> unit\n");
        let project = Project::new(dir.path());
        let cache = IndexCache::new(IndexConfig {
            default_open_module: "Stdlib".to_string(),
            ..IndexConfig::default()
        });

        let root = cache.get_or_build(&project, Some(&BufferContext::new("", "main.ml")));
        assert_eq!(names(&root), vec!["Main", "run"]);
    }

    #[test]
    fn test_promotion_uses_first_module_and_allows_collisions() {
        let dir = TempDir::new().unwrap();
        let second = dir.path().join("second");
        fs::create_dir(&second).unwrap();
        write(dir.path(), "dup.mli", "val first : int\n");
        write(&second, "dup.mli", "val second : int\n");
        write(dir.path(), "other.mli", "val first : string\n");
        let project = Project::new(dir.path()).with_search_paths([".", "second"]);
        let cache = IndexCache::new(IndexConfig::default());

        let buffer = BufferContext::new("open Dup\nopen Other\n", "x.ml");
        let root = cache.get_or_build(&project, Some(&buffer));
        assert!(root.find("second", DefinitionKind::Value).is_none());
        let firsts = root
            .children()
            .iter()
            .filter(|c| c.name() == "first")
            .count();
        assert_eq!(firsts, 2);
    }

    #[test]
    fn test_malformed_file_becomes_empty_module() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            let content = if i == 3 {
                "val broken : int\n(* never closed\n".to_string()
            } else {
                format!("val v{} : int\ntype t{} = A | B\n", i, i)
            };
            write(dir.path(), &format!("mod{:02}.mli", i), &content);
        }
        let project = Project::new(dir.path());
        let cache = IndexCache::new(IndexConfig::default());
        let root = cache.get_or_build(&project, None);

        assert_eq!(root.len(), 10);
        let broken = &root.children()[3];
        assert_eq!(broken.name(), "Mod03");
        assert!(broken.is_empty());
        let full = root.children().iter().filter(|m| m.len() == 2).count();
        assert_eq!(full, 9);
    }

    #[test]
    fn test_sequential_parsing_matches_parallel() {
        let dir = TempDir::new().unwrap();
        for i in 0..20 {
            write(dir.path(), &format!("m{:02}.mli", i), &format!("val x{} : int\n", i));
        }
        let project = Project::new(dir.path());
        let parallel = IndexCache::new(IndexConfig::default()).get_or_build(&project, None);
        let sequential = IndexCache::new(IndexConfig {
            parallel_parsing: false,
            ..IndexConfig::default()
        })
        .get_or_build(&project, None);
        assert_eq!(*parallel, *sequential);
    }

    #[test]
    fn test_unresolvable_project_builds_empty_root() {
        let dir = TempDir::new().unwrap();
        let project = Project::new(dir.path().join("gone")).with_search_paths(["nowhere"]);
        let cache = IndexCache::new(IndexConfig::default());
        assert!(cache.get_or_build(&project, None).is_empty());
    }
}
