//! End-to-end tests over the public API: discovery, parsing, caching,
//! scoping and background warm-up working together on a real directory tree.

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use caml_index::{
    BackgroundIndexJob, BufferContext, DefinitionKind, IndexCache, IndexConfig, InterfaceParser,
    JobStatus, Project,
};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// A project with its own interfaces, a linked vendor folder and a small
/// standard library directory.
fn setup() -> (TempDir, TempDir, TempDir, Project) {
    let project_dir = TempDir::new().unwrap();
    let vendor_dir = TempDir::new().unwrap();
    let stdlib_dir = TempDir::new().unwrap();

    write(
        &project_dir.path().join("src/parser.mli"),
        "(** Parse a string. *)\nval parse : string -> Ast.t\n\nexception Syntax_error of int * int\n",
    );
    write(
        &project_dir.path().join("src/ast.mli"),
        "type t =\n  | Leaf of int\n  | Node of t * t\n\nmodule Pretty : sig\n  val to_string : t -> string\nend\n",
    );
    write(&vendor_dir.path().join("json/yojson.mli"), "type t\nval from_string : string -> t\n");
    write(
        &stdlib_dir.path().join("list.mli"),
        "val length : 'a list -> int\nval map : ('a -> 'b) -> 'a list -> 'b list\n",
    );
    write(&stdlib_dir.path().join("pervasives.mli"), "val print_endline : string -> unit\n");
    write(&stdlib_dir.path().join("broken.mli"), "module M : sig\n  val x : int\n");

    let project = Project::new(project_dir.path())
        .with_link("vendor", vendor_dir.path())
        .with_search_paths([
            "src".to_string(),
            "vendor/json".to_string(),
            "missing".to_string(),
            stdlib_dir.path().display().to_string(),
        ]);
    (project_dir, vendor_dir, stdlib_dir, project)
}

#[test]
fn test_full_index_build() {
    let (_p, _v, _s, project) = setup();
    let cache = IndexCache::new(IndexConfig::default());
    let root = cache.get_or_build(&project, None);

    let names: Vec<&str> = root.children().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["Ast", "Parser", "Yojson", "Broken", "List", "Pervasives"]);

    let parse = root.find_path(&["Parser", "parse"]).unwrap();
    assert_eq!(parse.kind(), DefinitionKind::Value);
    assert_eq!(parse.signature.as_deref(), Some("string -> Ast.t"));
    assert_eq!(parse.doc.as_deref(), Some("Parse a string."));

    let node = root.find_path(&["Ast", "t", "Node"]);
    assert!(node.is_none(), "types are not containers for path lookup");
    let ty = root.find_path(&["Ast", "t"]).unwrap();
    assert!(ty.find("Node", DefinitionKind::Constructor).is_some());
    assert!(root.find_path(&["Ast", "Pretty", "to_string"]).is_some());

    assert!(root.find("Broken", DefinitionKind::Module).unwrap().is_empty());
}

#[test]
fn test_buffer_scoping() {
    let (_p, _v, _s, project) = setup();
    let cache = IndexCache::new(IndexConfig::default());
    let buffer = BufferContext::new("open List\nlet main () = print_endline \"hi\"\n", "parser.ml");
    let root = cache.get_or_build(&project, Some(&buffer));

    for promoted in ["length", "map", "print_endline", "parse"] {
        assert!(root.find_any(promoted).is_some(), "{} should be promoted", promoted);
    }
    assert!(root.find("Syntax_error", DefinitionKind::Exception).is_some());
    assert!(root.find_any("from_string").is_none());
    assert!(root.find("List", DefinitionKind::Module).is_some());
}

#[tokio::test]
async fn test_warm_up_feeds_later_builds() {
    let (project_dir, _v, stdlib_dir, project) = setup();
    let parser = Arc::new(InterfaceParser::new());

    let config = IndexConfig {
        stdlib_path: Some(stdlib_dir.path().to_path_buf()),
        ..IndexConfig::default()
    };
    let stdlib_job = BackgroundIndexJob::new(parser.clone(), config.clone(), None);
    let ready = stdlib_job.readiness();
    assert_eq!(stdlib_job.spawn().join().await, JobStatus::Completed);
    assert!(ready.load(Ordering::SeqCst));

    let project_job = BackgroundIndexJob::new(
        parser.clone(),
        config.clone(),
        Some(Project::new(project_dir.path())),
    );
    assert_eq!(project_job.run().await, JobStatus::Completed);

    // The vendored file was never warmed and the malformed one is never memoized
    let before = parser.parse_count();
    let cache = IndexCache::with_parser(config, parser.clone());
    let root = cache.get_or_build(&project, None);
    assert_eq!(root.len(), 6);
    assert_eq!(parser.parse_count(), before + 2);
}

fn flat_project(files: usize) -> (TempDir, Project) {
    let dir = TempDir::new().unwrap();
    for i in 0..files {
        write(
            &dir.path().join(format!("m{:02}.mli", i)),
            &format!("val x{} : int\ntype t{} = A | B\n", i, i),
        );
    }
    let project = Project::new(dir.path());
    (dir, project)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_foreground_build_alongside_warm_up() {
    const FILES: usize = 40;
    let (dir, project) = flat_project(FILES);
    let parser = Arc::new(InterfaceParser::new());
    let cache = Arc::new(IndexCache::with_parser(IndexConfig::default(), parser.clone()));

    let job = BackgroundIndexJob::new(parser.clone(), IndexConfig::default(), Some(project.clone()));
    let ready = job.readiness();
    let handle = job.spawn();
    let foreground = {
        let cache = cache.clone();
        let project = project.clone();
        tokio::task::spawn_blocking(move || cache.get_or_build(&project, None))
    };

    let built = foreground.await.unwrap();
    assert_eq!(handle.join().await, JobStatus::Completed);
    assert!(ready.load(Ordering::SeqCst));

    // Both users may miss the memo for the same file, but never more often
    let parses = parser.parse_count();
    assert!(
        (FILES..=2 * FILES).contains(&parses),
        "{} parses for {} files",
        parses,
        FILES
    );
    assert_eq!(parser.memo_len(), FILES);
    for i in 0..FILES {
        assert!(parser.is_memoized(&dir.path().join(format!("m{:02}.mli", i))));
    }

    assert_eq!(built.len(), FILES);
    assert!(built.children().iter().all(|m| m.len() == 2));
    let cached = cache.get_or_build(&project, None);
    assert!(Arc::ptr_eq(&built, &cached));
    assert_eq!(cache.build_count(), 1);
    assert_eq!(parser.parse_count(), parses);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_concurrent_build_owns_the_slot() {
    let (_dir, project) = flat_project(30);
    let cache = Arc::new(IndexCache::new(IndexConfig::default()));

    let builders: Vec<_> = (0..2)
        .map(|_| {
            let cache = cache.clone();
            let project = project.clone();
            tokio::task::spawn_blocking(move || cache.get_or_build(&project, None))
        })
        .collect();
    let mut roots = Vec::new();
    for builder in builders {
        roots.push(builder.await.unwrap());
    }

    assert_eq!(*roots[0], *roots[1]);
    assert!((1..=2).contains(&cache.build_count()));
    let cached = cache.get_or_build(&project, None);
    assert!(roots.iter().any(|root| Arc::ptr_eq(root, &cached)));
    assert!(cache.parser().parse_count() <= 2 * 30);
}
