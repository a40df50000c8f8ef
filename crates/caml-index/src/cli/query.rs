// cli/query.rs - build an index from the command line and print it
//
// Resolves a project from flags and an optional JSON settings file, optionally
// warms the parser memo with a background job, then prints either the whole
// aggregated tree or the definition at one qualified path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::background::{BackgroundIndexJob, ProgressEvent};
use crate::config::{parse_index_config, parse_project_config, IndexConfig};
use crate::definition::Definition;
use crate::discovery::Project;
use crate::index_cache::{BufferContext, IndexCache};
use crate::interface_parser::InterfaceParser;

/// Parsed command-line arguments
#[derive(Debug, Default, PartialEq, Eq)]
pub struct QueryArgs {
    pub config: Option<PathBuf>,
    pub project: Option<PathBuf>,
    pub search_paths: Vec<String>,
    pub stdlib: Option<PathBuf>,
    pub buffer: Option<PathBuf>,
    pub warm: bool,
    pub lookup: Option<String>,
}

fn value_for(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("{} requires a value", flag))
}

/// Parse arguments (executable name already skipped).
/// `--version` and `--help` are handled by the caller.
pub fn parse_args(args: &mut impl Iterator<Item = String>) -> Result<QueryArgs, String> {
    let mut parsed = QueryArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value_for(&arg, args)?)),
            "--project" => parsed.project = Some(PathBuf::from(value_for(&arg, args)?)),
            "--search-path" => parsed.search_paths.push(value_for(&arg, args)?),
            "--stdlib" => parsed.stdlib = Some(PathBuf::from(value_for(&arg, args)?)),
            "--buffer" => parsed.buffer = Some(PathBuf::from(value_for(&arg, args)?)),
            "--lookup" => {
                let path = value_for(&arg, args)?;
                if path.split('.').any(str::is_empty) {
                    return Err(format!("Invalid qualified name: '{}'", path));
                }
                parsed.lookup = Some(path);
            }
            "--warm" => parsed.warm = true,
            other => return Err(format!("Unknown argument: '{}'", other)),
        }
    }

    Ok(parsed)
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<serde_json::Value> {
    let Some(path) = path else {
        return Ok(serde_json::Value::Null);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON in settings file {}", path.display()))
}

fn resolve_project(args: &QueryArgs, settings: &serde_json::Value) -> anyhow::Result<Project> {
    let mut project = match (&args.project, parse_project_config(settings)) {
        (Some(root), _) => Project::new(root),
        (None, Some(config)) => config.into_project(),
        (None, None) => Project::new(std::env::current_dir().context("no current directory")?),
    };
    if !args.search_paths.is_empty() {
        project.search_paths = args.search_paths.clone();
    }
    Ok(project)
}

/// Resolved configuration and project for one invocation
pub fn prepare(args: &QueryArgs) -> anyhow::Result<(IndexConfig, Project)> {
    let settings = load_settings(args.config.as_deref())?;
    let mut config = parse_index_config(&settings).unwrap_or_default();
    let mut project = resolve_project(args, &settings)?;

    if let Some(stdlib) = &args.stdlib {
        config.stdlib_path = Some(stdlib.clone());
    }
    if let Some(stdlib) = &config.stdlib_path {
        let entry = stdlib.display().to_string();
        if !project.search_paths.contains(&entry) {
            project.search_paths.push(entry);
        }
    }
    Ok((config, project))
}

async fn warm(parser: Arc<InterfaceParser>, config: &IndexConfig, project: &Project) {
    let mut job = BackgroundIndexJob::new(parser, config.clone(), Some(project.clone()));
    let mut progress = job.subscribe();
    let handle = job.spawn();

    while let Some(event) = progress.recv().await {
        match event {
            ProgressEvent::Started { total } => eprintln!("warming {} interface files", total),
            ProgressEvent::File {
                processed,
                total,
                path,
            } => eprintln!("[{}/{}] {}", processed, total, path.display()),
            ProgressEvent::Finished(_) => break,
        }
    }
    let status = handle.join().await;
    eprintln!("warm-up {}", status);
}

fn render_lookup(root: &Definition, qualified: &str) -> anyhow::Result<String> {
    let segments: Vec<&str> = qualified.split('.').collect();
    let def = root
        .find_path(&segments)
        .ok_or_else(|| anyhow!("'{}' not found in index", qualified))?;

    let mut out = def.to_string();
    if let Some(doc) = &def.doc {
        out.push_str("\n(** ");
        out.push_str(doc);
        out.push_str(" *)\n");
    }
    Ok(out)
}

/// Run a query and return the text to print
pub async fn run(args: QueryArgs) -> anyhow::Result<String> {
    let (config, project) = prepare(&args)?;
    log::info!("Indexing project {}", project);

    let parser = Arc::new(InterfaceParser::with_capacity(config.memo_capacity));
    if args.warm {
        warm(parser.clone(), &config, &project).await;
    }

    let buffer = match &args.buffer {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read buffer {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Some(BufferContext::new(text, file_name))
        }
        None => None,
    };

    let cache = IndexCache::with_parser(config, parser);
    let root = cache.get_or_build(&project, buffer.as_ref());

    match &args.lookup {
        Some(qualified) => render_lookup(&root, qualified),
        None => Ok(root.to_string()),
    }
}
