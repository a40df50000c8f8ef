//
// config.rs
//
// Index settings and project definitions
//

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::discovery::Project;
use crate::interface_parser::DEFAULT_MEMO_CAPACITY;
use crate::scope::DEFAULT_OPEN_MODULE;

/// Default validity window of a cached index, in milliseconds
pub const DEFAULT_CACHE_WINDOW_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// How long a built index is reused before rebuilding
    pub cache_window_ms: u64,
    /// Interface file extension, without the dot
    pub interface_extension: String,
    /// Module that is always in scope
    pub default_open_module: String,
    /// Standard library interface directory, warmed when no project is given
    pub stdlib_path: Option<PathBuf>,
    /// Maximum number of parsed files kept in the parser memo
    pub memo_capacity: usize,
    /// Parse the files of one directory in parallel during a build
    pub parallel_parsing: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cache_window_ms: DEFAULT_CACHE_WINDOW_MS,
            interface_extension: "mli".to_string(),
            default_open_module: DEFAULT_OPEN_MODULE.to_string(),
            stdlib_path: None,
            memo_capacity: DEFAULT_MEMO_CAPACITY,
            parallel_parsing: true,
        }
    }
}

impl IndexConfig {
    pub fn cache_window(&self) -> Duration {
        Duration::from_millis(self.cache_window_ms)
    }
}

/// Build an [`IndexConfig`] from a settings object, starting from defaults and
/// overriding every field present under `"index"`. Returns `None` when the
/// settings have no `"index"` section.
pub fn parse_index_config(settings: &serde_json::Value) -> Option<IndexConfig> {
    let index = settings.get("index")?;
    let mut config = IndexConfig::default();

    if let Some(v) = index.get("cacheWindowMs").and_then(|v| v.as_u64()) {
        config.cache_window_ms = v;
    }
    if let Some(v) = index.get("interfaceExtension").and_then(|v| v.as_str()) {
        let ext = v.trim_start_matches('.');
        if !ext.is_empty() {
            config.interface_extension = ext.to_string();
        }
    }
    if let Some(v) = index.get("defaultOpenModule").and_then(|v| v.as_str()) {
        config.default_open_module = v.to_string();
    }
    if let Some(v) = index.get("stdlibPath").and_then(|v| v.as_str()) {
        config.stdlib_path = Some(PathBuf::from(v));
    }
    if let Some(v) = index.get("memoCapacity").and_then(|v| v.as_u64()) {
        config.memo_capacity = v as usize;
    }
    if let Some(v) = index.get("parallelParsing").and_then(|v| v.as_bool()) {
        config.parallel_parsing = v;
    }

    log::info!(
        "Index config: window={}ms ext=.{} default_open={} memo={}",
        config.cache_window_ms,
        config.interface_extension,
        config.default_open_module,
        config.memo_capacity
    );
    Some(config)
}

/// Project definition as written in a settings file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Identity used for cache validity; the canonical root when absent
    pub name: Option<String>,
    pub root: PathBuf,
    pub search_paths: Vec<String>,
    pub links: HashMap<String, PathBuf>,
}

impl ProjectConfig {
    pub fn into_project(self) -> Project {
        let mut project = Project::new(self.root);
        if let Some(name) = self.name {
            project = project.with_identity(name);
        }
        if !self.search_paths.is_empty() {
            project = project.with_search_paths(self.search_paths);
        }
        project.links = self.links;
        project
    }
}

/// Read the `"project"` section of a settings object, if any
pub fn parse_project_config(settings: &serde_json::Value) -> Option<ProjectConfig> {
    let section = settings.get("project")?;
    match ProjectConfig::deserialize(section) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Ignoring invalid project settings: {}", e);
            None
        }
    }
}
