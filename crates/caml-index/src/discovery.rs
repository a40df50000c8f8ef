//
// discovery.rs
//
// Locating interface files on disk
//

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::DiscoveryError;

/// Directories skipped during recursive project listing (build output)
const SKIPPED_DIRS: &[&str] = &["_build"];

/// A project whose interface files feed the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Compared for cache validity
    pub identity: String,
    pub root: PathBuf,
    /// Ordered search-path entries: `"."`, project-relative, or absolute
    pub search_paths: Vec<String>,
    /// Project-relative logical folder name to target directory
    pub links: HashMap<String, PathBuf>,
}

impl Project {
    /// Project rooted at `root`, identified by its canonical path, searching
    /// only the root itself.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let identity = fs::canonicalize(&root)
            .unwrap_or_else(|_| root.clone())
            .to_string_lossy()
            .into_owned();
        Self {
            identity,
            root,
            search_paths: vec![".".to_string()],
            links: HashMap::new(),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_search_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_link(mut self, name: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        self.links.insert(name.into(), target.into());
        self
    }

    /// Map a project-relative path through the link table, then onto the root
    fn project_relative(&self, entry: &Path) -> PathBuf {
        let mut components = entry.components();
        if let Some(Component::Normal(first)) = components.next() {
            if let Some(target) = first.to_str().and_then(|name| self.links.get(name)) {
                return target.join(components.as_path());
            }
        }
        self.root.join(entry)
    }

    fn resolve_entry(&self, entry: &str) -> Result<PathBuf, DiscoveryError> {
        if entry == "." {
            return Ok(self.root.clone());
        }

        let path = Path::new(entry);
        if path.is_relative() {
            let candidate = self.project_relative(path);
            if candidate.is_dir() {
                return Ok(candidate);
            }
        }

        if path.is_dir() {
            return Ok(path.to_path_buf());
        }

        Err(DiscoveryError::Unresolved {
            entry: entry.to_string(),
        })
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identity, self.root.display())
    }
}

/// Resolve a project's search paths to existing directories, in order.
/// Entries that resolve to nothing are skipped.
pub fn resolve_search_paths(project: &Project) -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(project.search_paths.len());
    for entry in &project.search_paths {
        match project.resolve_entry(entry) {
            Ok(dir) => {
                log::trace!("Search path '{}' resolved to {}", entry, dir.display());
                dirs.push(dir);
            }
            Err(e) => log::trace!("Skipping search path: {}", e),
        }
    }
    dirs
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

/// Interface files directly inside `dir`, following symlinks.
///
/// Order is whatever the filesystem returns.
pub fn list_interface_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let unreadable = |source| DiscoveryError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };
    let entries = fs::read_dir(dir).map_err(unreadable)?;

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        // `Path::is_file` follows symlinks
        if has_extension(&path, extension) && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.iter().any(|d| name == *d)
}

/// Every interface file under the project root, recursively, sorted by path.
/// Hidden directories and build output are skipped.
pub fn project_interface_files(
    project: &Project,
    extension: &str,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !project.root.is_dir() {
        return Err(DiscoveryError::Unresolved {
            entry: project.root.display().to_string(),
        });
    }

    let mut files: Vec<PathBuf> = WalkDir::new(&project.root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|result| match result {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::trace!("Skipping unreadable entry under {}: {}", project.root.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), extension))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}
