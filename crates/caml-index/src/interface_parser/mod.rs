//
// interface_parser/mod.rs
//
// Interface file parsing with a per-file memo
//

pub mod parser;
pub mod parser_pool;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use lru::LruCache;

use crate::definition::{module_name_from_file, Definition, DefinitionKind};
use crate::error::ParseError;

pub use parser::parse_signature;

/// Default number of parsed files kept in the memo
pub const DEFAULT_MEMO_CAPACITY: usize = 4096;

/// Snapshot metadata for an interface file, used to decide memo validity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSnapshot {
    /// File modification time (from filesystem metadata)
    pub mtime: SystemTime,
    /// File size in bytes
    pub size: u64,
}

impl FileSnapshot {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: metadata.len(),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoEntry {
    snapshot: FileSnapshot,
    module: Arc<Definition>,
}

/// Parser for interface files.
///
/// One instance is shared (via `Arc`) by the synchronous build path and the
/// background warm-up job. Parsed modules are memoized per absolute path and
/// reused until the file's modification time or size changes. Failed parses
/// are never memoized.
pub struct InterfaceParser {
    memo: Mutex<LruCache<PathBuf, MemoEntry>>,
    parses: AtomicUsize,
}

impl std::fmt::Debug for InterfaceParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceParser")
            .field("parses", &self.parse_count())
            .finish_non_exhaustive()
    }
}

impl Default for InterfaceParser {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMO_CAPACITY)
    }
}

impl InterfaceParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        let cap = NonZeroUsize::new(cap)
            .unwrap_or(NonZeroUsize::new(DEFAULT_MEMO_CAPACITY).unwrap());
        Self {
            memo: Mutex::new(LruCache::new(cap)),
            parses: AtomicUsize::new(0),
        }
    }

    /// Parse one interface file into a module named after the file
    /// (`list.mli` becomes `List`).
    pub fn parse_file(&self, path: &Path) -> Result<Arc<Definition>, ParseError> {
        let io_err = |source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        };
        let metadata = std::fs::metadata(path).map_err(io_err)?;
        let snapshot = FileSnapshot::from_metadata(&metadata);
        let key = memo_key(path);

        if let Some(module) = self.memo_get(&key, &snapshot) {
            log::trace!("Memo hit for {}", key.display());
            return Ok(module);
        }

        let bytes = std::fs::read(path).map_err(io_err)?;
        let text = String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8 {
            path: path.to_path_buf(),
        })?;
        let name = module_name_for(path);

        self.parses.fetch_add(1, Ordering::SeqCst);
        let module = Arc::new(parse_signature(&text, &name)?);
        log::trace!(
            "Parsed {} ({} top-level definitions)",
            key.display(),
            module.len()
        );

        if let Ok(mut guard) = self.memo.lock() {
            guard.push(
                key,
                MemoEntry {
                    snapshot,
                    module: module.clone(),
                },
            );
        }
        Ok(module)
    }

    /// Parse a file, substituting an empty module named after the file when
    /// parsing fails. The failure is logged.
    pub fn parse_or_empty(&self, path: &Path) -> Definition {
        match self.parse_file(path) {
            Ok(module) => module.as_ref().clone(),
            Err(e) => {
                log::warn!("Failed to parse {}: {}", path.display(), e);
                Definition::new(DefinitionKind::Module, module_name_for(path))
            }
        }
    }

    fn memo_get(&self, key: &Path, snapshot: &FileSnapshot) -> Option<Arc<Definition>> {
        let mut guard = self.memo.lock().ok()?;
        let entry = guard.get(key)?;
        if entry.snapshot == *snapshot {
            Some(entry.module.clone())
        } else {
            None
        }
    }

    /// Number of files actually parsed (memo misses) since construction
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    /// Whether a memo entry exists for `path`, fresh or not
    pub fn is_memoized(&self, path: &Path) -> bool {
        let key = memo_key(path);
        self.memo
            .lock()
            .map(|g| g.contains(&key))
            .unwrap_or(false)
    }

    pub fn memo_len(&self) -> usize {
        self.memo.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn invalidate(&self, path: &Path) {
        let key = memo_key(path);
        if let Ok(mut guard) = self.memo.lock() {
            guard.pop(&key);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut guard) = self.memo.lock() {
            guard.clear();
        }
    }
}

fn memo_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn module_name_for(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(module_name_from_file)
        .unwrap_or_default()
}
