//
// error.rs
//
// Error taxonomy for interface indexing
//

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn one interface file into a definition tree.
///
/// Callers log these and fall back to an empty module; a parse error never
/// aborts a build.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid UTF-8")]
    InvalidUtf8 { path: PathBuf },
    /// The grammar rejected part of the file (an `ERROR` node)
    #[error("line {}: syntax error near `{found}`", .line + 1)]
    Syntax { line: u32, found: String },
    /// The grammar recovered by inserting a token that is not there
    #[error("line {}: missing `{expected}`", .line + 1)]
    Missing { line: u32, expected: String },
    #[error("the parser returned no syntax tree")]
    NoTree,
}

/// A configured search path that could not be turned into a directory.
///
/// Missing search paths are expected (projects list optional paths), so
/// discovery skips these quietly instead of reporting them.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("search path `{entry}` does not resolve to an existing directory")]
    Unresolved { entry: String },
    #[error("failed to list {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal state of a background index job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Every file in the target list was parsed
    Completed,
    /// Cancellation was observed between two files
    Cancelled,
    /// No file list could be obtained
    Aborted,
    /// The worker task itself failed (panicked or was torn down)
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Aborted => "aborted",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}
