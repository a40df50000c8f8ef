// lib.rs - OCaml interface indexing for editor completion.
//
// The binary in main.rs is a thin driver over `cli`. Benchmarks and
// integration tests use the library directly.

pub mod background;
pub mod cli;
pub mod config;
pub mod definition;
pub mod discovery;
pub mod error;
pub mod index_cache;
pub mod interface_parser;
pub mod scope;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use background::{BackgroundIndexJob, IndexJobHandle, JobState, ProgressEvent};
pub use config::{IndexConfig, ProjectConfig};
pub use definition::{Definition, DefinitionKind};
pub use discovery::Project;
pub use error::{DiscoveryError, JobStatus, ParseError};
pub use index_cache::{BufferContext, IndexCache};
pub use interface_parser::InterfaceParser;
