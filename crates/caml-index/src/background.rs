//
// background.rs
//
// Cancellable warm-up job that fills the parser memo
//

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::IndexConfig;
use crate::discovery::{list_interface_files, project_interface_files, Project};
use crate::error::JobStatus;
use crate::interface_parser::InterfaceParser;

/// Progress notification emitted by a running job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// File list obtained; `total` files will be parsed
    Started { total: usize },
    /// One more file parsed (successfully or not)
    File {
        processed: usize,
        total: usize,
        path: PathBuf,
    },
    Finished(JobStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    Finished(JobStatus),
}

/// Warms the parser memo for every interface file of a project, or of the
/// standard library directory when no project is given.
///
/// The job never touches the index cache. Its durable effects are the memo
/// entries for the files it parsed and the readiness flag.
pub struct BackgroundIndexJob {
    parser: Arc<InterfaceParser>,
    config: IndexConfig,
    project: Option<Project>,
    token: CancellationToken,
    ready: Arc<AtomicBool>,
    state: Arc<Mutex<JobState>>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl BackgroundIndexJob {
    pub fn new(parser: Arc<InterfaceParser>, config: IndexConfig, project: Option<Project>) -> Self {
        Self {
            parser,
            config,
            project,
            token: CancellationToken::new(),
            ready: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(JobState::Created)),
            progress: None,
        }
    }

    /// Report readiness through an existing flag instead of a fresh one
    pub fn with_readiness(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = ready;
        self
    }

    /// Receive progress events. Only the most recent subscriber gets them.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress = Some(tx);
        rx
    }

    pub fn readiness(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> JobState {
        read_state(&self.state)
    }

    /// Start the job on the current tokio runtime
    pub fn spawn(self) -> IndexJobHandle {
        let token = self.token.clone();
        let ready = self.ready.clone();
        let state = self.state.clone();
        let task = tokio::spawn(self.run());
        IndexJobHandle {
            task,
            token,
            ready,
            state,
        }
    }

    /// Run the job to a terminal state on the calling task
    pub async fn run(self) -> JobStatus {
        self.set_state(JobState::Running);
        let start = Instant::now();

        let Some(files) = self.target_files() else {
            return self.finish(JobStatus::Aborted);
        };
        let total = files.len();
        log::info!("Background indexing {} interface files", total);
        self.emit(ProgressEvent::Started { total });

        for (i, path) in files.into_iter().enumerate() {
            if self.token.is_cancelled() {
                log::info!("Background indexing cancelled after {}/{} files", i, total);
                return self.finish(JobStatus::Cancelled);
            }

            let parser = self.parser.clone();
            let target = path.clone();
            let parsed = tokio::task::spawn_blocking(move || parser.parse_file(&target)).await;
            match parsed {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::warn!("Failed to parse {}: {}", path.display(), e),
                Err(e) => {
                    log::warn!("Parse worker for {} failed: {}", path.display(), e);
                    return self.finish(JobStatus::Failed);
                }
            }

            self.emit(ProgressEvent::File {
                processed: i + 1,
                total,
                path,
            });
            tokio::task::yield_now().await;
        }

        log::info!(
            "Background indexing finished {} files in {:?}",
            total,
            start.elapsed()
        );
        self.finish(JobStatus::Completed)
    }

    fn target_files(&self) -> Option<Vec<PathBuf>> {
        let ext = self.config.interface_extension.as_str();
        if let Some(project) = &self.project {
            return match project_interface_files(project, ext) {
                Ok(files) => Some(files),
                Err(e) => {
                    log::warn!("Background indexing aborted for {}: {}", project, e);
                    None
                }
            };
        }

        let Some(stdlib) = &self.config.stdlib_path else {
            log::warn!("Background indexing aborted: no project and no standard library path");
            return None;
        };
        match list_interface_files(stdlib, ext) {
            Ok(mut files) => {
                files.sort();
                Some(files)
            }
            Err(e) => {
                log::warn!("Background indexing aborted: {}", e);
                None
            }
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // A dropped receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }

    fn set_state(&self, state: JobState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// Record the terminal state. Readiness means the memo is warm, so only
    /// a completed run sets it; cancelled, aborted and failed runs leave it
    /// untouched.
    fn finish(&self, status: JobStatus) -> JobStatus {
        if status == JobStatus::Completed {
            self.ready.store(true, Ordering::SeqCst);
        }
        self.set_state(JobState::Finished(status));
        self.emit(ProgressEvent::Finished(status));
        status
    }
}

fn read_state(state: &Mutex<JobState>) -> JobState {
    state.lock().map(|g| *g).unwrap_or(JobState::Finished(JobStatus::Failed))
}

/// Handle to a spawned [`BackgroundIndexJob`]
pub struct IndexJobHandle {
    task: JoinHandle<JobStatus>,
    token: CancellationToken,
    ready: Arc<AtomicBool>,
    state: Arc<Mutex<JobState>>,
}

impl IndexJobHandle {
    /// Request cancellation. The job stops before its next file.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> JobState {
        read_state(&self.state)
    }

    /// Wait for the job to reach a terminal state
    pub async fn join(self) -> JobStatus {
        match self.task.await {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Background index job failed: {}", e);
                if let Ok(mut guard) = self.state.lock() {
                    *guard = JobState::Finished(JobStatus::Failed);
                }
                JobStatus::Failed
            }
        }
    }
}
