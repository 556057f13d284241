//! Follow-mode coordinator: runs periodic vectorization cycles with a
//! re-entrancy guard and single-instance PID-file locking.

use crate::config::FollowModeConfig;
use crate::error::{ErrorCategory, RagentError, Result};
use crate::model::{ProgressReport, WorkerState, WorkerStatus};
use crate::pipeline::{VectorizeOptions, VectorizePipeline};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

pub struct PidLock {
    path: PathBuf,
    file: File,
}

impl PidLock {
    /// Acquires an exclusive non-blocking advisory lock on the PID file
    /// at `dir/ragent.pid`, writing the current process id on success.
    pub fn acquire(dir: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| RagentError::new(ErrorCategory::FileRead, e.to_string()))?;
        let path = PathBuf::from(dir).join("ragent.pid");
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| RagentError::new(ErrorCategory::FileRead, e.to_string()))?;

        file.try_lock_exclusive()
            .map_err(|_| RagentError::new(ErrorCategory::Unknown, "ErrAnotherInstanceRunning"))?;

        let mut file = file;
        file.set_len(0).map_err(|e| RagentError::new(ErrorCategory::FileRead, e.to_string()))?;
        write!(file, "{}", std::process::id()).map_err(|e| RagentError::new(ErrorCategory::FileRead, e.to_string()))?;

        Ok(Self { path, file })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct FollowCoordinator {
    pub pipeline: Arc<VectorizePipeline>,
    pub config: FollowModeConfig,
    in_progress: AtomicBool,
    status: RwLock<WorkerStatus>,
    progress: Arc<RwLock<ProgressReport>>,
}

impl FollowCoordinator {
    pub fn new(pipeline: Arc<VectorizePipeline>, config: FollowModeConfig) -> Self {
        Self {
            pipeline,
            config,
            in_progress: AtomicBool::new(false),
            status: RwLock::new(WorkerStatus {
                state: WorkerState::Idle,
                pid: std::process::id(),
                started_at: None,
                last_error: None,
            }),
            progress: Arc::new(RwLock::new(ProgressReport::default())),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.read().unwrap().clone()
    }

    pub fn progress(&self) -> ProgressReport {
        *self.progress.read().unwrap()
    }

    /// Runs one cycle if no other cycle is in flight. Returns `false`
    /// (without error) when skipped due to re-entrancy.
    pub async fn tick(&self) -> Result<bool> {
        if self.in_progress.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            tracing::info!("follow-mode cycle already running, skipping tick");
            return Ok(false);
        }

        {
            let mut status = self.status.write().unwrap();
            status.state = WorkerState::Running;
            status.started_at = Some(chrono::Utc::now());
            status.last_error = None;
        }

        let progress_slot = self.progress.clone();
        let on_progress: Arc<dyn Fn(ProgressReport) + Send + Sync> =
            Arc::new(move |report: ProgressReport| {
                *progress_slot.write().unwrap() = report;
            });

        let result = self.pipeline.run(&VectorizeOptions::default(), Some(on_progress)).await;

        {
            let mut status = self.status.write().unwrap();
            match &result {
                Ok(_) => status.state = WorkerState::Waiting,
                Err(e) => {
                    status.state = WorkerState::Error;
                    status.last_error = Some(e.message.clone());
                }
            }
        }

        self.in_progress.store(false, Ordering::SeqCst);
        result.map(|_| true)
    }
}
