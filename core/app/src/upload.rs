//! Concurrent uploads with per-file progress.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use filedeck_api::{FileServer, ProgressFn, RemoteEntry, UploadSource};
use filedeck_common::{EntryId, Error};

use crate::context::AppContext;
use crate::directory::DirectoryStore;
use crate::events::{AppEvent, EventBus};

/// Progress of one upload. Only ever increases, or becomes `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum UploadProgress {
    /// Percentage in `0.0..=100.0`.
    Percent(f64),
    /// Terminal.
    Failed,
}

impl UploadProgress {
    /// Move forward to `percent`. Returns whether anything changed.
    fn advance(&mut self, percent: f64) -> bool {
        match self {
            UploadProgress::Percent(current) if percent > *current => {
                *current = percent.min(100.0);
                true
            }
            _ => false,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UploadProgress::Failed)
    }
}

/// A file being uploaded, or one that failed and has not been dismissed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadTask {
    pub file_name: String,
    pub target: EntryId,
    pub progress: UploadProgress,
}

/// How one upload ended.
#[derive(Debug)]
pub enum UploadOutcome {
    Uploaded { file_name: String, entry: RemoteEntry },
    Failed { file_name: String, error: Error },
}

impl UploadOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            UploadOutcome::Uploaded { file_name, .. } | UploadOutcome::Failed { file_name, .. } => {
                file_name
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

/// Handles of the uploads started by one call.
pub struct UploadBatch {
    handles: Vec<(String, JoinHandle<UploadOutcome>)>,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait until every upload of the batch has settled.
    pub async fn settled(self) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for (file_name, handle) in self.handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => UploadOutcome::Failed {
                    error: Error::Upload {
                        file: file_name.clone(),
                        reason: format!("upload task aborted: {}", e),
                    },
                    file_name,
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

type Tasks = Arc<Mutex<Vec<UploadTask>>>;

fn lock(tasks: &Tasks) -> MutexGuard<'_, Vec<UploadTask>> {
    tasks.lock().unwrap_or_else(|e| e.into_inner())
}

/// First task still in flight for `file_name`.
///
/// Tasks are matched by file name; failed tasks never match.
fn in_flight<'a>(tasks: &'a mut [UploadTask], file_name: &str) -> Option<&'a mut UploadTask> {
    tasks
        .iter_mut()
        .find(|t| t.file_name == file_name && !t.progress.is_failed())
}

/// Runs uploads as independent tokio tasks and tracks their progress.
///
/// No queue and no concurrency limit. A successful upload removes its
/// task and refreshes the target directory if it is still the one shown;
/// a failed one stays visible.
#[derive(Clone)]
pub struct UploadCoordinator {
    server: Arc<dyn FileServer>,
    directory: DirectoryStore,
    events: EventBus,
    tasks: Tasks,
}

impl UploadCoordinator {
    pub fn new(ctx: &AppContext, directory: DirectoryStore) -> Self {
        Self {
            server: ctx.server().clone(),
            directory,
            events: ctx.events().clone(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start uploading every source into `target`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn upload(&self, target: &EntryId, sources: Vec<UploadSource>) -> UploadBatch {
        let mut handles = Vec::with_capacity(sources.len());
        for source in sources {
            let file_name = source.name().to_string();
            lock(&self.tasks).push(UploadTask {
                file_name: file_name.clone(),
                target: target.clone(),
                progress: UploadProgress::Percent(0.0),
            });
            self.events.publish(AppEvent::UploadStarted {
                file_name: file_name.clone(),
            });

            let handle = tokio::spawn(self.clone().run(target.clone(), source));
            handles.push((file_name, handle));
        }
        UploadBatch { handles }
    }

    async fn run(self, target: EntryId, source: UploadSource) -> UploadOutcome {
        let file_name = source.name().to_string();
        info!("Uploading {} ({} bytes)", file_name, source.len());

        let tasks = self.tasks.clone();
        let name = file_name.clone();
        let progress: ProgressFn = Arc::new(move |percent| {
            if let Some(task) = in_flight(&mut lock(&tasks), &name) {
                task.progress.advance(percent);
            }
        });

        let result = self.server.upload_file(&target, source, progress).await;
        match result {
            Ok(entry) => {
                info!("Uploaded {}", file_name);
                {
                    let mut tasks = lock(&self.tasks);
                    if let Some(pos) = tasks
                        .iter()
                        .position(|t| t.file_name == file_name && !t.progress.is_failed())
                    {
                        tasks.remove(pos);
                    }
                }
                self.events.publish(AppEvent::UploadSettled {
                    file_name: file_name.clone(),
                    succeeded: true,
                });
                if self.directory.current_id().as_ref() == Some(&target) {
                    if let Err(e) = self.directory.load(Some(&target)).await {
                        warn!("Failed to reload after upload of {}: {}", file_name, e);
                    }
                } else {
                    debug!("{} moved out of view, skipping reload", target);
                }
                UploadOutcome::Uploaded { file_name, entry }
            }
            Err(e) => {
                error!("Failed to upload {}: {}", file_name, e);
                if let Some(task) = in_flight(&mut lock(&self.tasks), &file_name) {
                    task.progress = UploadProgress::Failed;
                }
                self.events.publish(AppEvent::UploadSettled {
                    file_name: file_name.clone(),
                    succeeded: false,
                });
                let error = match e {
                    Error::Unauthorized(_) | Error::Upload { .. } => e,
                    other => Error::Upload {
                        file: file_name.clone(),
                        reason: other.user_message(),
                    },
                };
                UploadOutcome::Failed { file_name, error }
            }
        }
    }

    /// Snapshot of the visible tasks.
    pub fn tasks(&self) -> Vec<UploadTask> {
        lock(&self.tasks).clone()
    }

    /// Apply a progress report for `file_name`. Unknown names are ignored.
    pub fn update_progress(&self, file_name: &str, percent: f64) {
        if let Some(task) = in_flight(&mut lock(&self.tasks), file_name) {
            task.progress.advance(percent);
        }
    }

    /// Dismiss failed tasks, returning how many were removed.
    pub fn clear_failed(&self) -> usize {
        let mut tasks = lock(&self.tasks);
        let before = tasks.len();
        tasks.retain(|t| !t.progress.is_failed());
        before - tasks.len()
    }
}
