use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use crate::commands::generator::GenerationResult;
use crate::commands::runtime::{ensure_dir, ensure_parent_dirs, SandboxRuntime, DOCUMENT_ROOT};
use crate::commands::sanitize::{rewrite_path, slug_for};
use crate::commands::store::{FileEntry, ProjectMeta, SharedStore};
use crate::error::{Result, WpaiError};
use crate::util::is_blank_path;

/// Progress events streamed to the UI while a generation result is applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum ReconcileEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        raw_name: String,
        slug: String,
        total_files: usize,
    },
    FileStarted { path: String },
    FileWritten { path: String },
    FileFailed { path: String, message: String },
    #[serde(rename_all = "camelCase")]
    Finished { slug: String, failed: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum FileStatus {
    Written,
    Failed { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub original_path: String,
    pub path: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Per-file results of one reconciliation. Partial failure is a normal outcome.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub slug: String,
    pub created: bool,
    pub files: Vec<FileOutcome>,
}

impl ReconcileReport {
    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Failed { .. }))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    /// Turns a report with failed files into [`WpaiError::PartialBatch`].
    pub fn ensure_complete(self) -> Result<Self> {
        match self.failed() {
            0 => Ok(self),
            failed => Err(WpaiError::PartialBatch {
                failed,
                total: self.files.len(),
            }),
        }
    }
}

/// One async lock per slug, so work on a project is applied strictly in turn.
///
/// Only slugs that are held or waited on keep an entry.
#[derive(Clone, Default)]
pub struct SlugLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SlugLocks {
    pub async fn acquire(&self, slug: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            // An entry nobody else references is idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(slug.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Applies generation results to the file set store and the sandbox runtime.
pub struct Reconciler {
    store: SharedStore,
    runtime: Arc<dyn SandboxRuntime>,
    locks: SlugLocks,
    events: Option<mpsc::UnboundedSender<ReconcileEvent>>,
}

impl Reconciler {
    pub fn new(store: SharedStore, runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self {
            store,
            runtime,
            locks: SlugLocks::default(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<ReconcileEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn locks(&self) -> &SlugLocks {
        &self.locks
    }

    fn emit(&self, event: ReconcileEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Merges `result` into its project and writes every file to the sandbox.
    ///
    /// Files are written in the order given. A file that fails to write is
    /// recorded in the report and the rest of the batch still runs. Calls for
    /// the same slug are serialized.
    pub async fn reconcile(&self, result: GenerationResult) -> Result<ReconcileReport> {
        let slug = slug_for(&result.raw_name)?;
        let _guard = self.locks.acquire(&slug).await;
        tracing::info!(
            "Reconciling {} {:?} as {slug} ({} files)",
            result.kind.label(),
            result.raw_name,
            result.files.len()
        );

        let rewritten: Vec<(String, FileEntry)> = result
            .files
            .into_iter()
            .map(|file| {
                // With several matching segments, the one under plugins/ or
                // themes/ is renamed rather than the first one.
                let path = rewrite_path(&file.path, &result.raw_name, &slug);
                (file.path, FileEntry::new(path, file.content))
            })
            .collect();

        let created = {
            let mut store = self.store.lock().await;
            let created = !store.contains(&slug);
            store.create_or_get(
                &slug,
                ProjectMeta {
                    kind: result.kind,
                    name: result.raw_name.clone(),
                    description: result.description.clone(),
                },
            );
            store.merge_files(
                &slug,
                rewritten
                    .iter()
                    .filter(|(_, f)| !is_blank_path(&f.path))
                    .map(|(_, f)| f.clone())
                    .collect(),
            )?;
            created
        };

        self.emit(ReconcileEvent::Started {
            raw_name: result.raw_name.clone(),
            slug: slug.clone(),
            total_files: rewritten.len(),
        });

        let base_dir = format!(
            "{DOCUMENT_ROOT}/wp-content/{}/{slug}",
            result.kind.content_dir()
        );
        if let Err(e) = self.ensure_base_dir(&base_dir).await {
            tracing::warn!("Could not create {base_dir}: {e}");
        }

        let mut outcomes = Vec::with_capacity(rewritten.len());
        for (original_path, file) in rewritten {
            self.emit(ReconcileEvent::FileStarted {
                path: file.path.clone(),
            });

            let status = match self.write_one(&file).await {
                Ok(()) => {
                    tracing::debug!("Wrote {}", file.path);
                    self.emit(ReconcileEvent::FileWritten {
                        path: file.path.clone(),
                    });
                    FileStatus::Written
                }
                Err(e) => {
                    tracing::error!("{e}");
                    let message = e.to_string();
                    self.emit(ReconcileEvent::FileFailed {
                        path: file.path.clone(),
                        message: message.clone(),
                    });
                    FileStatus::Failed { message }
                }
            };

            outcomes.push(FileOutcome {
                original_path,
                path: file.path,
                status,
            });
        }

        self.refresh_preview().await;

        let report = ReconcileReport {
            slug,
            created,
            files: outcomes,
        };
        self.emit(ReconcileEvent::Finished {
            slug: report.slug.clone(),
            failed: report.failed(),
        });
        tracing::info!(
            "Reconciled {}: {} of {} files written",
            report.slug,
            report.files.len() - report.failed(),
            report.files.len()
        );
        Ok(report)
    }

    async fn ensure_base_dir(&self, base_dir: &str) -> Result<()> {
        ensure_parent_dirs(self.runtime.as_ref(), base_dir).await?;
        ensure_dir(self.runtime.as_ref(), base_dir).await
    }

    async fn write_one(&self, file: &FileEntry) -> Result<()> {
        if is_blank_path(&file.path) {
            return Err(WpaiError::EmptyPath {
                path: file.path.clone(),
            });
        }
        let to_write_error = |e: WpaiError| WpaiError::ExternalWrite {
            path: file.path.clone(),
            message: e.to_string(),
        };
        ensure_parent_dirs(self.runtime.as_ref(), &file.path)
            .await
            .map_err(to_write_error)?;
        self.runtime
            .write_file(&file.path, &file.content)
            .await
            .map_err(to_write_error)
    }

    /// Reloads the current page so the preview picks up new code.
    async fn refresh_preview(&self) {
        let refreshed = match self.runtime.get_current_url().await {
            Ok(url) => self.runtime.go_to(&url).await,
            Err(e) => Err(e),
        };
        if let Err(e) = refreshed {
            tracing::warn!("Could not refresh preview: {e}");
        }
    }
}
