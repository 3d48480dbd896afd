//! End-to-end run: load or fetch a chat table, persist it, classify, persist
//! again, publish.
//!
//! Every stage returns `Result`; the first error or cancellation stops the
//! run. The unlabeled table is written as soon as it is fetched so that a
//! cancelled or failed classification never loses the download.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use chatscope_archive::{read_table, write_table, ChatArchive};
use chatscope_common::{ChatTable, PipelineError, ProgressSink, Result};

use crate::classify::{classify_all, BatchSettings, DEFAULT_BATCH_SIZE, DEFAULT_TOKEN_SIZE};
use crate::job::{CancelHandle, JobController, JobEvent};
use crate::store::ResultStore;
use crate::traits::EmotionClassifier;

const STEP_LOAD: &str = "Loading saved chat";
const STEP_SAVE: &str = "Saving chat";
const STEP_SAVE_LABELED: &str = "Saving labeled chat";

/// Inputs for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Where the table is written. If it already exists, the run resumes from it.
    pub output_path: PathBuf,
    pub url: String,
    pub skip_download: bool,
    pub skip_classify: bool,
    pub batch_size: usize,
    pub token_size: usize,
}

impl RunRequest {
    pub fn new(output_path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            output_path: output_path.into(),
            url: url.into(),
            skip_download: false,
            skip_classify: false,
            batch_size: DEFAULT_BATCH_SIZE,
            token_size: DEFAULT_TOKEN_SIZE,
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batch_size,
            token_size: self.token_size,
        }
    }
}

/// A run in flight on its own task.
pub struct JobHandle {
    pub events: mpsc::UnboundedReceiver<JobEvent>,
    pub cancel: CancelHandle,
    pub join: JoinHandle<Result<Arc<ChatTable>>>,
}

pub struct Orchestrator {
    archive: Arc<ChatArchive>,
    classifier: Option<Arc<dyn EmotionClassifier>>,
    store: Arc<ResultStore>,
}

impl Orchestrator {
    pub fn new(
        archive: Arc<ChatArchive>,
        classifier: Option<Arc<dyn EmotionClassifier>>,
        store: Arc<ResultStore>,
    ) -> Self {
        Self {
            archive,
            classifier,
            store,
        }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Start a run on a dedicated task. Events arrive on `JobHandle::events`
    /// and end with exactly one `Finished`.
    pub fn spawn_run(self: &Arc<Self>, request: RunRequest) -> JobHandle {
        let cancel = CancelHandle::new();
        let (job, events) = JobController::new(cancel.clone());
        let orchestrator = Arc::clone(self);
        let run_id = Uuid::new_v4();

        let join = tokio::spawn(
            async move {
                let started = Instant::now();
                job.start();
                let result = orchestrator.run(&request, &job).await;
                let elapsed = format_elapsed(started.elapsed());

                match &result {
                    Ok(table) => {
                        info!(records = table.records.len(), elapsed = %elapsed, "Run completed")
                    }
                    Err(e) if e.is_cancelled() => info!(elapsed = %elapsed, "Run cancelled"),
                    Err(e) => error!(kind = e.kind(), error = %e, elapsed = %elapsed, "Run failed"),
                }

                job.finish(result.as_ref().err());
                result
            }
            .instrument(info_span!("run", %run_id)),
        );

        JobHandle { events, cancel, join }
    }

    /// Execute one run against `job`. Public so callers can drive it inline.
    pub async fn run(&self, request: &RunRequest, job: &JobController) -> Result<Arc<ChatTable>> {
        request.batch_settings().validate()?;
        let path = &request.output_path;

        let mut table = if path.exists() {
            job.checkpoint(STEP_LOAD)?;
            let table = read_table(path)?;
            info!(
                path = %path.display(),
                records = table.records.len(),
                "Resuming from saved chat table"
            );
            table
        } else if request.skip_download {
            return Err(PipelineError::Configuration(format!(
                "missing required input: {} does not exist and download was skipped",
                path.display()
            )));
        } else {
            let source = self.archive.source(&request.url)?;
            let table = source.chat(job).await?;

            // A fetched transcript is always persisted; a cancel that arrived
            // meanwhile takes effect once it is on disk.
            job.enter_step(STEP_SAVE);
            write_table(path, &table)?;
            info!(
                path = %path.display(),
                records = table.records.len(),
                "Saved chat table"
            );
            job.checkpoint(STEP_SAVE)?;
            table
        };

        if request.skip_classify {
            info!("Classification skipped");
        } else {
            let classifier = self.classifier.as_ref().ok_or_else(|| {
                PipelineError::Configuration(
                    "no classifier configured (set CLASSIFIER_URL or skip classification)".into(),
                )
            })?;

            let labels =
                classify_all(classifier.as_ref(), &table.texts(), request.batch_settings(), job)
                    .await?;
            table.attach_labels(labels)?;

            job.checkpoint(STEP_SAVE_LABELED)?;
            write_table(path, &table)?;
            info!(path = %path.display(), "Saved labeled chat table");
        }

        Ok(self.store.set(table))
    }
}

/// `hh:mm:ss`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}
