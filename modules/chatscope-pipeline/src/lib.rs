//! Chat ingestion pipeline.
//!
//! Fetches a stream's chat (or resumes from a saved table), persists it,
//! classifies every message in batches and hands the result to a
//! single-slot store. One run at a time, on its own task, with a typed
//! event stream and cooperative cancellation.

pub mod classify;
pub mod infra;
pub mod job;
pub mod pipeline;
pub mod store;
pub mod summary;
pub mod traits;

pub use classify::{classify_all, BatchSettings, DEFAULT_BATCH_SIZE, DEFAULT_TOKEN_SIZE};
pub use infra::HttpClassifier;
pub use job::{CancelHandle, JobController, JobEvent, Outcome, Phase};
pub use pipeline::{format_elapsed, JobHandle, Orchestrator, RunRequest};
pub use store::ResultStore;
pub use summary::{EmotionTimeline, MinuteBucket};
pub use traits::EmotionClassifier;
