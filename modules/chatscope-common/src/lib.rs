pub mod config;
pub mod error;
pub mod progress;
pub mod types;

pub use config::Config;
pub use error::{PipelineError, Result, CANCEL_MESSAGE};
pub use progress::ProgressSink;
pub use types::*;
