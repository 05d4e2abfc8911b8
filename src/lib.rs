//! Pack-size aware sheet concatenation and relative price index (RPI)
//! enrichment over tabular price tracker data.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod storage;

pub use error::{PipelineError, Result, StageOutcome, UnavailableReason};
pub use pipeline::{PipelineOutput, RunParams, RunReport, run_pipeline};
