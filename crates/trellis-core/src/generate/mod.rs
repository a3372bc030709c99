//! Plan generation and adjustment: prompt assembly plus the background
//! worker that drives the external model and applies the resulting draft.

pub mod prompt;
pub mod worker;

pub use worker::{Job, JobQueue, WorkerConfig, request_adjustment, request_generation, spawn_worker};
