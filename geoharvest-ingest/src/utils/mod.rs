//! Utility modules

pub mod retry;
pub mod worker_pool;

pub use retry::{retry_transient, RetryPolicy};
pub use worker_pool::run_bounded;
