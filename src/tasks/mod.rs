//! Background encode tasks.
//!
//! This module runs encoder invocations off the caller's thread:
//!
//! - [`TaskManager`] validates submissions, keeps the task registry and
//!   schedules work on a fixed pool of worker threads
//! - [`EncoderService`] builds commands and runs them, monitored or plain
//! - [`TaskEvent`] broadcasts state changes and progress to any number of
//!   subscribers

mod manager;
mod pool;
mod service;
mod types;

pub use manager::{ProgressCallback, TaskManager, TaskManagerBuilder, TaskObserver};
pub use service::EncoderService;
pub use types::*;
