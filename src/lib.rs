//! ffqueue - background ffmpeg conversion and concatenation queue
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod tasks;
