//! # ffqueue-av
//!
//! Building, running and monitoring ffmpeg/ffprobe invocations.
//!
//! This crate provides:
//! - Typed encode parameters and input descriptors ([`EncodeParams`], [`InputSpec`])
//! - Deterministic argv generation for single-file conversion and multi-file
//!   concatenation ([`CommandBuilder`])
//! - Blocking execution with captured output ([`execute`])
//! - Execution with streamed progress, ETA and cancellation ([`ProgressMonitor`])
//! - Media probing via ffprobe ([`Prober`])
//! - Tool availability checks
//!
//! ## Features
//!
//! - `tracing` - Emit debug/warn events through the `tracing` crate
//!
//! ## Example
//!
//! ```no_run
//! use ffqueue_av::{CommandBuilder, EncodeParams, InputSpec, ProgressMonitor};
//! use std::path::Path;
//!
//! let params = EncodeParams::from_json(r#"{"video": {"codec": "libx264", "crf": 23}}"#)?;
//! let argv = CommandBuilder::default()
//!     .build_convert(&InputSpec::new("in.mov"), Path::new("out.mp4"), &params)?;
//!
//! ProgressMonitor::new().run(&argv, Some(120.0), |update| {
//!     if let Some(progress) = update.progress {
//!         eprintln!("{:.0}%", progress * 100.0);
//!     }
//! }, true)?;
//! # Ok::<(), ffqueue_av::Error>(())
//! ```

pub mod command;
mod error;
pub mod exec;
pub mod params;
pub mod probe;
pub mod progress;
pub mod tools;

// Re-exports
pub use command::{format_command, CommandBuilder};
pub use error::{Error, Result, ToolFailure};
pub use exec::{execute, CommandResult};
pub use params::{
    AudioParams, ColorAdjust, Crop, Denoise, EncodeParams, InputSpec, Loudnorm, VideoParams,
};
pub use probe::{MediaInfo, ProbedInputs, Prober};
pub use progress::{DiagnosticParser, FfmpegDiagnostics, ProgressMonitor, ProgressUpdate};
pub use tools::{check_tool, check_tools, require_tool, resolve_tool_path, ToolInfo};

/// Cancellation handle accepted by [`ProgressMonitor::run_cancellable`].
pub use tokio_util::sync::CancellationToken;

/// Probe a media file with the `ffprobe` found on `PATH`.
///
/// # Example
///
/// ```no_run
/// let info = ffqueue_av::probe("/path/to/video.mkv")?;
/// println!("Duration: {:?}", info.duration);
/// # Ok::<(), ffqueue_av::Error>(())
/// ```
pub fn probe<P: AsRef<std::path::Path>>(path: P) -> Result<MediaInfo> {
    probe::probe(path.as_ref())
}
