//! Progress reporting for long-running encodes.
//!
//! [`ProgressMonitor`] runs the encoder, feeds each diagnostic line through a
//! [`DiagnosticParser`], and hands the caller a [`ProgressUpdate`] per line
//! plus a terminal one when the process exits.

mod monitor;
mod parser;

pub use monitor::{ProgressMonitor, DEFAULT_CANCEL_GRACE};
pub use parser::{
    DiagnosticParser, DiagnosticSample, FfmpegDiagnostics, ProgressPipeDiagnostics,
    ProgressUpdate,
};
