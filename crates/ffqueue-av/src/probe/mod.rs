//! Media file probing.
//!
//! Probing is advisory: callers use it to fill in merge inputs and total
//! durations, and fall back to bare inputs when it fails.

mod ffprobe;
mod types;

pub use ffprobe::{parse_ffprobe_json, Prober};
pub use types::*;

use crate::Result;
use std::path::Path;

/// Probe a media file with the `ffprobe` found on `PATH`.
pub fn probe(path: &Path) -> Result<MediaInfo> {
    Prober::default().probe(path)
}
