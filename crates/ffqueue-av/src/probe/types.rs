//! Probed media metadata.

use crate::params::InputSpec;
use serde::Serialize;
use std::path::PathBuf;

/// Container and stream metadata of one media file.
///
/// Fields the prober did not report, or reported in an unreadable form, are
/// `None` rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    pub file_path: PathBuf,
    /// Container format name(s), e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub container: Option<String>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    /// File size in bytes.
    pub size: Option<u64>,
    /// Overall bit rate in bits per second.
    pub bit_rate: Option<u64>,
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoStream {
    /// Stream index within the container.
    pub index: u32,
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Frames per second.
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioStream {
    /// Stream index within the container.
    pub index: u32,
    pub codec: Option<String>,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
}

impl MediaInfo {
    /// Frame size of the first video stream that reports one.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.video_streams.iter().find_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        })
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    /// A merge input carrying this file's frame size and audio presence.
    pub fn to_input_spec(&self) -> InputSpec {
        let spec = InputSpec::new(self.file_path.clone()).with_audio(self.has_audio());
        match self.dimensions() {
            Some((w, h)) => spec.with_dimensions(w, h),
            None => spec,
        }
    }
}

/// Merge inputs built from probing a list of files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbedInputs {
    pub specs: Vec<InputSpec>,
    /// Sum of the known input durations, or `None` if none was known.
    pub total_duration: Option<f64>,
}
