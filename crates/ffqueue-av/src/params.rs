//! Encode parameter and input descriptor types.
//!
//! These are the strongly typed form of the parameter maps a front end
//! produces. Every field is optional; an absent field means the encoder picks
//! its own default. Values are checked once, by [`EncodeParams::validate`] and
//! [`InputSpec::validate`], when a command is built.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Highest CRF accepted by the x264/x265/libvpx family.
const MAX_CRF: u32 = 63;

/// One input file, optionally trimmed, with the stream facts needed to merge it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    path: PathBuf,
    #[serde(default, alias = "start", skip_serializing_if = "Option::is_none")]
    trim_start: Option<f64>,
    #[serde(default, alias = "end", skip_serializing_if = "Option::is_none")]
    trim_end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    has_audio: Option<bool>,
}

impl InputSpec {
    /// Input from a bare path; every other field takes its default.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            trim_start: None,
            trim_end: None,
            width: None,
            height: None,
            has_audio: None,
        }
    }

    /// Restrict the consumed portion of the input (seconds).
    #[must_use]
    pub fn with_trim(mut self, start: Option<f64>, end: Option<f64>) -> Self {
        self.trim_start = start;
        self.trim_end = end;
        self
    }

    /// Record the input's video dimensions.
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Record whether the input carries an audio stream.
    #[must_use]
    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = Some(has_audio);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn trim_start(&self) -> Option<f64> {
        self.trim_start
    }

    pub fn trim_end(&self) -> Option<f64> {
        self.trim_end
    }

    /// Both dimensions, if both are known and non-zero.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// Whether the input has audio. Unknown counts as yes.
    pub fn has_audio(&self) -> bool {
        self.has_audio.unwrap_or(true)
    }

    /// Check the record is usable as an encoder input.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("input is missing a path"));
        }
        for (name, value) in [("trim_start", self.trim_start), ("trim_end", self.trim_end)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::invalid_argument(format!(
                        "{name} must be a non-negative number of seconds, got {v}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl From<&str> for InputSpec {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for InputSpec {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for InputSpec {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for InputSpec {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

/// Full parameter set for one encoder invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeParams {
    pub video: VideoParams,
    pub audio: AudioParams,
    /// Overwrite the output file if it exists (`-y`), otherwise refuse (`-n`).
    pub overwrite: bool,
    /// Passed to the encoder verbatim, just before the output path.
    pub extra_args: Vec<String>,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            video: VideoParams::default(),
            audio: AudioParams::default(),
            overwrite: true,
            extra_args: Vec::new(),
        }
    }
}

impl EncodeParams {
    /// Parse a JSON parameter map.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Fill every unset field from `defaults`. `overwrite` and a non-empty
    /// `extra_args` are kept as they are.
    #[must_use]
    pub fn with_defaults(mut self, defaults: &EncodeParams) -> Self {
        self.video.fill_from(&defaults.video);
        self.audio.fill_from(&defaults.audio);
        if self.extra_args.is_empty() {
            self.extra_args = defaults.extra_args.clone();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.audio.validate()
    }
}

/// Video stream settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoParams {
    /// Encoder name, e.g. `libx264`.
    pub codec: Option<String>,
    /// Constant rate factor. Takes precedence over `bitrate`.
    pub crf: Option<u32>,
    /// Target bitrate, e.g. `4M`.
    pub bitrate: Option<String>,
    pub fps: Option<f64>,
    /// Output size as `WxH`, or `auto`.
    pub resolution: Option<String>,
    pub preset: Option<String>,
    pub tune: Option<String>,
    pub crop: Option<Crop>,
    /// Clockwise rotation in degrees.
    pub rotate: Option<f64>,
    pub color: Option<ColorAdjust>,
}

impl VideoParams {
    /// The explicit resolution, unless it is absent or `auto`.
    pub fn explicit_resolution(&self) -> Option<&str> {
        self.resolution
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("auto"))
    }

    fn fill_from(&mut self, other: &VideoParams) {
        fill(&mut self.codec, &other.codec);
        // A bitrate default must not shadow an explicit crf and vice versa.
        if self.crf.is_none() && self.bitrate.is_none() {
            self.crf = other.crf;
            self.bitrate = other.bitrate.clone();
        }
        fill(&mut self.fps, &other.fps);
        fill(&mut self.resolution, &other.resolution);
        fill(&mut self.preset, &other.preset);
        fill(&mut self.tune, &other.tune);
        fill(&mut self.crop, &other.crop);
        fill(&mut self.rotate, &other.rotate);
        fill(&mut self.color, &other.color);
    }

    fn validate(&self) -> Result<()> {
        if let Some(crf) = self.crf {
            if crf > MAX_CRF {
                return Err(Error::invalid_argument(format!(
                    "crf must be between 0 and {MAX_CRF}, got {crf}"
                )));
            }
        }
        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(Error::invalid_argument(format!(
                    "fps must be positive, got {fps}"
                )));
            }
        }
        if let Some(rotate) = self.rotate {
            if !rotate.is_finite() {
                return Err(Error::invalid_argument("rotate must be a finite angle"));
            }
        }
        if let Some(crop) = &self.crop {
            if crop.w == Some(0) || crop.h == Some(0) {
                return Err(Error::invalid_argument("crop width and height must be non-zero"));
            }
        }
        Ok(())
    }
}

/// Crop rectangle. Only applied when both `w` and `h` are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Crop {
    pub x: Option<u32>,
    pub y: Option<u32>,
    #[serde(alias = "width")]
    pub w: Option<u32>,
    #[serde(alias = "height")]
    pub h: Option<u32>,
}

/// Color equalization, each value in percent around zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorAdjust {
    pub brightness: Option<f64>,
    pub contrast: Option<f64>,
    pub saturation: Option<f64>,
}

impl ColorAdjust {
    pub fn is_empty(&self) -> bool {
        self.brightness.is_none() && self.contrast.is_none() && self.saturation.is_none()
    }
}

/// Audio stream settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioParams {
    pub codec: Option<String>,
    pub bitrate: Option<String>,
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub loudnorm: Option<Loudnorm>,
    pub denoise: Option<Denoise>,
}

impl AudioParams {
    fn fill_from(&mut self, other: &AudioParams) {
        fill(&mut self.codec, &other.codec);
        fill(&mut self.bitrate, &other.bitrate);
        fill(&mut self.sample_rate, &other.sample_rate);
        fill(&mut self.channels, &other.channels);
        fill(&mut self.loudnorm, &other.loudnorm);
        fill(&mut self.denoise, &other.denoise);
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == Some(0) {
            return Err(Error::invalid_argument("sample_rate must be positive"));
        }
        if self.channels == Some(0) {
            return Err(Error::invalid_argument("channels must be positive"));
        }
        Ok(())
    }
}

/// EBU R128 loudness normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Loudnorm {
    /// Integrated loudness target in LUFS (default -16).
    pub target: Option<f64>,
    /// Maximum true peak in dBTP (default -1).
    pub true_peak: Option<f64>,
}

impl Loudnorm {
    pub fn target(&self) -> f64 {
        self.target.unwrap_or(-16.0)
    }

    pub fn true_peak(&self) -> f64 {
        self.true_peak.unwrap_or(-1.0)
    }
}

/// FFT denoiser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Denoise {
    /// Noise reduction in dB (default 12).
    pub strength: Option<f64>,
}

impl Denoise {
    pub fn strength(&self) -> f64 {
        self.strength.unwrap_or(12.0)
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, default: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(default);
    }
}

/// Parse a `WxH` resolution string.
pub fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.trim().to_ascii_lowercase().split_once('x').map(|(w, h)| {
        (w.trim().parse::<u32>(), h.trim().parse::<u32>())
    })?;
    match (w, h) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    }
}
