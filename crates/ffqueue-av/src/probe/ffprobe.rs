//! FFprobe-based media probing.

use super::types::*;
use crate::exec::execute;
use crate::params::InputSpec;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};

// ffprobe output varies between builds and containers, so every leaf is read
// leniently: a value of the wrong type becomes `None` instead of failing the
// whole document.

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Value,
    #[serde(default)]
    streams: Value,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    #[serde(default, deserialize_with = "lenient_string")]
    format_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    duration: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default, deserialize_with = "lenient_u32")]
    index: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string")]
    codec_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    codec_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string")]
    r_frame_rate: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    channels: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string")]
    sample_rate: Option<String>,
}

fn lenient_string<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_u32<'de, D>(de: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Runs ffprobe against media files.
#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe: PathBuf,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl Prober {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// The argv used to inspect `path`.
    pub fn command(&self, path: &Path) -> Vec<String> {
        let mut argv: Vec<String> = vec![self.ffprobe.to_string_lossy().into_owned()];
        argv.extend(
            ["-v", "error", "-print_format", "json", "-show_format", "-show_streams"]
                .map(String::from),
        );
        argv.push(path.to_string_lossy().into_owned());
        argv
    }

    /// Probe a media file.
    ///
    /// # Errors
    ///
    /// - [`Error::ExternalTool`] if ffprobe exits non-zero.
    /// - [`Error::ToolNotFound`] if ffprobe is missing.
    /// - [`Error::Json`] if the output is not a JSON document.
    pub fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let result = execute(&self.command(path), true)?;
        parse_ffprobe_json(path, &result.stdout)
    }

    /// Probe every path, in order, into merge inputs.
    ///
    /// A file that cannot be probed becomes a bare [`InputSpec`] with no
    /// known frame size and no audio, so a merge fills its audio with
    /// silence. It contributes nothing to the total duration.
    pub fn probe_inputs<P: AsRef<Path>>(&self, paths: &[P]) -> ProbedInputs {
        let mut specs = Vec::with_capacity(paths.len());
        let mut total = 0.0;

        for path in paths {
            let path = path.as_ref();
            match self.probe(path) {
                Ok(info) => {
                    total += info.duration.unwrap_or(0.0);
                    specs.push(info.to_input_spec());
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(path = %path.display(), error = %_e, "probe failed, using bare input");
                    specs.push(InputSpec::new(path).with_audio(false));
                }
            }
        }

        ProbedInputs {
            specs,
            total_duration: (total > 0.0).then_some(total),
        }
    }
}

/// Parse ffprobe's `-print_format json` output.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<MediaInfo> {
    if json.trim().is_empty() {
        return Err(Error::parse_error("ffprobe", "empty output"));
    }
    let output: FfprobeOutput = serde_json::from_str(json)?;
    Ok(into_media_info(path, output))
}

fn into_media_info(path: &Path, output: FfprobeOutput) -> MediaInfo {
    let format: FfprobeFormat = serde_json::from_value(output.format).unwrap_or_default();
    let streams: Vec<FfprobeStream> = match output.streams {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    };
    let mut info = MediaInfo {
        file_path: path.to_path_buf(),
        container: format.format_name,
        duration: format
            .duration
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0),
        size: format.size.and_then(|s| s.parse().ok()),
        bit_rate: format.bit_rate.and_then(|s| s.parse().ok()),
        video_streams: Vec::new(),
        audio_streams: Vec::new(),
    };

    for stream in streams {
        match stream.codec_type.as_deref() {
            Some("video") => info.video_streams.push(VideoStream {
                index: stream.index.unwrap_or(0),
                codec: stream.codec_name,
                width: stream.width,
                height: stream.height,
                frame_rate: stream.r_frame_rate.and_then(|s| parse_frame_rate(&s)),
            }),
            Some("audio") => info.audio_streams.push(AudioStream {
                index: stream.index.unwrap_or(0),
                codec: stream.codec_name,
                channels: stream.channels,
                sample_rate: stream.sample_rate.and_then(|s| s.parse().ok()),
            }),
            _ => {}
        }
    }

    info
}

fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }
    rate.parse().ok()
}
