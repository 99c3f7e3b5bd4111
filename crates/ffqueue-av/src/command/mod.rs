//! Translate [`EncodeParams`] into encoder argument vectors.
//!
//! Building is pure: no I/O, no clock, no randomness. The same inputs always
//! produce the same argv, so the output can be compared against literal
//! expected sequences.
//!
//! # Example
//!
//! ```
//! use ffqueue_av::{CommandBuilder, EncodeParams, InputSpec};
//! use std::path::Path;
//!
//! let mut params = EncodeParams::default();
//! params.video.crf = Some(23);
//!
//! let argv = CommandBuilder::new("ffmpeg")
//!     .build_convert(&InputSpec::new("in.mov"), Path::new("out.mp4"), &params)?;
//! assert_eq!(argv, ["ffmpeg", "-hide_banner", "-y", "-i", "in.mov", "-crf", "23", "out.mp4"]);
//! # Ok::<(), ffqueue_av::Error>(())
//! ```

mod concat;
mod filters;

pub use concat::{
    build_concat_graph, resolve_target_resolution, ConcatGraph, DEFAULT_SAMPLE_RATE,
    FALLBACK_RESOLUTION,
};
pub use filters::{audio_filters, rotation_filter, video_filters};

use crate::params::{AudioParams, EncodeParams, InputSpec, VideoParams};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Builds ffmpeg argument vectors. The first element is always the encoder
/// program itself.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    encoder: PathBuf,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl CommandBuilder {
    /// Create a builder for the encoder at `encoder`.
    pub fn new(encoder: impl Into<PathBuf>) -> Self {
        Self {
            encoder: encoder.into(),
        }
    }

    /// The encoder program placed at `argv[0]`.
    pub fn encoder(&self) -> &Path {
        &self.encoder
    }

    /// Build a single-input transcode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the input has no path, the output
    /// path is empty, or a parameter is out of range.
    pub fn build_convert(
        &self,
        input: &InputSpec,
        output: &Path,
        params: &EncodeParams,
    ) -> Result<Vec<String>> {
        input.validate()?;
        validate_output(output)?;
        params.validate()?;

        let mut argv = self.preamble(params);
        push_input(&mut argv, input);
        push_video_args(&mut argv, &params.video, true);
        push_audio_args(&mut argv, &params.audio);
        argv.extend(params.extra_args.iter().cloned());
        argv.push(path_arg(output));

        #[cfg(feature = "tracing")]
        tracing::debug!(argv = ?argv, "built convert command");

        Ok(argv)
    }

    /// Build a concatenation of two or more inputs into one output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for fewer than two inputs, an input
    /// without a path, an empty output path, or an out-of-range parameter.
    pub fn build_merge(
        &self,
        inputs: &[InputSpec],
        output: &Path,
        params: &EncodeParams,
    ) -> Result<Vec<String>> {
        if inputs.len() < 2 {
            return Err(Error::invalid_argument(format!(
                "merging requires at least two inputs, got {}",
                inputs.len()
            )));
        }
        for input in inputs {
            input.validate()?;
        }
        validate_output(output)?;
        params.validate()?;

        let mut argv = self.preamble(params);
        for input in inputs {
            push_input(&mut argv, input);
        }

        let resolution = resolve_target_resolution(inputs, params);
        let sample_rate = params.audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let concat = build_concat_graph(inputs, resolution, sample_rate);

        argv.push("-filter_complex".into());
        argv.push(concat.graph);
        argv.push("-map".into());
        argv.push(concat.video_label.into());
        if let Some(audio_label) = concat.audio_label {
            argv.push("-map".into());
            argv.push(audio_label.into());
        }

        // The graph already transforms every input; a separate -vf would
        // conflict with the mapped graph output.
        push_video_args(&mut argv, &params.video, false);
        push_audio_args(&mut argv, &params.audio);
        argv.extend(params.extra_args.iter().cloned());
        argv.push(path_arg(output));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            inputs = inputs.len(),
            width = resolution.0,
            height = resolution.1,
            "built merge command"
        );

        Ok(argv)
    }

    fn preamble(&self, params: &EncodeParams) -> Vec<String> {
        vec![
            path_arg(&self.encoder),
            "-hide_banner".into(),
            (if params.overwrite { "-y" } else { "-n" }).into(),
        ]
    }
}

fn validate_output(output: &Path) -> Result<()> {
    if output.as_os_str().is_empty() {
        return Err(Error::invalid_argument("output path is empty"));
    }
    Ok(())
}

fn push_input(argv: &mut Vec<String>, input: &InputSpec) {
    if let Some(start) = input.trim_start() {
        argv.push("-ss".into());
        argv.push(start.to_string());
    }
    argv.push("-i".into());
    argv.push(path_arg(input.path()));
    if let Some(end) = input.trim_end() {
        argv.push("-to".into());
        argv.push(end.to_string());
    }
}

fn push_video_args(argv: &mut Vec<String>, video: &VideoParams, allow_filters: bool) {
    push_opt(argv, "-c:v", video.codec.as_deref());

    if let Some(crf) = video.crf {
        argv.push("-crf".into());
        argv.push(crf.to_string());
    } else {
        push_opt(argv, "-b:v", video.bitrate.as_deref());
    }

    if let Some(fps) = video.fps {
        argv.push("-r".into());
        argv.push(fps.to_string());
    }
    push_opt(argv, "-s", video.explicit_resolution());
    push_opt(argv, "-preset", video.preset.as_deref());
    push_opt(argv, "-tune", video.tune.as_deref());

    if allow_filters {
        if let Some(filters) = video_filters(video) {
            argv.push("-vf".into());
            argv.push(filters);
        }
    }
}

fn push_audio_args(argv: &mut Vec<String>, audio: &AudioParams) {
    push_opt(argv, "-c:a", audio.codec.as_deref());
    push_opt(argv, "-b:a", audio.bitrate.as_deref());
    if let Some(rate) = audio.sample_rate {
        argv.push("-ar".into());
        argv.push(rate.to_string());
    }
    if let Some(channels) = audio.channels {
        argv.push("-ac".into());
        argv.push(channels.to_string());
    }
    if let Some(filters) = audio_filters(audio) {
        argv.push("-af".into());
        argv.push(filters);
    }
}

/// Push `flag value` when the value is present and non-blank.
fn push_opt(argv: &mut Vec<String>, flag: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        argv.push(flag.into());
        argv.push(v.into());
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Render an argv as a shell-safe string for logs and dry runs.
pub fn format_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}
