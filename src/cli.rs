use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ffqueue_av::EncodeParams;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffqueue")]
#[command(author, version, about = "Queue ffmpeg conversions and merges with live progress")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a single file
    Convert(ConvertArgs),

    /// Concatenate several files into one
    Merge(MergeArgs),

    /// Print the encoder command a job would run, without running it
    PrintCommand {
        #[command(subcommand)]
        job: JobCommand,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// A single-file conversion
    Convert(ConvertArgs),

    /// A multi-file merge
    Merge(MergeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Input file
    pub input: PathBuf,

    /// Output file
    pub output: PathBuf,

    /// Start reading the input at this offset, in seconds
    #[arg(long)]
    pub start: Option<f64>,

    /// Stop reading the input at this offset, in seconds
    #[arg(long)]
    pub end: Option<f64>,

    /// Input duration in seconds for progress reporting (probed if omitted)
    #[arg(long)]
    pub duration: Option<f64>,

    #[command(flatten)]
    pub encode: EncodeArgs,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Input files, in playback order
    #[arg(required = true, num_args = 2..)]
    pub inputs: Vec<PathBuf>,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub encode: EncodeArgs,
}

/// Encode settings shared by every job command. Flags override the
/// `--params` file, which overrides the config file's `[defaults]`.
#[derive(Args, Debug, Clone, Default)]
pub struct EncodeArgs {
    /// JSON file with encode parameters
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Video codec, e.g. libx264
    #[arg(long)]
    pub video_codec: Option<String>,

    /// Constant rate factor (takes precedence over --bitrate)
    #[arg(long)]
    pub crf: Option<u32>,

    /// Video bitrate, e.g. 4M
    #[arg(long)]
    pub bitrate: Option<String>,

    /// Output frame rate
    #[arg(long)]
    pub fps: Option<f64>,

    /// Output resolution as WxH, or "auto"
    #[arg(long)]
    pub resolution: Option<String>,

    /// Encoder preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Audio codec, e.g. aac
    #[arg(long)]
    pub audio_codec: Option<String>,

    /// Audio bitrate, e.g. 192k
    #[arg(long)]
    pub audio_bitrate: Option<String>,

    /// Fail instead of overwriting an existing output
    #[arg(long)]
    pub no_overwrite: bool,
}

impl EncodeArgs {
    /// Resolve the effective parameters for a job.
    pub fn to_params(&self, defaults: &EncodeParams) -> Result<EncodeParams> {
        let (mut params, file_sets_overwrite) = match &self.params {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read params file: {:?}", path))?;
                let params = EncodeParams::from_json(&json)
                    .with_context(|| format!("Failed to parse params file: {:?}", path))?;
                let sets_overwrite = serde_json::from_str::<serde_json::Value>(&json)
                    .ok()
                    .is_some_and(|v| v.get("overwrite").is_some());
                (params, sets_overwrite)
            }
            None => (EncodeParams::default(), false),
        };
        if !file_sets_overwrite {
            params.overwrite = defaults.overwrite;
        }

        let video = &mut params.video;
        override_with(&mut video.codec, &self.video_codec);
        override_with(&mut video.crf, &self.crf);
        override_with(&mut video.bitrate, &self.bitrate);
        override_with(&mut video.fps, &self.fps);
        override_with(&mut video.resolution, &self.resolution);
        override_with(&mut video.preset, &self.preset);
        // An explicit --bitrate beats a crf that came from a file or defaults.
        if self.bitrate.is_some() && self.crf.is_none() {
            video.crf = None;
        }

        let audio = &mut params.audio;
        override_with(&mut audio.codec, &self.audio_codec);
        override_with(&mut audio.bitrate, &self.audio_bitrate);

        if self.no_overwrite {
            params.overwrite = false;
        }

        Ok(params.with_defaults(defaults))
    }
}

fn override_with<T: Clone>(field: &mut Option<T>, flag: &Option<T>) {
    if flag.is_some() {
        field.clone_from(flag);
    }
}
