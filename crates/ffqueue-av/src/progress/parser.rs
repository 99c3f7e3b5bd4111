//! Diagnostic line parsing and progress/ETA math.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=(\d+):(\d+):(\d+\.?\d*)").expect("time pattern is valid")
});
static FRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"frame=\s*(\d+)").expect("frame pattern is valid"));
static SPEED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"speed=\s*([\d.]+)x").expect("speed pattern is valid"));

/// Raw facts extracted from one diagnostic line. Unmatched fields are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiagnosticSample {
    /// Encoded media position, in seconds.
    pub time: Option<f64>,
    pub frame: Option<u64>,
    /// Encode speed as a multiple of real time.
    pub speed: Option<f64>,
}

/// Extracts a [`DiagnosticSample`] from a line of encoder diagnostics.
///
/// Implementations must be cheap; they run once per line on the monitoring
/// thread.
pub trait DiagnosticParser: Send + Sync {
    fn parse_line(&self, line: &str) -> DiagnosticSample;
}

/// Parser for ffmpeg's default stderr status line:
///
/// ```text
/// frame=  100 fps= 50 q=28.0 size=  256kB time=00:00:05.00 bitrate= 419.4kbits/s speed=2.0x
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegDiagnostics;

impl DiagnosticParser for FfmpegDiagnostics {
    fn parse_line(&self, line: &str) -> DiagnosticSample {
        let time = TIME_RE.captures(line).and_then(|caps| {
            let hours: f64 = caps[1].parse().ok()?;
            let minutes: f64 = caps[2].parse().ok()?;
            let seconds: f64 = caps[3].parse().ok()?;
            Some(hours * 3600.0 + minutes * 60.0 + seconds)
        });
        let frame = FRAME_RE
            .captures(line)
            .and_then(|caps| caps[1].parse().ok());
        let speed = SPEED_RE
            .captures(line)
            .and_then(|caps| caps[1].parse().ok());

        DiagnosticSample { time, frame, speed }
    }
}

/// Parser for the key=value stream of `ffmpeg -progress pipe:2`, where each
/// line carries a single field (`out_time_us=5000000`, `frame=100`,
/// `speed=2.0x`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressPipeDiagnostics;

impl DiagnosticParser for ProgressPipeDiagnostics {
    fn parse_line(&self, line: &str) -> DiagnosticSample {
        let mut sample = DiagnosticSample::default();
        let Some((key, value)) = line.trim().split_once('=') else {
            return sample;
        };
        let value = value.trim();
        match key {
            "out_time_us" | "out_time_ms" => {
                // ffmpeg reports microseconds under both keys.
                sample.time = value
                    .parse::<i64>()
                    .ok()
                    .filter(|us| *us >= 0)
                    .map(|us| us as f64 / 1_000_000.0);
            }
            "frame" => sample.frame = value.parse().ok(),
            "speed" => sample.speed = value.trim_end_matches('x').trim().parse().ok(),
            _ => {}
        }
        sample
    }
}

/// One progress snapshot. Produced once per diagnostic line, plus exactly one
/// terminal update (`done == true`) per invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// Fraction complete in `0.0..=1.0`; needs a timestamp and a known duration.
    pub progress: Option<f64>,
    /// Encoded media position, in seconds.
    pub current_time: Option<f64>,
    pub current_frame: Option<u64>,
    /// Encode speed as a multiple of real time.
    pub speed: Option<f64>,
    /// Estimated seconds remaining.
    pub eta_seconds: Option<f64>,
    /// The diagnostic line this update was derived from.
    pub raw_line: String,
    pub done: bool,
    /// Set on the terminal update only.
    pub exit_code: Option<i32>,
}

impl ProgressUpdate {
    /// Derive an update from a parsed line.
    ///
    /// Progress is `time / total_duration`, capped at 1. The ETA comes from the
    /// encode speed when it is positive, otherwise from extrapolating the wall
    /// clock `elapsed` since the encoder started.
    pub fn from_sample(
        sample: DiagnosticSample,
        raw_line: &str,
        total_duration: Option<f64>,
        elapsed: Duration,
    ) -> Self {
        let total = total_duration.filter(|t| *t > 0.0);
        let progress = match (sample.time, total) {
            (Some(time), Some(total)) => Some((time / total).min(1.0)),
            _ => None,
        };

        let eta_seconds = match (progress, total, sample.time, sample.speed) {
            (Some(_), Some(total), Some(time), Some(speed)) if speed > 0.0 => {
                Some(((total - time) / speed).max(0.0))
            }
            (Some(progress), ..) if progress > 0.0 => {
                let elapsed = elapsed.as_secs_f64();
                Some((elapsed / progress * (1.0 - progress)).max(0.0))
            }
            _ => None,
        };

        Self {
            progress,
            current_time: sample.time,
            current_frame: sample.frame,
            speed: sample.speed,
            eta_seconds,
            raw_line: raw_line.to_string(),
            done: false,
            exit_code: None,
        }
    }

    /// The final update emitted after the process exits.
    ///
    /// A successful run reports completion (progress 1, position at the full
    /// duration, no time remaining). A failed one keeps the last observed
    /// progress and leaves the ETA unset.
    pub fn terminal(
        exit_code: i32,
        succeeded: bool,
        last_progress: f64,
        total_duration: Option<f64>,
        raw_line: String,
    ) -> Self {
        Self {
            progress: Some(if succeeded { 1.0 } else { last_progress }),
            current_time: if succeeded { total_duration } else { None },
            current_frame: None,
            speed: None,
            eta_seconds: succeeded.then_some(0.0),
            raw_line,
            done: true,
            exit_code: Some(exit_code),
        }
    }
}
