//! High-level encode operations over the ffqueue-av primitives.

use ffqueue_av::{
    execute, CancellationToken, CommandBuilder, CommandResult, EncodeParams, InputSpec, MediaInfo,
    ProbedInputs, Prober, ProgressMonitor, ProgressUpdate, Result,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;

/// Builds and runs encoder commands against configured tool paths.
///
/// Runs with a progress callback go through [`ProgressMonitor`] and can be
/// cancelled; runs without one are plain blocking executions.
#[derive(Debug, Clone)]
pub struct EncoderService {
    builder: CommandBuilder,
    monitor: ProgressMonitor,
    prober: Prober,
}

impl Default for EncoderService {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl EncoderService {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            builder: CommandBuilder::new(ffmpeg),
            monitor: ProgressMonitor::new(),
            prober: Prober::new(ffprobe),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tools.resolved_ffmpeg(), config.tools.resolved_ffprobe())
            .with_cancel_grace(config.tasks.cancel_grace())
    }

    /// How long a cancelled encode may take to quit before it is killed.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.monitor = self.monitor.cancel_grace(grace);
        self
    }

    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    /// Transcode one input, blocking until the encoder exits.
    pub fn convert(
        &self,
        input: &InputSpec,
        output: &Path,
        params: &EncodeParams,
        duration: Option<f64>,
        callback: Option<&mut dyn FnMut(&ProgressUpdate)>,
    ) -> Result<CommandResult> {
        let argv = self.builder.build_convert(input, output, params)?;
        self.run(&argv, duration, callback, &CancellationToken::new())
    }

    /// Concatenate inputs into one output, blocking until the encoder exits.
    pub fn merge(
        &self,
        inputs: &[InputSpec],
        output: &Path,
        params: &EncodeParams,
        total_duration: Option<f64>,
        callback: Option<&mut dyn FnMut(&ProgressUpdate)>,
    ) -> Result<CommandResult> {
        let argv = self.builder.build_merge(inputs, output, params)?;
        self.run(&argv, total_duration, callback, &CancellationToken::new())
    }

    pub fn probe(&self, path: &Path) -> Result<MediaInfo> {
        self.prober.probe(path)
    }

    /// Probe merge inputs, degrading unreadable files to bare inputs.
    pub fn probe_inputs<P: AsRef<Path>>(&self, paths: &[P]) -> ProbedInputs {
        self.prober.probe_inputs(paths)
    }

    /// Run a prebuilt argv, always checking the exit code.
    pub(crate) fn run(
        &self,
        argv: &[String],
        duration: Option<f64>,
        callback: Option<&mut dyn FnMut(&ProgressUpdate)>,
        cancel: &CancellationToken,
    ) -> Result<CommandResult> {
        match callback {
            Some(callback) => self.monitor.run_cancellable(argv, duration, callback, true, cancel),
            None => execute(argv, true),
        }
    }
}
