//! Running an encoder while streaming progress from its diagnostic output.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::parser::{DiagnosticParser, FfmpegDiagnostics, ProgressUpdate};
use crate::exec::{exit_code, program_name, split_argv, CommandResult};
use crate::{Error, Result};

/// Default time a cancelled encoder gets to finish after being asked to quit.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// How often the monitor wakes to check for cancellation when the encoder is
/// quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs a command and turns each of its stderr lines into a [`ProgressUpdate`].
///
/// Updates are delivered on the calling thread, in the order the lines were
/// produced, followed by exactly one terminal update once the process exits.
/// Standard output is discarded.
#[derive(Debug, Clone)]
pub struct ProgressMonitor<P = FfmpegDiagnostics> {
    parser: P,
    cancel_grace: Duration,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMonitor {
    /// A monitor that understands ffmpeg's default status lines.
    pub fn new() -> Self {
        Self::with_parser(FfmpegDiagnostics)
    }
}

impl<P: DiagnosticParser> ProgressMonitor<P> {
    pub fn with_parser(parser: P) -> Self {
        Self {
            parser,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    /// How long a cancelled encoder may keep running after `q` is sent before
    /// it is killed.
    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Run `argv` to completion, reporting progress against `total_duration`
    /// seconds.
    ///
    /// The returned result carries the captured stderr and an empty stdout.
    /// With `check` set, a non-zero exit becomes [`Error::ExternalTool`] after
    /// the terminal update has been delivered.
    ///
    /// There is no timeout: an encoder that never exits blocks the caller.
    pub fn run<F>(
        &self,
        argv: &[String],
        total_duration: Option<f64>,
        on_update: F,
        check: bool,
    ) -> Result<CommandResult>
    where
        F: FnMut(&ProgressUpdate),
    {
        self.run_cancellable(argv, total_duration, on_update, check, &CancellationToken::new())
    }

    /// Like [`run`](Self::run), but stops the encoder once `cancel` fires.
    ///
    /// Cancellation writes `q` to the encoder's stdin so it can finalize its
    /// output, then kills it if it is still running after the grace period.
    /// A cancelled run always ends in [`Error::Cancelled`], whatever the exit
    /// code, and still delivers its terminal update.
    pub fn run_cancellable<F>(
        &self,
        argv: &[String],
        total_duration: Option<f64>,
        mut on_update: F,
        check: bool,
        cancel: &CancellationToken,
    ) -> Result<CommandResult>
    where
        F: FnMut(&ProgressUpdate),
    {
        let (program, args) = split_argv(argv)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(program, ?args, ?total_duration, "executing with progress");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::from_spawn(program, e))?;

        let Some(stderr) = child.stderr.take() else {
            reap(&mut child);
            return Err(Error::Protocol(format!(
                "{} diagnostic stream is unavailable",
                program_name(argv)
            )));
        };
        let mut stdin = child.stdin.take();

        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("ffqueue-diagnostics".into())
            .spawn(move || {
                for line in DiagnosticLines::new(stderr) {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                reap(&mut child);
                return Err(Error::Io(e));
            }
        };

        let started = Instant::now();
        let mut last_progress = 0.0;
        let mut captured = String::new();
        let mut quit_requested: Option<Instant> = None;
        let mut killed = false;
        let mut drained = false;

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    let sample = self.parser.parse_line(&line);
                    let update =
                        ProgressUpdate::from_sample(sample, &line, total_duration, started.elapsed());
                    if let Some(progress) = update.progress {
                        last_progress = progress;
                    }
                    on_update(&update);
                    captured.push_str(&line);
                    captured.push('\n');
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    drained = true;
                    break;
                }
            }

            if killed {
                // A grandchild may still hold stderr open after the kill.
                if matches!(child.try_wait(), Ok(Some(_))) {
                    break;
                }
                continue;
            }
            if !cancel.is_cancelled() {
                continue;
            }
            match quit_requested {
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(program, "cancellation requested, asking encoder to quit");
                    request_quit(&mut stdin);
                    quit_requested = Some(Instant::now());
                }
                Some(at) if at.elapsed() >= self.cancel_grace => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(program, "encoder ignored quit request, killing");
                    // Already exited if this fails; the reader will disconnect.
                    let _ = child.kill();
                    killed = true;
                }
                Some(_) => {}
            }
        }

        let status = child.wait()?;
        // Otherwise the reader is left to finish whenever stderr closes.
        if drained {
            let _ = reader.join();
        }

        let code = exit_code(status);
        let cancelled = quit_requested.is_some();
        let succeeded = code == 0 && !cancelled;
        let message = format!("{} exited with code {code}", program_name(argv));

        on_update(&ProgressUpdate::terminal(
            code,
            succeeded,
            last_progress,
            total_duration,
            message.clone(),
        ));

        if cancelled {
            return Err(Error::Cancelled);
        }
        if check && code != 0 {
            return Err(Error::external_tool(message, argv, Some(code), "", captured));
        }

        Ok(CommandResult {
            exit_code: code,
            stdout: String::new(),
            stderr: captured,
            argv: argv.to_vec(),
        })
    }
}

/// Ask ffmpeg to stop: `q` on stdin makes it flush and close the output.
fn request_quit(stdin: &mut Option<ChildStdin>) {
    if let Some(mut pipe) = stdin.take() {
        let _ = pipe.write_all(b"q\n").and_then(|()| pipe.flush());
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Splits a byte stream into lines terminated by `\n`, `\r` or `\r\n`.
///
/// ffmpeg redraws its status line with bare carriage returns, so splitting
/// on `\n` alone would hold every update until the encode finishes. A
/// trailing unterminated line is yielded at end of stream. Invalid UTF-8 is
/// replaced rather than rejected.
pub(crate) struct DiagnosticLines<R> {
    reader: BufReader<R>,
    after_cr: bool,
    finished: bool,
}

impl<R: Read> DiagnosticLines<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            after_cr: false,
            finished: false,
        }
    }
}

impl<R: Read> Iterator for DiagnosticLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut line = Vec::new();
        loop {
            let buf = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            if buf.is_empty() {
                self.finished = true;
                return (!line.is_empty())
                    .then(|| Ok(String::from_utf8_lossy(&line).into_owned()));
            }

            let mut consumed = 0;
            let mut terminated = false;
            for &byte in buf {
                consumed += 1;
                if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                    continue;
                }
                match byte {
                    b'\n' => {
                        terminated = true;
                        break;
                    }
                    b'\r' => {
                        self.after_cr = true;
                        terminated = true;
                        break;
                    }
                    _ => line.push(byte),
                }
            }
            self.reader.consume(consumed);

            if terminated {
                return Some(Ok(String::from_utf8_lossy(&line).into_owned()));
            }
        }
    }
}
