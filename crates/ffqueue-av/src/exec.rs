//! Synchronous execution of an argument vector.

use crate::{Error, Result};
use serde::Serialize;
use std::process::{Command, ExitStatus, Stdio};

/// Exit code reported when a process was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Outcome of a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// Process exit code, or [`SIGNAL_EXIT_CODE`] if it had none.
    pub exit_code: i32,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// The argument vector that was run, program first.
    pub argv: Vec<String>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into [`Error::ExternalTool`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(Error::external_tool(
            format!("{} exited with code {}", program_name(&self.argv), self.exit_code),
            &self.argv,
            Some(self.exit_code),
            self.stdout,
            self.stderr,
        ))
    }
}

/// Run `argv` to completion, capturing both output streams.
///
/// With `check` set, a non-zero exit becomes [`Error::ExternalTool`];
/// otherwise the result is returned whatever the exit code, for the caller to
/// inspect.
///
/// There is no timeout: a child that never exits blocks the caller.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] for an empty argv.
/// - [`Error::ToolNotFound`] if the program does not exist.
/// - [`Error::ExternalTool`] on a non-zero exit when `check` is set.
pub fn execute(argv: &[String], check: bool) -> Result<CommandResult> {
    let (program, args) = split_argv(argv)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(program, ?args, "executing");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::from_spawn(program, e))?;

    let result = CommandResult {
        exit_code: exit_code(output.status),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        argv: argv.to_vec(),
    };

    if check {
        result.check()
    } else {
        Ok(result)
    }
}

pub(crate) fn split_argv(argv: &[String]) -> Result<(&str, &[String])> {
    match argv.split_first() {
        Some((program, args)) if !program.is_empty() => Ok((program.as_str(), args)),
        _ => Err(Error::invalid_argument("command is empty")),
    }
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNAL_EXIT_CODE)
}

/// File name of `argv[0]`, for messages.
pub(crate) fn program_name(argv: &[String]) -> String {
    argv.first()
        .map(|p| {
            std::path::Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.clone())
        })
        .unwrap_or_default()
}
