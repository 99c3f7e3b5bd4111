//! Error types for ffqueue-av.

use std::fmt;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, running or monitoring encoder jobs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed parameters, rejected before any process is spawned.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The encoder or prober exited unsuccessfully.
    #[error("{0}")]
    ExternalTool(Box<ToolFailure>),

    /// The diagnostic stream of a monitored process was unavailable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A monitored run was stopped through its cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// Failed to parse tool output.
    #[error("failed to parse {tool} output: {message}")]
    ParseError { tool: String, message: String },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Diagnostics captured from a failed external tool run.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    /// Human-readable summary, e.g. `ffmpeg exited with code 1`.
    pub message: String,
    /// The full argument vector, program first.
    pub argv: Vec<String>,
    /// Exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(line) = self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            write!(f, ": {}", line.trim())?;
        }
        Ok(())
    }
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an external tool error from a finished invocation.
    pub fn external_tool(
        message: impl Into<String>,
        argv: &[String],
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ExternalTool(Box::new(ToolFailure {
            message: message.into(),
            argv: argv.to_vec(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }))
    }

    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a parse error.
    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Captured stderr of a failed external tool, if this is one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ExternalTool(failure) => Some(&failure.stderr),
            _ => None,
        }
    }

    /// Map a spawn error to [`Error::ToolNotFound`] when the binary is missing.
    pub(crate) fn from_spawn(program: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::tool_not_found(program)
        } else {
            Error::Io(err)
        }
    }
}
