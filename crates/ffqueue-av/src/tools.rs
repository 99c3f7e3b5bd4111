//! External tool detection.

use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Availability of one external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// The name or path the tool was looked up by.
    pub name: String,
    pub available: bool,
    /// First line of the tool's version banner.
    pub version: Option<String>,
    /// Resolved executable path.
    pub path: Option<PathBuf>,
}

/// Check an ffmpeg-family tool, which prints its banner for `-version`.
///
/// # Example
///
/// ```no_run
/// use ffqueue_av::check_tool;
///
/// let info = check_tool("ffprobe");
/// if info.available {
///     println!("ffprobe version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(name: &str) -> ToolInfo {
    check_tool_with_arg(name, "-version")
}

/// Check a tool using a custom version argument.
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let output = Command::new(name)
        .arg(version_arg)
        .stdin(Stdio::null())
        .output();

    match output {
        Ok(output) if output.status.success() => ToolInfo {
            name: name.to_string(),
            available: true,
            version: String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(str::to_string),
            path: which::which(name).ok(),
        },
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the encoder and prober.
pub fn check_tools(ffmpeg: &Path, ffprobe: &Path) -> Vec<ToolInfo> {
    vec![
        check_tool(&ffmpeg.to_string_lossy()),
        check_tool(&ffprobe.to_string_lossy()),
    ]
}

/// Require that a tool is on `PATH`, returning its location.
///
/// # Errors
///
/// Returns [`Error::ToolNotFound`] if it is not.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Resolve a tool, preferring a configured path that exists over `PATH`.
pub fn resolve_tool_path(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) if path.exists() => Ok(path.to_path_buf()),
        _ => require_tool(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_unavailable() {
        let info = check_tool("nonexistent_tool_12345");
        assert!(!info.available);
        assert!(info.version.is_none());
        assert!(info.path.is_none());
    }

    #[test]
    fn require_missing_tool() {
        assert!(matches!(
            require_tool("nonexistent_tool_12345"),
            Err(Error::ToolNotFound { .. })
        ));
    }

    #[test]
    fn configured_path_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("my-ffmpeg");
        std::fs::write(&tool, "").unwrap();
        assert_eq!(resolve_tool_path("ffmpeg", Some(&tool)).unwrap(), tool);
    }

    #[test]
    fn missing_configured_path_falls_back_to_lookup() {
        let result = resolve_tool_path(
            "nonexistent_tool_12345",
            Some(Path::new("/nonexistent/dir/tool")),
        );
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }
}
