use ffqueue_av::EncodeParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    /// Encode parameters applied underneath whatever a command specifies.
    #[serde(default)]
    pub defaults: EncodeParams,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}

impl ToolsConfig {
    /// Configured encoder, or `ffmpeg` from `PATH`.
    pub fn ffmpeg(&self) -> &Path {
        self.ffmpeg_path
            .as_deref()
            .unwrap_or_else(|| Path::new("ffmpeg"))
    }

    /// Configured prober, or `ffprobe` from `PATH`.
    pub fn ffprobe(&self) -> &Path {
        self.ffprobe_path
            .as_deref()
            .unwrap_or_else(|| Path::new("ffprobe"))
    }

    /// Encoder to run: the configured path if it exists, else `ffmpeg` on
    /// `PATH`, else the configured value as given.
    pub fn resolved_ffmpeg(&self) -> PathBuf {
        resolve_tool("ffmpeg", self.ffmpeg_path.as_deref())
    }

    /// Prober to run, resolved like [`resolved_ffmpeg`](Self::resolved_ffmpeg).
    pub fn resolved_ffprobe(&self) -> PathBuf {
        resolve_tool("ffprobe", self.ffprobe_path.as_deref())
    }
}

fn resolve_tool(name: &str, configured: Option<&Path>) -> PathBuf {
    ffqueue_av::resolve_tool_path(name, configured)
        .unwrap_or_else(|_| configured.unwrap_or_else(|| Path::new(name)).to_path_buf())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TasksConfig {
    /// Number of encodes run at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Seconds a cancelled encode may take to quit before it is killed.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_secs: u64,
}

fn default_max_workers() -> usize {
    2
}

fn default_cancel_grace() -> u64 {
    5
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            cancel_grace_secs: default_cancel_grace(),
        }
    }
}

impl TasksConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_configured_tool_is_used() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let tools = ToolsConfig {
            ffmpeg_path: Some(file.path().to_path_buf()),
            ffprobe_path: None,
        };
        assert_eq!(tools.resolved_ffmpeg(), file.path());
    }

    #[test]
    fn unresolvable_tool_keeps_configured_value() {
        let missing = Path::new("/nonexistent/dir/tool");
        assert_eq!(resolve_tool("nonexistent_tool_12345", Some(missing)), missing);
        assert_eq!(
            resolve_tool("nonexistent_tool_12345", None),
            Path::new("nonexistent_tool_12345")
        );
    }
}
