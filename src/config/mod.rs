mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./ffqueue.toml", "~/.config/ffqueue/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.tasks.max_workers == 0 {
        anyhow::bail!("tasks.max_workers must be at least 1");
    }

    for (name, path) in [
        ("ffmpeg_path", &config.tools.ffmpeg_path),
        ("ffprobe_path", &config.tools.ffprobe_path),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("tools.{} does not exist: {:?}", name, path);
            }
        }
    }

    config
        .defaults
        .validate()
        .context("Invalid [defaults] encode parameters")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.tasks.max_workers, 2);
        assert_eq!(config.tasks.cancel_grace_secs, 5);
        assert_eq!(config.tools.ffmpeg(), Path::new("ffmpeg"));
        assert_eq!(config.tools.ffprobe(), Path::new("ffprobe"));
        assert_eq!(config.defaults, ffqueue_av::EncodeParams::default());
    }

    #[test]
    fn full_config() {
        let file = write_config(
            r#"
[tools]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[tasks]
max_workers = 4
cancel_grace_secs = 10

[defaults]
overwrite = false

[defaults.video]
codec = "libx264"
crf = 20
preset = "slow"

[defaults.audio]
codec = "aac"
bitrate = "192k"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.tools.ffmpeg(), Path::new("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.tasks.max_workers, 4);
        assert_eq!(config.tasks.cancel_grace().as_secs(), 10);
        assert!(!config.defaults.overwrite);
        assert_eq!(config.defaults.video.crf, Some(20));
        assert_eq!(config.defaults.audio.bitrate.as_deref(), Some("192k"));
    }

    #[test]
    fn zero_workers_rejected() {
        let file = write_config("[tasks]\nmax_workers = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn invalid_defaults_rejected() {
        let file = write_config("[defaults.video]\ncrf = 99\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn malformed_toml_reports_path() {
        let file = write_config("[tasks\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        assert!(load_config_or_default(Some(Path::new("/nonexistent/ffqueue.toml"))).is_err());
    }
}
