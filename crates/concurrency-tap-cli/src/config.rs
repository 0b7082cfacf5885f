//! Configuration loading and resolution.
//!
//! Each setting resolves as: CLI flag, then environment variable, then the
//! JSON config file, then the built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use concurrency_tap::TapConfig;

pub const ENV_DB: &str = "CTAP_DB";
pub const ENV_SNAPSHOT: &str = "CTAP_SNAPSHOT";
pub const ENV_URL: &str = "CTAP_URL";
pub const ENV_CHROMIUM: &str = "CTAP_CHROMIUM_PATH";

const DEFAULT_URL: &str = "https://rtrack.live/datasets";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Settings for the browser side of a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub url: String,
    pub db_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub navigation_timeout_ms: u64,
    /// How long to keep listening after the page has loaded.
    pub settle_ms: u64,
    /// Upper bound for flushing responses still in flight after the window closes.
    pub drain_timeout_ms: u64,
    pub user_agent: String,
    pub chromium_path: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            db_path: PathBuf::from("roblox_data.db"),
            snapshot_path: PathBuf::from("concurrent_users.csv"),
            navigation_timeout_ms: 60_000,
            settle_ms: 15_000,
            drain_timeout_ms: 5_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chromium_path: None,
        }
    }
}

impl CaptureSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Layout of the optional JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub capture: CaptureSettings,
    pub extraction: TapConfig,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
    pub url: Option<String>,
    pub chromium: Option<PathBuf>,
    pub settle_ms: Option<u64>,
}

/// Load the config file (if any) and apply environment and CLI overrides.
pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<(CaptureSettings, TapConfig)> {
    let file = match config_path {
        Some(path) => read_file_config(path)?,
        None => FileConfig::default(),
    };
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    Ok(resolve(file, overrides, env))
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let file: FileConfig = serde_json::from_str(&text)
        .with_context(|| format!("invalid config: {}", path.display()))?;
    // Re-run library validation on the extraction section.
    let extraction = TapConfig::from_json(&serde_json::to_string(&file.extraction)?)
        .with_context(|| format!("invalid extraction settings in {}", path.display()))?;
    Ok(FileConfig { extraction, ..file })
}

fn resolve(
    file: FileConfig,
    overrides: &Overrides,
    env: impl Fn(&str) -> Option<String>,
) -> (CaptureSettings, TapConfig) {
    let FileConfig {
        capture: mut settings,
        extraction,
    } = file;

    if let Some(db) = overrides.db.clone().or_else(|| env(ENV_DB).map(PathBuf::from)) {
        settings.db_path = db;
    }
    if let Some(snapshot) = overrides
        .snapshot
        .clone()
        .or_else(|| env(ENV_SNAPSHOT).map(PathBuf::from))
    {
        settings.snapshot_path = snapshot;
    }
    if let Some(url) = overrides.url.clone().or_else(|| env(ENV_URL)) {
        settings.url = url;
    }
    if let Some(chromium) = overrides
        .chromium
        .clone()
        .or_else(|| env(ENV_CHROMIUM).map(PathBuf::from))
    {
        settings.chromium_path = Some(chromium);
    }
    if let Some(settle_ms) = overrides.settle_ms {
        settings.settle_ms = settle_ms;
    }

    (settings, extraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let (settings, tap) = resolve(FileConfig::default(), &Overrides::default(), no_env);
        assert_eq!(settings.url, DEFAULT_URL);
        assert_eq!(settings.db_path, PathBuf::from("roblox_data.db"));
        assert_eq!(settings.snapshot_path, PathBuf::from("concurrent_users.csv"));
        assert_eq!(settings.settle_window(), Duration::from_secs(15));
        assert_eq!(tap.threshold, 1000);
    }

    #[test]
    fn test_precedence() {
        let mut file = FileConfig::default();
        file.capture.db_path = PathBuf::from("file.db");
        file.capture.url = "https://file".to_string();
        file.capture.snapshot_path = PathBuf::from("file.csv");

        let env = |key: &str| match key {
            ENV_DB => Some("env.db".to_string()),
            ENV_URL => Some("https://env".to_string()),
            _ => None,
        };
        let overrides = Overrides {
            db: Some(PathBuf::from("flag.db")),
            ..Overrides::default()
        };

        let (settings, _) = resolve(file, &overrides, env);
        assert_eq!(settings.db_path, PathBuf::from("flag.db"));
        assert_eq!(settings.url, "https://env");
        assert_eq!(settings.snapshot_path, PathBuf::from("file.csv"));
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tap.json");
        std::fs::write(
            &path,
            r#"{"capture": {"settle_ms": 500}, "extraction": {"threshold": 10, "filter_policy": "keyword_and_content_type"}}"#,
        )
        .unwrap();

        let file = read_file_config(&path).unwrap();
        assert_eq!(file.capture.settle_ms, 500);
        assert_eq!(file.capture.navigation_timeout_ms, 60_000);
        assert_eq!(file.extraction.threshold, 10);
    }

    #[test]
    fn test_invalid_extraction_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tap.json");
        std::fs::write(&path, r#"{"extraction": {"max_depth": 0}}"#).unwrap();
        assert!(read_file_config(&path).is_err());
    }
}
