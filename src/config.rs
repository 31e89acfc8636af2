//! Configuration for the archiver.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TELEGRAM_BOT_TOKEN, TELEGRAM_USER_ID,
//!    TG_ARCHIVER_NOTES_ROOT, TG_ARCHIVER_STATE_FILE, WHISPER_PATH)
//! 2. Config file (`--config`, or `.tg-archiver/config.yaml` found by walking up
//!    from the current directory)
//! 3. Defaults (`~/.tg-archiver`)
//!
//! Relative paths in the config file are resolved against the directory that
//! contains the file.

pub mod paths;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::archive::Locale;
use crate::core::PollSettings;
use crate::ingest::WhisperSettings;
use crate::notify::DeliverySettings;

use self::paths::{ArchivePaths, DEFAULT_MEDIA_DIR};

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub whisper: WhisperSection,
    #[serde(default)]
    pub error_logging: DeliverySettings,
    #[serde(default)]
    pub polling: PollSettings,
    #[serde(default)]
    pub format: FormatSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    /// Owner of the bot; receives error notifications
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsSection {
    pub notes_root: Option<String>,
    pub media_dir_name: Option<String>,
    pub state_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhisperSection {
    pub binary: Option<String>,
    pub ffmpeg: Option<String>,
    pub model_path: Option<String>,
    /// Model to download when `model_path` is missing (e.g. "base", "small")
    pub model_type: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatSection {
    #[serde(default)]
    pub locale: Locale,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Archiver home (defaults for notes, state and models)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub bot_token: String,
    pub user_id: i64,
    pub paths: ArchivePaths,
    pub whisper: WhisperSettings,
    pub delivery: DeliverySettings,
    pub polling: PollSettings,
    pub locale: Locale,
}

impl ResolvedConfig {
    /// Check what `run` needs before touching the network
    pub fn validate_for_run(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!(
                "Telegram bot token is not configured (set telegram.bot_token or TELEGRAM_BOT_TOKEN)"
            );
        }
        if self.user_id == 0 && self.delivery.enabled {
            tracing::warn!("telegram.user_id is not set; error notifications will fail to deliver");
        }
        Ok(())
    }

    /// Bot token with everything but the bot id hidden
    pub fn masked_token(&self) -> String {
        match self.bot_token.split_once(':') {
            Some((bot_id, _)) => format!("{}:****", bot_id),
            None if self.bot_token.is_empty() => "(not set)".to_string(),
            None => "****".to_string(),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(paths::HOME_DIR_NAME).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration from all sources
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let config_path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let file = match config_path {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let home = paths::default_home()?;
    resolve(file, config_path, home, |key| std::env::var(key).ok())
}

/// Merge a parsed config file with environment overrides and defaults
pub fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    home: PathBuf,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let bot_token = env("TELEGRAM_BOT_TOKEN")
        .or(file.telegram.bot_token)
        .unwrap_or_default();

    let user_id = match env("TELEGRAM_USER_ID") {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("TELEGRAM_USER_ID is not a number: {}", raw))?,
        None => file.telegram.user_id.unwrap_or(0),
    };

    let notes_root = if let Some(root) = env("TG_ARCHIVER_NOTES_ROOT") {
        PathBuf::from(root)
    } else if let Some(ref root) = file.paths.notes_root {
        resolve_path(&base_dir, root)
    } else {
        home.join("notes")
    };

    let state_file = if let Some(state) = env("TG_ARCHIVER_STATE_FILE") {
        PathBuf::from(state)
    } else if let Some(ref state) = file.paths.state_file {
        resolve_path(&base_dir, state)
    } else {
        home.join("state.json")
    };

    let media_dir_name = file
        .paths
        .media_dir_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MEDIA_DIR.to_string());

    let model_type = file
        .whisper
        .model_type
        .filter(|model| !model.trim().is_empty());

    let model_path = match file.whisper.model_path {
        Some(ref path) if !path.trim().is_empty() => resolve_path(&base_dir, path),
        _ => home.join("models").join(format!(
            "ggml-{}.bin",
            model_type.as_deref().unwrap_or("base")
        )),
    };

    let defaults = WhisperSettings::default();
    let whisper = WhisperSettings {
        binary: env("WHISPER_PATH")
            .or(file.whisper.binary)
            .unwrap_or(defaults.binary),
        ffmpeg: file.whisper.ffmpeg.unwrap_or(defaults.ffmpeg),
        model_path,
        model_type,
        language: file.whisper.language.unwrap_or(defaults.language),
    };

    Ok(ResolvedConfig {
        home,
        config_file,
        bot_token,
        user_id,
        paths: ArchivePaths::new(notes_root, media_dir_name, state_file),
        whisper,
        delivery: file.error_logging,
        polling: file.polling,
        locale: file.format.locale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let home = PathBuf::from("/home/user/.tg-archiver");
        let config = resolve(ConfigFile::default(), None, home.clone(), no_env).unwrap();

        assert_eq!(config.paths.notes_root, home.join("notes"));
        assert_eq!(config.paths.state_file, home.join("state.json"));
        assert_eq!(config.paths.media_dir_name, "media");
        assert_eq!(config.whisper.model_path, home.join("models/ggml-base.bin"));
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.delivery.max_queue_size, 100);
        assert_eq!(config.polling.batch_limit, 100);
        assert_eq!(config.locale, Locale::En);
        assert!(config.config_file.is_none());
        assert!(config.validate_for_run().is_err());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".tg-archiver");
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
telegram:
  bot_token: "123456:SECRET"
  user_id: 4242
paths:
  notes_root: ../notes
  media_dir_name: attachments
  state_file: /var/lib/archiver/state.json
whisper:
  model_type: small
  language: en
error_logging:
  enabled: false
  max_queue_size: 2
polling:
  poll_interval_ms: 250
format:
  locale: ru
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        let config = resolve(
            parsed,
            Some(config_path.clone()),
            PathBuf::from("/home/user/.tg-archiver"),
            no_env,
        )
        .unwrap();

        assert_eq!(config.bot_token, "123456:SECRET");
        assert_eq!(config.user_id, 4242);
        assert_eq!(config.paths.notes_root, config_dir.join("../notes"));
        assert_eq!(config.paths.media_dir_name, "attachments");
        assert_eq!(
            config.paths.state_file,
            PathBuf::from("/var/lib/archiver/state.json")
        );
        assert_eq!(
            config.whisper.model_path,
            PathBuf::from("/home/user/.tg-archiver/models/ggml-small.bin")
        );
        assert_eq!(config.whisper.language, "en");
        assert!(!config.delivery.enabled);
        assert_eq!(config.delivery.max_queue_size, 2);
        // Unset fields in a partial section keep their defaults
        assert_eq!(config.delivery.max_message_length, 4000);
        assert_eq!(config.polling.poll_interval_ms, 250);
        assert_eq!(config.polling.retry_interval_ms, 5000);
        assert_eq!(config.locale, Locale::Ru);
        assert_eq!(config.masked_token(), "123456:****");
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = ConfigFile::default();
        file.telegram.bot_token = Some("from-file".to_string());
        file.paths.notes_root = Some("/from/file".to_string());

        let env: HashMap<&str, &str> = [
            ("TELEGRAM_BOT_TOKEN", "1:from-env"),
            ("TELEGRAM_USER_ID", "99"),
            ("TG_ARCHIVER_NOTES_ROOT", "/from/env"),
            ("WHISPER_PATH", "/opt/whisper/bin/whisper-cli"),
        ]
        .into_iter()
        .collect();

        let config = resolve(file, None, PathBuf::from("/h"), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.bot_token, "1:from-env");
        assert_eq!(config.user_id, 99);
        assert_eq!(config.paths.notes_root, PathBuf::from("/from/env"));
        assert_eq!(config.whisper.binary, "/opt/whisper/bin/whisper-cli");
    }

    #[test]
    fn test_invalid_user_id_env_is_rejected() {
        let result = resolve(ConfigFile::default(), None, PathBuf::from("/h"), |key| {
            (key == "TELEGRAM_USER_ID").then(|| "not-a-number".to_string())
        });

        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
