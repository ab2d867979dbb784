use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Filesystem root under which `<bot_id>/<build_version>` bundles live.
    pub workarea: PathBuf,
    /// Similarity cutoff in [0,1] below which classification reports "no match".
    pub intent_classify_threshold: f32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workarea: PathBuf::from("./workarea"),
            intent_classify_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// K in the "elite set" disjunction — top-K query terms ORed together.
    pub elite_set_size: usize,
    /// Number of documents retrieved from the recall index per classify call.
    pub top_n: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            elite_set_size: 30,
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BotConfig {
    pub runtime: RuntimeConfig,
    pub recall: RecallConfig,
    pub telemetry: TelemetryConfig,
}

impl BotConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    /// The `CLAUSE_WORKAREA` environment variable, when set, always wins
    /// over both the file and the default.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("CLAUSE_WORKAREA") {
            if !value.is_empty() {
                config.runtime.workarea = PathBuf::from(value);
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Directory holding one bot build's artifacts.
    pub fn bundle_dir(&self, bot_id: &str, build_version: &str) -> PathBuf {
        self.runtime.workarea.join(bot_id).join(build_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = BotConfig::load_from("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config.runtime.intent_classify_threshold, 0.5);
        assert_eq!(config.recall.elite_set_size, 30);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.toml");

        let mut config = BotConfig::default();
        config.runtime.intent_classify_threshold = 0.72;
        config.save_to(&path).unwrap();

        let loaded = BotConfig::load_from(&path).unwrap();
        assert_eq!(loaded.runtime.intent_classify_threshold, 0.72);
    }

    #[test]
    fn bundle_dir_joins_workarea_bot_and_version() {
        let mut config = BotConfig::default();
        config.runtime.workarea = PathBuf::from("/data/bots");
        let dir = config.bundle_dir("weather-bot", "17");
        assert_eq!(dir, PathBuf::from("/data/bots/weather-bot/17"));
    }
}
