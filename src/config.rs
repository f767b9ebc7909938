//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::{backend::FeishuCredentials, source::SourceType};

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend origin and import destination.
    pub server: ServerCfg,
    /// Queue and source selection.
    pub import: ImportCfg,
    #[serde(default)]
    pub notion: NotionCfg,
    #[serde(default)]
    pub feishu: FeishuCredentials,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCfg {
    /// Origin the API requests are sent to.
    pub base_url: String,
    /// Knowledge base receiving the documents.
    pub kb_id: String,
    /// Parent node for created documents; empty means the root.
    #[serde(default)]
    pub parent_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportCfg {
    pub source: SourceType,
    /// Upper bound on simultaneously outstanding requests.
    pub max_concurrent: usize,
    /// Delay between job status polls.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotionCfg {
    pub integration_token: String,
}

impl ImportCfg {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerCfg {
                base_url: "http://127.0.0.1:8000".into(),
                kb_id: "".into(),
                parent_id: "".into(),
            },
            import: ImportCfg {
                source: SourceType::OfflineFile,
                max_concurrent: 3,
                poll_interval_ms: 2000,
            },
            notion: NotionCfg::default(),
            feishu: FeishuCredentials::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let cfg = Config::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        assert!(s.contains("source = \"offline-file\""));
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn optional_sections_default_when_missing() {
        let s = r#"
            [server]
            base_url = "https://wiki.example"
            kb_id = "kb-1"

            [import]
            source = "feishu"
            max_concurrent = 5
            poll_interval_ms = 10
        "#;
        let cfg: Config = toml::from_str(s).unwrap();
        assert_eq!(cfg.import.source, SourceType::Feishu);
        assert_eq!(cfg.server.parent_id, "");
        assert!(!cfg.feishu.is_complete());
        assert_eq!(cfg.import.poll_interval(), Duration::from_millis(100));
    }
}
