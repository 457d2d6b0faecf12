use std::path::{Path, PathBuf};

use anyhow::Context;
use peerchain_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};

/// Node settings read from `--config`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory holding one file per stored key.
    pub data_dir: PathBuf,
    pub ledger: LedgerConfig,
}

impl NodeConfig {
    /// Read `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".peerchain"),
            ledger: LedgerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_gives_defaults() {
        assert_eq!(NodeConfig::load(None).unwrap(), NodeConfig::default());
    }

    #[test]
    fn loads_nested_ledger_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(
            &path,
            "data_dir = \"/var/lib/peerchain\"\n\n[ledger]\nnode_id = 4\nfork_ttl_secs = 30\n",
        )
        .unwrap();

        let config = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/peerchain"));
        assert_eq!(config.ledger.node_id, 4);
        assert_eq!(config.ledger.fork_ttl_secs, 30);
        assert_eq!(config.ledger.cache_capacity, 25);
    }

    #[test]
    fn printed_defaults_parse_back() {
        let text = NodeConfig::default().to_toml().unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, NodeConfig::default());
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NodeConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
