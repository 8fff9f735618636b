use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskhive_market::{MarketConfig, RewardPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub market: MarketSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub data_dir: PathBuf,
    pub name: String,
    /// First-run admin password. Change it before exposing the API.
    pub admin_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "file".
    pub backend: String,
    /// User table location for the file backend.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSettings {
    pub reward_policy: RewardPolicy,
    pub min_submission_len: usize,
    pub store_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                data_dir: PathBuf::from("./data"),
                name: "taskhive-node".to_string(),
                admin_password: "taskhive-admin".to_string(),
            },
            storage: StorageConfig {
                backend: "memory".to_string(),
                path: PathBuf::from("./data/users.json"),
            },
            api: ApiConfig {
                enabled: true,
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            market: MarketSettings {
                reward_policy: RewardPolicy::OnApproval,
                min_submission_len: 10,
                store_timeout_secs: 5,
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_with_paths(data_dir: PathBuf, api_port: u16) -> Self {
        let mut config = Self::default();
        config.storage.path = data_dir.join("users.json");
        config.node.data_dir = data_dir;
        config.api.port = api_port;
        config
    }

    pub fn market_config(&self) -> MarketConfig {
        MarketConfig {
            reward_policy: self.market.reward_policy,
            min_submission_len: self.market.min_submission_len,
            store_timeout: Duration::from_secs(self.market.store_timeout_secs),
        }
    }
}
