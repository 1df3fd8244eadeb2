use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment tag that matches every selected environment.
pub const ENV_ALL: &str = "all";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Server {
    pub name: String,
    pub host: String,
    pub environment: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Inventory {
    #[serde(default)]
    pub servers: Vec<Server>,
}

impl Inventory {
    /// The compiled-in server table. `~/.slipway/servers.toml` overrides it.
    pub fn builtin() -> Self {
        Self {
            servers: vec![Server {
                name: "transcript".to_string(),
                host: "transcript-prod-app.archive.internal".to_string(),
                environment: "prod".to_string(),
                roles: vec!["transcript".to_string()],
            }],
        }
    }

    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".slipway").join("servers.toml"))
            .unwrap_or_else(|| PathBuf::from("servers.toml"))
    }

    /// Load the effective inventory. A missing override file falls back to
    /// the builtin table; a present but broken file is fatal.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        if !config_path.exists() {
            return Ok(Self::builtin());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid inventory file {}", config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn find_server(&self, name: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.name == name)
    }
}
