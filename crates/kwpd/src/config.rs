//! Daemon configuration file

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use kwp_diag::{SessionConfig, TransportConfig};
use serde::Deserialize;

/// Top-level `kwpd.toml`
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// YAML catalog replacing the built-in one
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served for every path outside the API
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

impl Config {
    /// Load a TOML config file
    ///
    /// A relative `catalog` or `static_dir` is resolved against the
    /// directory holding the config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.catalog = config.catalog.map(|p| base.join(p));
            config.server.static_dir = config.server.static_dir.map(|p| base.join(p));
        }
        Ok(config)
    }
}
