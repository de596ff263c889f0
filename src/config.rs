use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One year.
const MAX_SESSION_MINUTES: u64 = 525_600;

#[derive(Parser, Debug)]
#[command(name = "scrivener", about = "A small blogging API")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    /// Validity window of a login, also used as the cookie Max-Age.
    pub session_minutes: u64,
    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "access_token".to_string(),
            session_minutes: 30,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_minutes as i64)
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("scrivener.db"));
        }

        if !(1..=MAX_SESSION_MINUTES).contains(&config.auth.session_minutes) {
            anyhow::bail!(
                "auth.session_minutes must be between 1 and {}, got {}",
                MAX_SESSION_MINUTES,
                config.auth.session_minutes
            );
        }

        if !(4..=31).contains(&config.auth.bcrypt_cost) {
            anyhow::bail!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                config.auth.bcrypt_cost
            );
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".scrivener")
        })
    }

    pub fn db_path(&self) -> &Path {
        self.database
            .path
            .as_deref()
            .unwrap_or_else(|| Path::new("scrivener.db"))
    }
}
