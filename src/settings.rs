use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;

const CONFIG_FILE: &str = "donate-client.toml";
const ENV_PREFIX: &str = "DONATE";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_LOGIN_PATH: &str = "/api/auth/login/";
pub const DEFAULT_CAMPAIGNS_PATH: &str = "/api/campaigns/";
pub const DEFAULT_DONATIONS_PATH: &str = "/api/donations/";
pub const DEFAULT_REFRESH_ENDPOINTS: [&str; 2] = ["/api/auth/refresh/", "/api/token/refresh/"];
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 40;
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub login_path: String,
    pub campaigns_path: String,
    pub donations_path: String,
    /// Refresh endpoints in probing order. Each one is tried with every body shape.
    pub refresh_endpoints: Vec<String>,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub store: StoreKind,
    pub store_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            campaigns_path: DEFAULT_CAMPAIGNS_PATH.to_string(),
            donations_path: DEFAULT_DONATIONS_PATH.to_string(),
            refresh_endpoints: DEFAULT_REFRESH_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            store: StoreKind::default(),
            store_path: None,
        }
    }
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("base_url", DEFAULT_BASE_URL)?
        .set_default("login_path", DEFAULT_LOGIN_PATH)?
        .set_default("campaigns_path", DEFAULT_CAMPAIGNS_PATH)?
        .set_default("donations_path", DEFAULT_DONATIONS_PATH)?
        .set_default("refresh_endpoints", DEFAULT_REFRESH_ENDPOINTS.to_vec())?
        .set_default("timeout_seconds", DEFAULT_TIMEOUT_SECONDS)?
        .set_default("connect_timeout_seconds", DEFAULT_CONNECT_TIMEOUT_SECONDS)?
        .set_default("store", "file")
}

impl ClientConfig {
    /// Defaults, then `donate-client.toml` in the working directory if present,
    /// then `DONATE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        with_defaults()?
            .add_source(
                File::with_name(CONFIG_FILE)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("refresh_endpoints")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        with_defaults()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Where the file-backed session store lives.
    pub fn resolved_store_path(&self) -> PathBuf {
        if let Some(path) = &self.store_path {
            return path.clone();
        }
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("donation-client")
            .join("session.json")
    }
}
