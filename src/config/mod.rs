use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Path to the SQLite database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub remote_storage: RemoteStorageConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding locally stored artifact bytes.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Upload size cap enforced by the gateway.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Artifacts larger than this are promoted to the remote tier.
    #[serde(default = "default_remote_threshold_bytes")]
    pub remote_threshold_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            remote_threshold_bytes: default_remote_threshold_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStorageConfig {
    #[serde(default)]
    pub enabled: bool,
    /// S3-compatible endpoint.
    #[serde(default = "default_remote_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_remote_region")]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

impl Default for RemoteStorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_remote_endpoint(),
            region: default_remote_region(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Which messaging-session binding to run: "cloud" or "none".
    #[serde(default = "default_session_provider")]
    pub provider: String,
    /// Directory for provider session data.
    #[serde(default = "default_session_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub cloud: Option<CloudSessionConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: default_session_provider(),
            data_dir: default_session_data_dir(),
            cloud: None,
        }
    }
}

/// WhatsApp Cloud API credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloudSessionConfig {
    pub phone_number_id: String,
    pub access_token: String,
    #[serde(default)]
    pub verify_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_db_path() -> String {
    "~/.filebridge/filebridge.db".into()
}
fn default_upload_dir() -> String {
    "~/.filebridge/uploads".into()
}
fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}
fn default_remote_threshold_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_remote_endpoint() -> String {
    "https://s3.amazonaws.com".into()
}
fn default_remote_region() -> String {
    "us-east-1".into()
}
fn default_session_provider() -> String {
    "none".into()
}
fn default_session_data_dir() -> String {
    "~/.filebridge/session".into()
}
fn default_gateway_host() -> String {
    "127.0.0.1".into()
}
fn default_gateway_port() -> u16 {
    8090
}

const DEFAULT_CONFIG: &str = r#"# Filebridge configuration

# db_path = "~/.filebridge/filebridge.db"

[storage]
# upload_dir = "~/.filebridge/uploads"
# max_upload_bytes = 104857600        # 100 MB
# remote_threshold_bytes = 10485760   # 10 MB

[remote_storage]
enabled = false
# endpoint = "https://s3.amazonaws.com"
# region = "us-east-1"
# bucket = ""
# access_key = ""
# secret_key = ""

[session]
provider = "none"   # "cloud" to enable the WhatsApp Cloud API binding
# data_dir = "~/.filebridge/session"

# [session.cloud]
# phone_number_id = ""
# access_token = ""
# verify_token = ""

[gateway]
host = "127.0.0.1"
port = 8090
"#;

impl Config {
    /// Load `~/.filebridge/config.toml`, writing a commented default file on
    /// first run.
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .context("Could not determine home directory")?;
        let config_path = home.join(".filebridge").join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load a config file from an explicit path, creating it if missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            tracing::info!("Wrote default config to {}", config_path.display());
        }

        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let mut config: Config =
            toml::from_str(&contents).context("Failed to parse config file")?;
        config.config_path = config_path.to_path_buf();
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        expand(&self.db_path)
    }

    pub fn upload_dir(&self) -> PathBuf {
        expand(&self.storage.upload_dir)
    }

    pub fn session_data_dir(&self) -> PathBuf {
        expand(&self.session.data_dir)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
