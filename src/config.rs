// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration management for Outpost

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OutpostError, Result};

/// Main configuration structure for Outpost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Outpost instance name
    pub name: String,

    /// Stop certificate procedures at the first failed command
    #[serde(default)]
    pub strict: bool,

    /// Container orchestration settings
    #[serde(default)]
    pub compose: ComposeConfig,

    /// Client certificate settings
    #[serde(default)]
    pub clients: ClientsConfig,

    /// Reconciliation engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Object-storage API settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Bucket certificate issuance
    #[serde(default)]
    pub acme: AcmeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the orchestration CLI is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Program to run (docker-compose, podman-compose, ...)
    #[serde(default = "default_compose_program")]
    pub program: String,

    /// Arguments placed before `run` (e.g. ["compose"] for `docker compose`)
    #[serde(default)]
    pub args: Vec<String>,

    /// Service running the VPN image
    #[serde(default = "default_service")]
    pub service: String,

    /// Shell-sourced file providing PROTO and HOSTNAME
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
}

/// Where client artifacts and the action log live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientsConfig {
    /// Directory receiving exported `<name>.ovpn` files
    #[serde(default = "default_conf_dir")]
    pub conf_dir: PathBuf,

    /// Append-only action log
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Issue client keys without a passphrase
    #[serde(default = "default_true")]
    pub nopass: bool,
}

/// Reconciliation engine invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine program
    #[serde(default = "default_engine_program")]
    pub program: String,

    /// Directory the rendered configuration is written to
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Default descriptor location
    #[serde(default = "default_descriptors")]
    pub descriptors: PathBuf,
}

/// Object-storage API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Cluster hosting the bucket
    #[serde(default)]
    pub cluster: Option<String>,

    /// Bucket label
    #[serde(default)]
    pub bucket: Option<String>,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// ACME certificate authority settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeConfig {
    /// Directory URL of the certificate authority
    #[serde(default = "default_directory_url")]
    pub directory_url: String,

    /// Where the account credentials are kept between runs
    #[serde(default = "default_account_file")]
    pub account_file: PathBuf,

    /// Account contact URLs (`mailto:ops@example.com`)
    #[serde(default)]
    pub contact: Vec<String>,

    /// Agree to the authority's terms of service when registering
    #[serde(default = "default_true")]
    pub agree_tos: bool,

    /// Domain the bucket is served under (defaults to the bucket hostname)
    #[serde(default)]
    pub domain: Option<String>,

    /// Lifetime of the presigned challenge URLs, in seconds
    #[serde(default = "default_challenge_expiry")]
    pub challenge_expiry: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            program: default_compose_program(),
            args: Vec::new(),
            service: default_service(),
            env_file: default_env_file(),
        }
    }
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            conf_dir: default_conf_dir(),
            log_file: default_log_file(),
            nopass: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
            work_dir: default_work_dir(),
            descriptors: default_descriptors(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            cluster: None,
            bucket: None,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            directory_url: default_directory_url(),
            account_file: default_account_file(),
            contact: Vec::new(),
            agree_tos: true,
            domain: None,
            challenge_expiry: default_challenge_expiry(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "outpost".to_string(),
            strict: false,
            compose: ComposeConfig::default(),
            clients: ClientsConfig::default(),
            engine: EngineConfig::default(),
            storage: StorageConfig::default(),
            acme: AcmeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(OutpostError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Load the file when present, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(OutpostError::InvalidConfig {
                message: "Outpost name cannot be empty".to_string(),
            });
        }

        if self.compose.program.trim().is_empty() {
            return Err(OutpostError::InvalidConfig {
                message: "compose.program cannot be empty".to_string(),
            });
        }

        if self.compose.service.trim().is_empty() {
            return Err(OutpostError::InvalidConfig {
                message: "compose.service cannot be empty".to_string(),
            });
        }

        if self.engine.program.trim().is_empty() {
            return Err(OutpostError::InvalidConfig {
                message: "engine.program cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Commented configuration written by `outpost init`
pub const DEFAULT_CONFIG_TOML: &str = r#"# SPDX-License-Identifier: AGPL-3.0-or-later
# Outpost Configuration

name = "outpost"
# Stop certificate procedures at the first failed command
strict = false

[compose]
program = "docker-compose"
# args = ["compose"]
service = "openvpn"
env_file = ".env"

[clients]
conf_dir = "client-confs"
log_file = "VPNclients.log"
nopass = true

[engine]
program = "terraform"
work_dir = ".outpost/engine"
descriptors = "deploy"

[storage]
api_url = "https://api.linode.com/"
token_env = "LINODE_BUCKET_ACCESS_KEY"
# cluster = "us-east-1"
# bucket = "vpn-assets"

[acme]
directory_url = "https://acme-v02.api.letsencrypt.org/directory"
account_file = ".outpost/acme-account.json"
# contact = ["mailto:ops@example.com"]
agree_tos = true
# domain = "vpn-assets.us-east-1.linodeobjects.com"
challenge_expiry = 360

[logging]
# Used when neither --verbose nor --debug nor RUST_LOG is given
level = "warn"
"#;

// Default value functions

fn default_compose_program() -> String {
    "docker-compose".to_string()
}

fn default_service() -> String {
    "openvpn".to_string()
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_conf_dir() -> PathBuf {
    PathBuf::from("client-confs")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("VPNclients.log")
}

fn default_true() -> bool {
    true
}

fn default_engine_program() -> String {
    "terraform".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".outpost/engine")
}

fn default_descriptors() -> PathBuf {
    PathBuf::from("deploy")
}

fn default_api_url() -> String {
    "https://api.linode.com/".to_string()
}

fn default_token_env() -> String {
    "LINODE_BUCKET_ACCESS_KEY".to_string()
}

fn default_user_agent() -> String {
    format!("outpost/{}", env!("CARGO_PKG_VERSION"))
}

fn default_directory_url() -> String {
    "https://acme-v02.api.letsencrypt.org/directory".to_string()
}

fn default_account_file() -> PathBuf {
    PathBuf::from(".outpost/acme-account.json")
}

fn default_challenge_expiry() -> u32 {
    360
}

fn default_log_level() -> String {
    "warn".to_string()
}
