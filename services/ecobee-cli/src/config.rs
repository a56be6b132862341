//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The web-login password is loaded from the ECOBEE_PASSWORD env var or
//! password_file, never stored in the TOML directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use ecobee_auth::{DEFAULT_API_BASE_URL, DEFAULT_WEB_AUTH_BASE_URL, Endpoints};
use ecobee_client::{Settings, StatusCodeMap};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub ecobee: EcobeeConfig,
    #[serde(default)]
    pub secondary: Option<SecondaryConfig>,
}

/// ecobee API settings
#[derive(Debug, Deserialize)]
pub struct EcobeeConfig {
    /// Developer API key. ECOBEE_API_KEY overrides it; when both are absent
    /// the key stored with the credentials is used.
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_base_url")]
    pub auth_base_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_web_auth_base_url")]
    pub web_auth_base_url: String,
    /// Seconds between token polls while waiting for PIN authorization.
    #[serde(default = "default_pin_poll_interval")]
    pub pin_poll_interval_secs: u64,
    /// Give up waiting for PIN authorization after this many seconds.
    #[serde(default = "default_pin_poll_timeout")]
    pub pin_poll_timeout_secs: u64,
    /// Write Prometheus metrics here on exit (textfile collector format).
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
    #[serde(default)]
    pub status_codes: StatusCodeMap,
}

/// Web-login credentials for accounts without a developer PIN flow
#[derive(Debug, Deserialize)]
pub struct SecondaryConfig {
    pub username: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to ECOBEE_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("ecobee.conf")
}

fn default_timeout() -> u64 {
    30
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_web_auth_base_url() -> String {
    DEFAULT_WEB_AUTH_BASE_URL.to_string()
}

fn default_pin_poll_interval() -> u64 {
    30
}

fn default_pin_poll_timeout() -> u64 {
    600
}

fn require_http(name: &str, url: &str) -> common::Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. ECOBEE_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        let ecobee = &config.ecobee;
        require_http("auth_base_url", &ecobee.auth_base_url)?;
        require_http("api_base_url", &ecobee.api_base_url)?;
        require_http("web_auth_base_url", &ecobee.web_auth_base_url)?;

        if ecobee.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if ecobee.pin_poll_interval_secs == 0 {
            return Err(common::Error::Config(
                "pin_poll_interval_secs must be greater than 0".into(),
            ));
        }
        ecobee
            .status_codes
            .validate()
            .map_err(common::Error::Config)?;

        if let Ok(key) = std::env::var("ECOBEE_API_KEY") {
            config.ecobee.api_key = Some(Secret::new(key));
        }

        if let Some(secondary) = config.secondary.as_mut() {
            if secondary.username.trim().is_empty() {
                return Err(common::Error::Config(
                    "secondary.username must not be empty".into(),
                ));
            }
            // Env var takes precedence over file
            if let Ok(password) = std::env::var("ECOBEE_PASSWORD") {
                secondary.password = Some(Secret::new(password));
            } else if let Some(ref password_file) = secondary.password_file {
                let password = std::fs::read_to_string(password_file).map_err(|e| {
                    common::Error::Config(format!(
                        "failed to read password_file {}: {e}",
                        password_file.display()
                    ))
                })?;
                let password = Secret::new(password.trim().to_owned());
                if !password.is_blank() {
                    secondary.password = Some(password);
                }
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("ecobee-cli.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.ecobee.timeout_secs)
    }

    pub fn pin_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ecobee.pin_poll_interval_secs)
    }

    pub fn pin_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.ecobee.pin_poll_timeout_secs)
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            auth_base: self.ecobee.auth_base_url.clone(),
            api_base: self.ecobee.api_base_url.clone(),
            web_auth_base: self.ecobee.web_auth_base_url.clone(),
        }
    }

    /// Client settings. Web login is only enabled when a password resolved.
    pub fn settings(&self) -> Settings {
        let (username, password) = match &self.secondary {
            Some(SecondaryConfig {
                username,
                password: Some(password),
                ..
            }) => (Some(username.clone()), Some(password.expose().clone())),
            _ => (None, None),
        };
        Settings {
            api_key: self.ecobee.api_key.as_ref().map(|k| k.expose().clone()),
            endpoints: self.endpoints(),
            status_codes: self.ecobee.status_codes.clone(),
            username,
            password,
        }
    }
}
