// Configuration loading
// ---------------------
// Reads the TOML file that describes a single refill job: who logs in,
// which office, which medication, and where the portal lives. The result
// is an immutable `Config` value that `main` owns and lends to the client.

use crate::error::{RefillError, Result};
use reqwest::Url;
use serde::Deserialize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the config file location.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_REFILL_PATH: &str = "/msgs/newmsg";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for one refill job. Built once at startup, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub base_url: String,
    pub med_id: String,
    pub office: String,
    pub login_path: String,
    pub refill_path: String,
    pub timeout_secs: u64,
}

/// On-disk shape. Everything optional so that missing fields can be
/// reported together instead of one serde error at a time.
#[derive(Deserialize, Default)]
struct RawConfig {
    username: Option<String>,
    password: Option<String>,
    base_url: Option<String>,
    med_id: Option<String>,
    office: Option<String>,
    login_path: Option<String>,
    refill_path: Option<String>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load the config from `$CONFIG_PATH`, or from
    /// `<config dir>/refiller/config.toml` when the variable is unset.
    pub fn from_env() -> Result<Self> {
        let path = resolve_path(std::env::var_os(CONFIG_PATH_ENV))?;
        Self::from_toml_file(&path)
    }

    /// Load and validate a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RefillError::Configuration(format!(
                "config file not found at {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            RefillError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)
            .map_err(|e| RefillError::Configuration(format!("error parsing config file: {}", e)))?;
        raw.validate()
    }

    /// Per-request network timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Absolute URL of a portal endpoint. `path` starts with `/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn login_url(&self) -> String {
        self.endpoint(&self.login_path)
    }

    pub fn refill_url(&self) -> String {
        self.endpoint(&self.refill_path)
    }
}

// Hand-written so the password never ends up in a log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("med_id", &self.med_id)
            .field("office", &self.office)
            .field("login_path", &self.login_path)
            .field("refill_path", &self.refill_path)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RawConfig {
    fn validate(self) -> Result<Config> {
        let required = [
            ("username", &self.username),
            ("password", &self.password),
            ("base_url", &self.base_url),
            ("med_id", &self.med_id),
            ("office", &self.office),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(RefillError::Configuration(format!(
                "missing or empty required fields in config file: {}",
                missing.join(", ")
            )));
        }

        let base_url = self.base_url.unwrap_or_default();
        check_base_url(&base_url)?;

        let login_path = endpoint_path("login_path", self.login_path, DEFAULT_LOGIN_PATH)?;
        let refill_path = endpoint_path("refill_path", self.refill_path, DEFAULT_REFILL_PATH)?;

        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(RefillError::Configuration(
                "timeout_secs must be greater than zero".into(),
            ));
        }

        Ok(Config {
            username: self.username.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            base_url,
            med_id: self.med_id.unwrap_or_default(),
            office: self.office.unwrap_or_default(),
            login_path,
            refill_path,
            timeout_secs,
        })
    }
}

fn check_base_url(base_url: &str) -> Result<()> {
    let url = Url::parse(base_url)
        .map_err(|e| RefillError::Configuration(format!("invalid base_url {:?}: {}", base_url, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(RefillError::Configuration(format!(
            "base_url must use http or https, got {:?}",
            other
        ))),
    }
}

fn endpoint_path(field: &str, value: Option<String>, default: &str) -> Result<String> {
    let path = value.unwrap_or_else(|| default.to_string());
    if !path.starts_with('/') {
        return Err(RefillError::Configuration(format!(
            "{} must start with '/', got {:?}",
            field, path
        )));
    }
    Ok(path)
}

/// Pick the config file location from the value of `$CONFIG_PATH`.
pub fn resolve_path(env_value: Option<OsString>) -> Result<PathBuf> {
    match env_value {
        Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => dirs::config_dir()
            .map(|dir| dir.join("refiller").join("config.toml"))
            .ok_or_else(|| {
                RefillError::Configuration(format!(
                    "{} is not set and no user config directory is available",
                    CONFIG_PATH_ENV
                ))
            }),
    }
}
