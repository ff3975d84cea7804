//! Configuration loading for uniwifi.
//!
//! TOML file + `UNIWIFI_`-prefixed environment overrides, with per-controller
//! `[[controllers]]` entries translated into `uniwifi_api::ControllerEndpoint`
//! values ready to hand to a coordinator. Passwords can live in the file or be
//! pulled from a named environment variable per controller.

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use uniwifi_api::{ControllerEndpoint, ControllerVariant};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} for controller '{name}': {reason}")]
    Validation {
        name: String,
        field: String,
        reason: String,
    },

    #[error("duplicate controller name '{name}'")]
    DuplicateName { name: String },

    #[error("no password configured for controller '{name}'")]
    NoCredentials { name: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Defaults applied to every controller entry that does not override
    /// them.
    #[serde(default)]
    pub defaults: Defaults,

    /// One entry per controller to poll.
    #[serde(default)]
    pub controllers: Vec<ControllerProfile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_site")]
    pub site: String,

    /// UniFi OS gateway (`true`) vs standalone Network Application.
    #[serde(default = "default_true")]
    pub unifi_os: bool,

    /// Local controllers typically carry self-signed certificates.
    #[serde(default)]
    pub verify_tls: bool,

    #[serde(default)]
    pub force_provision: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_auth_failure_limit")]
    pub auth_failure_limit: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            site: default_site(),
            unifi_os: true,
            verify_tls: false,
            force_provision: false,
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
            auth_failure_limit: default_auth_failure_limit(),
        }
    }
}

fn default_site() -> String {
    "default".into()
}
fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    60
}
fn default_timeout() -> u64 {
    10
}
fn default_auth_failure_limit() -> u32 {
    3
}

/// One `[[controllers]]` entry. Only `name`, `url`, and `username` are
/// mandatory; everything else falls back to `[defaults]`.
#[derive(Debug, Deserialize, Serialize)]
pub struct ControllerProfile {
    /// Unique display name, used in logs and to address the controller.
    pub name: String,

    /// Controller root URL (e.g. "https://192.168.1.1").
    pub url: String,

    pub username: String,

    /// Plaintext password. Prefer `password_env`.
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    pub password_env: Option<String>,

    pub site: Option<String>,
    pub unifi_os: Option<bool>,
    pub verify_tls: Option<bool>,
    pub force_provision: Option<bool>,

    /// Access points (MACs) to force-provision after writes. Empty means
    /// every adopted AP.
    #[serde(default)]
    pub managed_aps: Vec<String>,

    pub poll_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub auth_failure_limit: Option<u32>,
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load configuration from a TOML file, with `UNIWIFI_`-prefixed
/// environment variables layered on top. `__` separates nesting levels
/// (`UNIWIFI_DEFAULTS__SITE=branch`), since keys themselves contain
/// single underscores.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("UNIWIFI_").split("__"));

    Ok(figment.extract()?)
}

/// Translate the parsed config into one endpoint per controller entry.
///
/// Rejects duplicate names (two coordinators polling the same entry would
/// double every session) and resolves each entry's password.
pub fn endpoints(config: &Config) -> Result<Vec<ControllerEndpoint>, ConfigError> {
    let mut seen: Vec<&str> = Vec::with_capacity(config.controllers.len());
    let mut out = Vec::with_capacity(config.controllers.len());

    for profile in &config.controllers {
        if seen.contains(&profile.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                name: profile.name.clone(),
            });
        }
        seen.push(&profile.name);
        out.push(resolve(profile, &config.defaults)?);
    }
    Ok(out)
}

fn resolve(profile: &ControllerProfile, defaults: &Defaults) -> Result<ControllerEndpoint, ConfigError> {
    let url: Url = profile.url.parse().map_err(|e| ConfigError::Validation {
        name: profile.name.clone(),
        field: "url".into(),
        reason: format!("{e}: {}", profile.url),
    })?;

    let password = resolve_password(profile)?;

    let poll_interval_secs = profile
        .poll_interval_secs
        .unwrap_or(defaults.poll_interval_secs);
    if poll_interval_secs == 0 {
        return Err(ConfigError::Validation {
            name: profile.name.clone(),
            field: "poll_interval_secs".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let variant = if profile.unifi_os.unwrap_or(defaults.unifi_os) {
        ControllerVariant::UnifiOs
    } else {
        ControllerVariant::Classic
    };

    Ok(ControllerEndpoint {
        name: profile.name.clone(),
        url,
        site: profile.site.clone().unwrap_or_else(|| defaults.site.clone()),
        username: profile.username.clone(),
        password,
        variant,
        verify_tls: profile.verify_tls.unwrap_or(defaults.verify_tls),
        force_provision: profile.force_provision.unwrap_or(defaults.force_provision),
        managed_aps: profile.managed_aps.clone(),
        poll_interval: Duration::from_secs(poll_interval_secs),
        request_timeout: Duration::from_secs(
            profile.timeout_secs.unwrap_or(defaults.timeout_secs),
        ),
        auth_failure_limit: profile
            .auth_failure_limit
            .unwrap_or(defaults.auth_failure_limit),
    })
}

/// Password chain: named env var first, then plaintext in the file.
fn resolve_password(profile: &ControllerProfile) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }
    Err(ConfigError::NoCredentials {
        name: profile.name.clone(),
    })
}
