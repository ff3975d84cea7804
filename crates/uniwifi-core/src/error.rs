// ── Core error types ──
//
// User-facing errors from uniwifi-core. Consumers never see raw HTTP
// status codes or JSON parse failures — the `From<uniwifi_api::Error>`
// impl translates transport-layer errors into domain variants, keeping the
// retry/terminal decision logic in one place.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Recoverable by re-login ──────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Transient, retried on the normal schedule ────────────────────
    #[error("Controller unavailable: {message}")]
    ApiUnavailable { message: String },

    #[error("Refresh exceeded its {timeout_secs}s deadline")]
    RefreshTimeout { timeout_secs: u64 },

    // ── Fatal to a single operation ──────────────────────────────────
    #[error("SSID {ssid} not found at site {site}")]
    WlanNotFound { ssid: String, site: String },

    #[error("Settings key {key} not found at site {site}")]
    SettingNotFound { key: String, site: String },

    /// Two pre-shared-key entries under one ssid share a password.
    /// Raised before any network call is made.
    #[error(
        "Duplicate pre-shared-key password for ssid {ssid} (networks {network_a} and {network_b})"
    )]
    DuplicatePresharedKey {
        ssid: String,
        network_a: String,
        network_b: String,
    },

    #[error("Invalid password: {reason}")]
    InvalidPassword { reason: String },

    // ── Coordinator lifecycle ────────────────────────────────────────
    #[error("Coordinator has stopped after repeated authentication failures")]
    CoordinatorFailed,

    // ── Catch-alls ───────────────────────────────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// `true` when the next poll cycle may succeed without operator
    /// intervention (server failures, connectivity, timeouts).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ApiUnavailable { .. } | Self::RefreshTimeout { .. } | Self::Api { .. }
        )
    }

    /// `true` when credentials should be re-checked.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<uniwifi_api::Error> for CoreError {
    fn from(err: uniwifi_api::Error) -> Self {
        match err {
            uniwifi_api::Error::Authentication { message, .. } => {
                CoreError::AuthenticationFailed { message }
            }
            uniwifi_api::Error::MissingCsrfToken => CoreError::AuthenticationFailed {
                message: "login response missing CSRF token".into(),
            },
            uniwifi_api::Error::Api { status, message } => CoreError::ApiUnavailable {
                message: format!("HTTP {status}: {message}"),
            },
            uniwifi_api::Error::Transport(ref e) if e.is_timeout() || e.is_connect() => {
                CoreError::ApiUnavailable {
                    message: e.to_string(),
                }
            }
            uniwifi_api::Error::Transport(e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            uniwifi_api::Error::Http { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            uniwifi_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            uniwifi_api::Error::Tls(message) => CoreError::Config { message },
            uniwifi_api::Error::Deserialization { message, .. } => CoreError::Api {
                message: format!("unexpected response shape: {message}"),
                status: None,
            },
        }
    }
}
