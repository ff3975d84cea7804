use thiserror::Error;

/// Top-level error type for the `uniwifi-api` crate.
///
/// Status classification happens in exactly one place
/// ([`Session::request`](crate::session::Session)); every caller branches
/// on these variants instead of re-deriving status-code meaning.
/// `uniwifi-core` maps them into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// 401/403 from the controller — credentials rejected or session
    /// expired. Recoverable by re-login on the next cycle.
    #[error("Authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    /// The UniFi OS login response did not carry the `X-CSRF-Token`
    /// header, so no authenticated call could succeed afterwards.
    #[error("Login response missing CSRF token")]
    MissingCsrfToken,

    // ── Controller failures ─────────────────────────────────────────
    /// 5xx from the controller — transient server failure, retried on
    /// the normal poll schedule.
    #[error("Controller error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Any other non-2xx status (catch-all transport semantics).
    #[error("Unexpected HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Connection-level failure (refused, DNS, TLS handshake, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL construction failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON decode of the `{"data": [...]}` envelope failed; the raw
    /// body is kept for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// `true` if re-authentication on the next cycle might resolve this.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::MissingCsrfToken)
    }

    /// `true` for transient failures worth retrying on the normal
    /// schedule (server errors, connectivity, timeouts).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { .. } => true,
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
