// ── Controller endpoint identity ──
//
// Everything needed to reach one controller: address, site, credentials,
// deployment variant, and the polling/timeout tuning that the coordinator
// layer reads. Immutable after construction; one coordinator owns one
// endpoint for the process lifetime.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::Error;

/// Deployment mode of the controller.
///
/// Determines the login prefix and the resource-path prefix, selected once
/// per endpoint at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerVariant {
    /// UniFi OS gateway (UDM, UCG, ...): auth at `/api/auth`, network API
    /// proxied behind `/proxy/network`, CSRF token required on
    /// authenticated calls.
    UnifiOs,
    /// Standalone Network Application: bare `/api`, no proxy prefix,
    /// no CSRF token.
    Classic,
}

impl ControllerVariant {
    /// Prefix for the login/logout endpoints.
    pub fn login_prefix(self) -> &'static str {
        match self {
            Self::UnifiOs => "/api/auth",
            Self::Classic => "/api",
        }
    }

    /// Prefix for site-scoped resource endpoints.
    pub fn api_prefix(self) -> &'static str {
        match self {
            Self::UnifiOs => "/proxy/network",
            Self::Classic => "",
        }
    }

    /// Whether authenticated requests must carry the `X-CSRF-Token` header.
    pub fn requires_csrf(self) -> bool {
        matches!(self, Self::UnifiOs)
    }
}

/// Identity and tuning for one remote controller.
///
/// Built once from static configuration at startup and owned exclusively by
/// one coordinator. Credentials stay wrapped in [`SecretString`] until the
/// login call itself.
#[derive(Debug, Clone)]
pub struct ControllerEndpoint {
    /// Display name used in logs and error messages.
    pub name: String,
    /// Controller root URL (e.g. `https://192.168.1.1:8443`).
    pub url: Url,
    /// Site identifier (controller default is `"default"`).
    pub site: String,
    /// Local account username.
    pub username: String,
    /// Local account password.
    pub password: SecretString,
    /// Deployment variant, fixed at construction.
    pub variant: ControllerVariant,
    /// Verify the controller's TLS certificate. Disabling this is an
    /// explicit operator choice for self-signed controllers.
    pub verify_tls: bool,
    /// Issue a fleet-wide force-provision after every write.
    pub force_provision: bool,
    /// Access points (MACs) to provision. Empty list means discover every
    /// adopted AP via the device list.
    pub managed_aps: Vec<String>,
    /// Scheduled refresh interval.
    pub poll_interval: Duration,
    /// Overall deadline for one refresh cycle.
    pub request_timeout: Duration,
    /// Consecutive auth failures tolerated before the coordinator goes
    /// terminal. A single stale-session 401 should not demand operator
    /// intervention.
    pub auth_failure_limit: u32,
}

impl ControllerEndpoint {
    /// Full login URL for this endpoint's variant.
    pub(crate) fn login_url(&self) -> Result<Url, Error> {
        self.join(self.variant.login_prefix(), "login")
    }

    /// Full logout URL for this endpoint's variant.
    pub(crate) fn logout_url(&self) -> Result<Url, Error> {
        self.join(self.variant.login_prefix(), "logout")
    }

    /// Site-scoped resource URL: `{url}{api_prefix}/api/s/{site}/{path}`.
    pub(crate) fn site_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}{}/api/s/{}/{path}",
            self.url.as_str().trim_end_matches('/'),
            self.variant.api_prefix(),
            self.site,
        );
        Url::parse(&full).map_err(Error::InvalidUrl)
    }

    fn join(&self, prefix: &str, leaf: &str) -> Result<Url, Error> {
        let full = format!(
            "{}{prefix}/{leaf}",
            self.url.as_str().trim_end_matches('/')
        );
        Url::parse(&full).map_err(Error::InvalidUrl)
    }
}
