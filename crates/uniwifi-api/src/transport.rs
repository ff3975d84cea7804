// ── HTTP client construction ──
//
// One place that turns endpoint TLS/timeout settings into a
// `reqwest::Client`. Every session gets a fresh cookie jar so no cookie
// or CSRF state leaks between logical operations.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;

use crate::error::Error;

/// Build the per-session HTTP client.
///
/// `verify_tls = false` accepts self-signed certificates without warning,
/// an explicit operator choice for local controllers.
pub(crate) fn build_client(verify_tls: bool, timeout: Duration) -> Result<reqwest::Client, Error> {
    let jar = Arc::new(Jar::default());

    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("uniwifi/", env!("CARGO_PKG_VERSION")))
        .cookie_provider(jar);

    if !verify_tls {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
}
