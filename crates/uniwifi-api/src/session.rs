// ── Session lifecycle and request execution ──
//
// A `Session` is ephemeral: created by `login`, used for exactly one
// logical operation (a refresh or a write), then discarded via `logout`.
// It owns a fresh cookie jar and, on UniFi OS, the CSRF token captured at
// login. Status classification lives here and nowhere else — every layer
// above branches on `Error` variants instead of status codes.

use std::sync::RwLock;

use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use crate::endpoint::ControllerEndpoint;
use crate::error::Error;
use crate::models::Envelope;
use crate::transport::build_client;

/// An authenticated, single-operation session against one controller.
///
/// Never shared across operations and never persisted — the cookie/CSRF
/// pair is only valid between one login and the matching logout.
#[derive(Debug)]
pub struct Session {
    http: reqwest::Client,
    endpoint: ControllerEndpoint,
    /// CSRF token for UniFi OS. Captured from the login response and
    /// rotated via `X-Updated-CSRF-Token` on later responses.
    csrf_token: RwLock<Option<String>>,
}

impl Session {
    /// Authenticate against the endpoint and return a live session.
    ///
    /// Sends the credentials as a JSON POST to `{login_prefix}/login`.
    /// 401/403 classify as [`Error::Authentication`]. On the UniFi OS
    /// variant the response must carry an `X-CSRF-Token` header; a login
    /// without one cannot make any authenticated call afterwards.
    pub async fn login(endpoint: &ControllerEndpoint) -> Result<Self, Error> {
        let http = build_client(endpoint.verify_tls, endpoint.request_timeout)?;
        let url = endpoint.login_url()?;

        debug!(controller = %endpoint.name, %url, "logging in");

        let body = json!({
            "username": endpoint.username,
            "password": endpoint.password.expose_secret(),
        });

        let resp = http.post(url).json(&body).send().await?;
        let resp = classify(resp).await?;

        let csrf_token = if endpoint.variant.requires_csrf() {
            let token = resp
                .headers()
                .get("X-CSRF-Token")
                .or_else(|| resp.headers().get("x-csrf-token"))
                .and_then(|v| v.to_str().ok())
                .map(String::from)
                .ok_or(Error::MissingCsrfToken)?;
            Some(token)
        } else {
            None
        };

        debug!(controller = %endpoint.name, "login successful");

        Ok(Self {
            http,
            endpoint: endpoint.clone(),
            csrf_token: RwLock::new(csrf_token),
        })
    }

    /// The endpoint this session was opened against.
    pub fn endpoint(&self) -> &ControllerEndpoint {
        &self.endpoint
    }

    /// End the session with a POST to `{login_prefix}/logout`.
    ///
    /// Callers treat this as best-effort: a failed logout is logged and
    /// swallowed so it never masks the outcome of the operation it closes.
    pub async fn logout(&self) -> Result<(), Error> {
        let url = self.endpoint.logout_url()?;
        debug!(controller = %self.endpoint.name, %url, "logging out");

        let builder = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_LENGTH, "0");
        let resp = self.apply_csrf(builder).send().await?;
        classify(resp).await?;

        debug!(controller = %self.endpoint.name, "logout complete");
        Ok(())
    }

    /// Issue an authenticated request to a site-scoped resource path.
    ///
    /// Always carries the session cookie; carries the CSRF header only on
    /// the UniFi OS variant. This is the single place failure semantics
    /// are decided: 401/403 → `Authentication`, ≥500 → `Api`, any other
    /// non-2xx → `Http`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, Error> {
        let url = self.endpoint.site_url(path)?;
        self.request_url(method, url, body).await
    }

    async fn request_url(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, Error> {
        debug!(%method, %url, "request");

        let mut builder = self.http.request(method, url);
        if let Some(json) = body {
            builder = builder.json(json);
        }
        let resp = self.apply_csrf(builder).send().await?;

        self.rotate_csrf(resp.headers());
        classify(resp).await
    }

    /// GET a resource and unwrap the `{"data": [...]}` envelope.
    pub(crate) async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, Error> {
        let resp = self.request(Method::GET, path, None).await?;
        let body = resp.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })?;

        Ok(envelope.data)
    }

    fn apply_csrf(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if !self.endpoint.variant.requires_csrf() {
            return builder;
        }
        let guard = self.csrf_token.read().expect("CSRF lock poisoned");
        match guard.as_deref() {
            Some(token) => builder.header("X-CSRF-Token", token),
            None => builder,
        }
    }

    /// UniFi OS may rotate tokens mid-session — prefer the updated one.
    fn rotate_csrf(&self, headers: &reqwest::header::HeaderMap) {
        if !self.endpoint.variant.requires_csrf() {
            return;
        }
        let new_token = headers
            .get("X-Updated-CSRF-Token")
            .or_else(|| headers.get("x-csrf-token"))
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if let Some(token) = new_token {
            trace!("CSRF token rotated");
            *self.csrf_token.write().expect("CSRF lock poisoned") = Some(token);
        }
    }
}

/// Map a response's status onto the error taxonomy, passing 2xx through.
async fn classify(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let message = body_preview(resp).await;
        return Err(Error::Authentication {
            status: status.as_u16(),
            message,
        });
    }

    if status.is_server_error() {
        let message = body_preview(resp).await;
        return Err(Error::Api {
            status: status.as_u16(),
            message,
        });
    }

    if !status.is_success() {
        let message = body_preview(resp).await;
        return Err(Error::Http {
            status: status.as_u16(),
            message,
        });
    }

    Ok(resp)
}

async fn body_preview(resp: reqwest::Response) -> String {
    let body = resp.text().await.unwrap_or_default();
    body.chars().take(200).collect()
}
