// ── Write operations ──
//
// Mutations follow a fixed shape: validate locally, open a fresh session,
// resolve the target id from a live listing, PUT the payload, optionally
// force-provision, log out, then run a full awaited refresh so the cache
// reflects the controller's post-write state before the caller returns.

use serde_json::{Value, json};
use tracing::{debug, warn};

use uniwifi_api::{PresharedKeyEntry, Session};

use crate::coordinator::Coordinator;
use crate::error::CoreError;

// 802.11 WPA passphrase bounds.
const PASSPHRASE_MIN: usize = 8;
const PASSPHRASE_MAX: usize = 63;

impl Coordinator {
    // ── Public mutations ─────────────────────────────────────────────

    /// Apply an arbitrary merge-patch to the wlan named `ssid`.
    ///
    /// The payload carries only the keys to change; the controller merges
    /// it into the stored record. If the payload rewrites the per-network
    /// pre-shared keys, password uniqueness is checked before any network
    /// call. `force` requests a force-provision on top of the endpoint's
    /// default. Returns after the post-write refresh has completed.
    pub async fn set_wlan_config(
        &self,
        ssid: &str,
        payload: Value,
        force: bool,
    ) -> Result<(), CoreError> {
        check_preshared_keys(ssid, &payload)?;
        self.write_wlan(ssid, payload, force).await
    }

    /// Change the wlan passphrase.
    pub async fn set_wlan_password(
        &self,
        ssid: &str,
        password: &str,
        force: bool,
    ) -> Result<(), CoreError> {
        validate_passphrase(password)?;
        self.write_wlan(ssid, json!({ "x_passphrase": password }), force)
            .await
    }

    /// Enable or disable broadcast of the wlan.
    pub async fn set_wlan_enabled(
        &self,
        ssid: &str,
        enabled: bool,
        force: bool,
    ) -> Result<(), CoreError> {
        // The controller stores this flag as a string.
        self.write_wlan(ssid, json!({ "enabled": enabled.to_string() }), force)
            .await
    }

    /// Replace the per-network pre-shared keys of a multi-password ssid.
    ///
    /// Fails with [`CoreError::DuplicatePresharedKey`] before any network
    /// call if two entries share a password: the controller accepts such a
    /// set but clients can then join the wrong network.
    pub async fn set_preshared_keys(
        &self,
        ssid: &str,
        keys: Vec<PresharedKeyEntry>,
        force: bool,
    ) -> Result<(), CoreError> {
        for entry in &keys {
            validate_passphrase(&entry.password)?;
        }
        let payload = json!({ "private_preshared_keys": keys });
        check_preshared_keys(ssid, &payload)?;
        self.write_wlan(ssid, payload, force).await
    }

    /// Apply a merge-patch to a site settings section (e.g. `"guest_access"`).
    ///
    /// Settings records are keyed by section name but addressed by a
    /// backing-store id, so the id is resolved from a live listing first.
    pub async fn set_setting(&self, key: &str, payload: Value, force: bool) -> Result<(), CoreError> {
        let endpoint = self.endpoint().clone();
        let session = Session::login(&endpoint).await?;

        let result = async {
            let id = session
                .setting_id(key)
                .await?
                .ok_or_else(|| CoreError::SettingNotFound {
                    key: key.to_owned(),
                    site: endpoint.site.clone(),
                })?;
            debug!(controller = %endpoint.name, key, id, "updating settings section");
            session.put_setting(key, &id, &payload).await?;
            self.provision(&session, force).await
        }
        .await;

        if let Err(e) = session.logout().await {
            warn!(controller = %endpoint.name, error = %e, "logout failed (non-fatal)");
        }
        result?;

        let barrier = self.cycle_barrier();
        self.refresh_started_after(barrier).await.into_result()?;
        Ok(())
    }

    // ── Shared write cycle ───────────────────────────────────────────

    async fn write_wlan(&self, ssid: &str, payload: Value, force: bool) -> Result<(), CoreError> {
        let endpoint = self.endpoint().clone();
        let session = Session::login(&endpoint).await?;

        let result = async {
            // Resolve against a live listing, not the cache: the cached id
            // could be minutes old and ids change when a wlan is recreated.
            let wlans = session.list_wlans().await?;
            let id = wlans
                .iter()
                .find(|w| w.name == ssid)
                .map(|w| w.id.clone())
                .ok_or_else(|| CoreError::WlanNotFound {
                    ssid: ssid.to_owned(),
                    site: endpoint.site.clone(),
                })?;

            debug!(controller = %endpoint.name, ssid, id, "updating wlanconf");
            session.put_wlan(&id, &payload).await?;
            self.provision(&session, force).await
        }
        .await;

        if let Err(e) = session.logout().await {
            warn!(controller = %endpoint.name, error = %e, "logout failed (non-fatal)");
        }
        result?;

        // Mandatory: the caller must not observe a cache that predates its
        // own write. The barrier keeps this from coalescing onto a cycle
        // that fetched before the PUT. Refresh failure is the operation's
        // failure.
        let barrier = self.cycle_barrier();
        self.refresh_started_after(barrier).await.into_result()?;
        Ok(())
    }

    /// Push the pending configuration to access points, when requested by
    /// the call or by the endpoint default. With no explicit AP list,
    /// every adopted AP is provisioned.
    async fn provision(&self, session: &Session, force: bool) -> Result<(), CoreError> {
        let endpoint = self.endpoint();
        if !(force || endpoint.force_provision) {
            return Ok(());
        }

        let macs = if endpoint.managed_aps.is_empty() {
            session
                .list_devices_basic()
                .await
                .map_err(|e| CoreError::Api {
                    message: format!("force-provision device discovery failed: {e}"),
                    status: None,
                })?
                .into_iter()
                .filter(uniwifi_api::DeviceBasic::is_access_point)
                .map(|d| d.mac)
                .collect()
        } else {
            endpoint.managed_aps.clone()
        };

        debug!(controller = %endpoint.name, count = macs.len(), "force-provisioning access points");
        session
            .force_provision(&macs)
            .await
            .map_err(|e| CoreError::Api {
                message: format!("force-provision failed: {e}"),
                status: None,
            })
    }
}

// ── Local validation ─────────────────────────────────────────────────

fn validate_passphrase(password: &str) -> Result<(), CoreError> {
    if !(PASSPHRASE_MIN..=PASSPHRASE_MAX).contains(&password.len()) {
        return Err(CoreError::InvalidPassword {
            reason: format!("length must be {PASSPHRASE_MIN}-{PASSPHRASE_MAX} characters"),
        });
    }
    if !password.is_ascii() {
        return Err(CoreError::InvalidPassword {
            reason: "only printable ASCII characters are allowed".into(),
        });
    }
    Ok(())
}

/// Reject a pre-shared-key set in which two networks share a password.
/// Checked against the outgoing payload, before any session is opened.
fn check_preshared_keys(ssid: &str, payload: &Value) -> Result<(), CoreError> {
    let Some(entries) = payload
        .get("private_preshared_keys")
        .and_then(Value::as_array)
    else {
        return Ok(());
    };

    let mut seen: Vec<(&str, &str)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let network = entry
            .get("networkconf_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(password) = entry.get("password").and_then(Value::as_str) else {
            continue;
        };
        if let Some((other, _)) = seen.iter().find(|(_, p)| *p == password) {
            return Err(CoreError::DuplicatePresharedKey {
                ssid: ssid.to_owned(),
                network_a: (*other).to_owned(),
                network_b: network.to_owned(),
            });
        }
        seen.push((network, password));
    }
    Ok(())
}
