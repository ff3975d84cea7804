// ── Typed resource operations ──
//
// Fetchers and write primitives implemented as inherent methods on
// `Session`, keeping `session.rs` focused on transport mechanics. Each
// fetcher is one GET with the envelope unwrapped into typed records; the
// write primitives are the id-scoped PUTs and the devmgr provisioning
// command that the coordinator layer composes.

use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::Error;
use crate::models::{DeviceBasic, NetworkConfig, SettingEntry, SystemInfo, WlanConfig};
use crate::session::Session;

impl Session {
    // ── Fetchers ─────────────────────────────────────────────────────

    /// Fetch every wireless-network definition for the site.
    pub async fn list_wlans(&self) -> Result<Vec<WlanConfig>, Error> {
        self.get_data("rest/wlanconf").await
    }

    /// Fetch every network (VLAN/subnet) definition for the site.
    pub async fn list_networks(&self) -> Result<Vec<NetworkConfig>, Error> {
        self.get_data("rest/networkconf").await
    }

    /// Fetch the controller's diagnostic system-info blob.
    pub async fn sys_info(&self) -> Result<SystemInfo, Error> {
        let data: Vec<Value> = self.get_data("stat/sysinfo").await?;
        Ok(SystemInfo(data))
    }

    /// Fetch the site settings list.
    ///
    /// Returned rather than cached: the payload carries a lot of
    /// unnecessary and sensitive site configuration.
    pub async fn list_settings(&self) -> Result<Vec<SettingEntry>, Error> {
        self.get_data("rest/setting").await
    }

    /// Resolve a settings key to its opaque backing-store id, needed
    /// before a targeted settings update. `None` if the key is absent.
    pub async fn setting_id(&self, key: &str) -> Result<Option<String>, Error> {
        let settings = self.list_settings().await?;
        Ok(settings.into_iter().find(|s| s.key == key).map(|s| s.id))
    }

    /// Fetch the minimal adopted-device list (`stat/device-basic`).
    pub async fn list_devices_basic(&self) -> Result<Vec<DeviceBasic>, Error> {
        self.get_data("stat/device-basic").await
    }

    // ── Write primitives ─────────────────────────────────────────────

    /// PUT a partial payload onto one wlan by id (merge-patch on the
    /// controller side; only changed fields are supplied).
    ///
    /// The response body is ignored — it is not guaranteed to echo full
    /// state, so callers refresh instead of trusting it.
    pub async fn put_wlan(&self, id: &str, payload: &Value) -> Result<(), Error> {
        let path = format!("rest/wlanconf/{id}");
        self.request(Method::PUT, &path, Some(payload)).await?;
        Ok(())
    }

    /// PUT a partial payload onto one settings section by key and
    /// backing-store id.
    pub async fn put_setting(&self, key: &str, id: &str, payload: &Value) -> Result<(), Error> {
        let path = format!("rest/setting/{key}/{id}");
        self.request(Method::PUT, &path, Some(payload)).await?;
        Ok(())
    }

    /// Command each given access point to re-apply its configuration
    /// immediately rather than waiting for its next check-in.
    pub async fn force_provision(&self, macs: &[String]) -> Result<(), Error> {
        for mac in macs {
            debug!(%mac, "force-provision");
            let payload = json!({ "cmd": "force-provision", "mac": mac });
            self.request(Method::POST, "cmd/devmgr", Some(&payload))
                .await?;
        }
        info!(count = macs.len(), "force-provision issued");
        Ok(())
    }
}
