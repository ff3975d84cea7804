// ── Wire models for the legacy REST resources ──
//
// The controller wraps every resource payload in `{"data": [...]}`.
// Records are decoded at the fetch boundary; unknown fields are kept in a
// flattened bag wherever a later PUT needs passthrough. The controller is
// inconsistent about booleans (real `true` vs the string `"true"`), so the
// flag fields accept both.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response envelope for every legacy REST resource.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Vec<T>,
}

/// One wireless-network definition (`rest/wlanconf`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WlanConfig {
    #[serde(rename = "_id")]
    pub id: String,
    /// The ssid.
    pub name: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enabled: bool,
    #[serde(
        rename = "hide_ssid",
        default,
        deserialize_with = "lenient_bool"
    )]
    pub hidden: bool,
    #[serde(rename = "x_passphrase", default)]
    pub passphrase: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub wpa3_support: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub wpa3_transition: bool,
    #[serde(default)]
    pub networkconf_id: Option<String>,
    /// Per-client-network password variants, keyed by network id.
    #[serde(rename = "private_preshared_keys", default)]
    pub preshared_keys: Option<Vec<PresharedKeyEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WlanConfig {
    /// QR-encodable join payload for this network, in the standard
    /// `WIFI:` scheme. `None` when the controller withheld the passphrase
    /// (open networks, restricted accounts).
    pub fn qr_text(&self) -> Option<String> {
        let password = self.passphrase.as_deref()?;
        Some(format!("WIFI:T:WPA;S:{};P:{password};;", self.name))
    }
}

/// One private pre-shared key: a per-network password variant attached to
/// a wlan, uniquely identified by its network reference within the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresharedKeyEntry {
    pub networkconf_id: String,
    pub password: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One VLAN/subnet definition (`rest/networkconf`), referenced by id from
/// pre-shared-key entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Opaque diagnostic blob from `stat/sysinfo`. Consumers only ever pass
/// it through, so it stays untyped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInfo(pub Vec<Value>);

impl SystemInfo {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One site-settings entry (`rest/setting`). Only the key and backing-store
/// id are typed; the rest is sensitive site configuration we deliberately
/// leave opaque.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub key: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Minimal adopted-device record (`stat/device-basic`), used to discover
/// access points for force-provisioning.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceBasic {
    pub mac: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceBasic {
    /// Whether this device broadcasts wifi and should receive a
    /// force-provision command. Dream Machines embed an AP alongside the
    /// gateway, so the base `udm` model counts too.
    pub fn is_access_point(&self) -> bool {
        self.device_type == "uap"
            || (self.device_type == "udm" && self.model.as_deref() == Some("UDM"))
    }
}

/// Accept `true`/`false` as either JSON booleans or the string forms the
/// controller sometimes echoes back after a merge-patch write.
fn lenient_bool<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    match BoolOrString::deserialize(de)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => Ok(s.eq_ignore_ascii_case("true")),
    }
}
