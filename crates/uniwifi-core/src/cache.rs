// ── Coordinator cache ──
//
// One immutable snapshot per successful refresh, swapped wholesale.
// Readers load the current snapshot at any time, including mid-refresh,
// and always see a complete old or complete new state — never a mix of
// old wlans and new networks.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use uniwifi_api::{NetworkConfig, SystemInfo, WlanConfig};

/// The three collections fetched during one refresh cycle, plus the time
/// the cycle completed. Replaced all-or-nothing; never merged.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub wlans: Vec<WlanConfig>,
    pub networks: Vec<NetworkConfig>,
    pub system_info: SystemInfo,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Copy-on-replace holder for the current snapshot.
pub(crate) struct Cache {
    current: ArcSwap<CacheSnapshot>,
}

impl Cache {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(CacheSnapshot::default()),
        }
    }

    /// The current snapshot (cheap `Arc` clone, wait-free).
    pub(crate) fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.load_full()
    }

    /// Install a new snapshot, returning the one it replaced.
    pub(crate) fn replace(&self, snapshot: CacheSnapshot) -> Arc<CacheSnapshot> {
        self.current.swap(Arc::new(snapshot))
    }
}

// ── Pure lookups ─────────────────────────────────────────────────────

/// Find a wlan by ssid. Name-to-record resolution is always done against
/// an explicit snapshot so indices can never go stale under the reader.
pub fn find_wlan<'a>(snapshot: &'a CacheSnapshot, ssid: &str) -> Option<&'a WlanConfig> {
    snapshot.wlans.iter().find(|w| w.name == ssid)
}

/// Find a network definition by name.
pub fn find_network<'a>(snapshot: &'a CacheSnapshot, name: &str) -> Option<&'a NetworkConfig> {
    snapshot.networks.iter().find(|n| n.name == name)
}

// ── Change detection ─────────────────────────────────────────────────

/// User-relevant field changes for one ssid between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WlanChange {
    pub ssid: String,
    pub enabled_changed: bool,
    pub password_changed: bool,
    pub hidden_changed: bool,
}

impl WlanChange {
    pub fn any(&self) -> bool {
        self.enabled_changed || self.password_changed || self.hidden_changed
    }
}

/// Diff the wlan lists of two snapshots, reporting ssids present in both
/// whose user-relevant fields differ. Dependents (QR rendering, entity
/// state) drive their side effects from this.
pub fn wlan_changes(old: &CacheSnapshot, new: &CacheSnapshot) -> Vec<WlanChange> {
    new.wlans
        .iter()
        .filter_map(|wlan| {
            let before = find_wlan(old, &wlan.name)?;
            let change = WlanChange {
                ssid: wlan.name.clone(),
                enabled_changed: before.enabled != wlan.enabled,
                password_changed: before.passphrase != wlan.passphrase,
                hidden_changed: before.hidden != wlan.hidden,
            };
            change.any().then_some(change)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wlan(name: &str, enabled: bool, passphrase: &str) -> WlanConfig {
        serde_json::from_value(json!({
            "_id": format!("id-{name}"),
            "name": name,
            "enabled": enabled,
            "x_passphrase": passphrase,
        }))
        .unwrap()
    }

    fn snapshot(wlans: Vec<WlanConfig>) -> CacheSnapshot {
        CacheSnapshot {
            wlans,
            ..CacheSnapshot::default()
        }
    }

    #[test]
    fn find_wlan_returns_none_for_missing_ssid() {
        let snap = snapshot(vec![wlan("guest", true, "abc12345")]);
        assert!(find_wlan(&snap, "guest").is_some());
        assert!(find_wlan(&snap, "missing").is_none());
    }

    #[test]
    fn replace_returns_previous_snapshot() {
        let cache = Cache::new();
        let reader = cache.snapshot();
        assert!(reader.wlans.is_empty());

        let old = cache.replace(snapshot(vec![wlan("guest", true, "abc12345")]));
        assert!(old.wlans.is_empty());

        // The pre-replace reader still sees its complete snapshot.
        assert!(reader.wlans.is_empty());
        assert_eq!(cache.snapshot().wlans.len(), 1);
    }

    #[test]
    fn diff_reports_password_and_enabled_changes() {
        let old = snapshot(vec![
            wlan("guest", true, "abc12345"),
            wlan("iot", true, "iot-pass"),
        ]);
        let new = snapshot(vec![
            wlan("guest", false, "new-pass"),
            wlan("iot", true, "iot-pass"),
        ]);

        let changes = wlan_changes(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].ssid, "guest");
        assert!(changes[0].enabled_changed);
        assert!(changes[0].password_changed);
        assert!(!changes[0].hidden_changed);
    }

    #[test]
    fn diff_ignores_ssids_absent_from_either_side() {
        let old = snapshot(vec![wlan("guest", true, "abc12345")]);
        let new = snapshot(vec![wlan("brand-new", true, "whatever1")]);
        assert!(wlan_changes(&old, &new).is_empty());
    }
}
