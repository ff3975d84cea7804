// uniwifi-core: Polling coordinator and write-then-refresh mutations for
// UniFi wireless configuration.
//
// One `Coordinator` per controller endpoint. The coordinator polls on a
// schedule, keeps a wholesale-replaced cache snapshot, coalesces overlapping
// refreshes into a single session, and exposes mutations that always leave
// the cache consistent with the controller before returning.

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod ops;

pub use cache::{CacheSnapshot, WlanChange, find_network, find_wlan, wlan_changes};
pub use coordinator::{Coordinator, CoordinatorState, FailureKind, RefreshOutcome, UpdateEvent};
pub use error::CoreError;

// The wire-layer types callers need to construct and inspect coordinators.
pub use uniwifi_api::{
    ControllerEndpoint, ControllerVariant, NetworkConfig, PresharedKeyEntry, SystemInfo, WlanConfig,
};
