// uniwifi-api: Session-scoped client for the UniFi controller's legacy
// wireless-configuration API.
//
// One `Session` per logical operation: login, a handful of site-scoped
// requests, logout. The coordinator layer (`uniwifi-core`) owns scheduling
// and caching; this crate owns the wire.

pub mod endpoint;
pub mod error;
pub mod models;
pub mod resources;
pub mod session;

mod transport;

pub use endpoint::{ControllerEndpoint, ControllerVariant};
pub use error::Error;
pub use models::{
    DeviceBasic, NetworkConfig, PresharedKeyEntry, SettingEntry, SystemInfo, WlanConfig,
};
pub use session::Session;
