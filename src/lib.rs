//! Discovery of ITE Super I/O embedded controllers.
//!
//! For every HWID GUID of the running machine the plugin looks up a declared
//! chipset family in the quirk store, builds the matching driver, validates it
//! through the shared `/dev/port` resource and publishes it into the device
//! catalog. Devices of the IT55 family follow the ME lock state published by
//! the `intel_spi` plugin and can be unlocked explicitly.

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod plugin;
pub mod sio;

pub use catalog::{CatalogDevice, CatalogListener, DeviceCatalog, DeviceEvent, IfdRegion, RegionDevice};
pub use config::{QuirkStore, SuperioOptions};
pub use context::{Context, HwIds, KernelLockdown, PlatformLockdown};
pub use error::{Result, SuperioError};
pub use plugin::{PluginRule, SuperioPlugin};
