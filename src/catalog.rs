//! Process-wide device catalog.
//!
//! Any plugin may publish devices here. Every publication is announced
//! synchronously to the subscribed listeners with a [`DeviceEvent`], after the
//! catalog lock has been released, so listeners are free to read the catalog.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{Result, SuperioError};

/// Name of the plugin publishing Intel flash descriptor regions.
pub const INTEL_SPI_PLUGIN: &str = "intel_spi";

/// Intel flash descriptor regions, as used for logical ids by the SPI plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IfdRegion {
    Desc,
    Bios,
    Me,
    Gbe,
    Platform,
    Ec,
}

impl IfdRegion {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Desc => "desc",
            Self::Bios => "bios",
            Self::Me => "me",
            Self::Gbe => "gbe",
            Self::Platform => "platform",
            Self::Ec => "ec",
        }
    }
}

/// Anything that can sit in the catalog.
pub trait CatalogDevice: Send + Sync {
    /// Unique device id
    fn id(&self) -> &str;

    /// Name of the plugin that owns the device
    fn plugin(&self) -> &str;

    fn logical_id(&self) -> Option<&str>;

    fn is_locked(&self) -> bool;
}

/// What listeners learn about a newly published device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEvent {
    pub id: String,
    pub plugin: String,
    pub logical_id: Option<String>,
    pub locked: bool,
}

impl DeviceEvent {
    fn from_device(device: &dyn CatalogDevice) -> Self {
        Self {
            id: device.id().to_string(),
            plugin: device.plugin().to_string(),
            logical_id: device.logical_id().map(str::to_string),
            locked: device.is_locked(),
        }
    }
}

pub trait CatalogListener: Send + Sync {
    fn device_registered(&self, event: &DeviceEvent);
}

/// A flash region published by another plugin, e.g. the ME region of the
/// SPI flash descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct RegionDevice {
    pub id: String,
    pub plugin: String,
    pub region: IfdRegion,
    pub locked: bool,
}

impl RegionDevice {
    pub fn new(plugin: &str, region: IfdRegion, locked: bool) -> Self {
        Self {
            id: format!("{plugin}:{}", region.as_str()),
            plugin: plugin.to_string(),
            region,
            locked,
        }
    }
}

impl CatalogDevice for RegionDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn plugin(&self) -> &str {
        &self.plugin
    }

    fn logical_id(&self) -> Option<&str> {
        Some(self.region.as_str())
    }

    fn is_locked(&self) -> bool {
        self.locked
    }
}

#[derive(Default)]
pub struct DeviceCatalog {
    devices: RwLock<Vec<Arc<dyn CatalogDevice>>>,
    listeners: RwLock<Vec<Weak<dyn CatalogListener>>>,
}

impl DeviceCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register for publication events. Only a weak reference is kept.
    pub fn subscribe<L: CatalogListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<dyn CatalogListener> = Arc::<L>::downgrade(listener);
        self.listeners.write().push(weak);
    }

    /// Add a device and notify every live listener.
    pub fn publish(&self, device: Arc<dyn CatalogDevice>) -> Result<()> {
        let event = DeviceEvent::from_device(device.as_ref());
        {
            let mut devices = self.devices.write();
            if devices.iter().any(|d| d.id() == event.id) {
                return Err(SuperioError::AlreadyPublished(event.id));
            }
            devices.push(device);
        }
        log::debug!("published {} from {}", event.id, event.plugin);

        let listeners: Vec<Arc<dyn CatalogListener>> = {
            let mut listeners = self.listeners.write();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.device_registered(&event);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn CatalogDevice>> {
        self.devices.read().iter().find(|d| d.id() == id).cloned()
    }

    /// Devices owned by `plugin`, in publication order.
    pub fn by_plugin(&self, plugin: &str) -> Vec<Arc<dyn CatalogDevice>> {
        self.devices
            .read()
            .iter()
            .filter(|d| d.plugin() == plugin)
            .cloned()
            .collect()
    }

    pub fn devices(&self) -> Vec<Arc<dyn CatalogDevice>> {
        self.devices.read().clone()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<DeviceEvent>>,
        catalog_len: Mutex<Vec<usize>>,
        catalog: Mutex<Option<Arc<DeviceCatalog>>>,
    }

    impl CatalogListener for Recorder {
        fn device_registered(&self, event: &DeviceEvent) {
            self.events.lock().push(event.clone());
            if let Some(catalog) = self.catalog.lock().as_ref() {
                self.catalog_len.lock().push(catalog.len());
            }
        }
    }

    #[test]
    fn publish_notifies_listeners() {
        let catalog = DeviceCatalog::new();
        let recorder = Arc::new(Recorder::default());
        catalog.subscribe(&recorder);

        catalog
            .publish(Arc::new(RegionDevice::new(INTEL_SPI_PLUGIN, IfdRegion::Me, true)))
            .expect("publish");

        let events = recorder.events.lock();
        assert_eq!(
            events.as_slice(),
            &[DeviceEvent {
                id: "intel_spi:me".into(),
                plugin: "intel_spi".into(),
                logical_id: Some("me".into()),
                locked: true,
            }]
        );
    }

    #[test]
    fn listeners_may_read_the_catalog() {
        let catalog = DeviceCatalog::new();
        let recorder = Arc::new(Recorder::default());
        *recorder.catalog.lock() = Some(Arc::clone(&catalog));
        catalog.subscribe(&recorder);

        catalog
            .publish(Arc::new(RegionDevice::new(INTEL_SPI_PLUGIN, IfdRegion::Bios, false)))
            .expect("publish");
        assert_eq!(recorder.catalog_len.lock().as_slice(), &[1]);

        // break the cycle
        *recorder.catalog.lock() = None;
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let catalog = DeviceCatalog::new();
        catalog
            .publish(Arc::new(RegionDevice::new(INTEL_SPI_PLUGIN, IfdRegion::Me, false)))
            .expect("publish");
        assert!(matches!(
            catalog.publish(Arc::new(RegionDevice::new(INTEL_SPI_PLUGIN, IfdRegion::Me, true))),
            Err(SuperioError::AlreadyPublished(_))
        ));
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.get("intel_spi:me").expect("device").is_locked());
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let catalog = DeviceCatalog::new();
        let recorder = Arc::new(Recorder::default());
        catalog.subscribe(&recorder);
        drop(recorder);

        catalog
            .publish(Arc::new(RegionDevice::new(INTEL_SPI_PLUGIN, IfdRegion::Gbe, false)))
            .expect("publish");
        assert!(catalog.listeners.read().is_empty());
    }

    #[test]
    fn by_plugin_filters() {
        let catalog = DeviceCatalog::new();
        catalog
            .publish(Arc::new(RegionDevice::new(INTEL_SPI_PLUGIN, IfdRegion::Me, false)))
            .expect("publish");
        catalog
            .publish(Arc::new(RegionDevice::new("other", IfdRegion::Me, false)))
            .expect("publish");
        assert_eq!(catalog.by_plugin(INTEL_SPI_PLUGIN).len(), 1);
        assert_eq!(catalog.devices().len(), 2);
        assert!(!catalog.is_empty());
    }
}
