//! The Super I/O plugin: coldplug, ME lock tracking and unlock.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::catalog::{CatalogDevice, CatalogListener, DeviceCatalog, DeviceEvent, IfdRegion, INTEL_SPI_PLUGIN};
use crate::config::{SuperioOptions, QUIRK_KEYS, QUIRK_KEY_GTYPE};
use crate::context::Context;
use crate::error::{Result, SuperioError};
use crate::sio::device::SuperioDevice;
use crate::sio::port::SharedPort;
use crate::sio::registry::DriverRegistry;

/// Metadata source gating this plugin on kernel lockdown state.
pub const METADATA_SOURCE_LOCKDOWN: &str = "linux_lockdown";

/// Prefix of the vendor id derived from the SMBIOS baseboard manufacturer.
pub const VENDOR_ID_PREFIX: &str = "DMI";

/// Ordering hints for the host scheduling discovery passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PluginRule {
    /// Run after the named plugin, advisory only
    RunAfter(&'static str),
    MetadataSource(&'static str),
}

const RULES: &[PluginRule] = &[
    PluginRule::MetadataSource(METADATA_SOURCE_LOCKDOWN),
    // ME lock status comes from the SPI descriptor regions
    PluginRule::RunAfter(INTEL_SPI_PLUGIN),
];

pub struct SuperioPlugin {
    ctx: Arc<Context>,
    catalog: Arc<DeviceCatalog>,
    registry: DriverRegistry,
    port: Arc<SharedPort>,
    devices: RwLock<Vec<Arc<SuperioDevice>>>,
}

impl SuperioPlugin {
    /// Create the plugin with the built-in families and the host port device.
    pub fn new(
        ctx: Arc<Context>,
        catalog: Arc<DeviceCatalog>,
        options: &SuperioOptions,
    ) -> Result<Arc<Self>> {
        let registry = DriverRegistry::builtin()?;
        let port = Arc::new(SharedPort::open(&options.port_device));
        Ok(Self::with_parts(ctx, catalog, registry, port))
    }

    /// Create the plugin from explicit parts, register its quirk keys and
    /// subscribe it to catalog publications.
    pub fn with_parts(
        ctx: Arc<Context>,
        catalog: Arc<DeviceCatalog>,
        registry: DriverRegistry,
        port: Arc<SharedPort>,
    ) -> Arc<Self> {
        for key in QUIRK_KEYS {
            ctx.quirks().add_key(key);
        }
        let plugin = Arc::new(Self {
            ctx,
            catalog: Arc::clone(&catalog),
            registry,
            port,
            devices: RwLock::new(Vec::new()),
        });
        catalog.subscribe(&plugin);
        plugin
    }

    pub const fn rules() -> &'static [PluginRule] {
        RULES
    }

    /// Devices published by this plugin, in publication order.
    pub fn devices(&self) -> Vec<Arc<SuperioDevice>> {
        self.devices.read().clone()
    }

    /// Discover every Super I/O chip declared for this machine.
    ///
    /// All candidates are built and validated before any is published, so a
    /// failing candidate leaves the catalog without devices from this pass.
    pub fn coldplug(&self) -> Result<()> {
        if self.ctx.is_locked_down() {
            return Err(SuperioError::PlatformRestricted);
        }

        let mut found = Vec::new();
        for guid in self.ctx.hwid_guids() {
            if let Some(device) = self.build_chipset(guid)? {
                found.push(device);
            }
        }

        for device in found {
            self.publish(device)?;
        }
        Ok(())
    }

    /// Resolve, probe, validate and publish the chip declared for one HWID.
    ///
    /// Returns `Ok(None)` when no chipset is declared for `guid`.
    pub fn coldplug_chipset(&self, guid: &str) -> Result<Option<Arc<SuperioDevice>>> {
        match self.build_chipset(guid)? {
            Some(device) => self.publish(device).map(Some),
            None => Ok(None),
        }
    }

    fn build_chipset(&self, guid: &str) -> Result<Option<SuperioDevice>> {
        let quirks = self.ctx.quirks();

        // get chipset
        let Some(chipset) = quirks.lookup(guid, QUIRK_KEY_GTYPE) else {
            return Ok(None);
        };
        let entry = self
            .registry
            .lookup(&chipset)
            .ok_or_else(|| SuperioError::UnsupportedChipset(chipset.clone()))?;

        let mut device = SuperioDevice::new(&chipset, guid, entry, Arc::clone(&self.port));

        // set ID and ports via quirks
        device.apply_quirks(quirks)?;
        device.probe()?;

        if let Some(manufacturer) = self.ctx.baseboard_manufacturer() {
            device.set_vendor_id(&format!("{VENDOR_ID_PREFIX}:{manufacturer}"));
        }

        device.open()?;
        log::info!(
            "found {} ({}) for {guid} on {}",
            chipset,
            device.chip_name(),
            device.physical_id()
        );
        Ok(Some(device))
    }

    fn publish(&self, device: SuperioDevice) -> Result<Arc<SuperioDevice>> {
        let device = Arc::new(device);
        // visible to the lock synchronizer before anyone can see it published
        self.devices.write().push(Arc::clone(&device));

        let entry: Arc<dyn CatalogDevice> = device.clone();
        if let Err(e) = self.catalog.publish(entry) {
            self.devices.write().retain(|d| !Arc::ptr_eq(d, &device));
            return Err(e);
        }
        Ok(device)
    }

    /// Unlock a device of the lockable family.
    ///
    /// Whether unlocking an already unlocked device is an error is up to the
    /// family driver.
    pub fn unlock(&self, device: &SuperioDevice) -> Result<()> {
        let Some(lockable) = device.lockable() else {
            return Err(SuperioError::NotSupported(
                "IT55 is the only kind of SuperIO device that can be unlocked".into(),
            ));
        };
        device.run_unlock(lockable)?;
        log::info!("unlocked {}", device.instance_id());
        Ok(())
    }

    /// Unlock one of this plugin's devices by catalog id.
    pub fn unlock_device_id(&self, id: &str) -> Result<()> {
        let device = self
            .devices
            .read()
            .iter()
            .find(|d| d.instance_id() == id)
            .cloned()
            .ok_or_else(|| SuperioError::NotFound(id.to_string()))?;
        self.unlock(&device)
    }
}

impl CatalogListener for SuperioPlugin {
    fn device_registered(&self, event: &DeviceEvent) {
        // only the ME region of the SPI flash descriptor is interesting
        if event.plugin != INTEL_SPI_PLUGIN {
            return;
        }
        if event.logical_id.as_deref() != Some(IfdRegion::Me.as_str()) {
            return;
        }

        for device in self.devices.read().iter() {
            if device.lockable().is_none() {
                continue;
            }
            device.set_me_locked(event.locked);

            // unlock operation requires device to be locked
            if event.locked {
                device.add_locked_flag();
            }
            log::debug!(
                "{} ME lock state now {}",
                device.instance_id(),
                if event.locked { "locked" } else { "unlocked" }
            );
        }
    }
}
