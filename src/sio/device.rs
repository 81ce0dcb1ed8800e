// Super I/O device record: identity, quirk-derived settings and lock state

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::chips::{Capabilities, Lockable, SuperioDriver};
use super::port::SharedPort;
use super::registry::DriverEntry;
use crate::catalog::CatalogDevice;
use crate::config::{
    QuirkStore, QUIRK_KEY_AUTOLOAD_ACTION, QUIRK_KEY_CONTROL_PORT, QUIRK_KEY_DATA_PORT,
    QUIRK_KEY_ID, QUIRK_KEY_PORT, QUIRK_KEY_TIMEOUT,
};
use crate::error::{Result, SuperioError};

/// Owning plugin name written into every published record.
pub const PLUGIN_NAME: &str = "superio";

/// Instance id prefix, also the quirk namespace for device settings.
pub const INSTANCE_ID_PREFIX: &str = "SUPERIO";

/// EC wait timeout used when `SuperioTimeout` is not set, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 250;

/// What the EC should do with the flash autoload bit after an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoloadAction {
    #[default]
    None,
    NoChange,
    Off,
    On,
}

impl FromStr for AutoloadAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "no-change" => Ok(Self::NoChange),
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            other => Err(format!("unknown autoload action {other}")),
        }
    }
}

/// Settings taken from quirks; authoritative once probe has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuperioSettings {
    /// Expected chip ID in configuration space
    pub id: u16,
    /// SIO configuration index port (0x2E or 0x4E)
    pub port: u16,
    /// EC command/status port
    pub control_port: u16,
    /// EC data port
    pub data_port: u16,
    /// EC handshake timeout in milliseconds
    pub timeout_ms: u64,
    pub autoload_action: AutoloadAction,
}

impl Default for SuperioSettings {
    fn default() -> Self {
        Self {
            id: 0,
            port: 0,
            control_port: 0,
            data_port: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            autoload_action: AutoloadAction::None,
        }
    }
}

/// Build the instance id used as the quirk key for a device, e.g.
/// `SUPERIO\GUID_<guid>`.
pub fn build_instance_id(guid: &str) -> String {
    format!("{INSTANCE_ID_PREFIX}\\GUID_{guid}")
}

#[derive(Debug, Default)]
struct DeviceState {
    /// Lock state of the ME region as last reported
    me_locked: bool,
    /// Operations needing an unlocked device are refused while set
    locked: bool,
    name: Option<String>,
    version: Option<String>,
}

/// One Super I/O / EC chip instance.
pub struct SuperioDevice {
    chipset: String,
    guid: String,
    instance_id: String,
    vendor_id: Option<String>,
    settings: SuperioSettings,
    capabilities: Capabilities,
    driver: Box<dyn SuperioDriver>,
    port: Arc<SharedPort>,
    state: RwLock<DeviceState>,
}

impl SuperioDevice {
    /// Construct an unconfigured record for `chipset` bound to `guid`.
    pub fn new(chipset: &str, guid: &str, entry: &DriverEntry, port: Arc<SharedPort>) -> Self {
        Self {
            chipset: chipset.to_string(),
            guid: guid.to_string(),
            instance_id: build_instance_id(guid),
            vendor_id: None,
            settings: SuperioSettings::default(),
            capabilities: entry.capabilities,
            driver: (entry.construct)(),
            port,
            state: RwLock::new(DeviceState::default()),
        }
    }

    pub fn chipset(&self) -> &str {
        &self.chipset
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn vendor_id(&self) -> Option<&str> {
        self.vendor_id.as_deref()
    }

    pub fn set_vendor_id(&mut self, vendor_id: &str) {
        self.vendor_id = Some(vendor_id.to_string());
    }

    pub fn physical_id(&self) -> &str {
        self.port.name()
    }

    pub fn settings(&self) -> &SuperioSettings {
        &self.settings
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn chip_name(&self) -> &str {
        self.driver.chip_name()
    }

    pub fn name(&self) -> Option<String> {
        self.state.read().name.clone()
    }

    pub fn version(&self) -> Option<String> {
        self.state.read().version.clone()
    }

    /// Apply the quirks stored under this device's instance id.
    pub fn apply_quirks(&mut self, quirks: &QuirkStore) -> Result<()> {
        let id = self.instance_id.as_str();
        let s = &mut self.settings;

        if let Some(v) = quirks.lookup_u64(id, QUIRK_KEY_ID, u16::MAX.into())? {
            s.id = narrow(v);
        }
        if let Some(v) = quirks.lookup_u64(id, QUIRK_KEY_PORT, u16::MAX.into())? {
            s.port = narrow(v);
        }
        if let Some(v) = quirks.lookup_u64(id, QUIRK_KEY_CONTROL_PORT, u16::MAX.into())? {
            s.control_port = narrow(v);
        }
        if let Some(v) = quirks.lookup_u64(id, QUIRK_KEY_DATA_PORT, u16::MAX.into())? {
            s.data_port = narrow(v);
        }
        if let Some(v) = quirks.lookup_u64(id, QUIRK_KEY_TIMEOUT, u64::from(u32::MAX))? {
            s.timeout_ms = v;
        }
        if let Some(v) = quirks.lookup(id, QUIRK_KEY_AUTOLOAD_ACTION) {
            s.autoload_action = v.parse().map_err(|reason| SuperioError::InvalidQuirk {
                id: id.to_string(),
                key: QUIRK_KEY_AUTOLOAD_ACTION.to_string(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Validate the settings without touching hardware.
    pub fn probe(&mut self) -> Result<()> {
        self.driver.probe(&mut self.settings)?;
        log::debug!(
            "probed {} ({}) for {}: {:?}",
            self.chipset,
            self.driver.chip_name(),
            self.guid,
            self.settings
        );
        Ok(())
    }

    /// Acquire the port and run the family setup; the port is released on
    /// return whatever the outcome.
    pub fn open(&self) -> Result<()> {
        let mut io = self.port.acquire()?;
        let info = self.driver.setup(&mut io, &self.settings)?;
        drop(io);

        let mut state = self.state.write();
        if info.name.is_some() {
            state.name = info.name;
        }
        if info.version.is_some() {
            state.version = info.version;
        }
        Ok(())
    }

    /// The unlock hook of this device's family, if it has one.
    pub fn lockable(&self) -> Option<&dyn Lockable> {
        self.driver.lockable()
    }

    pub fn me_locked(&self) -> bool {
        self.state.read().me_locked
    }

    pub fn set_me_locked(&self, me_locked: bool) {
        self.state.write().me_locked = me_locked;
    }

    pub fn is_locked(&self) -> bool {
        self.state.read().locked
    }

    /// Mark the device locked until a successful unlock.
    pub fn add_locked_flag(&self) {
        self.state.write().locked = true;
    }

    /// Run `lockable` against this device and clear the lock state on success.
    pub(crate) fn run_unlock(&self, lockable: &dyn Lockable) -> Result<()> {
        let me_locked = self.me_locked();
        let mut io = self.port.acquire()?;
        lockable.unlock(&mut io, &self.settings, me_locked)?;
        drop(io);

        let mut state = self.state.write();
        state.me_locked = false;
        state.locked = false;
        Ok(())
    }
}

impl CatalogDevice for SuperioDevice {
    fn id(&self) -> &str {
        &self.instance_id
    }

    fn plugin(&self) -> &str {
        PLUGIN_NAME
    }

    fn logical_id(&self) -> Option<&str> {
        Some(&self.chipset)
    }

    fn is_locked(&self) -> bool {
        self.state.read().locked
    }
}

/// Values were range checked against `u16::MAX` by the quirk lookup.
#[allow(clippy::cast_possible_truncation)]
const fn narrow(v: u64) -> u16 {
    v as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QUIRK_KEYS;
    use crate::sio::port::testing::MockPort;
    use crate::sio::registry::DriverRegistry;

    fn quirks(json: &str) -> QuirkStore {
        let store = QuirkStore::from_json(json).expect("quirks");
        for key in QUIRK_KEYS {
            store.add_key(key);
        }
        store
    }

    fn device(chipset: &str, mock: &MockPort) -> SuperioDevice {
        let registry = DriverRegistry::builtin().expect("registry");
        let entry = registry.lookup(chipset).expect("entry");
        let port = Arc::new(SharedPort::new("/dev/port", Box::new(mock.clone())));
        SuperioDevice::new(chipset, "GUID-B", entry, port)
    }

    #[test]
    fn instance_id_is_deterministic() {
        assert_eq!(build_instance_id("GUID-B"), "SUPERIO\\GUID_GUID-B");
        let mock = MockPort::default();
        assert_eq!(device("IT55", &mock).instance_id(), build_instance_id("GUID-B"));
    }

    #[test]
    fn quirks_fill_settings() {
        let mock = MockPort::default();
        let mut dev = device("IT89", &mock);
        let store = quirks(
            r#"{ "SUPERIO\\GUID_GUID-B": {
                "SuperioId": "0x8987", "SuperioPort": "0x2E",
                "SuperioControlPort": "0x66", "SuperioDataPort": "0x62",
                "SuperioTimeout": "1000", "SuperioAutoloadAction": "no-change"
            } }"#,
        );
        dev.apply_quirks(&store).expect("quirks");
        assert_eq!(
            dev.settings(),
            &SuperioSettings {
                id: 0x8987,
                port: 0x2E,
                control_port: 0x66,
                data_port: 0x62,
                timeout_ms: 1000,
                autoload_action: AutoloadAction::NoChange,
            }
        );
    }

    #[test]
    fn no_quirks_keeps_defaults() {
        let mock = MockPort::default();
        let mut dev = device("IT89", &mock);
        dev.apply_quirks(&quirks("{}")).expect("quirks");
        assert_eq!(dev.settings(), &SuperioSettings::default());
    }

    #[test]
    fn malformed_autoload_action() {
        let mock = MockPort::default();
        let mut dev = device("IT89", &mock);
        let store = quirks(r#"{ "SUPERIO\\GUID_GUID-B": { "SuperioAutoloadAction": "sometimes" } }"#);
        assert!(matches!(
            dev.apply_quirks(&store),
            Err(SuperioError::InvalidQuirk { ref key, .. }) if key == "SuperioAutoloadAction"
        ));
    }

    #[test]
    fn open_records_ec_version_and_releases_port() {
        let mock = MockPort::default();
        {
            let mut st = mock.state();
            st.queue_ec_string("IT5570");
            st.queue_ec_string("1.07.02");
        }
        let mut dev = device("IT55", &mock);
        dev.apply_quirks(&quirks(
            r#"{ "SUPERIO\\GUID_GUID-B": { "SuperioControlPort": "0x66", "SuperioDataPort": "0x62" } }"#,
        ))
        .expect("quirks");
        dev.probe().expect("probe");
        dev.open().expect("open");

        assert_eq!(dev.name().as_deref(), Some("IT5570"));
        assert_eq!(dev.version().as_deref(), Some("1.07.02"));
        assert!(!dev.port.is_busy());
    }

    #[test]
    fn failed_open_releases_port() {
        let mock = MockPort::with_chip_id(0x1234);
        let mut dev = device("IT89", &mock);
        dev.apply_quirks(&quirks(
            r#"{ "SUPERIO\\GUID_GUID-B": {
                "SuperioId": "0x8987", "SuperioPort": "0x2E",
                "SuperioControlPort": "0x66", "SuperioDataPort": "0x62" } }"#,
        ))
        .expect("quirks");
        dev.probe().expect("probe");
        assert!(matches!(dev.open(), Err(SuperioError::Probe(_))));
        assert!(dev.port.acquire().is_ok());
    }

    #[test]
    fn lock_flags_default_unlocked() {
        let mock = MockPort::default();
        let dev = device("IT55", &mock);
        assert!(!dev.me_locked());
        assert!(!dev.is_locked());
        assert_eq!(CatalogDevice::plugin(&dev), PLUGIN_NAME);
        assert_eq!(CatalogDevice::logical_id(&dev), Some("IT55"));
    }

    #[test]
    fn autoload_action_parse() {
        assert_eq!("on".parse::<AutoloadAction>(), Ok(AutoloadAction::On));
        assert_eq!("off".parse::<AutoloadAction>(), Ok(AutoloadAction::Off));
        assert!("maybe".parse::<AutoloadAction>().is_err());
    }
}
