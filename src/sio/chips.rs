// Super I/O chip family driver interface and capability flags

use bitflags::bitflags;
use serde::Serialize;

use super::device::SuperioSettings;
use super::port::PortGuard;
use crate::error::{Result, SuperioError};

bitflags! {
    /// What a chipset family driver can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Settings are taken from quirks keyed by instance id
        const CONFIGURABLE = 1 << 0;
        /// Settings can be validated before touching hardware
        const PROBEABLE = 1 << 1;
        /// Hardware is reachable through the shared port resource
        const ACQUIRABLE = 1 << 2;
        /// Access to the ME region is vendor locked and can be unlocked
        const LOCKABLE = 1 << 3;

        const BASE = Self::CONFIGURABLE.bits() | Self::PROBEABLE.bits() | Self::ACQUIRABLE.bits();
    }
}

/// Values read back from the chip while it is acquired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetupInfo {
    /// Name reported by the EC firmware
    pub name: Option<String>,
    /// EC firmware version
    pub version: Option<String>,
}

/// One chipset family.
///
/// Each family (IT55, IT85, IT89) implements this trait; the register level
/// protocol stays behind it.
pub trait SuperioDriver: Send + Sync {
    /// Human readable chip name.
    fn chip_name(&self) -> &str;

    /// Validate and complete the quirk-derived settings. Must not touch
    /// hardware.
    fn probe(&self, settings: &mut SuperioSettings) -> Result<()>;

    /// Verify the chip answers as expected while the port is held.
    fn setup(&self, io: &mut PortGuard<'_>, settings: &SuperioSettings) -> Result<SetupInfo>;

    /// The unlock hook, for families that lock the ME region.
    fn lockable(&self) -> Option<&dyn Lockable> {
        None
    }
}

/// Families whose EC gates ME region access.
pub trait Lockable: Send + Sync {
    /// Run the chip-specific unlock sequence.
    ///
    /// `me_locked` is the last ME lock state seen for this device.
    fn unlock(&self, io: &mut PortGuard<'_>, settings: &SuperioSettings, me_locked: bool) -> Result<()>;
}

/// Fail probe when a required quirk was not provided.
pub(crate) fn require_set(value: u64, key: &str) -> Result<()> {
    if value == 0 {
        return Err(SuperioError::Probe(format!("{key} not set")));
    }
    Ok(())
}

/// Checks shared by every family that talks to the EC.
pub(crate) fn require_ec_ports(settings: &SuperioSettings) -> Result<()> {
    require_set(settings.control_port.into(), crate::config::QUIRK_KEY_CONTROL_PORT)?;
    require_set(settings.data_port.into(), crate::config::QUIRK_KEY_DATA_PORT)?;
    if settings.control_port == settings.data_port {
        return Err(SuperioError::Probe(format!(
            "control and data port are both 0x{:02X}",
            settings.control_port
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_capabilities() {
        assert!(Capabilities::BASE.contains(Capabilities::PROBEABLE | Capabilities::ACQUIRABLE));
        assert!(!Capabilities::BASE.contains(Capabilities::LOCKABLE));
    }

    #[test]
    fn ec_ports_must_differ() {
        let s = SuperioSettings {
            control_port: 0x66,
            data_port: 0x66,
            ..SuperioSettings::default()
        };
        assert!(matches!(require_ec_ports(&s), Err(SuperioError::Probe(_))));

        let s = SuperioSettings {
            control_port: 0x66,
            data_port: 0,
            ..SuperioSettings::default()
        };
        assert!(matches!(require_ec_ports(&s), Err(SuperioError::Probe(ref m)) if m.contains("SuperioDataPort")));
    }
}
