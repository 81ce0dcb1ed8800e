// ITE IT85xx Super I/O with integrated EC

use super::chips::{require_ec_ports, require_set, SetupInfo, SuperioDriver};
use super::device::{AutoloadAction, SuperioSettings};
use super::ec::{verify_chip_id, EcChannel, SIO_CMD_EC_GET_VERSION_STR};
use super::port::PortGuard;
use crate::config::{QUIRK_KEY_ID, QUIRK_KEY_PORT};
use crate::error::Result;

pub struct It85Driver;

impl It85Driver {
    pub fn construct() -> Box<dyn SuperioDriver> {
        Box::new(Self)
    }
}

impl SuperioDriver for It85Driver {
    fn chip_name(&self) -> &str {
        "IT85xx"
    }

    fn probe(&self, settings: &mut SuperioSettings) -> Result<()> {
        require_set(settings.id.into(), QUIRK_KEY_ID)?;
        require_set(settings.port.into(), QUIRK_KEY_PORT)?;
        require_ec_ports(settings)?;
        if settings.autoload_action != AutoloadAction::None {
            log::warn!("IT85 has no autoload control, ignoring {:?}", settings.autoload_action);
            settings.autoload_action = AutoloadAction::None;
        }
        Ok(())
    }

    fn setup(&self, io: &mut PortGuard<'_>, settings: &SuperioSettings) -> Result<SetupInfo> {
        verify_chip_id(io, settings)?;
        let version = EcChannel::new(io, settings).read_string(SIO_CMD_EC_GET_VERSION_STR)?;
        log::info!("IT85 0x{:04X} EC version {version}", settings.id);
        Ok(SetupInfo {
            name: None,
            version: Some(version),
        })
    }
}
