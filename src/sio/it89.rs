// ITE IT89xx Super I/O with integrated EC and flash autoload control

use super::chips::{require_ec_ports, require_set, SetupInfo, SuperioDriver};
use super::device::SuperioSettings;
use super::ec::{verify_chip_id, EcChannel, SIO_CMD_EC_GET_VERSION_STR};
use super::port::PortGuard;
use crate::config::{QUIRK_KEY_ID, QUIRK_KEY_PORT};
use crate::error::Result;

pub struct It89Driver;

impl It89Driver {
    pub fn construct() -> Box<dyn SuperioDriver> {
        Box::new(Self)
    }
}

impl SuperioDriver for It89Driver {
    fn chip_name(&self) -> &str {
        "IT89xx"
    }

    fn probe(&self, settings: &mut SuperioSettings) -> Result<()> {
        require_set(settings.id.into(), QUIRK_KEY_ID)?;
        require_set(settings.port.into(), QUIRK_KEY_PORT)?;
        require_ec_ports(settings)
    }

    fn setup(&self, io: &mut PortGuard<'_>, settings: &SuperioSettings) -> Result<SetupInfo> {
        verify_chip_id(io, settings)?;
        let version = EcChannel::new(io, settings).read_string(SIO_CMD_EC_GET_VERSION_STR)?;
        log::info!(
            "IT89 0x{:04X} EC version {version}, autoload action {:?}",
            settings.id,
            settings.autoload_action
        );
        Ok(SetupInfo {
            name: None,
            version: Some(version),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SuperioError;
    use crate::sio::port::testing::MockPort;
    use crate::sio::port::SharedPort;

    fn settings() -> SuperioSettings {
        SuperioSettings {
            id: 0x8987,
            port: 0x2E,
            control_port: 0x66,
            data_port: 0x62,
            timeout_ms: 5,
            ..SuperioSettings::default()
        }
    }

    #[test]
    fn setup_checks_id_then_reads_version() {
        let mock = MockPort::with_chip_id(0x8987);
        mock.state().queue_ec_string("2.3");
        let port = SharedPort::new("/dev/port", Box::new(mock));
        let mut io = port.acquire().expect("acquire");
        let info = It89Driver.setup(&mut io, &settings()).expect("setup");
        assert_eq!(info.version.as_deref(), Some("2.3"));
    }

    #[test]
    fn setup_rejects_wrong_chip() {
        let mock = MockPort::with_chip_id(0x5570);
        let port = SharedPort::new("/dev/port", Box::new(mock.clone()));
        let mut io = port.acquire().expect("acquire");
        assert!(matches!(It89Driver.setup(&mut io, &settings()), Err(SuperioError::Probe(_))));
        drop(io);
        // the EC was never addressed
        assert!(mock.state().writes.iter().all(|&(p, _)| p == 0x2E || p == 0x2F));
    }
}
