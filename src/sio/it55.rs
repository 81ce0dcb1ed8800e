// ITE IT5570 embedded controller
//
// The EC is reached only through its control/data port pair; there is no SIO
// configuration space to check. Firmware on these boards refuses to let the
// ME region be written until the EC has been asked to release it.

use super::chips::{require_ec_ports, Lockable, SetupInfo, SuperioDriver};
use super::device::SuperioSettings;
use super::ec::{EcChannel, SIO_CMD_EC_GET_NAME_STR, SIO_CMD_EC_GET_VERSION_STR};
use super::port::PortGuard;
use crate::error::Result;

/// ACPI EC "write EC RAM" command
const EC_CMD_WRITE_RAM: u8 = 0x81;
/// EC RAM byte holding the ME unlock request
const IT55_RAM_ME_UNLOCK: u8 = 0xE0;
const IT55_ME_UNLOCK_REQUEST: u8 = 0x01;

pub struct It55Driver;

impl It55Driver {
    pub fn construct() -> Box<dyn SuperioDriver> {
        Box::new(Self)
    }
}

impl SuperioDriver for It55Driver {
    fn chip_name(&self) -> &str {
        "IT5570"
    }

    fn probe(&self, settings: &mut SuperioSettings) -> Result<()> {
        require_ec_ports(settings)
    }

    fn setup(&self, io: &mut PortGuard<'_>, settings: &SuperioSettings) -> Result<SetupInfo> {
        let mut ec = EcChannel::new(io, settings);
        let name = ec.read_string(SIO_CMD_EC_GET_NAME_STR)?;
        let version = ec.read_string(SIO_CMD_EC_GET_VERSION_STR)?;
        log::info!("IT55 EC {name} version {version}");
        Ok(SetupInfo {
            name: Some(name),
            version: Some(version),
        })
    }

    fn lockable(&self) -> Option<&dyn Lockable> {
        Some(self)
    }
}

impl Lockable for It55Driver {
    fn unlock(&self, io: &mut PortGuard<'_>, settings: &SuperioSettings, me_locked: bool) -> Result<()> {
        if !me_locked {
            log::debug!("ME region not reported locked, nothing to request from the EC");
            return Ok(());
        }

        let mut ec = EcChannel::new(io, settings);
        ec.write_cmd(EC_CMD_WRITE_RAM)?;
        ec.write_data(IT55_RAM_ME_UNLOCK)?;
        ec.write_data(IT55_ME_UNLOCK_REQUEST)?;
        log::info!("requested ME region unlock from IT55 EC");
        Ok(())
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
            control_port: 0x66,
            data_port: 0x62,
            timeout_ms: 5,
            ..SuperioSettings::default()
        }
    }

    #[test]
    fn probe_needs_ec_ports() {
        let mut s = SuperioSettings::default();
        assert!(matches!(It55Driver.probe(&mut s), Err(SuperioError::Probe(_))));
        assert!(It55Driver.probe(&mut settings()).is_ok());
    }

    #[test]
    fn unlock_writes_request_when_locked() {
        let mock = MockPort::default();
        let port = SharedPort::new("/dev/port", Box::new(mock.clone()));
        let mut io = port.acquire().expect("acquire");
        It55Driver.unlock(&mut io, &settings(), true).expect("unlock");
        drop(io);
        assert_eq!(
            mock.state().writes,
            vec![(0x66, EC_CMD_WRITE_RAM), (0x62, IT55_RAM_ME_UNLOCK), (0x62, IT55_ME_UNLOCK_REQUEST)]
        );
    }

    #[test]
    fn unlock_when_not_locked_is_quiet() {
        let mock = MockPort::default();
        let port = SharedPort::new("/dev/port", Box::new(mock.clone()));
        let mut io = port.acquire().expect("acquire");
        It55Driver.unlock(&mut io, &settings(), false).expect("unlock");
        drop(io);
        assert!(mock.state().writes.is_empty());
    }

    #[test]
    fn unlock_propagates_ec_timeout() {
        let mock = MockPort::default();
        mock.state().ec_status = crate::sio::ec::SIO_STATUS_EC_IBF;
        let port = SharedPort::new("/dev/port", Box::new(mock));
        let mut io = port.acquire().expect("acquire");
        assert!(matches!(
            It55Driver.unlock(&mut io, &settings(), true),
            Err(SuperioError::Timeout(_))
        ));
    }
}
