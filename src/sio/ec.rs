// ITE configuration space and EC command channel helpers
//
// Configuration space is reached through the SIO index/data pair (0x2E/0x2F or
// 0x4E/0x4F). The EC itself is driven through its control/data port pair using
// the ACPI-style IBF/OBF handshake.

use std::thread;
use std::time::{Duration, Instant};

use super::device::SuperioSettings;
use super::port::PortGuard;
use crate::error::{Result, SuperioError};

/// EC status: output buffer full
pub const SIO_STATUS_EC_OBF: u8 = 0x01;
/// EC status: input buffer full
pub const SIO_STATUS_EC_IBF: u8 = 0x02;

pub const SIO_CMD_EC_GET_NAME_STR: u8 = 0x92;
pub const SIO_CMD_EC_GET_VERSION_STR: u8 = 0x93;

/// Chip ID registers in configuration space
const SIO_REG_CHIP_ID_HIGH: u8 = 0x20;
const SIO_REG_CHIP_ID_LOW: u8 = 0x21;
const SIO_REG_CONFIG_CONTROL: u8 = 0x02;

/// Longest string an EC is expected to return
const EC_STRING_MAX: usize = 0x100;

const EC_POLL_INTERVAL: Duration = Duration::from_micros(10);

/// ITE configuration space behind the SIO index port.
pub struct ConfigSpace<'g, 'a> {
    io: &'g mut PortGuard<'a>,
    port: u16,
}

impl<'g, 'a> ConfigSpace<'g, 'a> {
    /// Enter configuration mode; the key sequence depends on the index port.
    pub fn enter(io: &'g mut PortGuard<'a>, port: u16) -> Result<Self> {
        let key_sequence: &[u8] = if port == 0x2E {
            &[0x87, 0x01, 0x55, 0x55]
        } else {
            &[0x87, 0x01, 0x55, 0xAA]
        };
        for &byte in key_sequence {
            io.write_byte(port, byte)?;
        }
        Ok(Self { io, port })
    }

    pub fn read_reg(&mut self, reg: u8) -> Result<u8> {
        self.io.write_byte(self.port, reg)?;
        self.io.read_byte(self.port + 1)
    }

    pub fn chip_id(&mut self) -> Result<u16> {
        let high = self.read_reg(SIO_REG_CHIP_ID_HIGH)?;
        let low = self.read_reg(SIO_REG_CHIP_ID_LOW)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Leave configuration mode.
    pub fn exit(self) -> Result<()> {
        self.io.write_byte(self.port, SIO_REG_CONFIG_CONTROL)?;
        self.io.write_byte(self.port + 1, 0x02)
    }
}

/// Read the chip ID from configuration space and compare it to `SuperioId`.
pub fn verify_chip_id(io: &mut PortGuard<'_>, settings: &SuperioSettings) -> Result<()> {
    let mut cfg = ConfigSpace::enter(io, settings.port)?;
    let id = cfg.chip_id();
    // leave configuration mode even when the read failed
    let exited = cfg.exit();
    let id = id?;
    exited?;

    if id != settings.id {
        return Err(SuperioError::Probe(format!(
            "SuperIO chip ID 0x{id:04X} did not match expected 0x{:04X} at port 0x{:02X}",
            settings.id, settings.port
        )));
    }
    log::debug!("SuperIO chip ID 0x{id:04X} at port 0x{:02X}", settings.port);
    Ok(())
}

/// EC command channel over the control/data port pair.
pub struct EcChannel<'g, 'a> {
    io: &'g mut PortGuard<'a>,
    control_port: u16,
    data_port: u16,
    timeout: Duration,
}

impl<'g, 'a> EcChannel<'g, 'a> {
    pub fn new(io: &'g mut PortGuard<'a>, settings: &SuperioSettings) -> Self {
        Self {
            io,
            control_port: settings.control_port,
            data_port: settings.data_port,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }

    fn wait_for(&mut self, mask: u8, set: bool) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let status = self.io.read_byte(self.control_port)?;
            if (status & mask != 0) == set {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SuperioError::Timeout(format!(
                    "EC status 0x{status:02X} waiting for mask 0x{mask:02X} to be {}",
                    if set { "set" } else { "clear" }
                )));
            }
            thread::sleep(EC_POLL_INTERVAL);
        }
    }

    pub fn write_cmd(&mut self, cmd: u8) -> Result<()> {
        self.wait_for(SIO_STATUS_EC_IBF, false)?;
        self.io.write_byte(self.control_port, cmd)
    }

    pub fn write_data(&mut self, data: u8) -> Result<()> {
        self.wait_for(SIO_STATUS_EC_IBF, false)?;
        self.io.write_byte(self.data_port, data)
    }

    pub fn read_data(&mut self) -> Result<u8> {
        self.wait_for(SIO_STATUS_EC_OBF, true)?;
        self.io.read_byte(self.data_port)
    }

    /// Issue `cmd` and collect the reply up to a `$` or NUL terminator.
    pub fn read_string(&mut self, cmd: u8) -> Result<String> {
        self.write_cmd(cmd)?;
        let mut bytes = Vec::new();
        for _ in 0..EC_STRING_MAX {
            let byte = self.read_data()?;
            if byte == b'$' || byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
