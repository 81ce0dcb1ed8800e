// Direct port I/O and the exclusive, scoped access to it
//
// Every hardware access goes through a `PortGuard`. Holding the guard is the
// only way to read or write a port, and dropping it releases the resource.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Result, SuperioError};

/// Byte-wide port access primitives.
pub trait PortIo: Send {
    /// Read one byte from an I/O port.
    fn read_byte(&mut self, port: u16) -> Result<u8>;

    /// Write one byte to an I/O port.
    fn write_byte(&mut self, port: u16, value: u8) -> Result<()>;
}

/// Port access through the `/dev/port` character device.
///
/// The file offset is the port number. The device is opened on first use so
/// that merely constructing a handle never touches the host.
pub struct DevPort {
    path: PathBuf,
    file: Option<File>,
}

impl DevPort {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn file(&mut self) -> Result<&File> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)
                .map_err(|e| SuperioError::Io(format!("Failed to open {}: {e}", self.path.display())))?;
            log::debug!("opened {}", self.path.display());
            self.file = Some(file);
        }
        self.file
            .as_ref()
            .ok_or_else(|| SuperioError::Io(format!("{} is not open", self.path.display())))
    }
}

#[cfg(unix)]
impl PortIo for DevPort {
    fn read_byte(&mut self, port: u16) -> Result<u8> {
        use std::os::unix::fs::FileExt;

        let mut buf = [0u8; 1];
        self.file()?
            .read_exact_at(&mut buf, u64::from(port))
            .map_err(|e| SuperioError::Io(format!("Failed to read port 0x{port:04X}: {e}")))?;
        Ok(buf[0])
    }

    fn write_byte(&mut self, port: u16, value: u8) -> Result<()> {
        use std::os::unix::fs::FileExt;

        self.file()?
            .write_all_at(&[value], u64::from(port))
            .map_err(|e| SuperioError::Io(format!("Failed to write port 0x{port:04X}: {e}")))
    }
}

#[cfg(not(unix))]
impl PortIo for DevPort {
    fn read_byte(&mut self, _port: u16) -> Result<u8> {
        Err(SuperioError::NotSupported(format!(
            "{} is only available on unix hosts",
            self.path.display()
        )))
    }

    fn write_byte(&mut self, _port: u16, _value: u8) -> Result<()> {
        Err(SuperioError::NotSupported(format!(
            "{} is only available on unix hosts",
            self.path.display()
        )))
    }
}

/// The single shared port resource.
///
/// At most one [`PortGuard`] exists at a time; a second [`SharedPort::acquire`]
/// fails fast with [`SuperioError::ResourceBusy`] instead of blocking.
pub struct SharedPort {
    name: String,
    io: Mutex<Box<dyn PortIo>>,
}

impl SharedPort {
    pub fn new(name: &str, io: Box<dyn PortIo>) -> Self {
        Self {
            name: name.to_string(),
            io: Mutex::new(io),
        }
    }

    /// Shared resource backed by a port character device such as `/dev/port`.
    pub fn open(path: &Path) -> Self {
        Self::new(&path.display().to_string(), Box::new(DevPort::new(path)))
    }

    /// Resource path, also used as the device physical id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take exclusive access until the returned guard is dropped.
    pub fn acquire(&self) -> Result<PortGuard<'_>> {
        let io = self
            .io
            .try_lock()
            .ok_or_else(|| SuperioError::ResourceBusy(self.name.clone()))?;
        log::trace!("acquired {}", self.name);
        Ok(PortGuard {
            io,
            name: &self.name,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.io.is_locked()
    }
}

/// Scoped access to a [`SharedPort`].
pub struct PortGuard<'a> {
    io: MutexGuard<'a, Box<dyn PortIo>>,
    name: &'a str,
}

impl PortGuard<'_> {
    pub fn read_byte(&mut self, port: u16) -> Result<u8> {
        self.io.read_byte(port)
    }

    pub fn write_byte(&mut self, port: u16, value: u8) -> Result<()> {
        self.io.write_byte(port, value)
    }
}

impl Drop for PortGuard<'_> {
    fn drop(&mut self) {
        log::trace!("released {}", self.name);
    }
}
