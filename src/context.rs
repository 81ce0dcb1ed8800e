//! Platform context handed to every device: hardware ids, quirks and the
//! kernel lockdown policy.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{QuirkStore, SuperioOptions};

/// Hardware identity of the running machine.
///
/// Computing the GUIDs from SMBIOS is someone else's job; this only carries
/// the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HwIds {
    /// HWID GUIDs in priority order
    pub guids: Vec<String>,
    /// SMBIOS baseboard manufacturer, if reported
    pub baseboard_manufacturer: Option<String>,
}

impl HwIds {
    pub fn new<I, S>(guids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            guids: guids.into_iter().map(Into::into).collect(),
            baseboard_manufacturer: None,
        }
    }

    #[must_use]
    pub fn with_baseboard_manufacturer(mut self, manufacturer: &str) -> Self {
        self.baseboard_manufacturer = Some(manufacturer.to_string());
        self
    }
}

/// Reports whether the OS restricts raw hardware access.
pub trait PlatformLockdown: Send + Sync {
    fn is_locked_down(&self) -> bool;
}

/// Linux kernel lockdown as reported by securityfs.
///
/// The file lists every mode with the active one bracketed, e.g.
/// `none [integrity] confidentiality`.
pub struct KernelLockdown {
    path: PathBuf,
}

impl KernelLockdown {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl Default for KernelLockdown {
    fn default() -> Self {
        Self::new(Path::new("/sys/kernel/security/lockdown"))
    }
}

impl PlatformLockdown for KernelLockdown {
    fn is_locked_down(&self) -> bool {
        match fs::read_to_string(&self.path) {
            Ok(contents) => !contents.contains("[none]"),
            Err(e) => {
                log::debug!("cannot read {}: {e}", self.path.display());
                false
            }
        }
    }
}

impl PlatformLockdown for bool {
    fn is_locked_down(&self) -> bool {
        *self
    }
}

/// Shared, read-only view of the platform.
pub struct Context {
    quirks: Arc<QuirkStore>,
    hwids: HwIds,
    lockdown: Box<dyn PlatformLockdown>,
}

impl Context {
    pub fn new(quirks: Arc<QuirkStore>, hwids: HwIds, lockdown: Box<dyn PlatformLockdown>) -> Self {
        Self {
            quirks,
            hwids,
            lockdown,
        }
    }

    /// Context using the kernel lockdown file named in `options`.
    pub fn from_options(quirks: Arc<QuirkStore>, hwids: HwIds, options: &SuperioOptions) -> Self {
        Self::new(quirks, hwids, Box::new(KernelLockdown::new(&options.lockdown_file)))
    }

    pub fn quirks(&self) -> &QuirkStore {
        &self.quirks
    }

    pub fn hwid_guids(&self) -> &[String] {
        &self.hwids.guids
    }

    /// Baseboard manufacturer, treating an empty value as absent.
    pub fn baseboard_manufacturer(&self) -> Option<&str> {
        self.hwids
            .baseboard_manufacturer
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_locked_down(&self) -> bool {
        self.lockdown.is_locked_down()
    }
}
