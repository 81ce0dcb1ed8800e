// Chipset family name -> driver constructor
//
// Filled once when the plugin initializes and read-only afterwards.

use std::collections::HashMap;

use super::chips::{Capabilities, SuperioDriver};
use super::it55::It55Driver;
use super::it85::It85Driver;
use super::it89::It89Driver;
use crate::error::{Result, SuperioError};

/// Builds a fresh driver instance for one device.
pub type DriverConstructor = fn() -> Box<dyn SuperioDriver>;

#[derive(Clone, Copy)]
pub struct DriverEntry {
    pub construct: DriverConstructor,
    pub capabilities: Capabilities,
}

#[derive(Default)]
pub struct DriverRegistry {
    entries: HashMap<String, DriverEntry>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the IT55, IT85 and IT89 families.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(
            "IT55",
            It55Driver::construct,
            Capabilities::BASE | Capabilities::LOCKABLE,
        )?;
        registry.register("IT85", It85Driver::construct, Capabilities::BASE)?;
        registry.register("IT89", It89Driver::construct, Capabilities::BASE)?;
        Ok(registry)
    }

    /// Add a family; a name may only be registered once.
    pub fn register(
        &mut self,
        family: &str,
        construct: DriverConstructor,
        capabilities: Capabilities,
    ) -> Result<()> {
        if self.entries.contains_key(family) {
            return Err(SuperioError::DuplicateFamily(family.to_string()));
        }
        let _ = self.entries.insert(
            family.to_string(),
            DriverEntry {
                construct,
                capabilities,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, family: &str) -> Option<&DriverEntry> {
        self.entries.get(family)
    }

    /// Registered family names, sorted.
    pub fn families(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
