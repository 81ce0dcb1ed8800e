use serde::Serialize;
use thiserror::Error;

/// Unified error type for Super I/O operations.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum SuperioError {
    /// The quirk store names a family that has no compiled-in driver.
    #[error("SuperIO chipset {0} unsupported")]
    UnsupportedChipset(String),

    /// The hardware (or its settings) did not look like the declared chip.
    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Port resource {0} is busy")]
    ResourceBusy(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not supported when kernel locked down")]
    PlatformRestricted,

    #[error("Invalid quirk {key} for {id}: {reason}")]
    InvalidQuirk {
        id: String,
        key: String,
        reason: String,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Driver for {0} already registered")]
    DuplicateFamily(String),

    #[error("Device {0} already published")]
    AlreadyPublished(String),

    #[error("Device {0} not found")]
    NotFound(String),
}

impl SuperioError {
    /// Whether the operation was refused rather than attempted.
    ///
    /// Lockdown is reported as its own variant but callers treat it the same
    /// way as an unsupported request.
    pub const fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_) | Self::PlatformRestricted)
    }
}

/// Convenience Result type alias with `SuperioError`.
pub type Result<T> = std::result::Result<T, SuperioError>;

impl From<std::io::Error> for SuperioError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<SuperioError> for String {
    fn from(err: SuperioError) -> Self {
        err.to_string()
    }
}
