// Super I/O chip families, the device record and the shared port resource

pub mod chips;
pub mod device;
pub mod ec;
pub mod it55;
pub mod it85;
pub mod it89;
pub mod port;
pub mod registry;

pub use chips::{Capabilities, Lockable, SetupInfo, SuperioDriver};
pub use device::{AutoloadAction, SuperioDevice, SuperioSettings};
pub use port::{DevPort, PortGuard, PortIo, SharedPort};
pub use registry::{DriverConstructor, DriverEntry, DriverRegistry};
