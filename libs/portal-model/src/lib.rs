//! Portal Model Library
//!
//! Domain types shared by the registry client and the sync service:
//!
//! - `twin`: device twins and pages returned by the remote registry
//! - `entities`: rows mirrored into the local database
//! - `planning`: layers, plannings and schedules for downlink commands

pub mod entities;
pub mod planning;
pub mod twin;

// Re-exports for convenience
pub use entities::{
    Concentrator, Device, DeviceKind, DeviceModel, DeviceModelCommand, DeviceTagValue, EdgeDevice,
    EdgeDeviceModel, LorawanDevice, LorawanSettings, Versioned,
};
pub use planning::{due_commands, effective_planning, DaysOff, Layer, Planning, Schedule, TimeOfDay};
pub use twin::{ConnectionState, DeviceTwin, TwinPage, TwinStatus};
