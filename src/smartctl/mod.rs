//! smartctl Integration
//!
//! - [`command`] - Child process execution, timeout and error classification
//! - [`data`] - JSON extraction into the normalized [`Data`] model

pub mod command;
pub mod data;

pub use command::SmartctlCommand;
pub use data::{AttributeCategory, AttributeMap, Data, DeviceInfo, Protocol, Telemetry};
