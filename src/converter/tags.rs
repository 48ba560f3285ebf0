//! Device identity tags
//!
//! The closed set of device fields that can be attached to every metric of a device
//! as `name:value` tags.

use crate::smartctl::DeviceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceTag {
    DeviceName,
    DeviceType,
    DeviceProtocol,
    ModelFamily,
    ModelName,
    SerialNumber,
    FirmwareVersion,
}

impl DeviceTag {
    /// All supported tags, in emission order
    pub const ALL: [DeviceTag; 7] = [
        DeviceTag::DeviceName,
        DeviceTag::DeviceType,
        DeviceTag::DeviceProtocol,
        DeviceTag::ModelFamily,
        DeviceTag::ModelName,
        DeviceTag::SerialNumber,
        DeviceTag::FirmwareVersion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeviceTag::DeviceName => "device_name",
            DeviceTag::DeviceType => "device_type",
            DeviceTag::DeviceProtocol => "device_protocol",
            DeviceTag::ModelFamily => "model_family",
            DeviceTag::ModelName => "model_name",
            DeviceTag::SerialNumber => "serial_number",
            DeviceTag::FirmwareVersion => "firmware_version",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.name() == name)
    }

    pub fn value(self, device: &DeviceInfo) -> &str {
        match self {
            DeviceTag::DeviceName => &device.name,
            DeviceTag::DeviceType => &device.device_type,
            DeviceTag::DeviceProtocol => device.protocol.as_str(),
            DeviceTag::ModelFamily => &device.model_family,
            DeviceTag::ModelName => &device.model_name,
            DeviceTag::SerialNumber => &device.serial_number,
            DeviceTag::FirmwareVersion => &device.firmware_version,
        }
    }
}

/// Requested tag names that are not supported, sorted and deduplicated
pub fn unknown_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut unknown: Vec<String> = tags
        .iter()
        .map(AsRef::as_ref)
        .filter(|tag| DeviceTag::from_name(tag).is_none())
        .map(str::to_string)
        .collect();
    unknown.sort();
    unknown.dedup();
    unknown
}
