//! smartctl JSON Extraction
//!
//! Turns the document printed by `smartctl --json -x` into a normalized [`Data`] value.
//!
//! # Design Notes
//!
//! - **Protocol first**: `device.protocol` decides which telemetry tables are read.
//!   A missing or unknown protocol is the only way extraction can fail.
//! - **Lenient fields**: every other field is optional. Missing strings become empty,
//!   missing numbers become 0, missing tables become empty maps.
//! - **Lower-cased keys**: attribute names are lower-cased so configuration does not
//!   depend on the casing a given smartctl release prints.
//!
//! # JSON Paths Read
//!
//! - `device.name`, `device.type`, `device.protocol`
//! - `model_family`, `model_name`, `serial_number`, `firmware_version`
//! - `ata_smart_attributes.table[].{name, raw.value, raw.string}`
//! - `ata_device_statistics.pages[].table[].{name, value}`
//! - `nvme_smart_health_information_log.*`

use crate::error::ParseError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Normalized attribute map: lower-cased name to integer value
pub type AttributeMap = HashMap<String, i64>;

/// Storage interface family of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Ata,
    Nvme,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Ata => "ATA",
            Protocol::Nvme => "NVMe",
        }
    }

    fn parse(raw: &str) -> Result<Self, ParseError> {
        match raw {
            "ATA" => Ok(Protocol::Ata),
            "NVMe" => Ok(Protocol::Nvme),
            "" => Err(ParseError::UndetectedProtocol),
            other => Err(ParseError::UnsupportedProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the queried device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device path, e.g. `/dev/sdc`
    pub name: String,
    /// smartctl device type, e.g. `sat` or `nvme`
    pub device_type: String,
    pub protocol: Protocol,
    pub model_family: String,
    pub model_name: String,
    pub serial_number: String,
    pub firmware_version: String,
}

/// Telemetry tables, one variant per protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telemetry {
    Ata {
        smart_attributes: AttributeMap,
        device_stats: AttributeMap,
    },
    Nvme {
        health: AttributeMap,
    },
}

/// Source table an attribute is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeCategory {
    AtaSmartAttributes,
    AtaDeviceStats,
    NvmeHealth,
}

impl AttributeCategory {
    pub const ALL: [AttributeCategory; 3] = [
        AttributeCategory::AtaSmartAttributes,
        AttributeCategory::AtaDeviceStats,
        AttributeCategory::NvmeHealth,
    ];

    /// Segment used in metric names, e.g. `<prefix>.ata_smart_attributes.<key>`
    pub fn metric_segment(self) -> &'static str {
        match self {
            AttributeCategory::AtaSmartAttributes => "ata_smart_attributes",
            AttributeCategory::AtaDeviceStats => "ata_device_stats",
            AttributeCategory::NvmeHealth => "nvme_health",
        }
    }
}

/// Normalized result of one successful query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub device: DeviceInfo,
    pub telemetry: Telemetry,
}

impl Data {
    /// Parse the full smartctl JSON document
    pub fn from_json(raw: &Value) -> Result<Self, ParseError> {
        let protocol = Protocol::parse(str_at(raw, "/device/protocol"))?;
        let device = DeviceInfo {
            name: str_at(raw, "/device/name").to_string(),
            device_type: str_at(raw, "/device/type").to_string(),
            protocol,
            model_family: str_at(raw, "/model_family").to_string(),
            model_name: str_at(raw, "/model_name").to_string(),
            serial_number: str_at(raw, "/serial_number").to_string(),
            firmware_version: str_at(raw, "/firmware_version").to_string(),
        };

        let telemetry = match protocol {
            Protocol::Ata => Telemetry::Ata {
                smart_attributes: extract_ata_smart_attributes(raw),
                device_stats: extract_ata_device_stats(raw),
            },
            Protocol::Nvme => Telemetry::Nvme {
                health: extract_nvme_health(raw),
            },
        };

        Ok(Self { device, telemetry })
    }

    /// Attribute map for a category, `None` when the device protocol does not carry it
    pub fn attributes(&self, category: AttributeCategory) -> Option<&AttributeMap> {
        match (&self.telemetry, category) {
            (
                Telemetry::Ata {
                    smart_attributes, ..
                },
                AttributeCategory::AtaSmartAttributes,
            ) => Some(smart_attributes),
            (Telemetry::Ata { device_stats, .. }, AttributeCategory::AtaDeviceStats) => {
                Some(device_stats)
            }
            (Telemetry::Nvme { health }, AttributeCategory::NvmeHealth) => Some(health),
            _ => None,
        }
    }
}

fn str_at<'a>(raw: &'a Value, pointer: &str) -> &'a str {
    raw.pointer(pointer).and_then(Value::as_str).unwrap_or("")
}

fn int_at(raw: &Value, pointer: &str) -> i64 {
    raw.pointer(pointer).map(as_int).unwrap_or(0)
}

fn as_int(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
        .or_else(|| value.as_f64().map(|v| v as i64))
        .unwrap_or(0)
}

fn rows<'a>(raw: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    raw.pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|row| row.is_object())
}

/// Leading integer of a smartctl raw string, e.g. `"26 (35 33 36 35 0)"` -> 26
///
/// Leading whitespace is skipped and parsing stops at the first non-digit, so
/// `"26(35 33)"` also yields 26.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits = trimmed[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len() - sign_len);
    if digits == 0 {
        return None;
    }
    trimmed[..sign_len + digits].parse().ok()
}

fn extract_ata_smart_attributes(raw: &Value) -> AttributeMap {
    let mut out = AttributeMap::new();
    for row in rows(raw, "/ata_smart_attributes/table") {
        let name = str_at(row, "/name").to_lowercase();
        let mut value = int_at(row, "/raw/value");

        // The raw value packs min/max history into the upper bytes; the string form
        // starts with the current temperature.
        if name == "temperature_celsius" {
            if let Some(temp) = parse_leading_int(str_at(row, "/raw/string")) {
                value = temp;
            }
        }

        out.insert(name, value);
    }
    out
}

fn extract_ata_device_stats(raw: &Value) -> AttributeMap {
    let mut out = AttributeMap::new();
    for page in rows(raw, "/ata_device_statistics/pages") {
        for entry in rows(page, "/table") {
            let name = str_at(entry, "/name").to_lowercase();
            out.insert(name, int_at(entry, "/value"));
        }
    }
    out
}

fn extract_nvme_health(raw: &Value) -> AttributeMap {
    raw.pointer("/nvme_smart_health_information_log")
        .and_then(Value::as_object)
        .map(|log| {
            log.iter()
                .map(|(key, value)| (key.to_lowercase(), as_int(value)))
                .collect()
        })
        .unwrap_or_default()
}
