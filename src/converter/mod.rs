//! Metric Conversion
//!
//! Projects normalized smartctl [`Data`] onto the metrics configured for a device.
//!
//! # Metric Naming
//!
//! Every matched attribute becomes a gauge named `<prefix>.<category>.<key>`:
//! - `<prefix>.ata_smart_attributes.<key>` - ATA SMART attribute table
//! - `<prefix>.ata_device_stats.<key>` - ATA device statistics pages
//! - `<prefix>.nvme_health.<key>` - NVMe SMART/health information log
//!
//! Requested keys the device does not report are skipped silently, so a shared
//! configuration can list attributes that only some drive models expose.

pub mod tags;

use crate::smartctl::{AttributeCategory, Data};
use std::collections::HashSet;

pub use tags::{unknown_tags, DeviceTag};

/// A single named integer measurement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub name: String,
    pub value: i64,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Metrics of one device from one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetrics {
    pub device_name: String,
    /// `key:value` tags applied to every entry
    pub tags: Vec<String>,
    pub entries: Vec<Metric>,
}

/// Per-device selection of tags and attributes
#[derive(Debug, Clone, Default)]
pub struct ConverterConfig {
    pub metric_prefix: String,
    pub tags: Vec<String>,
    pub ata_smart_attributes: Vec<String>,
    pub ata_device_stats: Vec<String>,
    pub nvme_health: Vec<String>,
}

impl ConverterConfig {
    fn requested(&self, category: AttributeCategory) -> &[String] {
        match category {
            AttributeCategory::AtaSmartAttributes => &self.ata_smart_attributes,
            AttributeCategory::AtaDeviceStats => &self.ata_device_stats,
            AttributeCategory::NvmeHealth => &self.nvme_health,
        }
    }
}

/// Converts [`Data`] into [`DeviceMetrics`] for one device configuration
#[derive(Debug, Clone)]
pub struct Converter {
    /// Normalized prefix, always ending with exactly one `.`
    metric_prefix: String,
    tags: HashSet<String>,
    config: ConverterConfig,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            metric_prefix: normalize_prefix(&config.metric_prefix),
            tags: config.tags.iter().cloned().collect(),
            config,
        }
    }

    pub fn metric_prefix(&self) -> &str {
        &self.metric_prefix
    }

    pub fn convert(&self, data: &Data) -> DeviceMetrics {
        let capacity = AttributeCategory::ALL
            .iter()
            .map(|c| self.config.requested(*c).len())
            .sum();
        let mut entries = Vec::with_capacity(capacity);

        for category in AttributeCategory::ALL {
            let requested = self.config.requested(category);
            let Some(source) = data.attributes(category) else {
                continue;
            };
            let prefix = format!("{}{}.", self.metric_prefix, category.metric_segment());
            entries.extend(requested.iter().filter_map(|key| {
                source
                    .get(key)
                    .map(|value| Metric::new(format!("{prefix}{key}"), *value))
            }));
        }

        DeviceMetrics {
            device_name: data.device.name.clone(),
            tags: self.extract_tags(data),
            entries,
        }
    }

    fn extract_tags(&self, data: &Data) -> Vec<String> {
        DeviceTag::ALL
            .into_iter()
            .filter(|tag| self.tags.contains(tag.name()))
            .filter_map(|tag| {
                let value = tag.value(&data.device);
                (!value.is_empty()).then(|| format!("{}:{}", tag.name(), value))
            })
            .collect()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    format!("{}.", prefix.trim_matches('.'))
}
