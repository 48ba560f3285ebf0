use crate::converter::{unknown_tags, ConverterConfig};
use crate::error::ExporterError;
use crate::smartctl::command::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_SMARTCTL_BINARY};
use crate::smartctl::SmartctlCommand;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub smartctl: SmartctlConfig,
    #[serde(default)]
    pub statsd: StatsdConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmartctlConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default)]
    pub use_sudo: bool,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_seconds: u64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsdConfig {
    #[serde(default = "default_statsd_url")]
    pub url: String,
    #[serde(default = "default_metrics_prefix")]
    pub metrics_prefix: String,
    #[serde(default = "default_device_tags")]
    pub device_tags: Vec<String>,
    #[serde(default = "default_report_interval")]
    pub report_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeviceConfig {
    pub path: String,
    #[serde(default)]
    pub ata_smart_attributes_metrics: Vec<String>,
    #[serde(default)]
    pub ata_device_stats_metrics: Vec<String>,
    #[serde(default)]
    pub nvme_health_info_metrics: Vec<String>,
}

fn default_binary() -> String {
    DEFAULT_SMARTCTL_BINARY.to_string()
}

fn default_polling_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_secs()
}

fn default_statsd_url() -> String {
    "localhost:8125".to_string()
}

fn default_metrics_prefix() -> String {
    "smartctl.".to_string()
}

fn default_device_tags() -> Vec<String> {
    vec!["device_name".to_string()]
}

fn default_report_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9101
}

impl Default for SmartctlConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            use_sudo: false,
            polling_interval_seconds: default_polling_interval(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            url: default_statsd_url(),
            metrics_prefix: default_metrics_prefix(),
            device_tags: default_device_tags(),
            report_interval_seconds: default_report_interval(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: default_addr(),
            port: default_port(),
        }
    }
}

impl SmartctlConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_seconds)
    }

    pub fn command(&self) -> SmartctlCommand {
        SmartctlCommand::new()
            .with_binary(self.binary.clone())
            .with_sudo(self.use_sudo)
            .with_timeout(Duration::from_secs(self.timeout_seconds))
    }
}

impl StatsdConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_seconds)
    }
}

impl DeviceConfig {
    fn ata_metric_count(&self) -> usize {
        self.ata_smart_attributes_metrics.len() + self.ata_device_stats_metrics.len()
    }

    /// Converter selection for this device, using the shared statsd prefix and tags
    pub fn converter_config(&self, statsd: &StatsdConfig) -> ConverterConfig {
        ConverterConfig {
            metric_prefix: statsd.metrics_prefix.clone(),
            tags: statsd.device_tags.clone(),
            ata_smart_attributes: self.ata_smart_attributes_metrics.clone(),
            ata_device_stats: self.ata_device_stats_metrics.clone(),
            nvme_health: self.nvme_health_info_metrics.clone(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SMARTCTL_EXPORTER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Every problem found in the configuration, empty when valid
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut check = |failed: bool, message: String| {
            if failed {
                errors.push(message);
            }
        };

        check(self.devices.is_empty(), "devices are not specified".into());
        check(
            self.smartctl.binary.is_empty(),
            "smartctl binary is empty".into(),
        );
        check(
            self.smartctl.polling_interval_seconds == 0,
            "smartctl polling interval must be at least one second".into(),
        );
        check(
            self.smartctl.timeout_seconds == 0,
            "smartctl timeout must be at least one second".into(),
        );
        check(
            self.statsd.metrics_prefix.trim_matches('.').is_empty(),
            "metric prefix is not specified".into(),
        );
        check(self.statsd.url.is_empty(), "statsd URL is empty".into());
        check(
            self.statsd.report_interval_seconds == 0,
            "statsd report interval must be at least one second".into(),
        );

        let unknown = unknown_tags(&self.statsd.device_tags);
        check(
            !unknown.is_empty(),
            format!("unknown device tags {}", unknown.join(", ")),
        );

        for (idx, dev) in self.devices.iter().enumerate() {
            if dev.path.is_empty() {
                check(true, format!("devices[{idx}] must specify a path"));
                continue;
            }
            let ata = dev.ata_metric_count();
            let nvme = dev.nvme_health_info_metrics.len();
            check(
                ata + nvme == 0,
                format!(
                    "device {} must specify at least one of ATA or NVMe metrics",
                    dev.path
                ),
            );
            check(
                ata != 0 && nvme != 0,
                format!("device {} cannot specify both ATA and NVMe metrics", dev.path),
            );
        }

        errors
    }

    pub fn validate(&self) -> std::result::Result<(), ExporterError> {
        let errors = self.errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ExporterError::Config(errors.join("; ")))
        }
    }
}
