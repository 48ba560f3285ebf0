//! Configuration validation tests
//!
//! Tests that verify configuration defaults, loading and validation messages.

use smartctl_exporter::config::{Config, DeviceConfig, ServerConfig, SmartctlConfig, StatsdConfig};
use smartctl_exporter::error::ExporterError;
use std::time::Duration;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn ata_device(path: &str) -> DeviceConfig {
    DeviceConfig {
        path: path.to_string(),
        ata_smart_attributes_metrics: strings(&["temperature_celsius"]),
        ..Default::default()
    }
}

fn nvme_device(path: &str) -> DeviceConfig {
    DeviceConfig {
        path: path.to_string(),
        nvme_health_info_metrics: strings(&["temperature"]),
        ..Default::default()
    }
}

fn valid_config() -> Config {
    Config {
        smartctl: SmartctlConfig::default(),
        statsd: StatsdConfig::default(),
        server: ServerConfig::default(),
        devices: vec![ata_device("/dev/sda"), nvme_device("/dev/nvme0n1")],
    }
}

#[test]
fn test_defaults() {
    // Given: Default sections
    let smartctl = SmartctlConfig::default();
    let statsd = StatsdConfig::default();
    let server = ServerConfig::default();

    // Then: smartctl is polled every minute with a 15s timeout, without sudo
    assert_eq!(smartctl.binary, "smartctl");
    assert!(!smartctl.use_sudo);
    assert_eq!(smartctl.polling_interval(), Duration::from_secs(60));
    assert_eq!(smartctl.command().timeout(), Duration::from_secs(15));

    // Then: Metrics go to the local agent every 10s, tagged by device name
    assert_eq!(statsd.url, "localhost:8125");
    assert_eq!(statsd.metrics_prefix, "smartctl.");
    assert_eq!(statsd.device_tags, strings(&["device_name"]));
    assert_eq!(statsd.report_interval(), Duration::from_secs(10));

    // Then: Self-metrics server listens on all interfaces
    assert!(server.enabled);
    assert_eq!(server.addr, "0.0.0.0");
    assert_eq!(server.port, 9101);
}

#[test]
fn test_valid_config_has_no_errors() {
    let config = valid_config();
    assert!(config.errors().is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_devices() {
    let config = Config {
        devices: Vec::new(),
        ..valid_config()
    };
    assert_eq!(config.errors(), strings(&["devices are not specified"]));
}

#[test]
fn test_zero_intervals_are_rejected() {
    let mut config = valid_config();
    config.smartctl.polling_interval_seconds = 0;
    config.smartctl.timeout_seconds = 0;
    config.statsd.report_interval_seconds = 0;

    let errors = config.errors();
    assert!(errors.contains(&"smartctl polling interval must be at least one second".to_string()));
    assert!(errors.contains(&"smartctl timeout must be at least one second".to_string()));
    assert!(errors.contains(&"statsd report interval must be at least one second".to_string()));
}

#[test]
fn test_empty_prefix_and_url() {
    let mut config = valid_config();
    config.statsd.metrics_prefix = ".".to_string();
    config.statsd.url = String::new();
    config.smartctl.binary = String::new();

    let errors = config.errors();
    assert!(errors.contains(&"metric prefix is not specified".to_string()));
    assert!(errors.contains(&"statsd URL is empty".to_string()));
    assert!(errors.contains(&"smartctl binary is empty".to_string()));
}

#[test]
fn test_unknown_device_tags_are_listed() {
    // Given: Tags that are not device fields
    let mut config = valid_config();
    config.statsd.device_tags = strings(&["device_name", "rack", "device_path", "rack"]);

    // When: Validating
    let errors = config.errors();

    // Then: Each unknown tag is named once, sorted
    assert_eq!(errors, strings(&["unknown device tags device_path, rack"]));
}

#[test]
fn test_device_without_metrics() {
    let mut config = valid_config();
    config.devices.push(DeviceConfig {
        path: "/dev/sdb".to_string(),
        ..Default::default()
    });

    assert_eq!(
        config.errors(),
        strings(&["device /dev/sdb must specify at least one of ATA or NVMe metrics"])
    );
}

#[test]
fn test_device_mixing_protocols() {
    let mut config = valid_config();
    config.devices.push(DeviceConfig {
        path: "/dev/sdb".to_string(),
        ata_device_stats_metrics: strings(&["power-on hours"]),
        nvme_health_info_metrics: strings(&["temperature"]),
        ..Default::default()
    });

    assert_eq!(
        config.errors(),
        strings(&["device /dev/sdb cannot specify both ATA and NVMe metrics"])
    );
}

#[test]
fn test_device_without_path() {
    let mut config = valid_config();
    config.devices.push(DeviceConfig::default());

    assert_eq!(config.errors(), strings(&["devices[2] must specify a path"]));
}

#[test]
fn test_validate_joins_every_problem() {
    // Given: A configuration with several independent problems
    let mut config = valid_config();
    config.statsd.url = String::new();
    config.devices.push(DeviceConfig {
        path: "/dev/sdb".to_string(),
        ..Default::default()
    });

    // When: Validating
    let err = config.validate().unwrap_err();

    // Then: All problems are reported in one configuration error
    assert!(matches!(err, ExporterError::Config(_)));
    let message = err.to_string();
    assert!(message.starts_with("Configuration error: "));
    assert!(message.contains("statsd URL is empty; device /dev/sdb must specify"));
}

#[test]
fn test_converter_config_uses_shared_statsd_settings() {
    let statsd = StatsdConfig {
        metrics_prefix: "disks".to_string(),
        device_tags: strings(&["serial_number"]),
        ..Default::default()
    };
    let device = DeviceConfig {
        path: "/dev/sda".to_string(),
        ata_smart_attributes_metrics: strings(&["power_on_hours"]),
        ata_device_stats_metrics: strings(&["current temperature"]),
        nvme_health_info_metrics: Vec::new(),
    };

    let converter = device.converter_config(&statsd);

    assert_eq!(converter.metric_prefix, "disks");
    assert_eq!(converter.tags, strings(&["serial_number"]));
    assert_eq!(converter.ata_smart_attributes, strings(&["power_on_hours"]));
    assert_eq!(converter.ata_device_stats, strings(&["current temperature"]));
    assert!(converter.nvme_health.is_empty());
}

#[test]
fn test_load_shipped_default_config() {
    // Given: The configuration file shipped with the exporter
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/Default.toml");

    // When: Loading it
    let config = Config::load(path).expect("Failed to load shipped config");

    // Then: It describes one ATA and one NVMe device and is valid
    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.devices[0].path, "/dev/sda");
    assert!(!config.devices[0].ata_smart_attributes_metrics.is_empty());
    assert_eq!(config.devices[1].path, "/dev/nvme0n1");
    assert!(!config.devices[1].nvme_health_info_metrics.is_empty());
    assert!(config.errors().is_empty(), "{:?}", config.errors());
}

#[test]
fn test_load_partial_file_fills_defaults() {
    // Given: A file declaring only a device
    let path = std::env::temp_dir().join(format!(
        "smartctl-exporter-partial-{}.toml",
        std::process::id()
    ));
    std::fs::write(
        &path,
        "[[devices]]\npath = \"/dev/sdc\"\nata_device_stats_metrics = [\"power-on hours\"]\n",
    )
    .unwrap();

    // When: Loading it
    let config = Config::load(path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&path).ok();

    // Then: Every other section takes its defaults
    assert_eq!(config.devices.len(), 1);
    assert_eq!(config.devices[0].path, "/dev/sdc");
    assert_eq!(config.smartctl.polling_interval_seconds, 60);
    assert_eq!(config.statsd.report_interval_seconds, 10);
    assert_eq!(config.server.port, 9101);
    assert!(config.errors().is_empty());
}
