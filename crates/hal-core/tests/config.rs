use std::io::Write;

use hal_core::{
    LatencyMetrics, Module, ModuleConfig, ModuleDebug, ModuleKind, QueueConfig, VendorDebug,
};
use hal_graph::Configuration;

#[test]
fn latency_computation() {
    let latency = LatencyMetrics::new(48_000, 10, 960);
    assert_eq!(latency.minimum_buffer_frames, 480);
    assert!((latency.buffer_ms - 20.0).abs() < 1e-3);

    let rounded = LatencyMetrics::new(44_100, 10, 441);
    assert_eq!(rounded.minimum_buffer_frames, 441);
    let odd = LatencyMetrics::new(11_025, 10, 0);
    assert_eq!(odd.minimum_buffer_frames, 111);
}

#[test]
fn module_config_fills_missing_fields_with_defaults() {
    let json = r#"{ "kind": "usb", "debug": { "simulate_device_connections": true } }"#;
    let config = ModuleConfig::from_json(json).unwrap();
    assert_eq!(config.kind, ModuleKind::Usb);
    assert!(config.debug.simulate_device_connections);
    assert_eq!(config.debug.stream_transient_state_delay_ms, 0);
    assert_eq!(config.vendor_debug, VendorDebug::default());
    assert_eq!(config.queues, QueueConfig::default());
}

#[test]
fn module_config_loads_from_file() {
    let expected = ModuleConfig::default()
        .with_kind(ModuleKind::Bluetooth)
        .with_debug(ModuleDebug {
            simulate_device_connections: false,
            stream_transient_state_delay_ms: 25,
        })
        .with_vendor_debug(VendorDebug {
            force_transient_burst: true,
            force_synchronous_drain: false,
        })
        .with_queues(QueueConfig {
            command_capacity: 4,
            reply_capacity: 4,
        });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(&expected).unwrap().as_bytes())
        .unwrap();

    let loaded = ModuleConfig::from_json_file(file.path()).unwrap();
    assert_eq!(loaded, expected);

    let module = Module::from_config(loaded);
    assert_eq!(module.kind(), ModuleKind::Bluetooth);
    assert_eq!(module.module_debug().stream_transient_state_delay_ms, 25);
    assert!(module.vendor_debug().force_transient_burst);
}

#[test]
fn unknown_module_kind_is_rejected() {
    assert!(ModuleConfig::from_json(r#"{ "kind": "primary" }"#).is_err());
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{ not json").unwrap();
    assert!(ModuleConfig::from_json_file(file.path()).is_err());
}

#[test]
fn injected_configuration_replaces_the_builtin_table() {
    let table = hal_core::tables::stub_configuration();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(table.to_json_pretty().unwrap().as_bytes())
        .unwrap();

    let loaded = Configuration::from_json_file(file.path()).unwrap();
    assert_eq!(loaded, table);
    let module = Module::new(ModuleKind::Default).with_configuration(loaded);
    assert_eq!(module.audio_ports(), table.ports);
    assert_eq!(module.audio_routes(), table.routes);
}
