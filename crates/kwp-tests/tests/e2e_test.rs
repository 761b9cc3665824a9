//! End-to-end tests: catalog in, DATA lines out
//!
//! Run with: cargo test -p kwp-tests --test e2e_test

use std::path::PathBuf;

use kwp_conv::{build_schema, Catalog, Conversion, DataSource, Parameter};
use kwp_core::{SessionControl, StreamEvent};
use kwp_tests::{live_block, wait_for, TestBridge};
use pretty_assertions::assert_eq;

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
}

fn two_parameter_catalog() -> Catalog {
    Catalog::new(vec![DataSource::new(
        0x01,
        vec![
            Parameter::new("Battery voltage", "V", 1, 1)
                .with_conversion(Conversion::affine(0.10159, 0.0))
                .with_precision(2),
            Parameter::new("Engine Speed", "RPM", 31, 2).with_precision(1),
        ],
    )])
}

// =============================================================================
// Decoding
// =============================================================================

#[tokio::test]
async fn test_live_block_decodes_to_data_line() {
    let bridge = TestBridge::with_catalog(two_parameter_catalog());
    bridge.factory.on_open(|transport| {
        let block = live_block(&[(1, vec![100]), (31, 2000u16.to_le_bytes().to_vec())]);
        transport.set_live_data(0x01, block);
    });
    let mut viewer = bridge.hub.subscribe();

    bridge.manager.start("/dev/ttyUSB0").await.unwrap();
    let events = wait_for(&mut viewer, "DATA ").await;

    let schema = build_schema(&two_parameter_catalog(), "KWP2000").to_line();
    let hellos: Vec<&StreamEvent> = events.iter().filter(|e| e.is_line()).collect();
    // Join handshake, re-announcement before streaming, first record
    assert_eq!(hellos.len(), 3);
    assert_eq!(hellos[0].text(), schema);
    assert_eq!(hellos[1].text(), schema);

    let data = hellos[2].text();
    let (timestamp, values) = data
        .strip_prefix("DATA ")
        .and_then(|rest| rest.split_once(','))
        .unwrap();
    assert!(timestamp.parse::<i64>().unwrap() > 0);
    assert_eq!(values, "10.16,2000");

    bridge.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_short_block_yields_nan_for_missing_fields() {
    let bridge = TestBridge::with_catalog(two_parameter_catalog());
    bridge
        .factory
        .on_open(|transport| transport.set_live_data(0x01, vec![0x01, 100]));
    let mut viewer = bridge.hub.subscribe();

    bridge.manager.start("/dev/ttyUSB0").await.unwrap();
    let events = wait_for(&mut viewer, "DATA ").await;

    let data = events.last().unwrap().text();
    assert!(data.ends_with(",10.16,NaN"), "unexpected record: {}", data);

    bridge.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_builtin_catalog_streams_every_parameter() {
    let bridge = TestBridge::new();
    let mut viewer = bridge.hub.subscribe();

    bridge.manager.start("/dev/ttyUSB0").await.unwrap();
    let events = wait_for(&mut viewer, "DATA ").await;

    let data = events.last().unwrap().text();
    // Timestamp plus one value per parameter
    assert_eq!(data.split(',').count(), 26);
    assert!(!data.contains("NaN"));

    bridge.manager.stop().await.unwrap();
}

// =============================================================================
// Shipped configuration
// =============================================================================

#[test]
fn test_shipped_catalog_matches_builtin() {
    let catalog = Catalog::from_file(config_dir().join("catalog.yaml")).unwrap();
    assert_eq!(catalog, Catalog::builtin());
}

#[test]
fn test_shipped_catalog_schema() {
    let catalog = Catalog::from_file(config_dir().join("catalog.yaml")).unwrap();
    let schema = build_schema(&catalog, "KWP2000");

    assert_eq!(schema.fields.len(), 25);
    assert_eq!(schema.fields[0].key, "oxygen_sensor_bank1_sensor1");
    assert!(schema.fields.iter().any(|f| f.key == "battery_voltage"));
    assert!(schema.fields.iter().any(|f| f.key == "engine_speed"));
}

#[test]
fn test_catalog_yaml_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.yaml");
    std::fs::write(
        &path,
        r#"
sources:
  - local_identifier: 1
    parameters:
      - name: Battery voltage
        unit: V
        byte_offset: 1
        conversion:
          type: affine
          scale: 0.10159
          offset: 0.0
        precision: 2
      - name: Engine Speed
        unit: RPM
        byte_offset: 31
        byte_size: 2
        precision: 1
"#,
    )
    .unwrap();

    assert_eq!(Catalog::from_file(&path).unwrap(), two_parameter_catalog());
}
