use std::fs;

use mass_composition::balance::BestMeasurements;
use mass_composition_cli::config::{DataLayout, NetworkConfig};

#[test]
fn missing_fields_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("network.json");
    fs::write(
        &path,
        r#"{
            "name": "Plant",
            "data_file": "streams.csv",
            "streams": [{"name": "feed", "from": 0, "to": 1}],
            "tolerance": "not a number",
            "balance": {"best_measurements": "output", "best_locked": true}
        }"#,
    )
    .unwrap();

    let config = NetworkConfig::load(&path).unwrap();
    assert_eq!(config.name, "Plant");
    assert_eq!(config.layout, DataLayout::Long);
    assert_eq!(config.tolerance, 1e-6);
    assert_eq!(config.streams.len(), 1);
    assert_eq!(config.balance.best_measurements, Some(BestMeasurements::Output));
    assert!(config.balance.best_locked);
    assert!(config.balance.parallel);
    assert_eq!(
        config.data_file,
        dir.path().join("streams.csv").to_string_lossy().to_string()
    );
}

#[test]
fn unreadable_configs_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(NetworkConfig::load(&dir.path().join("absent.json")).is_err());
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(NetworkConfig::load(&path).is_err());
}

#[test]
fn networks_need_streams() {
    let config = NetworkConfig::default();
    assert!(config.build_network().is_err());
}
