use std::fs;

use mass_composition::composition::BinDirection;
use mass_composition_cli::commands::grade_tonnage::{self, GradeTonnageArgs};
use mass_composition_cli::commands::{demo, network, summary};
use mass_composition_cli::config::NetworkConfig;

#[test]
fn demo_files_drive_the_network_commands() {
    let dir = tempfile::tempdir().unwrap();
    let written = demo::run(dir.path()).unwrap();
    assert_eq!(written.len(), 4);

    let config = NetworkConfig::load(&dir.path().join("network.json")).unwrap();
    assert_eq!(config.streams.len(), 3);
    let network = config.build_network().unwrap();
    assert!(!network.balanced());

    let outputs = network::run_report(&config).unwrap();
    let csv = fs::read_to_string(&outputs[0]).unwrap();
    assert!(csv.starts_with("name,mass_wet,mass_dry"));
    let html = fs::read_to_string(&outputs[1]).unwrap();
    assert!(html.contains("Demo Flowsheet Network Report"));
    assert!(html.contains("Configuration"));
}

#[test]
fn balance_writes_balanced_and_residual_tables() {
    let dir = tempfile::tempdir().unwrap();
    demo::run(dir.path()).unwrap();
    let mut config = NetworkConfig::load(&dir.path().join("network.json")).unwrap();
    config.balance.max_iter = Some(20_000);

    let outputs = network::run_balance(&config).unwrap();
    assert_eq!(outputs.len(), 3);
    let balanced = fs::read_to_string(&outputs[0]).unwrap();
    assert!(balanced.starts_with("index,mass_dry,h2o"));
    // three streams of three records plus the header
    assert_eq!(balanced.lines().count(), 10);
    assert!(outputs[2].exists());
}

#[test]
fn summary_and_grade_tonnage_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    demo::run(dir.path()).unwrap();
    let csv = dir.path().join("sample_data.csv");

    let rows = summary::summarise(&csv, "sample", None).unwrap();
    assert_eq!(rows[0], ("mass_wet".to_string(), "300".to_string()));
    assert_eq!(rows[3], ("FE".to_string(), "59.00".to_string()));

    let args = GradeTonnageArgs {
        csv,
        index_col: None,
        cutoff_var: "FE".to_string(),
        bin_width: 2.0,
        cumulative: true,
        direction: BinDirection::Descending,
        output: Some(dir.path().join("gt.csv")),
        plot: Some(dir.path().join("gt.html")),
    };
    let binned = grade_tonnage::run(&args).unwrap();
    assert_eq!(binned.index, vec!["[56, 58)", "[58, 60)", "[60, 62)"]);
    assert!(dir.path().join("gt.csv").exists());
    let html = fs::read_to_string(dir.path().join("gt.html")).unwrap();
    assert!(html.contains("Grade-Tonnage: FE"));
}
