use mass_composition::balance::{BalanceConfig, MCBalance};
use mass_composition::demo_data::sample_data;
use mass_composition::io::{read_csv, write_csv};
use mass_composition::network::{MCNetwork, StreamLink};
use mass_composition::variables::VariableConfig;
use mass_composition::MassComposition;

fn flowsheet(lump_error: f64) -> MCNetwork {
    let (frame, _) = sample_data(false, true, false);
    let mut feed = MassComposition::from_frame(frame, "feed", &VariableConfig::default()).unwrap();
    let (mut lump, mut fines) = feed.split(0.4, "lump", "fines").unwrap();
    lump.data[(1, 1)] += lump_error;
    feed.set_nodes(1, 2);
    lump.set_nodes(2, 3);
    fines.set_nodes(2, 4);
    MCNetwork::from_streams(vec![feed, lump, fines], "Flowsheet").unwrap()
}

#[test]
fn tidy_csv_round_trip_rebuilds_the_network() {
    let net = flowsheet(0.0);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streams.csv");
    let (frame, attrs) = net.to_frame(None).unwrap();
    write_csv(&path, &frame, Some(&attrs)).unwrap();

    let table = read_csv(&path, None).unwrap();
    let links = vec![
        StreamLink::new("feed", 0, 1),
        StreamLink::new("lump", 1, 2),
        StreamLink::new("fines", 1, 3),
    ];
    let rebuilt = MCNetwork::from_frame_long(
        &table.frame,
        &table.attributes,
        "name",
        &links,
        "copy",
        &VariableConfig::default(),
    )
    .unwrap();
    assert_eq!(rebuilt.edge_names(), vec!["feed", "lump", "fines"]);
    assert!(rebuilt.balanced());
}

#[test]
fn reconciliation_reduces_node_imbalance() {
    let net = flowsheet(4.0);
    assert!(!net.balanced());

    let config = BalanceConfig {
        xatol: 1e-6,
        fatol: 1e-10,
        max_iter: Some(100_000),
        ..Default::default()
    };
    let balancer = MCBalance::new(&net, config).unwrap();
    let result = balancer.optimise().unwrap();
    assert_eq!(result.names.len(), 9);

    let balanced = balancer.balanced_network(&result).unwrap();
    let before = net.node_imbalance(1).unwrap();
    let after = balanced.node_imbalance(1).unwrap();
    let dry = after.column_position("mass_dry").unwrap();
    assert!(after.values[(1, dry)].abs() < before.values[(1, dry)].abs() / 4.0);
}
