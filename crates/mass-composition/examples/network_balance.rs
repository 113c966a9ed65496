//! Balance a split network with a measurement error on one stream.
use mass_composition::balance::{BalanceConfig, MCBalance};
use mass_composition::demo_data::sample_data;
use mass_composition::network::MCNetwork;
use mass_composition::report::network_report;
use mass_composition::variables::VariableConfig;
use mass_composition::{MassComposition, Result};

fn main() -> Result<()> {
    env_logger::init();

    let (frame, _) = sample_data(true, true, false);
    let mut feed = MassComposition::from_frame(frame, "feed", &VariableConfig::default())?;
    let (mut lump, mut fines) = feed.split(0.4, "lump", "fines")?;
    lump.data[(0, 1)] *= 1.05;
    feed.set_nodes(0, 1);
    lump.set_nodes(1, 2);
    fines.set_nodes(1, 3);
    let network = MCNetwork::from_streams(vec![feed, lump, fines], "Demo")?;
    println!("measured network balanced: {}", network.balanced());

    let balancer = MCBalance::new(&network, BalanceConfig::default())?;
    let result = balancer.optimise()?;
    let balanced = balancer.balanced_network(&result)?;
    println!("node 1 imbalance after balancing:\n{:?}", balanced.node_imbalance(1)?.values);

    network_report(&balanced, env!("CARGO_PKG_VERSION"))?.save_to_file("network_balance.html")?;
    println!("Report saved to network_balance.html");

    Ok(())
}
