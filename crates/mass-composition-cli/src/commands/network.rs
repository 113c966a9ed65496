use anyhow::{Context, Result};
use maud::html;
use std::path::PathBuf;

use mass_composition::balance::{max_abs_residuals, MCBalance};
use mass_composition::io::{write_csv, write_string_table};
use mass_composition::network::MCNetwork;
use mass_composition::report::{network_report, ReportSection};

use crate::config::NetworkConfig;
use crate::util::{ensure_dir, file_stem};

/// Stream summary CSV and HTML report of the configured network.
pub fn run_report(config: &NetworkConfig) -> Result<Vec<PathBuf>> {
    let network = config.build_network()?;
    let dir = ensure_dir(&PathBuf::from(&config.output_dir))?;
    let stem = file_stem(&network.name);

    let csv_path = dir.join(format!("{}_report.csv", stem));
    let (header, rows) = network.report_formatted()?;
    write_string_table(&csv_path, &header, &rows)?;

    log_balance(&network);

    let html_path = dir.join(format!("{}_report.html", stem));
    let mut report = network_report(&network, &config.version)?;
    report.add_section(config_section(config)?);
    report.save_to_file(&html_path)?;

    Ok(vec![csv_path, html_path])
}

/// Reconcile the configured network and write balanced values, residuals and
/// a report of the balanced network.
pub fn run_balance(config: &NetworkConfig) -> Result<Vec<PathBuf>> {
    let network = config.build_network()?;
    let dir = ensure_dir(&PathBuf::from(&config.output_dir))?;
    let stem = file_stem(&network.name);

    log_balance(&network);
    let start_time = std::time::Instant::now();
    let balancer = MCBalance::new(&network, config.balance.clone())?;
    let result = balancer.optimise().context("Balancing failed")?;
    log::info!("Balancing completed in {:?}", start_time.elapsed());
    if !result.converged {
        log::warn!("Some records did not converge; consider raising balance.max_iter");
    }
    for (component, worst) in max_abs_residuals(&result) {
        log::info!("largest adjustment to {}: {:.4}", component, worst);
    }

    let mut names = std::collections::BTreeMap::new();
    names.insert("name".to_string(), result.names.clone());
    let balanced_path = dir.join(format!("{}_balanced.csv", stem));
    write_csv(&balanced_path, &result.balanced, Some(&names))?;
    let residuals_path = dir.join(format!("{}_residuals.csv", stem));
    write_csv(&residuals_path, &result.residuals, Some(&names))?;

    let balanced = balancer.balanced_network(&result)?;
    log_balance(&balanced);
    let html_path = dir.join(format!("{}_balanced.html", stem));
    let mut report = network_report(&balanced, &config.version)?;
    report.add_section(config_section(config)?);
    report.save_to_file(&html_path)?;

    Ok(vec![balanced_path, residuals_path, html_path])
}

fn log_balance(network: &MCNetwork) {
    for node in network.balance_nodes() {
        match network.node_balanced(node) {
            Some(true) => log::info!("node {} is balanced", node),
            Some(false) => log::warn!("node {} is not balanced", node),
            None => {}
        }
    }
}

fn config_section(config: &NetworkConfig) -> Result<ReportSection> {
    let mut section = ReportSection::new("Configuration");
    let json = serde_json::to_string_pretty(config)?;
    section.add_content(html! {
        pre { code { (json) } }
    });
    Ok(section)
}
