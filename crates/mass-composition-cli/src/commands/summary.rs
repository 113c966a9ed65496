use anyhow::{Context, Result};
use std::path::Path;

use mass_composition::io::read_mass_composition;
use mass_composition::variables::{format_number, VariableConfig};

/// Weighted summary of a CSV dataset as `(variable, value)` rows.
pub fn summarise(csv: &Path, name: &str, index_col: Option<&str>) -> Result<Vec<(String, String)>> {
    let mc = read_mass_composition(csv, name, index_col, &VariableConfig::default())
        .with_context(|| format!("Failed to load dataset: {:?}", csv))?;
    log::info!("Loaded '{}' with {} records", mc.name, mc.len());

    let status = mc.status();
    if !status.ok {
        log::warn!("'{}' has out of range values: {}", mc.name, status);
    }

    let agg = mc.aggregate();
    let rows = mc
        .variables
        .vars
        .iter()
        .zip(agg.values.row(0).iter())
        .map(|(var, v)| (var.name.clone(), format_number(&var.format, *v)))
        .collect();
    Ok(rows)
}

pub fn run(csv: &Path, name: &str, index_col: Option<&str>) -> Result<()> {
    let rows = summarise(csv, name, index_col)?;
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    println!("{}", name);
    for (k, v) in rows {
        println!("  {:<width$}  {:>12}", k, v, width = width);
    }
    Ok(())
}
