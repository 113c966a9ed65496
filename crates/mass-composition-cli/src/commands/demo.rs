use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use mass_composition::demo_data::{sample_data, size_by_assay};
use mass_composition::io::write_csv;
use mass_composition::network::{MCNetwork, StreamLink};
use mass_composition::variables::VariableConfig;
use mass_composition::MassComposition;

use crate::config::NetworkConfig;
use crate::util::ensure_dir;

/// Write the demo datasets plus a ready-to-run network config.
pub fn run(out_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = ensure_dir(out_dir)?;
    let mut written = Vec::new();

    let (frame, attrs) = sample_data(true, true, false);
    let sample_path = dir.join("sample_data.csv");
    write_csv(&sample_path, &frame, Some(&attrs))?;
    written.push(sample_path);

    let size_path = dir.join("size_by_assay.csv");
    write_csv(&size_path, &size_by_assay(), None)?;
    written.push(size_path);

    let cfg = VariableConfig::default();
    let mut feed = MassComposition::from_frame(frame, "feed", &cfg)?;
    let (mut lump, mut fines) = feed.split(0.4, "lump", "fines")?;
    // perturb the lump dry mass so the demo network is out of balance
    lump.data[(0, 1)] *= 1.05;
    feed.set_nodes(0, 1);
    lump.set_nodes(1, 2);
    fines.set_nodes(1, 3);
    let network = MCNetwork::from_streams(vec![feed, lump, fines], "Demo Flowsheet")?;

    let streams_path = dir.join("streams.csv");
    let (tidy, names) = network.to_frame(None)?;
    write_csv(&streams_path, &tidy, Some(&names))?;
    written.push(streams_path);

    let config = NetworkConfig {
        name: network.name.clone(),
        data_file: String::from("streams.csv"),
        streams: network
            .edges
            .iter()
            .map(|e| StreamLink::new(&e.stream.name, e.from, e.to))
            .collect(),
        output_dir: dir.join("output").to_string_lossy().to_string(),
        ..Default::default()
    };
    let config_path = dir.join("network.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
    written.push(config_path);

    for path in &written {
        log::info!("Wrote {:?}", path);
    }
    Ok(written)
}
