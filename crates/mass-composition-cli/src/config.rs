use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use mass_composition::balance::BalanceConfig;
use mass_composition::io::read_csv;
use mass_composition::network::{MCNetwork, StreamLink, DEFAULT_TOLERANCE};
use mass_composition::variables::VariableConfig;

use crate::util::validate_csv_file;

/// How stream records are laid out in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLayout {
    /// One row per stream record, the stream named in `name_column`
    Long,
    /// One row per record, columns prefixed by stream name
    Wide,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    pub version: String,
    pub name: String,
    pub data_file: String,
    pub layout: DataLayout,
    pub name_column: String,
    pub index_column: Option<String>,
    pub streams: Vec<StreamLink>,
    pub tolerance: f64,
    pub variables: VariableConfig,
    pub balance: BalanceConfig,
    pub output_dir: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            version: clap::crate_version!().to_string(),
            name: String::from("Flowsheet"),
            data_file: String::new(),
            layout: DataLayout::Long,
            name_column: String::from("name"),
            index_column: None,
            streams: Vec::new(),
            tolerance: DEFAULT_TOLERANCE,
            variables: VariableConfig::default(),
            balance: BalanceConfig::default(),
            output_dir: String::from("mass_composition_output"),
        }
    }
}

impl NetworkConfig {
    /// Read a JSON config; missing or invalid fields fall back to defaults.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_json = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let partial: serde_json::Value = serde_json::from_str(&config_json)
            .with_context(|| format!("Config file is not valid JSON: {:?}", config_path))?;
        let mut config = NetworkConfig::default();

        macro_rules! load_or_default {
            ($field:ident) => {
                if let Some(val) = partial.get(stringify!($field)) {
                    if let Ok(parsed) = serde_json::from_value(val.clone()) {
                        config.$field = parsed;
                    } else {
                        log::warn!(
                            "Config Invalid value for '{}', using default: {:?}",
                            stringify!($field), config.$field
                        );
                    }
                } else {
                    log::warn!(
                        "Config Missing field '{}', using default: {:?}",
                        stringify!($field), config.$field
                    );
                }
            };
        }

        load_or_default!(name);
        load_or_default!(data_file);
        load_or_default!(layout);
        load_or_default!(name_column);
        load_or_default!(index_column);
        load_or_default!(streams);
        load_or_default!(tolerance);
        load_or_default!(variables);
        load_or_default!(balance);
        load_or_default!(output_dir);

        // relative data files resolve against the config location
        let data = PathBuf::from(&config.data_file);
        if data.is_relative() && !config.data_file.is_empty() {
            if let Some(parent) = config_path.parent() {
                config.data_file = parent.join(data).to_string_lossy().to_string();
            }
        }

        Ok(config)
    }

    /// Load the config and apply command line overrides.
    pub fn from_arguments(config_path: &PathBuf, matches: &ArgMatches) -> Result<Self> {
        let mut config = Self::load(config_path)?;

        if let Some(data_file) = matches.get_one::<String>("data_file") {
            config.data_file = data_file.clone();
        }
        validate_csv_file(&config.data_file)?;

        if let Some(output_dir) = matches.get_one::<String>("output_dir") {
            config.output_dir = output_dir.clone();
        }

        Ok(config)
    }

    /// Read the data file and assemble the network.
    pub fn build_network(&self) -> Result<MCNetwork> {
        if self.streams.is_empty() {
            anyhow::bail!("Config lists no streams for network '{}'", self.name);
        }
        let table = read_csv(&self.data_file, self.index_column.as_deref())
            .with_context(|| format!("Failed to read data file: {}", self.data_file))?;
        let network = match self.layout {
            DataLayout::Long => MCNetwork::from_frame_long(
                &table.frame,
                &table.attributes,
                &self.name_column,
                &self.streams,
                &self.name,
                &self.variables,
            )?,
            DataLayout::Wide => {
                MCNetwork::from_frame_wide(&table.frame, &self.streams, &self.name, &self.variables)?
            }
        };
        Ok(network.with_tolerance(self.tolerance))
    }
}
