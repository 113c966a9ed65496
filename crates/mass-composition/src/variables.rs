//! Variable detection and metadata.
//!
//! Input columns are matched against patterns for wet mass, dry mass and
//! moisture; every other numeric column is treated as a chemical analyte
//! reported as mass percent of the dry mass.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MassCompositionError, Result};

pub const MASS_WET: &str = "mass_wet";
pub const MASS_DRY: &str = "mass_dry";
pub const MOISTURE: &str = "h2o";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    MassWet,
    MassDry,
    Moisture,
    Chemistry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Canonical name
    pub name: String,
    /// Name of the column the variable was read from
    pub column_name: String,
    pub kind: VariableKind,
    /// printf-style format, e.g. "%.2f"
    pub format: String,
    /// Inclusive (min, max) bounds used by the status check
    pub bounds: (f64, f64),
}

impl Variable {
    fn new(name: &str, column_name: &str, kind: VariableKind, config: &VariableConfig) -> Self {
        let format = config
            .formats
            .get(name)
            .cloned()
            .unwrap_or_else(|| match kind {
                VariableKind::MassWet | VariableKind::MassDry => config.mass_format.clone(),
                _ => config.composition_format.clone(),
            });
        let bounds = config.bounds.get(name).copied().unwrap_or(match kind {
            VariableKind::MassWet | VariableKind::MassDry => (0.0, f64::INFINITY),
            _ => (0.0, 100.0),
        });
        Self {
            name: name.to_string(),
            column_name: column_name.to_string(),
            kind,
            format,
            bounds,
        }
    }

    /// Render a value with the variable's format.
    pub fn format_value(&self, value: f64) -> String {
        format_number(&self.format, value)
    }
}

/// Render `value` using a printf-style precision format ("%.2f", "%.0f").
pub fn format_number(format: &str, value: f64) -> String {
    let precision = format
        .trim_start_matches('%')
        .trim_start_matches('.')
        .trim_end_matches('f')
        .parse::<usize>()
        .unwrap_or(2);
    format!("{:.*}", precision, value)
}

/// Detection patterns, formats and bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableConfig {
    pub mass_wet_patterns: Vec<String>,
    pub mass_dry_patterns: Vec<String>,
    pub moisture_patterns: Vec<String>,
    pub mass_format: String,
    pub composition_format: String,
    /// Per-variable format overrides keyed by canonical name
    pub formats: BTreeMap<String, String>,
    /// Per-variable bound overrides keyed by canonical name
    pub bounds: BTreeMap<String, (f64, f64)>,
}

impl Default for VariableConfig {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            mass_wet_patterns: owned(&["mass_wet", "wet_mass", "wmt", "mass_wmt"]),
            mass_dry_patterns: owned(&["mass_dry", "dry_mass", "dmt", "mass_dmt"]),
            moisture_patterns: owned(&["h2o", "moisture", "moisture_pct", "h2o_pct"]),
            mass_format: "%.0f".to_string(),
            composition_format: "%.2f".to_string(),
            formats: BTreeMap::new(),
            bounds: BTreeMap::new(),
        }
    }
}

impl VariableConfig {
    pub fn detect(&self, column: &str) -> VariableKind {
        let lower = column.to_lowercase();
        let hit = |patterns: &[String]| patterns.iter().any(|p| p.to_lowercase() == lower);
        if hit(&self.mass_wet_patterns) {
            VariableKind::MassWet
        } else if hit(&self.mass_dry_patterns) {
            VariableKind::MassDry
        } else if hit(&self.moisture_patterns) {
            VariableKind::Moisture
        } else {
            VariableKind::Chemistry
        }
    }
}

/// Ordered variable set: `mass_wet, mass_dry, h2o, analytes...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    pub vars: Vec<Variable>,
}

/// Where each canonical variable came from in the input columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    pub mass_wet: Option<usize>,
    pub mass_dry: Option<usize>,
    pub moisture: Option<usize>,
    pub chemistry: Vec<usize>,
}

impl Variables {
    /// Detect variables from input column names.
    ///
    /// Returns the ordered variable set along with the position of each source
    /// column. Masses and moisture are always present in the output, even when
    /// they are solved rather than supplied.
    pub fn from_columns(columns: &[String], config: &VariableConfig) -> Result<(Self, ColumnMapping)> {
        let mut mapping = ColumnMapping::default();
        let mut names: [Option<String>; 3] = [None, None, None];

        for (j, col) in columns.iter().enumerate() {
            let kind = config.detect(col);
            let (slot, pos) = match kind {
                VariableKind::MassWet => (0, &mut mapping.mass_wet),
                VariableKind::MassDry => (1, &mut mapping.mass_dry),
                VariableKind::Moisture => (2, &mut mapping.moisture),
                VariableKind::Chemistry => {
                    mapping.chemistry.push(j);
                    continue;
                }
            };
            if pos.is_some() {
                return Err(MassCompositionError::DuplicateVariable(col.clone()));
            }
            *pos = Some(j);
            names[slot] = Some(col.clone());
        }

        let mut vars = vec![
            Variable::new(
                MASS_WET,
                names[0].as_deref().unwrap_or(MASS_WET),
                VariableKind::MassWet,
                config,
            ),
            Variable::new(
                MASS_DRY,
                names[1].as_deref().unwrap_or(MASS_DRY),
                VariableKind::MassDry,
                config,
            ),
            Variable::new(
                MOISTURE,
                names[2].as_deref().unwrap_or(MOISTURE),
                VariableKind::Moisture,
                config,
            ),
        ];
        for &j in &mapping.chemistry {
            vars.push(Variable::new(&columns[j], &columns[j], VariableKind::Chemistry, config));
        }

        Ok((Self { vars }, mapping))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.vars.iter().map(|v| v.name.clone()).collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.vars.iter().map(|v| v.column_name.clone()).collect()
    }

    pub fn chemistry_names(&self) -> Vec<String> {
        self.vars
            .iter()
            .filter(|v| v.kind == VariableKind::Chemistry)
            .map(|v| v.name.clone())
            .collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.vars
            .iter()
            .position(|v| v.name == name || v.column_name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.position(name).map(|i| &self.vars[i])
    }

    /// Look up formats for the requested columns.
    ///
    /// With `strip_percent` the leading '%' is removed from each format.
    pub fn column_formats(&self, columns: &[String], strip_percent: bool) -> BTreeMap<String, String> {
        let mut formats = BTreeMap::new();
        for col in columns {
            if let Some(v) = self.get(col) {
                let fmt = if strip_percent {
                    v.format.trim_start_matches('%').to_string()
                } else {
                    v.format.clone()
                };
                formats.insert(col.clone(), fmt);
            }
        }
        formats
    }

    /// True when both sets carry the same canonical names in the same order.
    pub fn same_names(&self, other: &Variables) -> bool {
        self.names() == other.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_masses_and_analytes() {
        let (vars, mapping) = Variables::from_columns(
            &cols(&["wet_mass", "mass_dry", "FE", "SIO2"]),
            &VariableConfig::default(),
        )
        .unwrap();
        assert_eq!(vars.names(), vec!["mass_wet", "mass_dry", "h2o", "FE", "SIO2"]);
        assert_eq!(vars.get("mass_wet").unwrap().column_name, "wet_mass");
        assert_eq!(mapping.mass_wet, Some(0));
        assert_eq!(mapping.moisture, None);
        assert_eq!(mapping.chemistry, vec![2, 3]);
    }

    #[test]
    fn duplicate_detection_fails() {
        let res = Variables::from_columns(&cols(&["mass_dry", "DMT"]), &VariableConfig::default());
        assert!(matches!(res, Err(MassCompositionError::DuplicateVariable(_))));
    }

    #[test]
    fn formats_and_bounds() {
        let (vars, _) =
            Variables::from_columns(&cols(&["mass_dry", "Fe"]), &VariableConfig::default()).unwrap();
        assert_eq!(vars.get("mass_dry").unwrap().format_value(1234.56), "1235");
        assert_eq!(vars.get("Fe").unwrap().format_value(57.123), "57.12");
        assert_eq!(vars.get("Fe").unwrap().bounds, (0.0, 100.0));
        let fmts = vars.column_formats(&cols(&["Fe"]), true);
        assert_eq!(fmts["Fe"], ".2f");
    }
}
