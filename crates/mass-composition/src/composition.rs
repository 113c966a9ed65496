//! The mass-composition dataset.
//!
//! A `MassComposition` stores one row per record with columns ordered
//! `mass_wet, mass_dry, h2o, analytes...`. Analytes are mass percent of the dry
//! mass, so combining records always goes through component masses
//! (`dry * grade / 100`) and back.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use itertools_num::linspace;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{MassCompositionError, Result};
use crate::frame::Frame;
use crate::variables::{VariableConfig, VariableKind, Variables, MASS_DRY, MASS_WET, MOISTURE};

const WET: usize = 0;
const DRY: usize = 1;
const H2O: usize = 2;
const FIRST_ANALYTE: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct MassComposition {
    pub name: String,
    pub index_name: String,
    pub index: Vec<String>,
    pub variables: Variables,
    /// Records x variables, ordered as `variables`
    pub data: Array2<f64>,
    /// Non-numeric columns carried alongside the records
    pub attributes: BTreeMap<String, Vec<String>>,
    /// (from, to) node ids when the stream is placed on a network
    pub nodes: Option<(usize, usize)>,
}

/// Outcome of the bounds check across all records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Status {
    pub ok: bool,
    pub failing_components: Vec<String>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.ok {
            write!(f, "OK")
        } else {
            write!(f, "failing: {}", self.failing_components.join(", "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinDirection {
    Ascending,
    Descending,
}

impl FromStr for BinDirection {
    type Err = MassCompositionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ascending" | "asc" => Ok(BinDirection::Ascending),
            "descending" | "desc" => Ok(BinDirection::Descending),
            _ => Err(MassCompositionError::InvalidArgument(format!(
                "direction must be 'ascending' or 'descending', found '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    const TOKENS: [(&'static str, CmpOp); 6] = [
        (">=", CmpOp::Ge),
        ("<=", CmpOp::Le),
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        (">", CmpOp::Gt),
        ("<", CmpOp::Lt),
    ];

    fn eval(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CriterionValue {
    Number(f64),
    Text(String),
}

/// A single record filter, e.g. `Fe > 58` or `group == grp_1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub variable: String,
    pub op: CmpOp,
    pub value: CriterionValue,
}

impl FromStr for Criterion {
    type Err = MassCompositionError;

    fn from_str(s: &str) -> Result<Self> {
        for (token, op) in CmpOp::TOKENS {
            if let Some(at) = s.find(token) {
                let variable = s[..at].trim();
                let raw = s[at + token.len()..].trim().trim_matches(|c| c == '\'' || c == '"');
                if variable.is_empty() || raw.is_empty() {
                    break;
                }
                let value = match raw.parse::<f64>() {
                    Ok(v) => CriterionValue::Number(v),
                    Err(_) => CriterionValue::Text(raw.to_string()),
                };
                return Ok(Criterion {
                    variable: variable.to_string(),
                    op,
                    value,
                });
            }
        }
        Err(MassCompositionError::InvalidArgument(format!(
            "cannot parse criterion '{}'",
            s
        )))
    }
}

impl MassComposition {
    /// Build from a numeric frame, detecting variables and solving the
    /// wet mass / dry mass / moisture triangle.
    pub fn from_frame(frame: Frame, name: &str, config: &VariableConfig) -> Result<Self> {
        Self::from_frame_with_attributes(frame, BTreeMap::new(), name, config)
    }

    pub fn from_frame_with_attributes(
        frame: Frame,
        attributes: BTreeMap<String, Vec<String>>,
        name: &str,
        config: &VariableConfig,
    ) -> Result<Self> {
        if let Some((key, values)) = attributes.iter().find(|(_, v)| v.len() != frame.nrows()) {
            log::error!("attribute '{}' does not match the record count", key);
            return Err(MassCompositionError::ShapeMismatch {
                rows: frame.nrows(),
                cols: 1,
                len: values.len(),
            });
        }

        let (variables, mapping) = Variables::from_columns(&frame.columns, config)?;
        let n = frame.nrows();
        let col = |pos: Option<usize>| pos.map(|j| frame.values.column(j).to_owned());

        let wet = col(mapping.mass_wet);
        let dry = col(mapping.mass_dry);
        let h2o = col(mapping.moisture);

        let (wet, dry, h2o) = match (wet, dry, h2o) {
            (Some(w), Some(d), Some(m)) => (w, d, m),
            (Some(w), Some(d), None) => {
                let m = ndarray::Zip::from(&w).and(&d).map_collect(|&w, &d| moisture(w, d));
                (w, d, m)
            }
            (Some(w), None, Some(m)) => {
                let d = ndarray::Zip::from(&w).and(&m).map_collect(|&w, &m| w * (1.0 - m / 100.0));
                (w, d, m)
            }
            (None, Some(d), Some(m)) => {
                let w = ndarray::Zip::from(&d).and(&m).map_collect(|&d, &m| d / (1.0 - m / 100.0));
                (w, d, m)
            }
            (None, Some(d), None) => {
                log::debug!("'{}' has dry mass only: assuming zero moisture", name);
                (d.clone(), d, Array1::zeros(n))
            }
            _ => return Err(MassCompositionError::MissingMass(name.to_string())),
        };

        let mut data = Array2::<f64>::zeros((n, variables.len()));
        data.column_mut(WET).assign(&wet);
        data.column_mut(DRY).assign(&dry);
        data.column_mut(H2O).assign(&h2o);
        for (k, &j) in mapping.chemistry.iter().enumerate() {
            data.column_mut(FIRST_ANALYTE + k).assign(&frame.values.column(j));
        }

        log::debug!(
            "Created '{}' with {} records and {} analytes",
            name,
            n,
            mapping.chemistry.len()
        );

        Ok(Self {
            name: name.to_string(),
            index_name: frame.index_name,
            index: frame.index,
            variables,
            data,
            attributes,
            nodes: None,
        })
    }

    /// Rebuild composition from a component-mass table laid out as
    /// `mass_wet, mass_dry, <component masses>`.
    fn from_component_masses(&self, name: &str, masses: Array2<f64>) -> Self {
        let mut data = Array2::<f64>::zeros((masses.nrows(), self.variables.len()));
        for (i, row) in masses.rows().into_iter().enumerate() {
            let (w, d) = (row[0], row[1]);
            data[(i, WET)] = w;
            data[(i, DRY)] = d;
            data[(i, H2O)] = moisture(w, d);
            for k in 2..row.len() {
                data[(i, FIRST_ANALYTE + k - 2)] = grade(row[k], d);
            }
        }
        Self {
            name: name.to_string(),
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            variables: self.variables.clone(),
            data,
            attributes: self.attributes.clone(),
            nodes: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn set_nodes(&mut self, from: usize, to: usize) {
        self.nodes = Some((from, to));
    }

    pub fn analyte_names(&self) -> Vec<String> {
        self.variables.chemistry_names()
    }

    pub fn values_of(&self, variable: &str) -> Result<Array1<f64>> {
        let j = self
            .variables
            .position(variable)
            .ok_or_else(|| MassCompositionError::MissingColumn(variable.to_string()))?;
        Ok(self.data.column(j).to_owned())
    }

    /// Records x `[mass_wet, mass_dry, component masses...]`.
    pub fn component_masses(&self) -> Array2<f64> {
        component_masses(self.data.view())
    }

    /// Component masses as a frame (`mass_wet, mass_dry, <analytes>`).
    pub fn mass_component_frame(&self) -> Frame {
        let mut columns = vec![MASS_WET.to_string(), MASS_DRY.to_string()];
        columns.extend(self.analyte_names());
        Frame {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns,
            values: self.component_masses(),
        }
    }

    /// Weighted average of all records: summed masses, moisture from the summed
    /// masses, analytes weighted by dry mass.
    pub fn weight_average(&self) -> Array1<f64> {
        weight_average(self.data.view())
    }

    /// One-row frame labelled with the stream name.
    pub fn aggregate(&self) -> Frame {
        let row = self.weight_average();
        Frame {
            index_name: "name".to_string(),
            index: vec![self.name.clone()],
            columns: self.variables.names(),
            values: row.insert_axis(Axis(0)),
        }
    }

    fn check_compatible(&self, other: &MassComposition) -> Result<()> {
        if self.index != other.index {
            return Err(MassCompositionError::IndexMismatch(format!(
                "'{}' and '{}' have different record indexes",
                self.name, other.name
            )));
        }
        if !self.variables.same_names(&other.variables) {
            return Err(MassCompositionError::VariableMismatch(format!(
                "{:?} != {:?}",
                self.variables.names(),
                other.variables.names()
            )));
        }
        Ok(())
    }

    /// Record-wise sum of two streams.
    pub fn add(&self, other: &MassComposition, name: &str) -> Result<Self> {
        self.check_compatible(other)?;
        let masses = &self.component_masses() + &other.component_masses();
        Ok(self.from_component_masses(name, masses))
    }

    /// Record-wise difference of two streams.
    pub fn sub(&self, other: &MassComposition, name: &str) -> Result<Self> {
        self.check_compatible(other)?;
        let masses = &self.component_masses() - &other.component_masses();
        Ok(self.from_component_masses(name, masses))
    }

    /// Record-wise recovery of `self` relative to `other` for masses and
    /// component masses.
    pub fn div(&self, other: &MassComposition, name: &str) -> Result<Frame> {
        self.check_compatible(other)?;
        let ratio = ndarray::Zip::from(&self.component_masses())
            .and(&other.component_masses())
            .map_collect(|&a, &b| if b == 0.0 { f64::NAN } else { a / b });
        let mut frame = self.mass_component_frame();
        frame.values = ratio;
        frame.index_name = self.index_name.clone();
        log::debug!("Calculated recovery '{}' = '{}' / '{}'", name, self.name, other.name);
        Ok(frame)
    }

    /// Split into two streams of identical composition carrying `fraction` and
    /// `1 - fraction` of the mass.
    pub fn split(&self, fraction: f64, name_a: &str, name_b: &str) -> Result<(Self, Self)> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(MassCompositionError::InvalidArgument(format!(
                "split fraction must lie in [0, 1], found {}",
                fraction
            )));
        }
        let scale = |f: f64, name: &str| {
            let mut out = self.clone().with_name(name);
            out.nodes = None;
            out.data.column_mut(WET).mapv_inplace(|v| v * f);
            out.data.column_mut(DRY).mapv_inplace(|v| v * f);
            out
        };
        Ok((scale(fraction, name_a), scale(1.0 - fraction, name_b)))
    }

    fn filter_rows(&self, rows: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            index_name: self.index_name.clone(),
            index: rows.iter().map(|&i| self.index[i].clone()).collect(),
            variables: self.variables.clone(),
            data: self.data.select(Axis(0), rows),
            attributes: self
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), rows.iter().map(|&i| v[i].clone()).collect()))
                .collect(),
            nodes: self.nodes,
        }
    }

    /// Keep the records satisfying every criterion.
    pub fn query(&self, criteria: &[Criterion]) -> Result<Self> {
        let mut keep = vec![true; self.len()];
        for criterion in criteria {
            match &criterion.value {
                CriterionValue::Number(rhs) => {
                    let values = self.values_of(&criterion.variable)?;
                    for (k, v) in keep.iter_mut().zip(values.iter()) {
                        *k &= !v.is_nan() && criterion.op.eval(*v, *rhs);
                    }
                }
                CriterionValue::Text(rhs) => {
                    let values = self
                        .attributes
                        .get(&criterion.variable)
                        .ok_or_else(|| MassCompositionError::MissingColumn(criterion.variable.clone()))?;
                    let equal = match criterion.op {
                        CmpOp::Eq => true,
                        CmpOp::Ne => false,
                        _ => {
                            return Err(MassCompositionError::InvalidArgument(format!(
                                "attribute '{}' only supports == and !=",
                                criterion.variable
                            )))
                        }
                    };
                    for (k, v) in keep.iter_mut().zip(values.iter()) {
                        *k &= (v == rhs) == equal;
                    }
                }
            }
        }
        let rows: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        log::debug!("Query on '{}' kept {} of {} records", self.name, rows.len(), self.len());
        Ok(self.filter_rows(&rows))
    }

    /// Keep records by index label, in the order given.
    pub fn select_index(&self, labels: &[String]) -> Result<Self> {
        let rows = labels
            .iter()
            .map(|label| {
                self.index.iter().position(|i| i == label).ok_or_else(|| {
                    MassCompositionError::IndexMismatch(format!(
                        "'{}' has no record labelled '{}'",
                        self.name, label
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(self.filter_rows(&rows))
    }

    /// Grade-tonnage table binned on `cutoff_var`.
    ///
    /// Bins are `[left, right)`. Cumulative ascending rows include every record
    /// below the right edge; cumulative descending rows include every record at
    /// or above the left edge.
    pub fn binned_mass_composition(
        &self,
        cutoff_var: &str,
        bin_width: f64,
        cumulative: bool,
        direction: BinDirection,
    ) -> Result<Frame> {
        if !(bin_width > 0.0) {
            return Err(MassCompositionError::InvalidArgument(format!(
                "bin_width must be positive, found {}",
                bin_width
            )));
        }
        let cutoff = self.values_of(cutoff_var)?;
        let (min, max) = cutoff
            .iter()
            .filter(|v| !v.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if !min.is_finite() {
            return Err(MassCompositionError::InvalidArgument(format!(
                "'{}' has no values to bin",
                cutoff_var
            )));
        }

        // Edges are whole multiples of the width, rounded the same way records
        // are compared against them: first edge <= min and last edge > max.
        let edge = |k: f64| round_edge(k * bin_width);
        let mut k_lo = (min / bin_width).floor();
        if edge(k_lo) > min {
            k_lo -= 1.0;
        }
        let mut k_hi = (max / bin_width).floor() + 1.0;
        if edge(k_hi) <= max {
            k_hi += 1.0;
        } else if edge(k_hi - 1.0) > max {
            k_hi -= 1.0;
        }
        let span = k_hi - k_lo;
        if !span.is_finite()
            || span > MAX_BINS as f64
            || edge(k_lo) > min
            || edge(k_hi) <= max
        {
            return Err(MassCompositionError::InvalidArgument(format!(
                "bin_width {} splits '{}' into more than {} bins",
                bin_width, cutoff_var, MAX_BINS
            )));
        }
        let n_bins = span as usize;
        let edges: Vec<f64> = linspace(k_lo, k_hi, n_bins + 1)
            .map(|k| edge(k.round()))
            .collect();

        let mut columns = vec!["bin_left".to_string(), "bin_right".to_string()];
        columns.extend(self.variables.names());
        let mut index = Vec::with_capacity(n_bins);
        let mut rows = Vec::with_capacity(n_bins);

        for b in 0..n_bins {
            let (left, right) = (edges[b], edges[b + 1]);
            let selected: Vec<usize> = cutoff
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_nan())
                .filter(|&(_, &v)| match (cumulative, direction) {
                    (false, _) => v >= left && v < right,
                    (true, BinDirection::Ascending) => v < right,
                    (true, BinDirection::Descending) => v >= left,
                })
                .map(|(i, _)| i)
                .collect();
            let agg = weight_average(self.data.select(Axis(0), &selected).view());
            let mut row = vec![left, right];
            row.extend(agg.iter());
            rows.push(row);
            index.push(format!("[{}, {})", left, right));
        }

        log::debug!(
            "Binned '{}' on '{}' into {} bins of width {}",
            self.name,
            cutoff_var,
            n_bins,
            bin_width
        );
        Frame::from_rows(cutoff_var, index, columns, rows)
    }

    /// Check every record against the variable bounds.
    pub fn status(&self) -> Status {
        let mut failing = Vec::new();
        for (j, var) in self.variables.vars.iter().enumerate() {
            let (lo, hi) = var.bounds;
            let out_of_range = self
                .data
                .column(j)
                .iter()
                .any(|&v| !v.is_nan() && (v < lo || v > hi));
            if out_of_range {
                failing.push(var.name.clone());
            }
        }
        Status {
            ok: failing.is_empty(),
            failing_components: failing,
        }
    }

    /// Export the records; optionally restore the input column names.
    pub fn to_frame(&self, original_column_names: bool) -> Frame {
        let columns = if original_column_names {
            self.variables.column_names()
        } else {
            self.variables.names()
        };
        Frame {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns,
            values: self.data.clone(),
        }
    }

    /// Replace the record values, keeping index and variables.
    pub fn set_data(&mut self, data: Array2<f64>) -> Result<()> {
        if data.dim() != self.data.dim() {
            return Err(MassCompositionError::ShapeMismatch {
                rows: self.data.nrows(),
                cols: self.data.ncols(),
                len: data.len(),
            });
        }
        self.data = data;
        Ok(())
    }

    /// Reindex to `labels`, filling new records with zero mass.
    pub fn reindex_zero_fill(&self, labels: &[String]) -> Self {
        let mut data = Array2::<f64>::zeros((labels.len(), self.variables.len()));
        let mut attributes: BTreeMap<String, Vec<String>> = self
            .attributes
            .keys()
            .map(|k| (k.clone(), vec![String::new(); labels.len()]))
            .collect();
        for (i, label) in labels.iter().enumerate() {
            match self.index.iter().position(|l| l == label) {
                Some(src) => {
                    data.row_mut(i).assign(&self.data.row(src));
                    for (k, v) in attributes.iter_mut() {
                        v[i] = self.attributes[k][src].clone();
                    }
                }
                None => {
                    for (j, var) in self.variables.vars.iter().enumerate() {
                        if var.kind == VariableKind::Chemistry || var.name == MOISTURE {
                            data[(i, j)] = f64::NAN;
                        }
                    }
                    data[(i, H2O)] = 0.0;
                }
            }
        }
        Self {
            name: self.name.clone(),
            index_name: self.index_name.clone(),
            index: labels.to_vec(),
            variables: self.variables.clone(),
            data,
            attributes,
            nodes: self.nodes,
        }
    }
}

/// Moisture percent from wet and dry masses.
pub fn moisture(wet: f64, dry: f64) -> f64 {
    if wet == 0.0 {
        if dry == 0.0 {
            0.0
        } else {
            f64::NAN
        }
    } else {
        (wet - dry) / wet * 100.0
    }
}

fn grade(component_mass: f64, dry: f64) -> f64 {
    if dry == 0.0 {
        f64::NAN
    } else {
        component_mass / dry * 100.0
    }
}

const MAX_BINS: usize = 100_000;

fn round_edge(v: f64) -> f64 {
    (v * 1e10).round() / 1e10
}

/// Records x `[mass_wet, mass_dry, component masses...]` from composition data.
pub fn component_masses(data: ArrayView2<f64>) -> Array2<f64> {
    let n_analytes = data.ncols().saturating_sub(FIRST_ANALYTE);
    let mut out = Array2::<f64>::zeros((data.nrows(), 2 + n_analytes));
    for (i, row) in data.rows().into_iter().enumerate() {
        out[(i, 0)] = row[WET];
        out[(i, 1)] = row[DRY];
        for k in 0..n_analytes {
            out[(i, 2 + k)] = row[DRY] * row[FIRST_ANALYTE + k] / 100.0;
        }
    }
    out
}

/// Weighted average of composition data, skipping NaN.
pub fn weight_average(data: ArrayView2<f64>) -> Array1<f64> {
    let mut out = Array1::<f64>::from_elem(data.ncols(), f64::NAN);
    let wet: f64 = data.column(WET).iter().filter(|v| !v.is_nan()).sum();
    let dry: f64 = data.column(DRY).iter().filter(|v| !v.is_nan()).sum();
    out[WET] = wet;
    out[DRY] = dry;
    out[H2O] = if wet > 0.0 { moisture(wet, dry) } else { f64::NAN };
    for j in FIRST_ANALYTE..data.ncols() {
        let (num, den) = data
            .column(DRY)
            .iter()
            .zip(data.column(j).iter())
            .filter(|(d, g)| !d.is_nan() && !g.is_nan())
            .fold((0.0, 0.0), |(num, den), (&d, &g)| (num + d * g, den + d));
        out[j] = if den > 0.0 { num / den } else { f64::NAN };
    }
    out
}
