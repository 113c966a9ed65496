//! Data reconciliation of a stream network.
//!
//! Every record is balanced on its own: the estimate is pulled towards the
//! measurements (weighted by their standard deviation) while the mass and
//! component mass imbalance across balance nodes is driven to zero.
use std::collections::BTreeMap;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::composition::MassComposition;
use crate::error::{MassCompositionError, Result};
use crate::frame::Frame;
use crate::network::MCNetwork;
use crate::optimize::{nelder_mead, NelderMeadOptions};

/// Standard deviation of ordinary measurements.
const SD_DEFAULT: f64 = 1.0;
/// Standard deviation of the best measured streams.
const SD_BEST: f64 = 0.1;
/// Standard deviation of the best measured streams when locked.
const SD_LOCKED: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestMeasurements {
    Input,
    Output,
}

impl FromStr for BestMeasurements {
    type Err = MassCompositionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "input" => Ok(BestMeasurements::Input),
            "output" => Ok(BestMeasurements::Output),
            _ => Err(MassCompositionError::InvalidArgument(format!(
                "best_measurements must be 'input' or 'output', found '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub best_measurements: Option<BestMeasurements>,
    pub best_locked: bool,
    pub xatol: f64,
    pub fatol: f64,
    pub max_iter: Option<usize>,
    pub parallel: bool,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            best_measurements: Some(BestMeasurements::Input),
            best_locked: false,
            xatol: 1e-8,
            fatol: 1e-4,
            max_iter: None,
            parallel: true,
        }
    }
}

impl BalanceConfig {
    /// Simplex options for `n` free variables. The evaluation limit is twice
    /// the iteration limit, which defaults to `200 * n`.
    fn optimizer_options(&self, n: usize) -> NelderMeadOptions {
        let max_iter = self.max_iter.unwrap_or(200 * n.max(1));
        NelderMeadOptions {
            xatol: self.xatol,
            fatol: self.fatol,
            max_iter: Some(max_iter),
            max_fev: Some(2 * max_iter),
        }
    }
}

/// Balanced estimates and residuals, one row per stream record.
#[derive(Debug, Clone)]
pub struct BalanceResult {
    pub balanced: Frame,
    /// `balanced - measured`
    pub residuals: Frame,
    /// Stream name of each row
    pub names: Vec<String>,
    /// True when every record converged
    pub converged: bool,
}

#[derive(Debug)]
struct RecordSolution {
    /// streams x components
    estimate: Array2<f64>,
    converged: bool,
}

pub struct MCBalance<'a> {
    network: &'a MCNetwork,
    pub config: BalanceConfig,
    /// Standard deviations, streams x components
    pub sd: Frame,
    /// (input edges, output edges) of every balance node
    relationships: Vec<(Vec<usize>, Vec<usize>)>,
}

impl<'a> MCBalance<'a> {
    pub fn new(network: &'a MCNetwork, config: BalanceConfig) -> Result<Self> {
        let sd = create_balance_config(network, config.best_measurements, config.best_locked)?;
        let relationships = network
            .balance_nodes()
            .into_iter()
            .map(|n| {
                let node = &network.nodes[n];
                (node.inputs.clone(), node.outputs.clone())
            })
            .collect();
        Ok(Self {
            network,
            config,
            sd,
            relationships,
        })
    }

    /// Component names in optimisation order.
    pub fn components(&self) -> &[String] {
        &self.sd.columns
    }

    /// Measured values of one record, streams x components.
    fn measured(&self, record: usize) -> Array2<f64> {
        let n_comp = self.sd.ncols();
        let mut xm = Array2::<f64>::zeros((self.network.edges.len(), n_comp));
        for (s, stream) in self.network.streams().enumerate() {
            for k in 0..n_comp {
                xm[(s, k)] = stream.data[(record, k + 1)];
            }
        }
        xm
    }

    fn solve_record(&self, record: usize) -> RecordSolution {
        let xm = self.measured(record);
        let (n_streams, n_comp) = xm.dim();

        let free: Vec<usize> = (0..n_comp)
            .filter(|&k| xm.column(k).iter().any(|v| v.is_finite() && *v != 0.0))
            .collect();

        let mut start = xm.clone();
        for &k in &free {
            let finite: Vec<f64> = xm.column(k).iter().copied().filter(|v| v.is_finite()).collect();
            let mean = finite.iter().sum::<f64>() / finite.len() as f64;
            for s in 0..n_streams {
                if !start[(s, k)].is_finite() {
                    start[(s, k)] = mean;
                }
            }
        }

        let unpack = |x: &[f64]| -> Array2<f64> {
            let mut est = start.clone();
            for (f, &k) in free.iter().enumerate() {
                for s in 0..n_streams {
                    est[(s, k)] = x[f * n_streams + s];
                }
            }
            est
        };
        let x0: Vec<f64> = free
            .iter()
            .flat_map(|&k| (0..n_streams).map(move |s| (s, k)))
            .map(|idx| start[idx])
            .collect();

        let sd = &self.sd.values;
        let objective = |x: &[f64]| cost(&unpack(x), &xm, sd, &self.relationships);
        let res = nelder_mead(objective, &x0, &self.config.optimizer_options(x0.len()));
        log::debug!(
            "record {}: cost {:e} after {} iterations",
            self.network.edges[0].stream.index[record],
            res.fun,
            res.iterations
        );
        RecordSolution {
            estimate: unpack(&res.x),
            converged: res.converged,
        }
    }

    /// Reconcile every record.
    pub fn optimise(&self) -> Result<BalanceResult> {
        let template = &self
            .network
            .edges
            .first()
            .ok_or_else(|| MassCompositionError::InvalidArgument("the network has no streams".into()))?
            .stream;
        let n_records = template.len();
        log::info!(
            "Balancing {} records across {} nodes of '{}'",
            n_records,
            self.relationships.len(),
            self.network.name
        );

        let solutions: Vec<RecordSolution> = if self.config.parallel {
            (0..n_records).into_par_iter().map(|r| self.solve_record(r)).collect()
        } else {
            (0..n_records).map(|r| self.solve_record(r)).collect()
        };

        let converged = solutions.iter().all(|s| s.converged);
        if !converged {
            log::warn!(
                "{} of {} records did not converge",
                solutions.iter().filter(|s| !s.converged).count(),
                n_records
            );
        }

        let n_streams = self.network.edges.len();
        let mut index = Vec::with_capacity(n_streams * n_records);
        let mut names = Vec::with_capacity(n_streams * n_records);
        let mut balanced = Array2::<f64>::zeros((n_streams * n_records, self.sd.ncols()));
        let mut measured = balanced.clone();
        for (s, stream) in self.network.streams().enumerate() {
            for (r, solution) in solutions.iter().enumerate() {
                let row = s * n_records + r;
                balanced.row_mut(row).assign(&solution.estimate.row(s));
                measured.row_mut(row).assign(&self.measured(r).row(s));
                index.push(stream.index[r].clone());
                names.push(stream.name.clone());
            }
        }

        let residuals = &balanced - &measured;
        let frame = |values: Array2<f64>| {
            Frame::new(
                template.index_name.clone(),
                index.clone(),
                self.sd.columns.clone(),
                values,
            )
        };
        Ok(BalanceResult {
            balanced: frame(balanced)?,
            residuals: frame(residuals)?,
            names,
            converged,
        })
    }

    /// The network rebuilt from balanced values, with wet mass recomputed from
    /// the balanced dry mass and moisture.
    pub fn balanced_network(&self, result: &BalanceResult) -> Result<MCNetwork> {
        let mut streams: Vec<MassComposition> = Vec::with_capacity(self.network.edges.len());
        for stream in self.network.streams() {
            let rows: Vec<usize> = result
                .names
                .iter()
                .enumerate()
                .filter_map(|(i, n)| (n == &stream.name).then_some(i))
                .collect();
            if rows.len() != stream.len() {
                return Err(MassCompositionError::ShapeMismatch {
                    rows: stream.len(),
                    cols: stream.variables.len(),
                    len: rows.len(),
                });
            }
            let values = result.balanced.values.select(Axis(0), &rows);
            let mut data = Array2::<f64>::zeros(stream.data.dim());
            for (i, row) in values.rows().into_iter().enumerate() {
                let (dry, h2o) = (row[0], row[1]);
                data[(i, 0)] = dry / (1.0 - h2o / 100.0);
                for (k, v) in row.iter().enumerate() {
                    data[(i, k + 1)] = *v;
                }
            }
            let mut out = stream.clone();
            out.set_data(data)?;
            streams.push(out);
        }
        self.network.with_streams(streams)
    }
}

/// Standard deviations of every stream measurement.
///
/// Rows are streams in edge order; columns are `mass_dry, h2o, analytes`.
pub fn create_balance_config(
    network: &MCNetwork,
    best_measurements: Option<BestMeasurements>,
    best_locked: bool,
) -> Result<Frame> {
    let template = &network
        .edges
        .first()
        .ok_or_else(|| MassCompositionError::InvalidArgument("the network has no streams".into()))?
        .stream;
    let columns: Vec<String> = template.variables.names().into_iter().skip(1).collect();
    let names = network.edge_names();

    let mut values = Array2::<f64>::from_elem((names.len(), columns.len()), SD_DEFAULT);
    let best: Vec<String> = match best_measurements {
        Some(BestMeasurements::Input) => network.input_edges().iter().map(|s| s.name.clone()).collect(),
        Some(BestMeasurements::Output) => network.output_edges().iter().map(|s| s.name.clone()).collect(),
        None => Vec::new(),
    };
    let best_sd = if best_locked { SD_LOCKED } else { SD_BEST };
    for (i, name) in names.iter().enumerate() {
        if best.contains(name) {
            values.row_mut(i).fill(best_sd);
        }
    }
    Frame::new("name".to_string(), names, columns, values)
}

fn nan_to_num(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else if v.is_infinite() {
        f64::MAX.copysign(v)
    } else {
        v
    }
}

/// Objective for one record. `x`, `xm` and `sd` are streams x components with
/// components ordered `mass_dry, h2o, analytes`.
fn cost(
    x: &Array2<f64>,
    xm: &Array2<f64>,
    sd: &Array2<f64>,
    relationships: &[(Vec<usize>, Vec<usize>)],
) -> f64 {
    let mass_grades: f64 = ndarray::Zip::from(x)
        .and(xm)
        .and(sd)
        .fold(0.0, |acc, &est, &meas, &s| acc + nan_to_num(((meas - est) / (est * s)).powi(2)));

    let n_comp = x.ncols();
    let mut masses = x.clone();
    for mut row in masses.rows_mut() {
        let dry = row[0];
        for k in 1..n_comp {
            row[k] *= dry / 100.0;
        }
    }

    let mut node_balance = 0.0;
    for (inputs, outputs) in relationships {
        for k in 0..n_comp {
            let sum_in: f64 = inputs.iter().map(|&e| masses[(e, k)]).sum();
            let sum_out: f64 = outputs.iter().map(|&e| masses[(e, k)]).sum();
            node_balance += nan_to_num((sum_in - sum_out).powi(2));
        }
    }
    mass_grades + node_balance
}

/// Balance summary for logging: worst absolute residual per component.
pub fn max_abs_residuals(result: &BalanceResult) -> BTreeMap<String, f64> {
    result
        .residuals
        .columns
        .iter()
        .enumerate()
        .map(|(j, c)| {
            let worst = result
                .residuals
                .values
                .column(j)
                .iter()
                .filter(|v| !v.is_nan())
                .fold(0.0, |m: f64, v| m.max(v.abs()));
            (c.clone(), worst)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableConfig;

    /// feed -> node -> (lump, fines), dry mass and Fe only
    fn split_network(lump_error: f64) -> MCNetwork {
        let frame = Frame::from_rows(
            "index",
            vec!["0".into(), "1".into(), "2".into()],
            vec!["mass_dry".into(), "Fe".into()],
            vec![vec![90.0, 57.0], vec![80.0, 59.0], vec![90.0, 61.0]],
        )
        .unwrap();
        let mut feed = MassComposition::from_frame(frame, "feed", &VariableConfig::default()).unwrap();
        let (mut lump, mut fines) = feed.split(0.4, "lump", "fines").unwrap();
        lump.data[(0, 1)] += lump_error;
        feed.set_nodes(0, 1);
        lump.set_nodes(1, 2);
        fines.set_nodes(1, 3);
        MCNetwork::from_streams(vec![feed, lump, fines], "split").unwrap()
    }

    fn config() -> BalanceConfig {
        BalanceConfig {
            xatol: 1e-6,
            fatol: 1e-10,
            max_iter: Some(50_000),
            ..Default::default()
        }
    }

    #[test]
    fn sd_frame_marks_best_streams() {
        let net = split_network(0.0);
        let sd = create_balance_config(&net, Some(BestMeasurements::Input), false).unwrap();
        assert_eq!(sd.columns, vec!["mass_dry", "h2o", "Fe"]);
        assert_eq!(sd.index, vec!["feed", "lump", "fines"]);
        assert_eq!(sd.get("feed", "Fe"), Some(0.1));
        assert_eq!(sd.get("lump", "Fe"), Some(1.0));

        let locked = create_balance_config(&net, Some(BestMeasurements::Output), true).unwrap();
        assert_eq!(locked.get("feed", "mass_dry"), Some(1.0));
        assert_eq!(locked.get("fines", "mass_dry"), Some(0.001));

        let none = create_balance_config(&net, None, false).unwrap();
        assert!(none.values.iter().all(|&v| v == 1.0));
        assert!("both".parse::<BestMeasurements>().is_err());
    }

    #[test]
    fn cost_is_zero_for_balanced_measurements() {
        let net = split_network(0.0);
        let bal = MCBalance::new(&net, config()).unwrap();
        let xm = bal.measured(1);
        assert!(cost(&xm, &xm, &bal.sd.values, &bal.relationships).abs() < 1e-12);
        let perturbed = &xm + 1.0;
        assert!(cost(&perturbed, &xm, &bal.sd.values, &bal.relationships) > 0.0);
    }

    #[test]
    fn balancing_removes_the_imbalance() {
        let net = split_network(5.0);
        assert!(!net.balanced());
        let before = net.node_imbalance(1).unwrap().get("0", "mass_dry").unwrap();
        assert!((before + 5.0).abs() < 1e-9);

        let bal = MCBalance::new(&net, config()).unwrap();
        let result = bal.optimise().unwrap();
        assert_eq!(result.balanced.nrows(), 9);
        assert_eq!(result.names[0], "feed");
        assert_eq!(result.names[3], "lump");

        let balanced = bal.balanced_network(&result).unwrap();
        let after = balanced.node_imbalance(1).unwrap();
        let dry = after.column_position("mass_dry").unwrap();
        for v in after.values.column(dry) {
            assert!(v.abs() < 0.5, "imbalance {} remains", v);
        }
        // zero moisture is held, so wet mass equals dry mass
        let lump = balanced.get_edge_by_name("lump").unwrap();
        assert_eq!(lump.data[(0, 0)], lump.data[(0, 1)]);
    }

    #[test]
    fn missing_measurements_start_at_the_column_mean() {
        let mut net = split_network(0.0);
        net.edges[1].stream.data[(1, 3)] = f64::NAN;
        net.edges[1].stream.data[(1, 1)] += 3.0;
        let before = net.node_imbalance(1).unwrap();
        assert!(before.get("1", "Fe").unwrap().is_nan());

        let bal = MCBalance::new(&net, config()).unwrap();
        let result = bal.optimise().unwrap();
        // lump, record 1
        let fe = result.balanced.values[(4, 2)];
        assert!(fe.is_finite());
        assert!((fe - 59.0).abs() < 0.5, "lump Fe estimated as {}", fe);
        assert!(result.residuals.values[(4, 2)].is_nan());

        let after = bal.balanced_network(&result).unwrap().node_imbalance(1).unwrap();
        assert!(after.get("1", "Fe").unwrap().abs() < 0.5);
        assert!(after.get("1", "mass_dry").unwrap().abs() < 0.5);
    }

    #[test]
    fn default_limits_scale_with_free_variables() {
        let opts = BalanceConfig::default().optimizer_options(6);
        assert_eq!(opts.fatol, 1e-4);
        assert_eq!(opts.max_iter, Some(1200));
        assert_eq!(opts.max_fev, Some(2400));

        let capped = BalanceConfig {
            max_iter: Some(10),
            ..Default::default()
        };
        assert_eq!(capped.optimizer_options(6).max_fev, Some(20));
    }

    #[test]
    fn serial_and_parallel_runs_agree() {
        let net = split_network(2.0);
        let parallel = MCBalance::new(&net, config()).unwrap().optimise().unwrap();
        let serial_cfg = BalanceConfig {
            parallel: false,
            ..config()
        };
        let serial = MCBalance::new(&net, serial_cfg).unwrap().optimise().unwrap();
        assert_eq!(parallel.balanced.values, serial.balanced.values);
        let worst = max_abs_residuals(&serial);
        assert_eq!(worst["h2o"], 0.0);
    }
}
