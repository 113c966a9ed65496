//! Derivative-free minimisation with the Nelder-Mead simplex.
use std::cell::Cell;

use serde::{Deserialize, Serialize};

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;
const NONZERO_DELTA: f64 = 0.05;
const ZERO_DELTA: f64 = 0.00025;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadOptions {
    /// Absolute spread of the simplex vertices accepted for convergence
    pub xatol: f64,
    /// Absolute spread of the function values accepted for convergence
    pub fatol: f64,
    /// Iteration limit; `200 * n` when unset
    pub max_iter: Option<usize>,
    /// Function evaluation limit; `200 * n` when unset
    pub max_fev: Option<usize>,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            xatol: 1e-4,
            fatol: 1e-4,
            max_iter: None,
            max_fev: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeResult {
    pub x: Vec<f64>,
    pub fun: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

/// Minimise `f` starting from `x0`.
///
/// NaN objective values rank as +inf so the simplex moves away from them.
pub fn nelder_mead<F>(f: F, x0: &[f64], options: &NelderMeadOptions) -> OptimizeResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let max_iter = options.max_iter.unwrap_or(200 * n.max(1));
    let max_fev = options.max_fev.unwrap_or(200 * n.max(1));

    let evaluations = Cell::new(0usize);
    let eval = |x: &[f64]| {
        evaluations.set(evaluations.get() + 1);
        let v = f(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };

    if n == 0 {
        let fun = eval(x0);
        return OptimizeResult {
            x: Vec::new(),
            fun,
            iterations: 0,
            evaluations: 1,
            converged: true,
        };
    }

    let mut sim: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    sim.push(x0.to_vec());
    for k in 0..n {
        let mut y = x0.to_vec();
        y[k] = if y[k] != 0.0 {
            (1.0 + NONZERO_DELTA) * y[k]
        } else {
            ZERO_DELTA
        };
        sim.push(y);
    }
    let mut fsim: Vec<f64> = sim.iter().map(|x| eval(x)).collect();
    sort_simplex(&mut sim, &mut fsim);

    let mut iterations = 0usize;
    let mut converged = false;

    while iterations < max_iter {
        if has_converged(&sim, &fsim, options) {
            converged = true;
            break;
        }
        if evaluations.get() >= max_fev {
            break;
        }

        let worst = sim[n].clone();
        let centroid: Vec<f64> = (0..n)
            .map(|j| sim[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let towards = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(worst.iter())
                .map(|(c, w)| (1.0 + coef) * c - coef * w)
                .collect()
        };

        let xr = towards(REFLECT);
        let fxr = eval(&xr);
        let mut shrink = false;

        if fxr < fsim[0] {
            let xe = towards(REFLECT * EXPAND);
            let fxe = eval(&xe);
            if fxe < fxr {
                sim[n] = xe;
                fsim[n] = fxe;
            } else {
                sim[n] = xr;
                fsim[n] = fxr;
            }
        } else if fxr < fsim[n - 1] {
            sim[n] = xr;
            fsim[n] = fxr;
        } else if fxr < fsim[n] {
            let xc = towards(CONTRACT * REFLECT);
            let fxc = eval(&xc);
            if fxc <= fxr {
                sim[n] = xc;
                fsim[n] = fxc;
            } else {
                shrink = true;
            }
        } else {
            let xcc = towards(-CONTRACT);
            let fxcc = eval(&xcc);
            if fxcc < fsim[n] {
                sim[n] = xcc;
                fsim[n] = fxcc;
            } else {
                shrink = true;
            }
        }

        if shrink {
            let best = sim[0].clone();
            for j in 1..=n {
                for (v, b) in sim[j].iter_mut().zip(best.iter()) {
                    *v = b + SHRINK * (*v - b);
                }
                fsim[j] = eval(&sim[j]);
            }
        }

        sort_simplex(&mut sim, &mut fsim);
        iterations += 1;
    }

    if !converged {
        converged = has_converged(&sim, &fsim, options);
        if !converged {
            log::warn!(
                "Nelder-Mead stopped after {} iterations without converging (f = {:e})",
                iterations,
                fsim[0]
            );
        }
    }

    OptimizeResult {
        x: sim.swap_remove(0),
        fun: fsim[0],
        iterations,
        evaluations: evaluations.get(),
        converged,
    }
}

fn sort_simplex(sim: &mut Vec<Vec<f64>>, fsim: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..fsim.len()).collect();
    order.sort_by(|&a, &b| fsim[a].total_cmp(&fsim[b]));
    *sim = order.iter().map(|&i| sim[i].clone()).collect();
    *fsim = order.iter().map(|&i| fsim[i]).collect();
}

fn has_converged(sim: &[Vec<f64>], fsim: &[f64], options: &NelderMeadOptions) -> bool {
    let x_spread = sim[1..]
        .iter()
        .flat_map(|v| v.iter().zip(sim[0].iter()).map(|(a, b)| (a - b).abs()))
        .fold(0.0, f64::max);
    let f_spread = fsim[1..]
        .iter()
        .map(|f| (f - fsim[0]).abs())
        .fold(0.0, f64::max);
    x_spread <= options.xatol && f_spread <= options.fatol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_minimum_of_a_quadratic() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
        let opts = NelderMeadOptions {
            xatol: 1e-8,
            fatol: 1e-8,
            max_iter: Some(2000),
            max_fev: Some(4000),
        };
        let res = nelder_mead(f, &[0.0, 0.0], &opts);
        assert!(res.converged);
        assert!((res.x[0] - 3.0).abs() < 1e-5);
        assert!((res.x[1] + 1.0).abs() < 1e-5);
        assert!(res.fun < 1e-9);
    }

    #[test]
    fn minimises_rosenbrock() {
        let f = |x: &[f64]| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2);
        let opts = NelderMeadOptions {
            xatol: 1e-8,
            fatol: 1e-8,
            max_iter: Some(5000),
            max_fev: Some(10000),
        };
        let res = nelder_mead(f, &[-1.2, 1.0], &opts);
        assert!((res.x[0] - 1.0).abs() < 1e-3);
        assert!((res.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn respects_iteration_limit() {
        let f = |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>();
        let opts = NelderMeadOptions {
            xatol: 0.0,
            fatol: 0.0,
            max_iter: Some(5),
            max_fev: None,
        };
        let res = nelder_mead(f, &[1.0, 1.0, 1.0], &opts);
        assert_eq!(res.iterations, 5);
        assert!(!res.converged);
    }
}
