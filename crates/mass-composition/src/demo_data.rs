//! Small datasets for demos, docs and tests.
use std::collections::BTreeMap;

use ndarray::{Array2, Axis};

use crate::frame::Frame;

/// Three iron ore records with a `group` attribute.
///
/// Column names are deliberately mixed case ("wet_mass", "FE", "al2o3") to
/// exercise variable detection.
pub fn sample_data(
    include_wet_mass: bool,
    include_dry_mass: bool,
    include_moisture: bool,
) -> (Frame, BTreeMap<String, Vec<String>>) {
    let mass_wet = [100.0, 90.0, 110.0];
    let mass_dry = [90.0, 80.0, 90.0];
    let fe = [57.0, 59.0, 61.0];
    let sio2 = [5.2, 3.1, 2.2];
    let al2o3 = [3.0, 1.7, 0.9];
    let loi = [5.0, 4.0, 3.0];

    let mut columns: Vec<(&str, Vec<f64>)> = Vec::new();
    if include_wet_mass {
        columns.push(("wet_mass", mass_wet.to_vec()));
    }
    if include_dry_mass {
        columns.push(("mass_dry", mass_dry.to_vec()));
    }
    if include_moisture {
        let h2o = mass_wet
            .iter()
            .zip(mass_dry.iter())
            .map(|(w, d)| (w - d) / w * 100.0)
            .collect();
        columns.push(("H2O", h2o));
    }
    columns.push(("FE", fe.to_vec()));
    columns.push(("SIO2", sio2.to_vec()));
    columns.push(("al2o3", al2o3.to_vec()));
    columns.push(("LOI", loi.to_vec()));

    let frame = columns_to_frame("index", (0..3).map(|i| i.to_string()).collect(), columns);

    let mut attributes = BTreeMap::new();
    attributes.insert(
        "group".to_string(),
        vec!["grp_1".to_string(), "grp_1".to_string(), "grp_2".to_string()],
    );
    (frame, attributes)
}

/// A size-by-assay distribution, coarsest fraction first.
pub fn size_by_assay() -> Frame {
    let size = [
        "[0.85, 2.0)",
        "[0.5, 0.85)",
        "[0.15, 0.5)",
        "[0.075, 0.15)",
        "[0.045, 0.075)",
        "[0.0, 0.045)",
    ];
    let mass_dry = vec![3.3, 9.9, 26.5, 2.5, 8.8, 49.0];
    let fe = vec![64.15, 64.33, 64.52, 62.65, 62.81, 55.12];
    let sio2 = vec![2.04, 2.05, 1.84, 2.88, 2.12, 6.77];
    let al2o3 = vec![2.68, 2.23, 2.19, 3.32, 2.25, 6.34];

    columns_to_frame(
        "size",
        size.iter().map(|s| s.to_string()).collect(),
        vec![("mass_dry", mass_dry), ("Fe", fe), ("SiO2", sio2), ("Al2O3", al2o3)],
    )
}

fn columns_to_frame(index_name: &str, index: Vec<String>, columns: Vec<(&str, Vec<f64>)>) -> Frame {
    let n = index.len();
    let mut values = Array2::<f64>::zeros((n, columns.len()));
    for (mut col, (_, v)) in values.axis_iter_mut(Axis(1)).zip(columns.iter()) {
        for (dst, src) in col.iter_mut().zip(v.iter()) {
            *dst = *src;
        }
    }
    Frame {
        index_name: index_name.to_string(),
        index,
        columns: columns.iter().map(|(c, _)| c.to_string()).collect(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_data_columns_follow_flags() {
        let (frame, attrs) = sample_data(false, true, true);
        assert_eq!(frame.columns, vec!["mass_dry", "H2O", "FE", "SIO2", "al2o3", "LOI"]);
        assert_eq!(frame.nrows(), 3);
        assert_eq!(attrs["group"].len(), 3);
    }

    #[test]
    fn size_by_assay_is_indexed_by_size() {
        let frame = size_by_assay();
        assert_eq!(frame.index_name, "size");
        let total: f64 = frame.column("mass_dry").unwrap().sum();
        assert!((total - 100.0).abs() < 1e-9);
    }
}
