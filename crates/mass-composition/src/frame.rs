//! Labelled numeric tables.
//!
//! `Frame` is the exchange format of the crate: aggregates, reports, grade-tonnage
//! tables and balance results are all frames. Rows are addressed by string labels,
//! columns by name, and missing values are `NaN`.
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};

use crate::error::{MassCompositionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Name of the row index (e.g. "index", "size", "name")
    pub index_name: String,
    /// Row labels
    pub index: Vec<String>,
    /// Column names
    pub columns: Vec<String>,
    /// Values, one row per index label
    pub values: Array2<f64>,
}

impl Frame {
    pub fn new(
        index_name: impl Into<String>,
        index: Vec<String>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if values.nrows() != index.len() || values.ncols() != columns.len() {
            return Err(MassCompositionError::ShapeMismatch {
                rows: index.len(),
                cols: columns.len(),
                len: values.len(),
            });
        }
        Ok(Self {
            index_name: index_name.into(),
            index,
            columns,
            values,
        })
    }

    /// Build a frame from row-major values.
    pub fn from_rows(
        index_name: impl Into<String>,
        index: Vec<String>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let n_cols = columns.len();
        let mut flat = Vec::with_capacity(rows.len() * n_cols);
        for row in &rows {
            if row.len() != n_cols {
                return Err(MassCompositionError::ShapeMismatch {
                    rows: rows.len(),
                    cols: n_cols,
                    len: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let values = Array2::from_shape_vec((rows.len(), n_cols), flat).map_err(|_| {
            MassCompositionError::ShapeMismatch {
                rows: index.len(),
                cols: n_cols,
                len: rows.len() * n_cols,
            }
        })?;
        Self::new(index_name, index, columns, values)
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row_position(&self, label: &str) -> Option<usize> {
        self.index.iter().position(|i| i == label)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_position(name).map(|j| self.values.column(j))
    }

    pub fn row(&self, label: &str) -> Option<ArrayView1<'_, f64>> {
        self.row_position(label).map(|i| self.values.row(i))
    }

    /// Value at (row label, column name).
    pub fn get(&self, label: &str, column: &str) -> Option<f64> {
        let i = self.row_position(label)?;
        let j = self.column_position(column)?;
        Some(self.values[(i, j)])
    }

    pub fn select_rows(&self, rows: &[usize]) -> Frame {
        Frame {
            index_name: self.index_name.clone(),
            index: rows.iter().map(|&i| self.index[i].clone()).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }

    pub fn select_columns(&self, names: &[&str]) -> Result<Frame> {
        let positions = names
            .iter()
            .map(|n| {
                self.column_position(n)
                    .ok_or_else(|| MassCompositionError::MissingColumn(n.to_string()))
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(Frame {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns: names.iter().map(|n| n.to_string()).collect(),
            values: self.values.select(Axis(1), &positions),
        })
    }

    /// Drop the named columns; unknown names are ignored.
    pub fn drop_columns(&self, names: &[&str]) -> Frame {
        let keep: Vec<usize> = (0..self.ncols())
            .filter(|&j| !names.contains(&self.columns[j].as_str()))
            .collect();
        Frame {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns: keep.iter().map(|&j| self.columns[j].clone()).collect(),
            values: self.values.select(Axis(1), &keep),
        }
    }

    pub fn rename_columns<F>(&mut self, f: F)
    where
        F: Fn(&str) -> String,
    {
        for c in self.columns.iter_mut() {
            *c = f(c);
        }
    }

    /// Stack frames vertically. All frames must carry the same columns.
    pub fn concat_rows(frames: &[Frame]) -> Result<Frame> {
        let first = frames
            .first()
            .ok_or_else(|| MassCompositionError::InvalidArgument("no frames to concatenate".into()))?;
        if let Some(other) = frames.iter().find(|f| f.columns != first.columns) {
            return Err(MassCompositionError::VariableMismatch(format!(
                "{:?} != {:?}",
                first.columns, other.columns
            )));
        }
        let views: Vec<_> = frames.iter().map(|f| f.values.view()).collect();
        let values = concatenate(Axis(0), &views).map_err(|_| MassCompositionError::ShapeMismatch {
            rows: frames.iter().map(|f| f.nrows()).sum(),
            cols: first.ncols(),
            len: frames.iter().map(|f| f.values.len()).sum(),
        })?;
        Ok(Frame {
            index_name: first.index_name.clone(),
            index: frames.iter().flat_map(|f| f.index.iter().cloned()).collect(),
            columns: first.columns.clone(),
            values,
        })
    }

    /// Column sums, skipping NaN.
    pub fn nansum(&self) -> Array1<f64> {
        self.values
            .columns()
            .into_iter()
            .map(|c| c.iter().filter(|v| !v.is_nan()).sum())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn frame() -> Frame {
        Frame::new(
            "index",
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into(), "z".into()],
            array![[1.0, 2.0, 3.0], [4.0, f64::NAN, 6.0]],
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_shape() {
        let res = Frame::new("index", vec!["a".into()], vec!["x".into()], array![[1.0, 2.0]]);
        assert!(res.is_err());
    }

    #[test]
    fn select_and_drop() {
        let f = frame();
        let s = f.select_columns(&["z", "x"]).unwrap();
        assert_eq!(s.columns, vec!["z", "x"]);
        assert_eq!(s.values[(1, 0)], 6.0);
        let d = f.drop_columns(&["y"]);
        assert_eq!(d.columns, vec!["x", "z"]);
        assert!(f.select_columns(&["nope"]).is_err());
    }

    #[test]
    fn nansum_skips_missing() {
        let sums = frame().nansum();
        assert_eq!(sums[0], 5.0);
        assert_eq!(sums[1], 2.0);
    }

    #[test]
    fn concat_requires_same_columns() {
        let f = frame();
        let joined = Frame::concat_rows(&[f.clone(), f.clone()]).unwrap();
        assert_eq!(joined.nrows(), 4);
        let other = f.drop_columns(&["x"]);
        assert!(Frame::concat_rows(&[f, other]).is_err());
    }

    #[test]
    fn lookup_by_labels() {
        let f = frame();
        assert_eq!(f.get("b", "z"), Some(6.0));
        assert_eq!(f.get("c", "z"), None);
    }
}
