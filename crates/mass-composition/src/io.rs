//! CSV reading and writing of frames.
//!
//! The first column is the index when it is named `index` (or the requested
//! index column). Columns whose every non-empty value parses as a number are
//! numeric; the rest are kept as attributes.
use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Array2;

use crate::composition::MassComposition;
use crate::error::{MassCompositionError, Result};
use crate::frame::Frame;
use crate::variables::VariableConfig;

/// Parsed CSV content.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub frame: Frame,
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Read a CSV file into a numeric frame plus attribute columns.
pub fn read_csv<P: AsRef<Path>>(path: P, index_col: Option<&str>) -> Result<CsvTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let index_pos = match index_col {
        Some(name) => Some(
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| MassCompositionError::MissingColumn(name.to_string()))?,
        ),
        None => headers.iter().position(|h| h == "index"),
    };

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() != headers.len() {
            return Err(MassCompositionError::ShapeMismatch {
                rows: row_idx + 1,
                cols: headers.len(),
                len: record.len(),
            });
        }
        for (j, value) in record.iter().enumerate() {
            raw[j].push(value.to_string());
        }
    }
    let n_rows = raw.first().map(|c| c.len()).unwrap_or(0);

    let index: Vec<String> = match index_pos {
        Some(j) => raw[j].clone(),
        None => (0..n_rows).map(|i| i.to_string()).collect(),
    };
    let index_name = index_pos
        .map(|j| headers[j].clone())
        .unwrap_or_else(|| "index".to_string());

    let mut numeric: Vec<(String, Vec<f64>)> = Vec::new();
    let mut attributes = BTreeMap::new();
    for (j, header) in headers.iter().enumerate() {
        if Some(j) == index_pos {
            continue;
        }
        match parse_numeric(&raw[j]) {
            Some(values) => numeric.push((header.clone(), values)),
            None => {
                attributes.insert(header.clone(), raw[j].clone());
            }
        }
    }

    let mut values = Array2::<f64>::zeros((n_rows, numeric.len()));
    for (j, (_, col)) in numeric.iter().enumerate() {
        for (i, v) in col.iter().enumerate() {
            values[(i, j)] = *v;
        }
    }
    let frame = Frame::new(
        index_name,
        index,
        numeric.into_iter().map(|(name, _)| name).collect(),
        values,
    )?;

    log::debug!(
        "Read {} rows, {} numeric columns and {} attributes from {}",
        frame.nrows(),
        frame.ncols(),
        attributes.len(),
        path.as_ref().display()
    );
    Ok(CsvTable { frame, attributes })
}

fn parse_numeric(values: &[String]) -> Option<Vec<f64>> {
    let mut any = false;
    let parsed = values
        .iter()
        .map(|v| {
            if v.is_empty() || v.eq_ignore_ascii_case("nan") {
                Some(f64::NAN)
            } else {
                any = true;
                v.parse::<f64>().ok()
            }
        })
        .collect::<Option<Vec<f64>>>()?;
    any.then_some(parsed)
}

/// Read a CSV file straight into a `MassComposition`.
pub fn read_mass_composition<P: AsRef<Path>>(
    path: P,
    name: &str,
    index_col: Option<&str>,
    config: &VariableConfig,
) -> Result<MassComposition> {
    let table = read_csv(path, index_col)?;
    MassComposition::from_frame_with_attributes(table.frame, table.attributes, name, config)
}

/// Write a frame, followed by any attribute columns. NaN is written empty.
pub fn write_csv<P: AsRef<Path>>(
    path: P,
    frame: &Frame,
    attributes: Option<&BTreeMap<String, Vec<String>>>,
) -> Result<()> {
    let file = std::fs::File::create(&path)?;
    write_frame(file, frame, attributes)?;
    log::info!("Wrote {} rows to {}", frame.nrows(), path.as_ref().display());
    Ok(())
}

/// Write a frame as CSV to any writer. NaN values become empty cells.
pub fn write_frame<W: std::io::Write>(
    writer: W,
    frame: &Frame,
    attributes: Option<&BTreeMap<String, Vec<String>>>,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    let mut header = vec![frame.index_name.clone()];
    header.extend(frame.columns.iter().cloned());
    if let Some(attrs) = attributes {
        header.extend(attrs.keys().cloned());
    }
    writer.write_record(&header)?;

    for (i, label) in frame.index.iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend(frame.values.row(i).iter().map(|v| {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }));
        if let Some(attrs) = attributes {
            record.extend(attrs.values().map(|col| col.get(i).cloned().unwrap_or_default()));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a string table (e.g. a formatted report).
pub fn write_string_table<P: AsRef<Path>>(
    path: P,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_data::sample_data;

    #[test]
    fn csv_keeps_numeric_and_attribute_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        let (frame, attrs) = sample_data(true, true, false);
        write_csv(&path, &frame, Some(&attrs)).unwrap();

        let table = read_csv(&path, None).unwrap();
        assert_eq!(table.frame.index_name, "index");
        assert_eq!(table.frame.columns, frame.columns);
        assert_eq!(table.frame.values, frame.values);
        assert_eq!(table.attributes["group"], attrs["group"]);
    }

    #[test]
    fn empty_cells_read_as_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.csv");
        std::fs::write(&path, "sample,mass_dry,Fe\na,10,\nb,,60\n").unwrap();
        let table = read_csv(&path, Some("sample")).unwrap();
        assert_eq!(table.frame.index, vec!["a", "b"]);
        assert!(table.frame.get("a", "Fe").unwrap().is_nan());
        assert!(table.frame.get("b", "mass_dry").unwrap().is_nan());
        assert!(read_csv(&path, Some("missing")).is_err());
    }

    #[test]
    fn frames_write_to_any_writer() {
        let frame = Frame::new(
            "FE",
            vec!["[57, 58)".into(), "[58, 59)".into()],
            vec!["mass_dry".into(), "Fe".into()],
            ndarray::array![[100.0, 57.5], [0.0, f64::NAN]],
        )
        .unwrap();
        let mut out = Vec::new();
        write_frame(&mut out, &frame, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "FE,mass_dry,Fe\n\"[57, 58)\",100,57.5\n\"[58, 59)\",0,\n");
    }
}
