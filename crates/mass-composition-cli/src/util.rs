use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn validate_csv_file(path: &str) -> Result<()> {
    let pb = PathBuf::from(path);

    let ext = pb
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    if ext.as_deref() != Some("csv") {
        anyhow::bail!("File must have a .csv extension: {}", path);
    }

    if !pb.exists() {
        anyhow::bail!("File does not exist: {}", path);
    }

    Ok(())
}

/// Create the output directory if needed and return it.
pub fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    Ok(dir.to_path_buf())
}

/// File-name friendly version of a label.
pub fn file_stem(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_files_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        assert!(validate_csv_file(path.to_str().unwrap()).is_err());
        fs::write(&path, "index,mass_dry\n0,1\n").unwrap();
        assert!(validate_csv_file(path.to_str().unwrap()).is_ok());
        assert!(validate_csv_file("data.tsv").is_err());
    }

    #[test]
    fn stems_are_lowercase() {
        assert_eq!(file_stem("Iron Ore Flowsheet"), "iron_ore_flowsheet");
    }
}
