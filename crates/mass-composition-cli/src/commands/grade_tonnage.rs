use anyhow::{Context, Result};
use std::path::PathBuf;

use mass_composition::composition::BinDirection;
use mass_composition::io::{read_mass_composition, write_csv, write_frame};
use mass_composition::plot::plot_bins;
use mass_composition::report::{Report, ReportSection};
use mass_composition::variables::VariableConfig;
use mass_composition::Frame;

#[derive(Debug, Clone)]
pub struct GradeTonnageArgs {
    pub csv: PathBuf,
    pub index_col: Option<String>,
    pub cutoff_var: String,
    pub bin_width: f64,
    pub cumulative: bool,
    pub direction: BinDirection,
    pub output: Option<PathBuf>,
    pub plot: Option<PathBuf>,
}

pub fn run(args: &GradeTonnageArgs) -> Result<Frame> {
    let mc = read_mass_composition(
        &args.csv,
        "grade_tonnage",
        args.index_col.as_deref(),
        &VariableConfig::default(),
    )
    .with_context(|| format!("Failed to load dataset: {:?}", args.csv))?;

    let binned = mc.binned_mass_composition(
        &args.cutoff_var,
        args.bin_width,
        args.cumulative,
        args.direction,
    )?;
    log::info!("Binned {} records into {} bins", mc.len(), binned.nrows());

    match &args.output {
        Some(path) => write_csv(path, &binned, None)?,
        None => write_frame(std::io::stdout().lock(), &binned, None)?,
    }

    if let Some(path) = &args.plot {
        let mut variables = vec!["mass_dry".to_string()];
        variables.extend(mc.analyte_names());
        let refs: Vec<&str> = variables.iter().map(|s| s.as_str()).collect();
        let figure = plot_bins(&binned, &refs, &args.cutoff_var)?;

        let mut report = Report::new(
            "mass-composition",
            clap::crate_version!(),
            &format!("Grade-Tonnage: {}", args.cutoff_var),
        );
        let mut section = ReportSection::new("Grade-Tonnage");
        section.add_plot(figure);
        section.add_table(&binned, &mc.variables.column_formats(&binned.columns, false));
        report.add_section(section);
        report.save_to_file(path)?;
    }

    Ok(binned)
}
