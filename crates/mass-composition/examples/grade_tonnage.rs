//! Grade-tonnage tables and figure from the demo dataset.
use mass_composition::composition::BinDirection;
use mass_composition::demo_data::sample_data;
use mass_composition::plot::plot_bins;
use mass_composition::report::{Report, ReportSection};
use mass_composition::variables::VariableConfig;
use mass_composition::{MassComposition, Result};

fn main() -> Result<()> {
    env_logger::init();

    let (frame, attrs) = sample_data(true, true, false);
    let mc = MassComposition::from_frame_with_attributes(frame, attrs, "Demo", &VariableConfig::default())?;

    let mut report = Report::new("mass-composition", env!("CARGO_PKG_VERSION"), "Grade-Tonnage Demo");
    for (label, cumulative) in [("Incremental", false), ("Cumulative", true)] {
        let binned = mc.binned_mass_composition("FE", 1.0, cumulative, BinDirection::Descending)?;
        println!("{} bins: {:?}", label, binned.index);

        let mut section = ReportSection::new(label);
        section.add_plot(plot_bins(&binned, &["mass_dry", "SIO2", "al2o3"], "FE")?);
        section.add_table(&binned, &mc.variables.column_formats(&binned.columns, false));
        report.add_section(section);
    }
    report.save_to_file("grade_tonnage.html")?;
    println!("Report saved to grade_tonnage.html");

    Ok(())
}
