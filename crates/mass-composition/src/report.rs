//! Self-contained HTML reports: sections of markup, tables and inline plotly
//! figures.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Local;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use plotly::Plot;

use crate::error::Result;
use crate::frame::Frame;
use crate::network::MCNetwork;
use crate::layout::Orientation;
use crate::plot::{balance_plot, network_plot, plot_title, sankey_plot, Colormap};
use crate::variables::format_number;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const STYLE: &str = "
body { font-family: sans-serif; margin: 2em; color: #222; }
header { border-bottom: 2px solid #b87333; margin-bottom: 1em; }
section { margin-bottom: 2em; }
table { border-collapse: collapse; }
th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: right; }
th { background-color: #f5f5f5; }
td.label { text-align: left; }
footer { color: #888; font-size: small; }
";

#[derive(Debug, Clone)]
enum Block {
    Html(Markup),
    Plot { id: String, html: String },
}

#[derive(Debug, Clone)]
pub struct ReportSection {
    pub title: String,
    blocks: Vec<Block>,
}

impl ReportSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            blocks: Vec::new(),
        }
    }

    pub fn add_content(&mut self, content: Markup) {
        self.blocks.push(Block::Html(content));
    }

    pub fn add_plot(&mut self, plot: Plot) {
        let id = format!("{}-plot-{}", slug(&self.title), self.blocks.len());
        let html = plot.to_inline_html(Some(&id));
        self.blocks.push(Block::Plot { id, html });
    }

    /// Render a frame as a table, formatting columns found in `formats`.
    pub fn add_table(&mut self, frame: &Frame, formats: &BTreeMap<String, String>) {
        self.blocks.push(Block::Html(frame_table(frame, formats)));
    }

    pub fn plot_ids(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Plot { id, .. } => Some(id.as_str()),
                Block::Html(_) => None,
            })
            .collect()
    }

    fn render(&self) -> Markup {
        html! {
            section id=(slug(&self.title)) {
                h2 { (self.title) }
                @for block in &self.blocks {
                    @match block {
                        Block::Html(markup) => {
                            div { (markup) }
                        }
                        Block::Plot { html: inline, .. } => {
                            div class="plot" { (PreEscaped(inline)) }
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub software: String,
    pub version: String,
    pub title: String,
    pub sections: Vec<ReportSection>,
}

impl Report {
    pub fn new(software: &str, version: &str, title: &str) -> Self {
        Self {
            software: software.to_string(),
            version: version.to_string(),
            title: title.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: ReportSection) {
        self.sections.push(section);
    }

    pub fn render(&self) -> String {
        let generated = Local::now().format("%Y-%m-%d %H:%M:%S");
        let page = html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    title { (self.title) }
                    script src=(PLOTLY_CDN) {}
                    style { (PreEscaped(STYLE)) }
                }
                body {
                    header {
                        h1 { (self.title) }
                        p { (self.software) " v" (self.version) }
                    }
                    @for section in &self.sections {
                        (section.render())
                    }
                    footer { "Generated " (generated.to_string()) }
                }
            }
        };
        page.into_string()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(&path, self.render())?;
        log::info!("Report written to {}", path.as_ref().display());
        Ok(())
    }
}

fn slug(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

/// HTML table of a frame with the index as the first column.
pub fn frame_table(frame: &Frame, formats: &BTreeMap<String, String>) -> Markup {
    let cell = |j: usize, v: f64| match formats.get(&frame.columns[j]) {
        Some(fmt) => format_number(fmt, v),
        None => v.to_string(),
    };
    html! {
        table {
            thead {
                tr {
                    th { (frame.index_name) }
                    @for col in &frame.columns { th { (col) } }
                }
            }
            tbody {
                @for (i, label) in frame.index.iter().enumerate() {
                    tr {
                        td class="label" { (label) }
                        @for (j, v) in frame.values.row(i).iter().enumerate() {
                            td { (cell(j, *v)) }
                        }
                    }
                }
            }
        }
    }
}

/// Report of a network: stream summary, flowsheet, sankey and node balance.
pub fn network_report(network: &MCNetwork, version: &str) -> Result<Report> {
    let mut report = Report::new(
        "mass-composition",
        version,
        &format!("{} Network Report", network.name),
    );

    let summary = network.report()?;
    let formats = network.column_formats(&summary.columns, false);

    let mut overview = ReportSection::new("Overview");
    overview.add_content(html! {
        p { (PreEscaped(plot_title(network, true, true))) }
    });
    overview.add_table(&summary, &formats);
    report.add_section(overview);

    let mut flowsheet = ReportSection::new("Flowsheet");
    flowsheet.add_plot(network_plot(network, Orientation::Horizontal));
    flowsheet.add_plot(sankey_plot(
        network,
        "mass_dry",
        None,
        &Colormap::copper_r(),
        None,
        None,
    )?);
    report.add_section(flowsheet);

    if !network.balance_nodes().is_empty() {
        let mut balance = ReportSection::new("Node Balance");
        balance.add_plot(balance_plot(network)?);
        for node in network.balance_nodes() {
            let imbalance = network.node_imbalance(node)?;
            balance.add_content(html! { h3 { "Node " (node) } });
            balance.add_table(&imbalance, &BTreeMap::new());
        }
        report.add_section(balance);
    }
    Ok(report)
}

/// Write the imbalance table of one node as an HTML page.
pub fn write_imbalance_report<P: AsRef<Path>>(network: &MCNetwork, node: usize, path: P) -> Result<()> {
    let imbalance = network.node_imbalance(node)?;
    let mut report = Report::new(
        "mass-composition",
        env!("CARGO_PKG_VERSION"),
        &format!("{}: node {} imbalance", network.name, node),
    );
    let mut section = ReportSection::new("Imbalance");
    section.add_content(html! {
        p { "Balanced: " (network.node_balanced(node).map_or("n/a".to_string(), |b| b.to_string())) }
    });
    section.add_table(&imbalance, &BTreeMap::new());
    report.add_section(section);
    report.save_to_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::MassComposition;
    use crate::demo_data::sample_data;
    use crate::variables::VariableConfig;

    fn network() -> MCNetwork {
        let (frame, _) = sample_data(true, true, false);
        let mut feed = MassComposition::from_frame(frame, "feed", &VariableConfig::default()).unwrap();
        let (mut lump, mut fines) = feed.split(0.4, "lump", "fines").unwrap();
        feed.set_nodes(0, 1);
        lump.set_nodes(1, 2);
        fines.set_nodes(1, 3);
        MCNetwork::from_streams(vec![feed, lump, fines], "Flowsheet").unwrap()
    }

    #[test]
    fn table_uses_formats() {
        let net = network();
        let summary = net.report().unwrap();
        let formats = net.column_formats(&summary.columns, false);
        let html = frame_table(&summary, &formats).into_string();
        assert!(html.contains("<th>mass_dry</th>"));
        assert!(html.contains("<td>260</td>"));
        assert!(html.contains("<td class=\"label\">lump</td>"));
    }

    #[test]
    fn network_report_has_sections_and_plots() {
        let report = network_report(&network(), "0.1.0").unwrap();
        let titles: Vec<&str> = report.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Overview", "Flowsheet", "Node Balance"]);
        assert_eq!(report.sections[1].plot_ids(), vec!["flowsheet-plot-0", "flowsheet-plot-1"]);

        let html = report.render();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Flowsheet Network Report"));
        assert!(html.contains("flowsheet-plot-1"));
    }

    #[test]
    fn imbalance_report_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.html");
        network().imbalance_report(1, &path).unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("Balanced: true"));
        assert!(write_imbalance_report(&network(), 9, dir.path().join("x.html")).is_err());
    }
}
