//! Plotly figures for mass-composition datasets and networks.
use std::str::FromStr;

use plotly::common::{DashType, HoverInfo, Line, Marker, Mode};
use plotly::layout::{Axis, HoverMode, Layout};
use plotly::{Plot, Scatter, Trace};
use serde::Serialize;

use crate::error::{MassCompositionError, Result};
use crate::frame::Frame;
use crate::layout::{digraph_linear_layout, midpoint, Orientation};
use crate::network::{MCNetwork, NodeType};

const COLOR_OK: &str = "green";
const COLOR_FAIL: &str = "red";
const COLOR_NEUTRAL: &str = "grey";
const LINK_DEFAULT: &str = "rgba(128, 128, 128, 0.4)";

/// Linear interpolation between anchor colours on `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    pub name: String,
    anchors: Vec<(f64, [u8; 3])>,
}

impl Colormap {
    pub fn new(name: &str, anchors: Vec<(f64, [u8; 3])>) -> Result<Self> {
        let sorted = anchors.windows(2).all(|w| w[0].0 < w[1].0);
        if anchors.len() < 2 || !sorted {
            return Err(MassCompositionError::InvalidArgument(format!(
                "colormap '{}' needs at least two increasing anchors",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            anchors,
        })
    }

    pub fn copper_r() -> Self {
        Self {
            name: "copper_r".into(),
            anchors: vec![(0.0, [255, 199, 127]), (0.2, [255, 159, 101]), (1.0, [0, 0, 0])],
        }
    }

    pub fn viridis() -> Self {
        Self {
            name: "viridis".into(),
            anchors: vec![
                (0.0, [68, 1, 84]),
                (0.25, [59, 82, 139]),
                (0.5, [33, 145, 140]),
                (0.75, [94, 201, 98]),
                (1.0, [253, 231, 37]),
            ],
        }
    }

    pub fn greys() -> Self {
        Self {
            name: "greys".into(),
            anchors: vec![(0.0, [255, 255, 255]), (1.0, [0, 0, 0])],
        }
    }

    /// Colour at `t`, clamped to `[0, 1]`.
    pub fn rgb(&self, t: f64) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let upper = self
            .anchors
            .iter()
            .position(|(p, _)| *p >= t)
            .unwrap_or(self.anchors.len() - 1)
            .max(1);
        let (p0, c0) = self.anchors[upper - 1];
        let (p1, c1) = self.anchors[upper];
        let f = ((t - p0) / (p1 - p0)).clamp(0.0, 1.0);
        let mut out = [0u8; 3];
        for k in 0..3 {
            out[k] = (c0[k] as f64 + f * (c1[k] as f64 - c0[k] as f64)).round() as u8;
        }
        out
    }

    /// CSS colour of `value` scaled between `vmin` and `vmax`.
    pub fn css(&self, value: f64, vmin: f64, vmax: f64, alpha: f64) -> String {
        let t = if vmax > vmin { (value - vmin) / (vmax - vmin) } else { 0.0 };
        let [r, g, b] = self.rgb(t);
        format!("rgba({}, {}, {}, {})", r, g, b, alpha)
    }
}

impl FromStr for Colormap {
    type Err = MassCompositionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "copper_r" => Ok(Self::copper_r()),
            "viridis" => Ok(Self::viridis()),
            "greys" | "Greys" => Ok(Self::greys()),
            _ => Err(MassCompositionError::InvalidArgument(format!("unknown colormap '{}'", s))),
        }
    }
}

/// Title of a network figure: name, balance state and edge status.
pub fn plot_title(network: &MCNetwork, html: bool, compact: bool) -> String {
    let (edges_ok, failing) = network.edge_status();
    let mut lines = vec![
        format!("Balanced: {}", network.balanced()),
        format!("Edge Status OK: {}", edges_ok),
    ];
    if !edges_ok {
        let names: Vec<&str> = failing.keys().map(|k| k.as_str()).collect();
        lines.push(format!("Failing edges: {}", names.join(", ")));
    }
    match (html, compact) {
        (true, true) => format!("{}<br><sup>{}</sup>", network.name, lines.join(", ")),
        (true, false) => format!("{}<br><sup>{}</sup>", network.name, lines.join("<br>")),
        (false, true) => format!("{}: {}", network.name, lines.join(", ")),
        (false, false) => format!("{}\n{}", network.name, lines.join("\n")),
    }
}

/// Grade-tonnage lines from a binned frame: one trace per variable against
/// the left bin edge.
pub fn plot_bins(binned: &Frame, variables: &[&str], cutoff_var: &str) -> Result<Plot> {
    let x: Vec<f64> = binned
        .column("bin_left")
        .ok_or_else(|| MassCompositionError::MissingColumn("bin_left".into()))?
        .to_vec();

    let mut plot = Plot::new();
    for var in variables {
        let y: Vec<f64> = binned
            .column(var)
            .ok_or_else(|| MassCompositionError::MissingColumn(var.to_string()))?
            .to_vec();
        plot.add_trace(
            Scatter::new(x.clone(), y)
                .mode(Mode::LinesMarkers)
                .name(var)
                .text_array(binned.index.clone()),
        );
    }
    plot.set_layout(
        Layout::new()
            .title(format!("Grade-Tonnage: {}", cutoff_var).as_str())
            .x_axis(Axis::new().title(cutoff_var))
            .y_axis(Axis::new().title("value")),
    );
    Ok(plot)
}

/// One point of an in-vs-out comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonPoint {
    pub variable: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
}

/// Scatter of `y` against `x` per variable with a `y = x` reference line.
pub fn comparison_plot(points: &[ComparisonPoint], x_label: &str, y_label: &str) -> Plot {
    let mut variables: Vec<&str> = Vec::new();
    for p in points {
        if !variables.contains(&p.variable.as_str()) {
            variables.push(&p.variable);
        }
    }

    let mut plot = Plot::new();
    for var in &variables {
        let selected: Vec<&ComparisonPoint> = points.iter().filter(|p| p.variable == *var).collect();
        let text: Vec<String> = selected
            .iter()
            .map(|p| format!("{}<br>{}: residual {:.4}", p.label, var, p.y - p.x))
            .collect();
        plot.add_trace(
            Scatter::new(
                selected.iter().map(|p| p.x).collect::<Vec<f64>>(),
                selected.iter().map(|p| p.y).collect::<Vec<f64>>(),
            )
            .mode(Mode::Markers)
            .name(var)
            .text_array(text)
            .hover_info(HoverInfo::Text),
        );
    }

    let (lo, hi) = points
        .iter()
        .flat_map(|p| [p.x, p.y])
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo.is_finite() {
        plot.add_trace(
            Scatter::new(vec![lo, hi], vec![lo, hi])
                .mode(Mode::Lines)
                .name("y = x")
                .line(Line::new().color(COLOR_NEUTRAL).dash(DashType::Dash)),
        );
    }
    plot.set_layout(
        Layout::new()
            .x_axis(Axis::new().title(x_label))
            .y_axis(Axis::new().title(y_label))
            .hover_mode(HoverMode::Closest),
    );
    plot
}

fn node_colour(network: &MCNetwork, node: usize) -> &'static str {
    match network.node_balanced(node) {
        Some(true) => COLOR_OK,
        Some(false) => COLOR_FAIL,
        None => COLOR_NEUTRAL,
    }
}

/// Flowsheet drawing: edges coloured by stream status, balance nodes by
/// balance state.
pub fn network_plot(network: &MCNetwork, orientation: Orientation) -> Plot {
    let pos = digraph_linear_layout(network, orientation);
    let mut plot = Plot::new();

    for edge in &network.edges {
        let (a, b) = (pos[edge.from], pos[edge.to]);
        let colour = if edge.stream.status().ok {
            COLOR_NEUTRAL
        } else {
            COLOR_FAIL
        };
        plot.add_trace(
            Scatter::new(vec![a.0, b.0], vec![a.1, b.1])
                .mode(Mode::Lines)
                .line(Line::new().width(2.0).color(colour))
                .hover_info(HoverInfo::Skip)
                .show_legend(false),
        );
    }

    let mids: Vec<(f64, f64)> = network
        .edges
        .iter()
        .map(|e| midpoint(pos[e.from], pos[e.to]))
        .collect();
    plot.add_trace(
        Scatter::new(
            mids.iter().map(|m| m.0).collect::<Vec<f64>>(),
            mids.iter().map(|m| m.1).collect::<Vec<f64>>(),
        )
        .mode(Mode::Text)
        .text_array(network.edge_names())
        .hover_info(HoverInfo::Text)
        .show_legend(false),
    );

    let node_text: Vec<String> = network
        .nodes
        .iter()
        .map(|n| match n.node_type() {
            NodeType::Balance => format!("node {} (balance)", n.node_id),
            NodeType::Source => format!("node {} (source)", n.node_id),
            NodeType::Sink => format!("node {} (sink)", n.node_id),
        })
        .collect();
    let colours: Vec<String> = (0..network.nodes.len())
        .map(|n| node_colour(network, n).to_string())
        .collect();
    plot.add_trace(
        Scatter::new(
            pos.iter().map(|p| p.0).collect::<Vec<f64>>(),
            pos.iter().map(|p| p.1).collect::<Vec<f64>>(),
        )
        .mode(Mode::Markers)
        .marker(Marker::new().size(16).color_array(colours))
        .text_array(node_text)
        .hover_info(HoverInfo::Text)
        .show_legend(false),
    );

    let hidden = || Axis::new().show_grid(false).zero_line(false).show_tick_labels(false);
    plot.set_layout(
        Layout::new()
            .title(plot_title(network, true, false).as_str())
            .show_legend(false)
            .hover_mode(HoverMode::Closest)
            .x_axis(hidden())
            .y_axis(hidden()),
    );
    plot
}

#[derive(Debug, Clone, Serialize)]
struct SankeyLine {
    color: String,
    width: f64,
}

#[derive(Debug, Clone, Serialize)]
struct SankeyNode {
    pad: usize,
    thickness: usize,
    line: SankeyLine,
    label: Vec<String>,
    color: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct SankeyLink {
    source: Vec<usize>,
    target: Vec<usize>,
    value: Vec<f64>,
    label: Vec<String>,
    color: Vec<String>,
}

/// Sankey trace serialised directly in plotly's schema.
#[derive(Debug, Clone, Serialize)]
pub struct SankeyTrace {
    r#type: &'static str,
    orientation: &'static str,
    node: SankeyNode,
    link: SankeyLink,
}

impl Trace for SankeyTrace {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Sankey diagram with link widths from the aggregate `width_var` and link
/// colours from `color_var` when given.
pub fn sankey_plot(
    network: &MCNetwork,
    width_var: &str,
    color_var: Option<&str>,
    colormap: &Colormap,
    vmin: Option<f64>,
    vmax: Option<f64>,
) -> Result<Plot> {
    let report = network.report()?;
    let column = |var: &str| -> Result<Vec<f64>> {
        Ok(report
            .column(var)
            .ok_or_else(|| MassCompositionError::MissingColumn(var.to_string()))?
            .to_vec())
    };
    let widths = column(width_var)?;

    let colours = match color_var {
        Some(var) => {
            let values = column(var)?;
            let finite = values.iter().copied().filter(|v| v.is_finite());
            let lo = vmin.unwrap_or_else(|| finite.clone().fold(f64::INFINITY, f64::min).floor());
            let hi = vmax.unwrap_or_else(|| finite.fold(f64::NEG_INFINITY, f64::max).ceil());
            values.iter().map(|&v| colormap.css(v, lo, hi, 0.6)).collect()
        }
        None => vec![LINK_DEFAULT.to_string(); widths.len()],
    };

    let trace = SankeyTrace {
        r#type: "sankey",
        orientation: "h",
        node: SankeyNode {
            pad: 15,
            thickness: 20,
            line: SankeyLine {
                color: "black".into(),
                width: 0.5,
            },
            label: network.nodes.iter().map(|n| n.node_id.to_string()).collect(),
            color: (0..network.nodes.len())
                .map(|n| node_colour(network, n).to_string())
                .collect(),
        },
        link: SankeyLink {
            source: network.edges.iter().map(|e| e.from).collect(),
            target: network.edges.iter().map(|e| e.to).collect(),
            value: widths,
            label: network.edge_names(),
            color: colours,
        },
    };

    let mut plot = Plot::new();
    plot.add_trace(Box::new(trace));
    plot.set_layout(Layout::new().title(plot_title(network, true, false).as_str()));
    Ok(plot)
}

/// Total input against total output mass of every balance node, record and
/// component.
pub fn balance_plot(network: &MCNetwork) -> Result<Plot> {
    let mut points = Vec::new();
    for node in network.balance_nodes() {
        let (inputs, outputs) = network.node_inputs_outputs(node)?;
        let template = inputs[0].mass_component_frame();
        let total = |streams: &[&crate::composition::MassComposition]| {
            streams
                .iter()
                .map(|s| s.component_masses())
                .fold(None, |acc: Option<ndarray::Array2<f64>>, m| {
                    Some(match acc {
                        Some(a) => a + m,
                        None => m,
                    })
                })
        };
        let (Some(sum_in), Some(sum_out)) = (total(&inputs[..]), total(&outputs[..])) else {
            continue;
        };
        for (i, label) in template.index.iter().enumerate() {
            for (j, var) in template.columns.iter().enumerate() {
                points.push(ComparisonPoint {
                    variable: var.clone(),
                    label: format!("node {}, {}", node, label),
                    x: sum_in[(i, j)],
                    y: sum_out[(i, j)],
                });
            }
        }
    }
    let mut plot = comparison_plot(&points, "Node input mass", "Node output mass");
    plot.set_layout(
        Layout::new()
            .title(plot_title(network, true, true).as_str())
            .x_axis(Axis::new().title("Node input mass"))
            .y_axis(Axis::new().title("Node output mass"))
            .hover_mode(HoverMode::Closest),
    );
    Ok(plot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{BinDirection, MassComposition};
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

    fn traces(plot: &Plot) -> Vec<serde_json::Value> {
        let json: serde_json::Value = serde_json::from_str(&plot.to_json()).unwrap();
        json["data"].as_array().cloned().unwrap_or_default()
    }

    #[test]
    fn colormap_interpolates_and_clamps() {
        let greys = Colormap::greys();
        assert_eq!(greys.rgb(0.0), [255, 255, 255]);
        assert_eq!(greys.rgb(1.0), [0, 0, 0]);
        assert_eq!(greys.rgb(0.5), [128, 128, 128]);
        assert_eq!(greys.rgb(7.0), [0, 0, 0]);
        assert_eq!(Colormap::viridis().rgb(-1.0), [68, 1, 84]);
        assert_eq!(greys.css(5.0, 0.0, 10.0, 1.0), "rgba(128, 128, 128, 1)");
        assert!("jet".parse::<Colormap>().is_err());
        assert!(Colormap::new("flat", vec![(0.0, [0, 0, 0])]).is_err());
    }

    #[test]
    fn titles_report_balance_and_status() {
        let net = network();
        assert_eq!(
            plot_title(&net, false, true),
            "Flowsheet: Balanced: true, Edge Status OK: true"
        );
        assert_eq!(
            plot_title(&net, true, false),
            "Flowsheet<br><sup>Balanced: true<br>Edge Status OK: true</sup>"
        );
    }

    #[test]
    fn network_plot_has_edge_label_and_node_traces() {
        let plot = network_plot(&network(), Orientation::Horizontal);
        // three edges, the labels, the nodes
        assert_eq!(traces(&plot).len(), 5);
    }

    #[test]
    fn sankey_links_follow_edges() {
        let net = network();
        let plot = sankey_plot(&net, "mass_dry", Some("FE"), &Colormap::copper_r(), None, None).unwrap();
        let data = traces(&plot);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["type"], "sankey");
        assert_eq!(data[0]["link"]["source"], serde_json::json!([0, 1, 1]));
        assert_eq!(data[0]["node"]["color"][1], "green");
        assert!(sankey_plot(&net, "Cu", None, &Colormap::greys(), None, None).is_err());
    }

    #[test]
    fn bins_and_balance_plots() {
        let net = network();
        let feed = net.get_edge_by_name("feed").unwrap();
        let binned = feed
            .binned_mass_composition("FE", 1.0, true, BinDirection::Descending)
            .unwrap();
        let plot = plot_bins(&binned, &["mass_dry", "SIO2"], "FE").unwrap();
        assert_eq!(traces(&plot).len(), 2);
        assert!(plot_bins(&binned, &["Cu"], "FE").is_err());

        let plot = balance_plot(&net).unwrap();
        // one trace per component plus the reference line
        let n_components = feed.mass_component_frame().ncols();
        assert_eq!(traces(&plot).len(), n_components + 1);
    }
}
