//! Flowsheet networks of mass-composition streams.
//!
//! Streams sit on the edges of a directed graph. Nodes are numbered `0..n` in
//! the order they are first seen, and every node with both inputs and outputs is
//! checked for conservation of mass and component mass.
pub mod node;

use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::composition::{Criterion, MassComposition, Status};
use crate::error::{MassCompositionError, Result};
use crate::frame::Frame;
use crate::variables::{format_number, VariableConfig};

pub use node::{MCNode, NodeType};

/// Default relative tolerance used when checking node balance.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Placement of a named stream between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLink {
    pub name: String,
    pub from: usize,
    pub to: usize,
}

impl StreamLink {
    pub fn new(name: &str, from: usize, to: usize) -> Self {
        Self {
            name: name.to_string(),
            from,
            to,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MCEdge {
    pub from: usize,
    pub to: usize,
    pub stream: MassComposition,
}

#[derive(Debug, Clone)]
pub struct MCNetwork {
    pub name: String,
    pub nodes: Vec<MCNode>,
    pub edges: Vec<MCEdge>,
    pub tolerance: f64,
}

impl MCNetwork {
    /// Build a network from streams that carry their `nodes`.
    pub fn from_streams(streams: Vec<MassComposition>, name: &str) -> Result<Self> {
        if streams.is_empty() {
            return Err(MassCompositionError::InvalidArgument(
                "a network needs at least one stream".into(),
            ));
        }
        check_variables(&streams)?;
        let streams = check_indexes(streams)?;

        let mut relabel: HashMap<usize, usize> = HashMap::new();
        let next_id = |label: usize, relabel: &mut HashMap<usize, usize>| -> usize {
            let n = relabel.len();
            *relabel.entry(label).or_insert(n)
        };

        let mut edges = Vec::with_capacity(streams.len());
        for mut stream in streams {
            let (u, v) = stream
                .nodes
                .ok_or_else(|| MassCompositionError::MissingNodes(stream.name.clone()))?;
            let from = next_id(u, &mut relabel);
            let to = next_id(v, &mut relabel);
            stream.nodes = Some((from, to));
            edges.push(MCEdge { from, to, stream });
        }

        let mut nodes: Vec<MCNode> = (0..relabel.len()).map(MCNode::new).collect();
        for (e, edge) in edges.iter().enumerate() {
            nodes[edge.from].outputs.push(e);
            nodes[edge.to].inputs.push(e);
        }

        log::info!(
            "Created network '{}' with {} nodes and {} streams",
            name,
            nodes.len(),
            edges.len()
        );

        Ok(Self {
            name: name.to_string(),
            nodes,
            edges,
            tolerance: DEFAULT_TOLERANCE,
        })
    }

    /// Build from a long (tidy) frame where the attribute `name_column` names the
    /// stream of each record.
    pub fn from_frame_long(
        frame: &Frame,
        attributes: &BTreeMap<String, Vec<String>>,
        name_column: &str,
        links: &[StreamLink],
        name: &str,
        config: &VariableConfig,
    ) -> Result<Self> {
        let names = attributes
            .get(name_column)
            .ok_or_else(|| MassCompositionError::MissingColumn(name_column.to_string()))?;

        let mut order: Vec<&String> = Vec::new();
        for n in names {
            if !order.contains(&n) {
                order.push(n);
            }
        }

        let mut streams = Vec::with_capacity(order.len());
        for stream_name in order {
            let rows: Vec<usize> = names
                .iter()
                .enumerate()
                .filter_map(|(i, n)| (n == stream_name).then_some(i))
                .collect();
            let sub = frame.select_rows(&rows);
            let sub_attrs: BTreeMap<String, Vec<String>> = attributes
                .iter()
                .filter(|(k, _)| k.as_str() != name_column)
                .map(|(k, v)| (k.clone(), rows.iter().map(|&i| v[i].clone()).collect()))
                .collect();
            let mut stream =
                MassComposition::from_frame_with_attributes(sub, sub_attrs, stream_name, config)?;
            place(&mut stream, links);
            streams.push(stream);
        }
        Self::from_streams(streams, name)
    }

    /// Build from a wide frame whose columns are prefixed by stream name
    /// (`feed_mass_dry`, `feed_Fe`, ...). A prefix needs at least three columns.
    pub fn from_frame_wide(
        frame: &Frame,
        links: &[StreamLink],
        name: &str,
        config: &VariableConfig,
    ) -> Result<Self> {
        let mut prefixes: Vec<(String, Vec<String>)> = Vec::new();
        for col in &frame.columns {
            if let Some((prefix, _)) = col.split_once('_') {
                match prefixes.iter_mut().find(|(p, _)| p == prefix) {
                    Some((_, cols)) => cols.push(col.clone()),
                    None => prefixes.push((prefix.to_string(), vec![col.clone()])),
                }
            }
        }

        let mut streams = Vec::new();
        for (prefix, cols) in prefixes.into_iter().filter(|(_, c)| c.len() >= 3) {
            log::info!("Creating object for {}", prefix);
            let refs: Vec<&str> = cols.iter().map(|c| c.as_str()).collect();
            let mut sub = frame.select_columns(&refs)?;
            let strip = format!("{}_", prefix);
            sub.rename_columns(|c| c.strip_prefix(strip.as_str()).unwrap_or(c).to_string());
            let mut stream = MassComposition::from_frame(sub, &prefix, config)?;
            place(&mut stream, links);
            streams.push(stream);
        }
        Self::from_streams(streams, name)
    }

    /// Rebuild with replacement streams, keeping the topology.
    pub fn with_streams(&self, streams: Vec<MassComposition>) -> Result<Self> {
        if streams.len() != self.edges.len() {
            return Err(MassCompositionError::InvalidArgument(format!(
                "expected {} streams, found {}",
                self.edges.len(),
                streams.len()
            )));
        }
        let mut net = self.clone();
        for (edge, mut stream) in net.edges.iter_mut().zip(streams) {
            stream.nodes = Some((edge.from, edge.to));
            edge.stream = stream;
        }
        Ok(net)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn streams(&self) -> impl Iterator<Item = &MassComposition> {
        self.edges.iter().map(|e| &e.stream)
    }

    pub fn edge_names(&self) -> Vec<String> {
        self.streams().map(|s| s.name.clone()).collect()
    }

    pub fn get_edge_by_name(&self, name: &str) -> Result<&MassComposition> {
        self.streams()
            .find(|s| s.name == name)
            .ok_or_else(|| MassCompositionError::UnknownStream(name.to_string()))
    }

    /// Streams leaving a node of degree one (feeds).
    pub fn input_edges(&self) -> Vec<&MassComposition> {
        self.edges
            .iter()
            .filter(|e| self.nodes[e.from].degree() == 1)
            .map(|e| &e.stream)
            .collect()
    }

    /// Streams entering a node of degree one (products).
    pub fn output_edges(&self) -> Vec<&MassComposition> {
        self.edges
            .iter()
            .filter(|e| self.nodes[e.to].degree() == 1)
            .map(|e| &e.stream)
            .collect()
    }

    pub fn node_inputs_outputs(
        &self,
        node: usize,
    ) -> Result<(Vec<&MassComposition>, Vec<&MassComposition>)> {
        let n = self.node(node)?;
        Ok((
            n.inputs.iter().map(|&e| &self.edges[e].stream).collect(),
            n.outputs.iter().map(|&e| &self.edges[e].stream).collect(),
        ))
    }

    pub fn node(&self, node: usize) -> Result<&MCNode> {
        self.nodes
            .get(node)
            .ok_or_else(|| MassCompositionError::InvalidArgument(format!("node {} is not on the network", node)))
    }

    pub fn balance_nodes(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Balance)
            .map(|n| n.node_id)
            .collect()
    }

    /// Per-record `sum(in) - sum(out)` of masses and component masses.
    pub fn node_imbalance(&self, node: usize) -> Result<Frame> {
        let n = self.node(node)?;
        let template = &self.edges[*n.inputs.first().or(n.outputs.first()).ok_or_else(|| {
            MassCompositionError::InvalidArgument(format!("node {} has no streams", node))
        })?]
        .stream;
        let mut frame = template.mass_component_frame();
        let mut total = Array2::<f64>::zeros(frame.values.dim());
        for &e in &n.inputs {
            total = total + self.edges[e].stream.component_masses();
        }
        for &e in &n.outputs {
            total = total - self.edges[e].stream.component_masses();
        }
        frame.values = total;
        Ok(frame)
    }

    /// `None` for source and sink nodes, otherwise whether the node conserves
    /// mass and component mass within the network tolerance.
    pub fn node_balanced(&self, node: usize) -> Option<bool> {
        let n = self.nodes.get(node)?;
        if n.node_type() != NodeType::Balance {
            return None;
        }
        let imbalance = self.node_imbalance(node).ok()?;
        let mut scale = Array2::<f64>::zeros(imbalance.values.dim());
        for &e in &n.inputs {
            scale = scale + self.edges[e].stream.component_masses().mapv(f64::abs);
        }
        let ok = imbalance
            .values
            .iter()
            .zip(scale.iter())
            .filter(|(d, _)| !d.is_nan())
            .all(|(d, s)| d.abs() <= self.tolerance * s.max(1.0));
        Some(ok)
    }

    /// True when every balance node is balanced.
    pub fn balanced(&self) -> bool {
        self.balance_nodes()
            .into_iter()
            .all(|n| self.node_balanced(n).unwrap_or(true))
    }

    /// Overall stream status and the failing components of each failing stream.
    pub fn edge_status(&self) -> (bool, BTreeMap<String, Vec<String>>) {
        let failing: BTreeMap<String, Vec<String>> = self
            .streams()
            .map(|s| (s.name.clone(), s.status()))
            .filter(|(_, status): &(String, Status)| !status.ok)
            .map(|(name, status)| (name, status.failing_components))
            .collect();
        (failing.is_empty(), failing)
    }

    /// Formats for the requested columns, looked up on the first feed stream.
    pub fn column_formats(&self, columns: &[String], strip_percent: bool) -> BTreeMap<String, String> {
        let reference = self
            .input_edges()
            .first()
            .copied()
            .or_else(|| self.streams().next());
        match reference {
            Some(stream) => stream.variables.column_formats(columns, strip_percent),
            None => BTreeMap::new(),
        }
    }

    /// Total mass and weight averaged composition of every stream.
    pub fn report(&self) -> Result<Frame> {
        let rows: Vec<Frame> = self.streams().map(|s| s.aggregate()).collect();
        Frame::concat_rows(&rows)
    }

    /// The report rendered with each variable's format.
    pub fn report_formatted(&self) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let rpt = self.report()?;
        let formats = self.column_formats(&rpt.columns, false);
        let mut header = vec!["name".to_string()];
        header.extend(rpt.columns.iter().cloned());
        let rows = rpt
            .index
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let mut row = vec![label.clone()];
                for (j, col) in rpt.columns.iter().enumerate() {
                    let v = rpt.values[(i, j)];
                    row.push(match formats.get(col) {
                        Some(fmt) => format_number(fmt, v),
                        None => v.to_string(),
                    });
                }
                row
            })
            .collect();
        Ok((header, rows))
    }

    /// Filter the named stream, then filter every other stream to the same
    /// record labels.
    pub fn query(&self, mc_name: &str, criteria: &[Criterion]) -> Result<Self> {
        let reference = self.get_edge_by_name(mc_name)?.query(criteria)?;
        let labels = reference.index.clone();
        let mut streams = Vec::with_capacity(self.edges.len());
        for stream in self.streams() {
            if stream.name == mc_name {
                streams.push(reference.clone());
            } else {
                streams.push(stream.select_index(&labels)?);
            }
        }
        Ok(Self::from_streams(streams, &self.name)?.with_tolerance(self.tolerance))
    }

    /// Write the imbalance table of `node` as an HTML page.
    #[cfg(feature = "viz")]
    pub fn imbalance_report<P: AsRef<std::path::Path>>(&self, node: usize, path: P) -> Result<()> {
        crate::report::write_imbalance_report(self, node, path)
    }

    /// Tidy export of the selected streams (all when `names` is None). The stream
    /// name of each record is returned as the `name` attribute.
    pub fn to_frame(&self, names: Option<&[String]>) -> Result<(Frame, BTreeMap<String, Vec<String>>)> {
        let selected: Vec<&MassComposition> = self
            .streams()
            .filter(|s| names.map_or(true, |n| n.contains(&s.name)))
            .collect();
        let frames: Vec<Frame> = selected.iter().map(|s| s.to_frame(false)).collect();
        let frame = Frame::concat_rows(&frames)?;
        let name_col = selected
            .iter()
            .flat_map(|s| std::iter::repeat(s.name.clone()).take(s.len()))
            .collect();
        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), name_col);
        Ok((frame, attrs))
    }
}

fn place(stream: &mut MassComposition, links: &[StreamLink]) {
    if let Some(link) = links.iter().find(|l| l.name == stream.name) {
        stream.set_nodes(link.from, link.to);
    }
}

/// Check that stream indexes line up.
///
/// Size-indexed streams missing only their coarsest fractions are padded with
/// zero-mass records. Any other disagreement is an error.
/// Every stream must carry the variables of the first, in the same order.
fn check_variables(streams: &[MassComposition]) -> Result<()> {
    let first = &streams[0];
    match streams.iter().find(|s| !s.variables.same_names(&first.variables)) {
        Some(other) => Err(MassCompositionError::VariableMismatch(format!(
            "stream '{}' has variables {:?}, '{}' has {:?}",
            other.name,
            other.variables.names(),
            first.name,
            first.variables.names()
        ))),
        None => Ok(()),
    }
}

fn check_indexes(streams: Vec<MassComposition>) -> Result<Vec<MassComposition>> {
    let first = &streams[0];
    if streams.iter().all(|s| s.index == first.index) {
        return Ok(streams);
    }
    if streams.iter().any(|s| s.index_name != first.index_name) {
        return Err(MassCompositionError::IndexMismatch(
            "stream index types are not consistent".into(),
        ));
    }
    if first.index_name != "size" {
        return Err(MassCompositionError::IndexMismatch(
            "stream index shapes are not consistent".into(),
        ));
    }

    log::debug!("size index detected - attempting index alignment");
    let reference = streams
        .iter()
        .max_by_key(|s| s.len())
        .map(|s| s.index.clone())
        .unwrap_or_default();

    streams
        .into_iter()
        .map(|s| {
            if s.index == reference {
                return Ok(s);
            }
            if s.index.iter().any(|l| !reference.contains(l)) {
                return Err(MassCompositionError::IndexMismatch(format!(
                    "'{}' has size fractions not found on the other streams",
                    s.name
                )));
            }
            let offset = reference.len() - s.len();
            if reference[offset..] == s.index[..] {
                log::debug!("The {} stream has missing coarse sizes only", s.name);
                Ok(s.reindex_zero_fill(&reference))
            } else {
                log::debug!("The {} stream has missing sizes requiring interpolation", s.name);
                Err(MassCompositionError::Unsupported(
                    "interpolation of missing size fractions".into(),
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_data::{sample_data, size_by_assay};

    fn feed() -> MassComposition {
        let (frame, attrs) = sample_data(true, true, false);
        MassComposition::from_frame_with_attributes(frame, attrs, "feed", &VariableConfig::default())
            .unwrap()
    }

    /// feed -> node -> (lump, fines)
    fn split_network() -> MCNetwork {
        let mut feed = feed();
        let (mut lump, mut fines) = feed.split(0.4, "lump", "fines").unwrap();
        feed.set_nodes(10, 20);
        lump.set_nodes(20, 30);
        fines.set_nodes(20, 40);
        MCNetwork::from_streams(vec![feed, lump, fines], "Flowsheet").unwrap()
    }

    #[test]
    fn nodes_are_renumbered_in_first_seen_order() {
        let net = split_network();
        assert_eq!(net.nodes.len(), 4);
        assert_eq!(net.edges[0].stream.nodes, Some((0, 1)));
        assert_eq!(net.edges[2].stream.nodes, Some((1, 3)));
        assert_eq!(net.nodes[1].node_type(), NodeType::Balance);
        assert_eq!(net.nodes[0].node_type(), NodeType::Source);
        assert_eq!(net.nodes[3].node_type(), NodeType::Sink);
    }

    #[test]
    fn streams_without_nodes_are_rejected() {
        let res = MCNetwork::from_streams(vec![feed()], "x");
        assert!(matches!(res, Err(MassCompositionError::MissingNodes(_))));
    }

    #[test]
    fn streams_with_different_variables_are_rejected() {
        let mut feed = feed();
        let (mut lump, mut fines) = feed.split(0.4, "lump", "fines").unwrap();
        let reduced = lump.to_frame(true).drop_columns(&["LOI"]);
        lump = MassComposition::from_frame(reduced, "lump", &VariableConfig::default()).unwrap();
        feed.set_nodes(0, 1);
        lump.set_nodes(1, 2);
        fines.set_nodes(1, 3);
        let res = MCNetwork::from_streams(vec![feed, lump, fines], "Flowsheet");
        assert!(matches!(res, Err(MassCompositionError::VariableMismatch(_))));
    }

    #[test]
    fn split_network_is_balanced() {
        let net = split_network();
        assert!(net.balanced());
        assert_eq!(net.node_balanced(0), None);
        let imbalance = net.node_imbalance(1).unwrap();
        assert!(imbalance.values.iter().all(|v| v.abs() < 1e-9));
        assert_eq!(net.edge_status(), (true, BTreeMap::new()));
    }

    #[test]
    fn perturbed_stream_unbalances_the_node() {
        let net = split_network();
        let mut streams: Vec<MassComposition> = net.streams().cloned().collect();
        streams[1].data[(0, 1)] += 5.0;
        let net = net.with_streams(streams).unwrap();
        assert_eq!(net.node_balanced(1), Some(false));
        assert!(!net.balanced());
    }

    #[test]
    fn inputs_outputs_and_report() {
        let net = split_network();
        let inputs: Vec<String> = net.input_edges().iter().map(|s| s.name.clone()).collect();
        let outputs: Vec<String> = net.output_edges().iter().map(|s| s.name.clone()).collect();
        assert_eq!(inputs, vec!["feed"]);
        assert_eq!(outputs, vec!["lump", "fines"]);

        let rpt = net.report().unwrap();
        assert_eq!(rpt.index, vec!["feed", "lump", "fines"]);
        let (header, rows) = net.report_formatted().unwrap();
        assert_eq!(header[0], "name");
        assert_eq!(rows[0][1], "300");
        assert!(net.get_edge_by_name("tails").is_err());
    }

    #[test]
    fn query_filters_every_stream_to_the_same_records() {
        let net = split_network();
        let filtered = net.query("feed", &["FE>58".parse().unwrap()]).unwrap();
        for s in filtered.streams() {
            assert_eq!(s.index, vec!["1", "2"]);
        }
    }

    #[test]
    fn tidy_export_rebuilds_the_network() {
        let net = split_network();
        let (frame, attrs) = net.to_frame(None).unwrap();
        assert_eq!(frame.nrows(), 9);
        let links: Vec<StreamLink> = net
            .edges
            .iter()
            .map(|e| StreamLink::new(&e.stream.name, e.from, e.to))
            .collect();
        let rebuilt =
            MCNetwork::from_frame_long(&frame, &attrs, "name", &links, "copy", &VariableConfig::default())
                .unwrap();
        assert_eq!(rebuilt.edge_names(), net.edge_names());
        assert!(rebuilt.balanced());
    }

    #[test]
    fn wide_frames_split_on_prefix() {
        let frame = Frame::from_rows(
            "index",
            vec!["0".into()],
            vec![
                "feed_mass_dry".into(),
                "feed_Fe".into(),
                "feed_SiO2".into(),
                "conc_mass_dry".into(),
                "conc_Fe".into(),
                "conc_SiO2".into(),
                "other_x".into(),
            ],
            vec![vec![100.0, 50.0, 10.0, 60.0, 60.0, 5.0, 1.0]],
        )
        .unwrap();
        let links = vec![StreamLink::new("feed", 0, 1), StreamLink::new("conc", 1, 2)];
        let net = MCNetwork::from_frame_wide(&frame, &links, "wide", &VariableConfig::default()).unwrap();
        assert_eq!(net.edge_names(), vec!["feed", "conc"]);
        assert_eq!(net.edges[1].stream.analyte_names(), vec!["Fe", "SiO2"]);
    }

    #[test]
    fn size_streams_missing_coarse_fractions_are_padded() {
        let cfg = VariableConfig::default();
        let full = MassComposition::from_frame(size_by_assay(), "feed", &cfg).unwrap();
        let labels: Vec<String> = full.index[2..].to_vec();
        let mut fines = full.select_index(&labels).unwrap().with_name("fines");
        let mut feed = full;
        feed.set_nodes(0, 1);
        fines.set_nodes(1, 2);
        let net = MCNetwork::from_streams(vec![feed, fines.clone()], "sizes").unwrap();
        let padded = net.get_edge_by_name("fines").unwrap();
        assert_eq!(padded.len(), 6);
        assert_eq!(padded.data[(0, 1)], 0.0);

        let mut gappy = fines;
        gappy.index.swap(0, 1);
        let mut feed = MassComposition::from_frame(size_by_assay(), "feed", &cfg).unwrap();
        feed.set_nodes(0, 1);
        let res = MCNetwork::from_streams(vec![feed, gappy], "sizes");
        assert!(matches!(res, Err(MassCompositionError::Unsupported(_))));
    }
}
