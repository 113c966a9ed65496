//! Linear layout for flowsheet drawings.
use std::collections::VecDeque;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MassCompositionError;
use crate::network::MCNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

impl FromStr for Orientation {
    type Err = MassCompositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "horizontal" => Ok(Orientation::Horizontal),
            "vertical" => Ok(Orientation::Vertical),
            _ => Err(MassCompositionError::InvalidArgument(format!(
                "orientation must be 'horizontal' or 'vertical', found '{}'",
                s
            ))),
        }
    }
}

/// Longest-path depth of every node from the feed nodes.
///
/// Nodes on a recycle loop never reach zero in-degree; they are placed one layer
/// beyond the deepest node already placed.
pub fn node_depths(network: &MCNetwork) -> Vec<usize> {
    let n = network.nodes.len();
    let mut in_degree: Vec<usize> = network.nodes.iter().map(|node| node.inputs.len()).collect();
    let mut depth = vec![0usize; n];
    let mut placed = vec![false; n];
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();

    while let Some(u) = queue.pop_front() {
        placed[u] = true;
        for &e in &network.nodes[u].outputs {
            let v = network.edges[e].to;
            depth[v] = depth[v].max(depth[u] + 1);
            in_degree[v] = in_degree[v].saturating_sub(1);
            if in_degree[v] == 0 && !placed[v] {
                queue.push_back(v);
            }
        }
    }

    let mut deepest = depth.iter().copied().max().unwrap_or(0);
    for i in 0..n {
        if !placed[i] {
            log::debug!("node {} is on a cycle, placing it after layer {}", i, deepest);
            deepest += 1;
            depth[i] = deepest;
        }
    }
    depth
}

/// (x, y) position of every node: depth along the flow direction, nodes of a
/// layer spread evenly about zero across it.
pub fn digraph_linear_layout(network: &MCNetwork, orientation: Orientation) -> Vec<(f64, f64)> {
    let depth = node_depths(network);
    let n_layers = depth.iter().copied().max().map_or(0, |d| d + 1);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); n_layers];
    for (node, &d) in depth.iter().enumerate() {
        layers[d].push(node);
    }

    let mut pos = vec![(0.0, 0.0); depth.len()];
    for (d, layer) in layers.iter().enumerate() {
        let centre = (layer.len() as f64 - 1.0) / 2.0;
        for (k, &node) in layer.iter().enumerate() {
            let across = centre - k as f64;
            pos[node] = match orientation {
                Orientation::Horizontal => (d as f64, across),
                Orientation::Vertical => (across, -(d as f64)),
            };
        }
    }
    pos
}

/// Midpoint of two positions.
pub fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
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
        let (mut a, mut b) = feed.split(0.5, "a", "b").unwrap();
        let (mut b1, mut b2) = b.split(0.5, "b1", "b2").unwrap();
        feed.set_nodes(0, 1);
        a.set_nodes(1, 2);
        b.set_nodes(1, 3);
        b1.set_nodes(3, 4);
        b2.set_nodes(3, 5);
        MCNetwork::from_streams(vec![feed, a, b, b1, b2], "tree").unwrap()
    }

    #[test]
    fn depths_follow_longest_path() {
        assert_eq!(node_depths(&network()), vec![0, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn layers_are_centred() {
        let pos = digraph_linear_layout(&network(), Orientation::Horizontal);
        assert_eq!(pos[0], (0.0, 0.0));
        assert_eq!(pos[2], (2.0, 0.5));
        assert_eq!(pos[3], (2.0, -0.5));
        let vertical = digraph_linear_layout(&network(), Orientation::Vertical);
        assert_eq!(vertical[1], (0.0, -1.0));
        assert!("diagonal".parse::<Orientation>().is_err());
    }
}
