use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// No incoming streams (feed)
    Source,
    /// No outgoing streams (product)
    Sink,
    /// Streams both in and out; mass must be conserved
    Balance,
}

/// A flowsheet node. `inputs` and `outputs` are edge positions on the network.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MCNode {
    pub node_id: usize,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

impl MCNode {
    pub fn new(node_id: usize) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    pub fn node_type(&self) -> NodeType {
        match (self.inputs.is_empty(), self.outputs.is_empty()) {
            (true, _) => NodeType::Source,
            (false, true) => NodeType::Sink,
            (false, false) => NodeType::Balance,
        }
    }

    pub fn degree(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }
}
