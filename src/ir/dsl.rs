use super::node::{Node, NodeKind};
use crate::error::{IrError, ParseError};
use crate::platform::Platform;
use serde::{Deserialize, Serialize};

/// Root of the unified IR: one metadata record and one workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedDsl {
    pub metadata: Metadata,
    pub workflow: Workflow,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A directed connection between two nodes of the same workflow.
///
/// `source_handle` names the branch taken out of a condition (`caseId`) or a
/// classifier (`classId`); every other edge leaves it empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn from_handle(
        source: impl Into<String>,
        handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source_handle: Some(handle.into()),
            ..Self::new(source, target)
        }
    }
}

/// Ordered nodes plus the edges between them.
///
/// Node order is the diagram order of the source document and is preserved
/// so that generation stays deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn first_of_kind(&self, kind: NodeKind) -> Option<&Node> {
        self.nodes.iter().find(|n| n.kind() == kind)
    }

    /// Edges leaving `node_id`, in declaration order.
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Node ids in topological order, falling back to diagram order for
    /// anything left over by a cycle.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut indegree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| self.incoming(&n.id).filter(|e| self.contains(&e.source)).count())
            .collect();
        let mut placed = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        loop {
            let next = (0..self.nodes.len()).find(|&i| !placed[i] && indegree[i] == 0);
            let Some(index) = next else { break };
            placed[index] = true;
            let id = self.nodes[index].id.as_str();
            order.push(id);
            for edge in self.outgoing(id) {
                if let Some(target) = self.nodes.iter().position(|n| n.id == edge.target) {
                    indegree[target] = indegree[target].saturating_sub(1);
                }
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if !placed[index] {
                order.push(node.id.as_str());
            }
        }
        order
    }
}

impl UnifiedDsl {
    pub fn new(metadata: Metadata, workflow: Workflow) -> Self {
        Self { metadata, workflow }
    }

    /// Builds the IR and runs the structural checks immediately.
    pub fn checked(metadata: Metadata, workflow: Workflow) -> Result<Self, IrError> {
        let dsl = Self::new(metadata, workflow);
        super::invariants::check(&dsl)?;
        Ok(dsl)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Reads a previously dumped IR and checks it.
    pub fn from_yaml(text: &str) -> Result<Self, ParseError> {
        let dsl: UnifiedDsl = serde_yaml::from_str(text).map_err(|e| ParseError::Yaml {
            platform: Platform::Unified,
            message: e.to_string(),
        })?;
        super::invariants::check(&dsl)?;
        Ok(dsl)
    }
}
