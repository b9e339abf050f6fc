//! Translation of an iteration's sub-workflow into a target platform's shape.
//!
//! Platforms either list loop-body nodes flat next to top-level nodes with a
//! parent pointer (and explicit loop boundary nodes), or nest them as a block
//! list inside the iteration node, with entry/exit expressed as reserved
//! ports on the iteration itself.

use crate::branch::{BranchPortEngine, PortScheme};
use crate::error::GenerateError;
use crate::ir::{Edge, IterationConfig, Node, NodeConfig, NodeKind, Position, Workflow};
use crate::reconcile::{IdReconciler, SyntheticRole};
use itertools::Itertools;

/// How a target platform represents a loop body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationShape {
    /// Body nodes are emitted flat with a parent reference. Missing boundary
    /// nodes are synthesized when the platform requires them.
    FlatWithParent {
        needs_start: bool,
        needs_end: bool,
        /// The single output of the loop start node, standing for the current item.
        start_output: &'static str,
    },
    /// Body nodes are nested inside the iteration node.
    NestedBlocks {
        entry_port: &'static str,
        exit_port: &'static str,
    },
}

impl IterationShape {
    pub fn is_nested(&self) -> bool {
        matches!(self, IterationShape::NestedBlocks { .. })
    }
}

/// A loop boundary node, reused from the body or synthesized.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Id edges and references use: an IR node id, or a synthetic key.
    pub key: String,
    pub target_id: String,
    pub synthesized: bool,
    pub position: Position,
}

/// Everything generation needs to emit one iteration's body.
#[derive(Debug, Clone)]
pub struct IterationLayout {
    pub owner: String,
    pub owner_target: String,
    pub start: Option<Boundary>,
    pub end: Option<Boundary>,
    /// Body nodes with no predecessor inside the body.
    pub entry_nodes: Vec<String>,
    /// The node whose output leaves the loop.
    pub exit_node: Option<String>,
    /// Synthesized edges, expressed with IR ids and synthetic keys.
    pub internal_edges: Vec<Edge>,
    /// Scoped port tables, present for nested bodies only.
    pub ports: Option<BranchPortEngine>,
    shape: IterationShape,
}

impl IterationLayout {
    pub fn shape(&self) -> IterationShape {
        self.shape
    }

    /// Rewrites a body reference to the iteration node itself. Flat bodies
    /// read the current item from the loop start node instead; nested bodies
    /// keep the reference and let the platform spell its loop variable.
    pub fn rewrite_reference(&self, node_id: &str, output: &str) -> Option<(String, String)> {
        if node_id != self.owner {
            return None;
        }
        match (self.shape, &self.start) {
            (IterationShape::FlatWithParent { start_output, .. }, Some(start)) => {
                if output != crate::ir::ITERATION_ITEM {
                    tracing::debug!(
                        iteration = %self.owner,
                        output,
                        "loop reference folded into the start node's single output"
                    );
                }
                Some((start.key.clone(), start_output.to_string()))
            }
            _ => None,
        }
    }

    pub fn is_boundary(&self, key: &str) -> bool {
        self.start.as_ref().is_some_and(|b| b.key == key)
            || self.end.as_ref().is_some_and(|b| b.key == key)
    }
}

pub struct IterationFlattener {
    shape: IterationShape,
    port_scheme: PortScheme,
}

impl IterationFlattener {
    pub fn new(shape: IterationShape, port_scheme: PortScheme) -> Self {
        Self { shape, port_scheme }
    }

    pub fn shape(&self) -> IterationShape {
        self.shape
    }

    /// Reconciles the body, maps its branch ports and plans boundary nodes
    /// and edges. `owner` must already be reconciled.
    pub fn flatten(
        &self,
        owner: &Node,
        config: &IterationConfig,
        ids: &mut IdReconciler,
        root_ports: &mut BranchPortEngine,
    ) -> Result<IterationLayout, GenerateError> {
        let owner_target = ids.require(&owner.id, &owner.id, 1)?.to_string();
        let body = &config.sub_workflow;

        for node in &body.nodes {
            let target = ids.reconcile(&node.id, node.kind());
            ids.record_title(&target, &node.title);
        }

        let mut scoped = self
            .shape
            .is_nested()
            .then(|| BranchPortEngine::new(self.port_scheme));
        {
            let ports = scoped.as_mut().unwrap_or(root_ports);
            map_body_ports(body, ports, ids);
        }

        let entry_nodes = entry_nodes(body);
        let exit_node = exit_node(body, config);

        let mut layout = IterationLayout {
            owner: owner.id.clone(),
            owner_target,
            start: None,
            end: None,
            entry_nodes,
            exit_node,
            internal_edges: Vec::new(),
            ports: scoped,
            shape: self.shape,
        };

        match self.shape {
            IterationShape::FlatWithParent {
                needs_start,
                needs_end,
                ..
            } => {
                self.plan_flat(&mut layout, body, ids, needs_start, needs_end)?;
            }
            IterationShape::NestedBlocks {
                entry_port,
                exit_port,
            } => {
                for entry in &layout.entry_nodes {
                    layout
                        .internal_edges
                        .push(Edge::from_handle(&owner.id, entry_port, entry));
                }
                if let Some(exit) = &layout.exit_node {
                    let mut edge = Edge::new(exit, &owner.id);
                    edge.target_handle = Some(exit_port.to_string());
                    layout.internal_edges.push(edge);
                }
            }
        }

        tracing::debug!(
            iteration = %owner.id,
            body = body.nodes.len(),
            synthesized = layout.internal_edges.len(),
            "flattened iteration body"
        );
        Ok(layout)
    }

    fn plan_flat(
        &self,
        layout: &mut IterationLayout,
        body: &Workflow,
        ids: &mut IdReconciler,
        needs_start: bool,
        needs_end: bool,
    ) -> Result<(), GenerateError> {
        let modelled_start = body.first_of_kind(NodeKind::Start);
        let modelled_end = body.first_of_kind(NodeKind::End);

        layout.start = match modelled_start {
            Some(node) => Some(reused(node, ids)?),
            None if needs_start => {
                let target =
                    ids.register_synthetic(&layout.owner, SyntheticRole::LoopStart, NodeKind::Start)?;
                let boundary = Boundary {
                    key: IdReconciler::synthetic_key(&layout.owner, SyntheticRole::LoopStart),
                    target_id: target,
                    synthesized: true,
                    position: Position::new(24.0, 68.0),
                };
                for entry in &layout.entry_nodes {
                    layout.internal_edges.push(Edge::new(&boundary.key, entry));
                }
                Some(boundary)
            }
            None => None,
        };

        layout.end = match modelled_end {
            Some(node) => Some(reused(node, ids)?),
            None if needs_end => {
                let target =
                    ids.register_synthetic(&layout.owner, SyntheticRole::LoopEnd, NodeKind::End)?;
                let right_edge = body
                    .nodes
                    .iter()
                    .map(|n| n.position.x)
                    .fold(0.0_f64, f64::max);
                let boundary = Boundary {
                    key: IdReconciler::synthetic_key(&layout.owner, SyntheticRole::LoopEnd),
                    target_id: target,
                    synthesized: true,
                    position: Position::new(right_edge + 320.0, 68.0),
                };
                if let Some(exit) = &layout.exit_node {
                    layout.internal_edges.push(Edge::new(exit, &boundary.key));
                }
                Some(boundary)
            }
            None => None,
        };
        Ok(())
    }
}

fn reused(node: &Node, ids: &IdReconciler) -> Result<Boundary, GenerateError> {
    Ok(Boundary {
        key: node.id.clone(),
        target_id: ids.require(&node.id, &node.id, 1)?.to_string(),
        synthesized: false,
        position: node.position,
    })
}

fn map_body_ports(body: &Workflow, ports: &mut BranchPortEngine, ids: &mut IdReconciler) {
    for node in &body.nodes {
        match &node.config {
            NodeConfig::Condition(config) => {
                ports.map_condition(&node.id, config, ids);
            }
            NodeConfig::Classifier(config) => {
                let outgoing: Vec<&Edge> = body.outgoing(&node.id).collect();
                ports.map_classifier(&node.id, config, &outgoing, ids);
            }
            _ => {}
        }
    }
}

/// Real processing nodes with no predecessor inside the body, in diagram order.
fn entry_nodes(body: &Workflow) -> Vec<String> {
    body.nodes
        .iter()
        .filter(|n| !matches!(n.kind(), NodeKind::Start | NodeKind::End))
        .filter(|n| {
            body.incoming(&n.id)
                .all(|e| body.node(&e.source).is_some_and(|s| s.kind() == NodeKind::Start))
        })
        .map(|n| n.id.clone())
        .collect()
}

/// The body node feeding the loop exit: the output selector's node when it
/// lives in the body, else the last terminal node in topological order,
/// preferring a Code node when several terminals tie.
fn exit_node(body: &Workflow, config: &IterationConfig) -> Option<String> {
    let selected = &config.output_selector.node_id;
    if body.contains(selected) {
        return Some(selected.clone());
    }

    let order = body.topological_order();
    let terminals = order
        .iter()
        .filter_map(|id| body.node(id))
        .filter(|n| !matches!(n.kind(), NodeKind::Start | NodeKind::End))
        .filter(|n| {
            body.outgoing(&n.id)
                .all(|e| body.node(&e.target).is_some_and(|t| t.kind() == NodeKind::End))
        })
        .collect_vec();

    let chosen = if terminals.len() > 1 {
        terminals
            .iter()
            .rev()
            .find(|n| n.kind() == NodeKind::Code)
            .or(terminals.last())
    } else {
        terminals.last()
    };
    chosen.map(|n| n.id.clone())
}
