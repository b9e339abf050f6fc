use crate::branch::BranchPortEngine;
use crate::error::GenerateError;
use crate::ir::{Edge, NodeKind};
use crate::iteration::{IterationLayout, IterationShape};
use crate::reconcile::IdReconciler;

/// Fixed port conventions of one target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConventions {
    /// Port on edges leaving a non-branching node.
    pub default_source_port: Option<&'static str>,
    /// Port on edges entering a node.
    pub default_target_port: Option<&'static str>,
    /// Whether edges into an End node carry a target port at all.
    pub end_takes_target_port: bool,
    /// Port every edge leaving an iteration node carries.
    pub iteration_output_port: Option<&'static str>,
}

/// A target-platform edge with reconciled ids and resolved ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub source: String,
    pub target: String,
    pub source_port: Option<String>,
    pub target_port: Option<String>,
    pub source_kind: NodeKind,
    pub target_kind: NodeKind,
    /// Reconciled id of the iteration whose body holds this edge.
    pub scope: Option<String>,
    pub synthesized: bool,
}

/// Remaps unified edges of one scope onto a target platform.
pub struct EdgeRemapper<'a> {
    conventions: PortConventions,
    ids: &'a IdReconciler,
    ports: &'a BranchPortEngine,
    layout: Option<&'a IterationLayout>,
}

impl<'a> EdgeRemapper<'a> {
    pub fn new(
        conventions: PortConventions,
        ids: &'a IdReconciler,
        ports: &'a BranchPortEngine,
        layout: Option<&'a IterationLayout>,
    ) -> Self {
        Self {
            conventions,
            ids,
            ports,
            layout,
        }
    }

    pub fn remap(&self, edge: &Edge, pass: u8) -> Result<ResolvedEdge, GenerateError> {
        let context = format!("edge {} -> {}", edge.source, edge.target);
        let source = self.ids.require(&edge.source, &context, pass)?.to_string();
        let target = self.ids.require(&edge.target, &context, pass)?.to_string();
        let source_kind = self.kind(&edge.source);
        let target_kind = self.kind(&edge.target);

        let source_port = self.source_port(edge, source_kind);
        let target_port = self.target_port(edge, target_kind);

        Ok(ResolvedEdge {
            source,
            target,
            source_port,
            target_port,
            source_kind,
            target_kind,
            scope: self.layout.map(|l| l.owner_target.clone()),
            synthesized: false,
        })
    }

    fn kind(&self, id: &str) -> NodeKind {
        self.ids.kind_of(id).unwrap_or(NodeKind::Code)
    }

    fn loop_ports(&self) -> Option<(&'a str, &'a str, &'a str)> {
        let layout = self.layout?;
        match layout.shape() {
            IterationShape::NestedBlocks {
                entry_port,
                exit_port,
            } => Some((layout.owner.as_str(), entry_port, exit_port)),
            IterationShape::FlatWithParent { .. } => None,
        }
    }

    fn source_port(&self, edge: &Edge, kind: NodeKind) -> Option<String> {
        if let Some((owner, entry_port, _)) = self.loop_ports() {
            if edge.source == owner {
                return Some(entry_port.to_string());
            }
        }
        if kind.is_branching() {
            let handle = edge.source_handle.as_deref()?;
            let resolved = self.ports.resolve_handle(&edge.source, handle);
            if resolved.is_none() {
                tracing::debug!(
                    node = %edge.source,
                    handle,
                    "unrecognized branch handle, emitting no port"
                );
            }
            return resolved.map(str::to_string);
        }
        if kind == NodeKind::Iteration {
            return self.conventions.iteration_output_port.map(str::to_string);
        }
        self.conventions.default_source_port.map(str::to_string)
    }

    fn target_port(&self, edge: &Edge, kind: NodeKind) -> Option<String> {
        if let Some((owner, _, exit_port)) = self.loop_ports() {
            if edge.target == owner {
                return Some(exit_port.to_string());
            }
        }
        if kind == NodeKind::End && !self.conventions.end_takes_target_port {
            return None;
        }
        self.conventions.default_target_port.map(str::to_string)
    }
}
