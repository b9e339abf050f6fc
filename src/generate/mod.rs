//! Multi-pass generation: annotate the IR once, then emit it in one pure pass.
//!
//! 1. **Discovery** reconciles every id (top level, loop bodies, synthetic
//!    boundary nodes), records titles, maps branch and intent ports, and lays
//!    out iteration bodies.
//! 2. **Reference resolution** emits every node and edge from the IR plus
//!    those annotations. A reference that was never reconciled is fatal.
//! 3. **Refinement** adds the default edge of classifiers whose default port
//!    has none. A failure here only skips that node.
//!
//! The passes run strictly in order; no pass observes a table a previous
//! pass has not finished.

use crate::branch::{BranchPortEngine, PortScheme};
use crate::error::GenerateError;
use crate::ir::{Edge, IterationConfig, Node, NodeConfig, UnifiedDsl, Workflow};
use crate::iteration::{Boundary, IterationFlattener, IterationLayout, IterationShape};
use crate::platform::Platform;
use crate::reconcile::{IdPolicy, IdReconciler, SyntheticRole};
use ahash::AHashMap;

pub mod context;
pub mod edges;

pub use context::{EmitContext, ResolvedRef};
pub use edges::{EdgeRemapper, PortConventions, ResolvedEdge};

pub const DISCOVERY_PASS: u8 = 1;
pub const RESOLUTION_PASS: u8 = 2;
pub const REFINEMENT_PASS: u8 = 3;

/// Everything about a target platform the orchestrator needs to know.
#[derive(Debug, Clone)]
pub struct TargetProfile {
    pub platform: Platform,
    pub id_policy: IdPolicy,
    pub port_scheme: PortScheme,
    pub iteration_shape: IterationShape,
    pub conventions: PortConventions,
}

/// Turns annotated IR into one platform's node and edge values.
pub trait PlatformEmitter {
    type Node;
    type Edge;

    fn profile(&self) -> TargetProfile;

    fn emit_node(&self, node: &Node, ctx: &EmitContext<'_>) -> Result<Self::Node, GenerateError>;

    /// Emits a loop start or end node, reused from the body or synthesized.
    fn emit_boundary(
        &self,
        boundary: &Boundary,
        role: SyntheticRole,
        owner: &Node,
        config: &IterationConfig,
        ctx: &EmitContext<'_>,
    ) -> Result<Self::Node, GenerateError>;

    fn emit_edge(&self, edge: &ResolvedEdge, ctx: &EmitContext<'_>)
    -> Result<Self::Edge, GenerateError>;
}

#[derive(Debug, Clone)]
pub struct EmittedNode<N> {
    /// IR id, or a synthetic key for a synthesized boundary node.
    pub source_id: String,
    pub target_id: String,
    /// Reconciled id of the enclosing iteration.
    pub parent: Option<String>,
    pub node: N,
}

#[derive(Debug, Clone)]
pub struct EmittedEdge<E> {
    pub resolved: ResolvedEdge,
    pub wire: E,
}

/// Emitted nodes and edges in emission order.
#[derive(Debug, Clone)]
pub struct GeneratedGraph<N, E> {
    pub nodes: Vec<EmittedNode<N>>,
    pub edges: Vec<EmittedEdge<E>>,
}

impl<N, E> GeneratedGraph<N, E> {
    /// Nodes directly inside `parent`, or top-level nodes for `None`.
    pub fn nodes_in<'a>(&'a self, parent: Option<&'a str>) -> impl Iterator<Item = &'a EmittedNode<N>> {
        self.nodes.iter().filter(move |n| n.parent.as_deref() == parent)
    }

    pub fn edges_in<'a>(&'a self, scope: Option<&'a str>) -> impl Iterator<Item = &'a EmittedEdge<E>> {
        self.edges
            .iter()
            .filter(move |e| e.resolved.scope.as_deref() == scope)
    }

    pub fn synthesized_edges(&self) -> impl Iterator<Item = &EmittedEdge<E>> {
        self.edges.iter().filter(|e| e.resolved.synthesized)
    }
}

/// Result of the discovery pass.
pub struct Annotations {
    pub ids: IdReconciler,
    pub root_ports: BranchPortEngine,
    pub layouts: AHashMap<String, IterationLayout>,
}

impl Annotations {
    pub fn layout(&self, iteration_id: &str) -> Option<&IterationLayout> {
        self.layouts.get(iteration_id)
    }

    /// Port engine that owns the tables of nodes inside `iteration_id`.
    pub fn ports_for(&self, iteration_id: Option<&str>) -> &BranchPortEngine {
        iteration_id
            .and_then(|id| self.layouts.get(id))
            .and_then(|l| l.ports.as_ref())
            .unwrap_or(&self.root_ports)
    }
}

pub struct Orchestrator<'e, P: PlatformEmitter> {
    emitter: &'e P,
    profile: TargetProfile,
    seed: u64,
}

impl<'e, P: PlatformEmitter> Orchestrator<'e, P> {
    pub fn new(emitter: &'e P, seed: u64) -> Self {
        Self {
            profile: emitter.profile(),
            emitter,
            seed,
        }
    }

    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    pub fn run(&self, dsl: &UnifiedDsl) -> Result<GeneratedGraph<P::Node, P::Edge>, GenerateError> {
        let annotations = self.discover(dsl)?;
        let mut graph = self.emit(dsl, &annotations)?;
        self.refine(dsl, &annotations, &mut graph);

        tracing::info!(
            platform = %self.profile.platform,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            synthesized = graph.synthesized_edges().count(),
            "generated workflow graph"
        );
        Ok(graph)
    }

    /// Pass 1: reconciled ids, titles, port tables and iteration layouts.
    pub fn discover(&self, dsl: &UnifiedDsl) -> Result<Annotations, GenerateError> {
        let workflow = &dsl.workflow;
        let mut ids = IdReconciler::new(self.profile.id_policy.clone(), self.seed);
        let mut root_ports = BranchPortEngine::new(self.profile.port_scheme);
        let mut layouts = AHashMap::new();

        for node in &workflow.nodes {
            let target = ids.reconcile(&node.id, node.kind());
            ids.record_title(&target, &node.title);
        }

        let flattener = IterationFlattener::new(self.profile.iteration_shape, self.profile.port_scheme);
        for node in &workflow.nodes {
            match &node.config {
                NodeConfig::Condition(config) => {
                    root_ports.map_condition(&node.id, config, &mut ids);
                }
                NodeConfig::Classifier(config) => {
                    let outgoing: Vec<&Edge> = workflow.outgoing(&node.id).collect();
                    root_ports.map_classifier(&node.id, config, &outgoing, &mut ids);
                }
                NodeConfig::Iteration(config) => {
                    let layout = flattener.flatten(node, config, &mut ids, &mut root_ports)?;
                    layouts.insert(node.id.clone(), layout);
                }
                _ => {}
            }
        }

        tracing::debug!(
            pass = DISCOVERY_PASS,
            reconciled = ids.len(),
            iterations = layouts.len(),
            "discovery complete"
        );
        Ok(Annotations {
            ids,
            root_ports,
            layouts,
        })
    }

    /// Pass 2: one emission of every node and edge.
    fn emit(
        &self,
        dsl: &UnifiedDsl,
        annotations: &Annotations,
    ) -> Result<GeneratedGraph<P::Node, P::Edge>, GenerateError> {
        let ctx = EmitContext::new(
            &annotations.ids,
            &annotations.root_ports,
            &annotations.layouts,
            RESOLUTION_PASS,
        );
        let mut graph = GeneratedGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
        };

        for node in &dsl.workflow.nodes {
            graph.nodes.push(EmittedNode {
                source_id: node.id.clone(),
                target_id: ctx.target_id(node)?.to_string(),
                parent: None,
                node: self.emitter.emit_node(node, &ctx)?,
            });
            if let NodeConfig::Iteration(config) = &node.config {
                self.emit_body(node, config, &ctx, &mut graph)?;
            }
        }

        let remapper = EdgeRemapper::new(
            self.profile.conventions,
            &annotations.ids,
            &annotations.root_ports,
            None,
        );
        for edge in &dsl.workflow.edges {
            let resolved = remapper.remap(edge, RESOLUTION_PASS)?;
            let wire = self.emitter.emit_edge(&resolved, &ctx)?;
            graph.edges.push(EmittedEdge { resolved, wire });
        }

        for node in &dsl.workflow.nodes {
            let NodeConfig::Iteration(config) = &node.config else {
                continue;
            };
            let Some(layout) = ctx.layout(&node.id) else {
                continue;
            };
            let inner = ctx.within(layout);
            let remapper = EdgeRemapper::new(
                self.profile.conventions,
                &annotations.ids,
                inner.ports(),
                Some(layout),
            );
            let body = config.sub_workflow.edges.iter().map(|e| (e, false));
            let internal = layout.internal_edges.iter().map(|e| (e, true));
            for (edge, synthesized) in body.chain(internal) {
                let mut resolved = remapper.remap(edge, RESOLUTION_PASS)?;
                resolved.synthesized = synthesized;
                let wire = self.emitter.emit_edge(&resolved, &inner)?;
                graph.edges.push(EmittedEdge { resolved, wire });
            }
        }

        tracing::debug!(
            pass = RESOLUTION_PASS,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "emission complete"
        );
        Ok(graph)
    }

    fn emit_body(
        &self,
        owner: &Node,
        config: &IterationConfig,
        ctx: &EmitContext<'_>,
        graph: &mut GeneratedGraph<P::Node, P::Edge>,
    ) -> Result<(), GenerateError> {
        let Some(layout) = ctx.layout(&owner.id) else {
            return Err(GenerateError::UnresolvedReference {
                source_id: owner.id.clone(),
                node_id: owner.id.clone(),
                pass: RESOLUTION_PASS,
            });
        };
        let inner = ctx.within(layout);
        let parent = Some(layout.owner_target.clone());

        if let Some(start) = layout.start.as_ref().filter(|b| b.synthesized) {
            graph.nodes.push(EmittedNode {
                source_id: start.key.clone(),
                target_id: start.target_id.clone(),
                parent: parent.clone(),
                node: self
                    .emitter
                    .emit_boundary(start, SyntheticRole::LoopStart, owner, config, &inner)?,
            });
        }

        for node in &config.sub_workflow.nodes {
            let emitted = match boundary_role(layout, &node.id) {
                Some((boundary, role)) => {
                    self.emitter
                        .emit_boundary(boundary, role, owner, config, &inner)?
                }
                None => self.emitter.emit_node(node, &inner)?,
            };
            graph.nodes.push(EmittedNode {
                source_id: node.id.clone(),
                target_id: inner.target_id(node)?.to_string(),
                parent: parent.clone(),
                node: emitted,
            });
        }

        if let Some(end) = layout.end.as_ref().filter(|b| b.synthesized) {
            graph.nodes.push(EmittedNode {
                source_id: end.key.clone(),
                target_id: end.target_id.clone(),
                parent,
                node: self
                    .emitter
                    .emit_boundary(end, SyntheticRole::LoopEnd, owner, config, &inner)?,
            });
        }
        Ok(())
    }

    /// Pass 3: default edges for classifiers whose default port has none.
    fn refine(
        &self,
        dsl: &UnifiedDsl,
        annotations: &Annotations,
        graph: &mut GeneratedGraph<P::Node, P::Edge>,
    ) {
        let ctx = EmitContext::new(
            &annotations.ids,
            &annotations.root_ports,
            &annotations.layouts,
            REFINEMENT_PASS,
        );

        let mut scopes: Vec<(&Workflow, Option<&IterationLayout>)> = vec![(&dsl.workflow, None)];
        for node in &dsl.workflow.nodes {
            if let NodeConfig::Iteration(config) = &node.config {
                scopes.push((&config.sub_workflow, annotations.layout(&node.id)));
            }
        }

        let mut added = 0;
        for (workflow, layout) in scopes {
            let scoped = match layout {
                Some(layout) => ctx.within(layout),
                None => ctx.within_root(),
            };
            let remapper = EdgeRemapper::new(
                self.profile.conventions,
                &annotations.ids,
                scoped.ports(),
                layout,
            );
            for node in &workflow.nodes {
                if !matches!(node.config, NodeConfig::Classifier(_)) {
                    continue;
                }
                let outcome = default_edge(node, workflow, &remapper, &scoped, graph).and_then(
                    |edge| match edge {
                        Some(resolved) => {
                            let wire = self.emitter.emit_edge(&resolved, &scoped)?;
                            Ok(Some(EmittedEdge { resolved, wire }))
                        }
                        None => Ok(None),
                    },
                );
                match outcome {
                    Ok(Some(edge)) => {
                        graph.edges.push(edge);
                        added += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(node = %node.id, error = %e, "skipping default edge refinement");
                    }
                }
            }
        }

        tracing::debug!(pass = REFINEMENT_PASS, added, "refinement complete");
    }
}

fn boundary_role<'l>(layout: &'l IterationLayout, node_id: &str) -> Option<(&'l Boundary, SyntheticRole)> {
    if let Some(start) = layout.start.as_ref().filter(|b| !b.synthesized && b.key == node_id) {
        return Some((start, SyntheticRole::LoopStart));
    }
    layout
        .end
        .as_ref()
        .filter(|b| !b.synthesized && b.key == node_id)
        .map(|end| (end, SyntheticRole::LoopEnd))
}

/// The edge a classifier's default port should carry, when it has none yet:
/// a copy of its last declared branch edge, moved onto the default port.
///
/// This is a heuristic. The last branch's target is only a guess at where
/// unmatched input should go.
fn default_edge<N, E>(
    node: &Node,
    workflow: &Workflow,
    remapper: &EdgeRemapper<'_>,
    ctx: &EmitContext<'_>,
    graph: &GeneratedGraph<N, E>,
) -> Result<Option<ResolvedEdge>, GenerateError> {
    let Some(table) = ctx.port_table(&node.id) else {
        return Ok(None);
    };
    let Some(default_port) = table.default_port() else {
        return Ok(None);
    };
    let source = ctx.require(&node.id, &node.id)?;

    let covered = graph
        .edges
        .iter()
        .any(|e| e.resolved.source == source && e.resolved.source_port.as_deref() == Some(default_port));
    if covered {
        return Ok(None);
    }

    let last_branch = workflow
        .outgoing(&node.id)
        .filter(|e| {
            e.source_handle
                .as_deref()
                .and_then(|h| table.resolve(h))
                .is_some_and(|port| port != default_port)
        })
        .last();
    let Some(last_branch) = last_branch else {
        tracing::warn!(node = %node.id, "classifier has no branch edge to copy for its default port");
        return Ok(None);
    };

    let mut resolved = remapper.remap(last_branch, ctx.pass)?;
    resolved.source_port = Some(default_port.to_string());
    resolved.synthesized = true;
    tracing::debug!(
        node = %node.id,
        target = %resolved.target,
        port = default_port,
        "synthesized classifier default edge"
    );
    Ok(Some(resolved))
}
