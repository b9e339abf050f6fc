use crate::branch::{BranchPortEngine, PortTable};
use crate::error::GenerateError;
use crate::ir::{Node, NodeKind, VariableSelector, template};
use crate::iteration::IterationLayout;
use crate::reconcile::IdReconciler;
use ahash::AHashMap;

/// A node-output reference after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Reconciled id of the referenced node.
    pub node_id: String,
    pub output: String,
    /// Extra selector segments past the output name.
    pub path: Vec<String>,
    pub kind: NodeKind,
    pub title: String,
    /// The reference names the enclosing iteration's current item, which a
    /// nested-block platform spells as a loop variable.
    pub loop_variable: bool,
}

/// Read-only view of the annotated IR handed to a platform emitter.
///
/// Built once discovery has populated every table, so emission never sees a
/// partially reconciled graph.
#[derive(Clone, Copy)]
pub struct EmitContext<'a> {
    pub ids: &'a IdReconciler,
    root_ports: &'a BranchPortEngine,
    layouts: &'a AHashMap<String, IterationLayout>,
    scope: Option<&'a IterationLayout>,
    pub pass: u8,
}

impl<'a> EmitContext<'a> {
    pub(crate) fn new(
        ids: &'a IdReconciler,
        root_ports: &'a BranchPortEngine,
        layouts: &'a AHashMap<String, IterationLayout>,
        pass: u8,
    ) -> Self {
        Self {
            ids,
            root_ports,
            layouts,
            scope: None,
            pass,
        }
    }

    /// The same context, positioned inside `layout`'s body.
    pub(crate) fn within(&self, layout: &'a IterationLayout) -> Self {
        Self {
            scope: Some(layout),
            ..*self
        }
    }

    pub(crate) fn within_root(&self) -> Self {
        Self {
            scope: None,
            ..*self
        }
    }

    pub fn scope(&self) -> Option<&'a IterationLayout> {
        self.scope
    }

    /// Reconciled id of the enclosing iteration, if any.
    pub fn parent_id(&self) -> Option<&'a str> {
        self.scope.map(|l| l.owner_target.as_str())
    }

    pub fn target_id(&self, node: &Node) -> Result<&'a str, GenerateError> {
        self.ids.require(&node.id, &node.id, self.pass)
    }

    pub fn require(&self, source_id: &str, referencing: &str) -> Result<&'a str, GenerateError> {
        self.ids.require(source_id, referencing, self.pass)
    }

    pub fn layout(&self, iteration_id: &str) -> Option<&'a IterationLayout> {
        self.layouts.get(iteration_id)
    }

    /// Port engine for the current scope.
    pub fn ports(&self) -> &'a BranchPortEngine {
        self.scope
            .and_then(|l| l.ports.as_ref())
            .unwrap_or(self.root_ports)
    }

    pub fn port_table(&self, node_id: &str) -> Option<&'a PortTable> {
        self.ports().table(node_id)
    }

    pub fn title(&self, target_id: &str) -> &'a str {
        self.ids.title_of(target_id).unwrap_or("")
    }

    /// Resolves `referenced.output` as seen from `referencing`.
    pub fn resolve_output(
        &self,
        referencing: &str,
        referenced: &str,
        output: &str,
    ) -> Result<ResolvedRef, GenerateError> {
        self.resolve_path(referencing, referenced, output, &[])
    }

    pub fn resolve_selector(
        &self,
        referencing: &str,
        selector: &VariableSelector,
    ) -> Result<ResolvedRef, GenerateError> {
        self.resolve_path(
            referencing,
            selector.node_id(),
            selector.output_name(),
            &selector.segments()[2..],
        )
    }

    fn resolve_path(
        &self,
        referencing: &str,
        referenced: &str,
        output: &str,
        path: &[String],
    ) -> Result<ResolvedRef, GenerateError> {
        let (source, output, loop_variable) = match self.scope {
            Some(layout) => match layout.rewrite_reference(referenced, output) {
                Some((key, start_output)) => (key, start_output, false),
                None => (
                    referenced.to_string(),
                    output.to_string(),
                    referenced == layout.owner,
                ),
            },
            None => (referenced.to_string(), output.to_string(), false),
        };
        let node_id = self.require(&source, referencing)?.to_string();
        let kind = self.ids.kind_of(&source).unwrap_or(NodeKind::Start);
        Ok(ResolvedRef {
            title: self.title(&node_id).to_string(),
            node_id,
            output,
            path: path.to_vec(),
            kind,
            loop_variable,
        })
    }

    /// Rewrites `{{#node.output#}}` placeholders to reconciled ids.
    pub fn render_template(&self, node: &Node, text: &str) -> Result<String, GenerateError> {
        let mut failure = None;
        let rendered = template::rewrite(text, |p| match p {
            template::Placeholder::NodeOutput { node_id, output } => {
                match self.resolve_output(&node.id, node_id, output) {
                    Ok(r) => Some(template::node_output(&r.node_id, &r.output)),
                    Err(e) => {
                        failure.get_or_insert(e);
                        None
                    }
                }
            }
            template::Placeholder::Input(_) => None,
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(rendered),
        }
    }
}
