//! Branch and intent port mapping for condition and classifier nodes.
//!
//! Port ids are derived from a node's *position* in sorted order, never from
//! raw `level` values: source platforms assign levels freely, so only their
//! relative order is portable.

use crate::ir::{ClassifierConfig, ConditionCase, ConditionConfig, Edge};
use crate::reconcile::IdReconciler;
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;

pub mod default;

pub use default::{find_default_class, looks_like_default};

/// How a target platform names branch and intent ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortScheme {
    /// `true`, `true_1`, … / `false`; `branch_0`, `branch_1`, … / `default`.
    Positional,
    /// The first case is `true`, later cases and all classes keep their own
    /// ids; the else branch is `false`.
    CaseId,
    /// A fresh `<prefix>::<uuid>` for every case and class, default included.
    Generated {
        case_prefix: &'static str,
        intent_prefix: &'static str,
    },
}

pub const CONDITION_DEFAULT_PORT: &str = "false";
pub const INTENT_DEFAULT_PORT: &str = "default";

fn condition_port_name(k: usize) -> String {
    if k == 0 {
        "true".to_string()
    } else {
        format!("true_{}", k)
    }
}

/// Case ids that would collide with a positional or else port.
fn is_reserved(case_id: &str) -> bool {
    case_id == "true" || case_id == CONDITION_DEFAULT_PORT
}

/// First positional name from `true_{k}` on that no kept case id or earlier
/// port already uses.
fn free_positional_port(k: usize, kept: &AHashSet<&str>, table: &PortTable) -> String {
    (k..)
        .map(condition_port_name)
        .find(|name| {
            !kept.contains(name.as_str()) && table.assignments.iter().all(|a| &a.port != name)
        })
        .unwrap_or_else(|| condition_port_name(k))
}

/// One assigned port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAssignment {
    /// The IR handle: a `caseId` or `classId`. Empty for an implicit default port.
    pub handle: String,
    pub port: String,
    /// Position among non-default ports; `None` for the default.
    pub index: Option<usize>,
}

impl PortAssignment {
    pub fn is_default(&self) -> bool {
        self.index.is_none()
    }
}

/// Ports of one condition or classifier node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortTable {
    /// Non-default ports in assigned order, then the default port if any.
    pub assignments: Vec<PortAssignment>,
    aliases: AHashMap<String, String>,
}

impl PortTable {
    fn push(&mut self, handle: &str, port: String, index: Option<usize>) {
        self.assignments.push(PortAssignment {
            handle: handle.to_string(),
            port,
            index,
        });
    }

    /// Adds the legacy handle spellings edges may still carry: positional
    /// names, bare indices and default names. Real handles always take
    /// precedence over an alias of the same name.
    fn add_aliases(&mut self, positional: fn(usize) -> String, default_like: &[&str]) {
        let mut aliases = AHashMap::new();
        for assignment in &self.assignments {
            match assignment.index {
                Some(k) => {
                    aliases.insert(positional(k), assignment.port.clone());
                    aliases.insert(k.to_string(), assignment.port.clone());
                }
                None => {
                    for name in default_like {
                        aliases.insert(name.to_string(), assignment.port.clone());
                    }
                }
            }
        }
        self.aliases = aliases;
    }

    /// Port for an IR handle, or for one of its legacy aliases.
    pub fn resolve(&self, handle: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| !a.handle.is_empty() && a.handle == handle)
            .map(|a| a.port.as_str())
            .or_else(|| self.aliases.get(handle).map(String::as_str))
    }

    pub fn default_assignment(&self) -> Option<&PortAssignment> {
        self.assignments.iter().find(|a| a.is_default())
    }

    pub fn default_port(&self) -> Option<&str> {
        self.default_assignment().map(|a| a.port.as_str())
    }

    /// Non-default assignments, in order.
    pub fn branches(&self) -> impl Iterator<Item = &PortAssignment> {
        self.assignments.iter().filter(|a| !a.is_default())
    }

    pub fn port_of_handle(&self, handle: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| a.handle == handle)
            .map(|a| a.port.as_str())
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Computes and holds port tables for every branching node in one scope.
///
/// Nested iteration bodies get their own engine so identically named
/// branches in sibling loops cannot collide.
#[derive(Debug, Clone)]
pub struct BranchPortEngine {
    scheme: PortScheme,
    tables: AHashMap<String, PortTable>,
}

impl BranchPortEngine {
    pub fn new(scheme: PortScheme) -> Self {
        Self {
            scheme,
            tables: AHashMap::new(),
        }
    }

    pub fn scheme(&self) -> PortScheme {
        self.scheme
    }

    pub fn table(&self, node_id: &str) -> Option<&PortTable> {
        self.tables.get(node_id)
    }

    pub fn resolve_handle(&self, node_id: &str, handle: &str) -> Option<&str> {
        self.tables.get(node_id)?.resolve(handle)
    }

    /// Condition ports: non-default cases sorted by level, indexed by position;
    /// the default case always takes the fixed else port.
    pub fn map_condition(
        &mut self,
        node_id: &str,
        config: &ConditionConfig,
        ids: &mut IdReconciler,
    ) -> &PortTable {
        if self.tables.contains_key(node_id) {
            return &self.tables[node_id];
        }
        let (defaults, mut branches): (Vec<&ConditionCase>, Vec<&ConditionCase>) =
            config.cases.iter().partition(|c| c.is_default());
        branches.sort_by_key(|c| c.level);

        // Ids later cases keep verbatim under `CaseId`.
        let kept: AHashSet<&str> = branches
            .iter()
            .skip(1)
            .map(|c| c.case_id.as_str())
            .filter(|id| !is_reserved(id))
            .collect();

        let mut table = PortTable::default();
        for (k, case) in branches.iter().enumerate() {
            let port = match self.scheme {
                PortScheme::Positional => condition_port_name(k),
                PortScheme::CaseId if k == 0 => condition_port_name(0),
                PortScheme::CaseId if is_reserved(&case.case_id) => {
                    free_positional_port(k, &kept, &table)
                }
                PortScheme::CaseId => case.case_id.clone(),
                PortScheme::Generated { case_prefix, .. } => ids.fresh_port_id(case_prefix),
            };
            table.push(&case.case_id, port, Some(k));
        }

        let default_handle = defaults.first().map_or("", |c| c.case_id.as_str());
        let default_port = match self.scheme {
            PortScheme::Positional | PortScheme::CaseId => CONDITION_DEFAULT_PORT.to_string(),
            PortScheme::Generated { case_prefix, .. } => ids.fresh_port_id(case_prefix),
        };
        table.push(default_handle, default_port, None);
        table.add_aliases(condition_port_name, &["false", "else"]);
        let first = table.branches().next().map(|a| a.port.clone());
        if let Some(first) = first {
            table.aliases.insert("true_0".to_string(), first);
        }

        tracing::debug!(node = node_id, ports = table.len(), "mapped condition ports");
        self.tables.entry(node_id.to_string()).or_insert(table)
    }

    /// Classifier ports, ordered by the node's outgoing edge declarations.
    pub fn map_classifier(
        &mut self,
        node_id: &str,
        config: &ClassifierConfig,
        outgoing: &[&Edge],
        ids: &mut IdReconciler,
    ) -> &PortTable {
        if self.tables.contains_key(node_id) {
            return &self.tables[node_id];
        }
        let edge_order = outgoing
            .iter()
            .filter_map(|e| e.source_handle.as_deref())
            .filter_map(|h| config.classes.iter().position(|c| c.id == h))
            .unique();
        let order: Vec<usize> = edge_order
            .chain(0..config.classes.len())
            .unique()
            .collect();

        let default_index = find_default_class(&config.classes);
        if default_index.is_none() {
            tracing::warn!(
                node = node_id,
                "classifier has no default class; the default port keeps no class"
            );
        }

        let mut table = PortTable::default();
        let mut k = 0;
        for &i in order.iter().filter(|&&i| Some(i) != default_index) {
            let class = &config.classes[i];
            let port = match self.scheme {
                PortScheme::Positional => format!("branch_{}", k),
                PortScheme::CaseId => class.id.clone(),
                PortScheme::Generated { intent_prefix, .. } => ids.fresh_port_id(intent_prefix),
            };
            table.push(&class.id, port, Some(k));
            k += 1;
        }

        match (default_index, self.scheme) {
            (Some(i), scheme) => {
                let class = &config.classes[i];
                let port = match scheme {
                    PortScheme::Positional => INTENT_DEFAULT_PORT.to_string(),
                    PortScheme::CaseId => class.id.clone(),
                    PortScheme::Generated { intent_prefix, .. } => {
                        ids.fresh_port_id(intent_prefix)
                    }
                };
                table.push(&class.id, port, None);
            }
            (None, PortScheme::Positional) => {
                table.push("", INTENT_DEFAULT_PORT.to_string(), None);
            }
            (None, PortScheme::Generated { intent_prefix, .. }) => {
                let port = ids.fresh_port_id(intent_prefix);
                table.push("", port, None);
            }
            (None, PortScheme::CaseId) => {}
        }
        table.add_aliases(|k| format!("branch_{}", k), &["default"]);

        tracing::debug!(node = node_id, ports = table.len(), "mapped classifier ports");
        self.tables.entry(node_id.to_string()).or_insert(table)
    }
}
