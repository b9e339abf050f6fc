//! Identifier reconciliation between source ids and target-platform ids.
//!
//! One `IdReconciler` belongs to exactly one conversion. It is idempotent: the
//! same source id always reconciles to the same target id, and two distinct
//! source ids never share one.

use crate::error::GenerateError;
use crate::ir::NodeKind;
use ahash::AHashMap;

pub mod strategy;

pub use strategy::{
    IdGenerator, IdPolicy, IdStrategy, RandomIdFormat, RoleIds, SyntheticRole, SyntheticScheme,
};

pub struct IdReconciler {
    generator: IdGenerator,
    forward: AHashMap<String, String>,
    inverse: AHashMap<String, String>,
    kinds: AHashMap<String, NodeKind>,
    titles: AHashMap<String, String>,
}

impl IdReconciler {
    pub fn new(policy: IdPolicy, seed: u64) -> Self {
        Self {
            generator: IdGenerator::new(policy, seed),
            forward: AHashMap::new(),
            inverse: AHashMap::new(),
            kinds: AHashMap::new(),
            titles: AHashMap::new(),
        }
    }

    /// Maps `source_id` to its target id, assigning one on first sight.
    pub fn reconcile(&mut self, source_id: &str, kind: NodeKind) -> String {
        if let Some(existing) = self.forward.get(source_id) {
            return existing.clone();
        }
        let target = self.generator.next_id(kind);
        self.bind(source_id, target.clone(), kind);
        target
    }

    /// Key under which a synthetic boundary node of `owner` is registered.
    pub fn synthetic_key(owner_source_id: &str, role: SyntheticRole) -> String {
        format!("{}#{}", owner_source_id, role.suffix())
    }

    /// The id a synthetic boundary node of `owner` has, derived purely from
    /// the owner's reconciled id. `None` until the owner itself is reconciled.
    pub fn derive_synthetic(&self, owner_source_id: &str, role: SyntheticRole) -> Option<String> {
        let owner_target = self.forward.get(owner_source_id)?;
        Some(self.generator.policy().synthetic.derive(owner_target, role))
    }

    /// Derives and records a synthetic boundary id so reverse lookups and
    /// reference resolution can see it.
    pub fn register_synthetic(
        &mut self,
        owner_source_id: &str,
        role: SyntheticRole,
        kind: NodeKind,
    ) -> Result<String, GenerateError> {
        let key = Self::synthetic_key(owner_source_id, role);
        if let Some(existing) = self.forward.get(&key) {
            return Ok(existing.clone());
        }
        let target = self.derive_synthetic(owner_source_id, role).ok_or_else(|| {
            GenerateError::UnresolvedReference {
                source_id: owner_source_id.to_string(),
                node_id: key.clone(),
                pass: 1,
            }
        })?;
        self.generator.claim(&target);
        self.bind(&key, target.clone(), kind);
        Ok(target)
    }

    fn bind(&mut self, source_id: &str, target: String, kind: NodeKind) {
        self.inverse.insert(target.clone(), source_id.to_string());
        self.forward.insert(source_id.to_string(), target);
        self.kinds.insert(source_id.to_string(), kind);
    }

    pub fn resolve(&self, source_id: &str) -> Option<&str> {
        self.forward.get(source_id).map(String::as_str)
    }

    /// Resolves a reference made by `node_id` during `pass`, failing loudly
    /// when the referenced id was never reconciled.
    pub fn require(&self, source_id: &str, node_id: &str, pass: u8) -> Result<&str, GenerateError> {
        self.resolve(source_id)
            .ok_or_else(|| GenerateError::UnresolvedReference {
                source_id: source_id.to_string(),
                node_id: node_id.to_string(),
                pass,
            })
    }

    /// Reverse lookup: which source id produced `target_id`.
    pub fn source_of(&self, target_id: &str) -> Option<&str> {
        self.inverse.get(target_id).map(String::as_str)
    }

    pub fn kind_of(&self, source_id: &str) -> Option<NodeKind> {
        self.kinds.get(source_id).copied()
    }

    pub fn record_title(&mut self, target_id: &str, title: &str) {
        self.titles.insert(target_id.to_string(), title.to_string());
    }

    /// Human-readable label of a reconciled node, for names and descriptions.
    pub fn title_of(&self, target_id: &str) -> Option<&str> {
        self.titles.get(target_id).map(String::as_str)
    }

    /// A fresh `<prefix>::<uuid>` port id from the same generator.
    pub fn fresh_port_id(&mut self, prefix: &str) -> String {
        self.generator.next_prefixed(prefix)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
