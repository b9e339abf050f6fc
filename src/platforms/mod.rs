//! Wire formats, parsers and generators, one module per platform.
//!
//! Every parser normalizes into the same IR shape: branch edges carry the
//! IR `caseId`/`classId` as their handle, loop boundary nodes are folded
//! into the owning iteration, and the result is checked before it is
//! returned. Every generator goes through the [`Orchestrator`].
//!
//! [`Orchestrator`]: crate::generate::Orchestrator

use crate::error::{GenerateError, ParseError};
use crate::ir::{ITERATION_INDEX, ITERATION_ITEM, Node, NodeConfig, Workflow, visit};
use crate::platform::Platform;
use ahash::AHashSet;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod coze;
pub mod dify;
pub mod iflytek;
pub mod unified;

pub use coze::{CozeGenerator, CozeParser};
pub use dify::{DifyGenerator, DifyParser};
pub use iflytek::{IFlytekGenerator, IFlytekParser};
pub use unified::UnifiedFormat;

/// Default bound on random id candidates before the nanosecond fallback.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Id-generation knobs shared by every generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Seeds every random id. The same seed reproduces the same document.
    pub seed: u64,
    /// First counter value for counter-based platforms; `None` keeps the
    /// platform's own base.
    pub counter_base: Option<u64>,
    /// Millisecond base for timestamp ids; `None` reads the clock.
    pub timestamp_base: Option<u64>,
    pub max_attempts: u32,
    /// Wrap the document in a ZIP archive where the platform exports one.
    pub archive: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            counter_base: None,
            timestamp_base: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            archive: false,
        }
    }
}

pub(crate) fn read_yaml<T: DeserializeOwned>(platform: Platform, bytes: &[u8]) -> Result<T, ParseError> {
    serde_yaml::from_slice(bytes).map_err(|e| ParseError::Yaml {
        platform,
        message: e.to_string(),
    })
}

pub(crate) fn write_yaml<T: Serialize>(platform: Platform, value: &T) -> Result<Vec<u8>, GenerateError> {
    serde_yaml::to_string(value)
        .map(String::into_bytes)
        .map_err(|e| GenerateError::Serialize {
            platform,
            message: e.to_string(),
        })
}

pub(crate) fn required<T>(value: Option<T>, node_id: &str, field: &str) -> Result<T, ParseError> {
    value.ok_or_else(|| ParseError::MissingField {
        node_id: node_id.to_string(),
        field: field.to_string(),
    })
}

/// Removes platform loop boundary nodes from an iteration body. Their edges
/// are dropped and references to their outputs become references to the
/// owning iteration's `item` (or `index`).
pub(crate) fn fold_loop_boundaries(owner: &str, body: &mut Workflow, boundaries: &AHashSet<String>) {
    if boundaries.is_empty() {
        return;
    }
    body.nodes.retain(|n| !boundaries.contains(&n.id));
    body.edges
        .retain(|e| !boundaries.contains(&e.source) && !boundaries.contains(&e.target));

    for node in &mut body.nodes {
        visit::rewrite_references(node, |node_id, output| {
            boundaries.contains(node_id).then(|| {
                let folded = if output == ITERATION_INDEX {
                    ITERATION_INDEX
                } else {
                    ITERATION_ITEM
                };
                (owner.to_string(), folded.to_string())
            })
        });
    }
    tracing::debug!(iteration = owner, folded = boundaries.len(), "folded loop boundary nodes");
}

/// IR handle for a branch edge leaving `node`. Platforms that name ports by
/// case or class id already carry the handle; anything else is dropped.
pub(crate) fn branch_handle(node: &Node, handle: Option<&str>) -> Option<String> {
    let handle = handle?;
    let known = match &node.config {
        NodeConfig::Condition(config) => config.case(handle).is_some(),
        NodeConfig::Classifier(config) => config.class(handle).is_some(),
        _ => false,
    };
    known.then(|| handle.to_string())
}
