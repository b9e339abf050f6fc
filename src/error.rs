use crate::ir::NodeKind;
use crate::platform::Platform;
use thiserror::Error;

/// Structural problems in a `UnifiedDsl`, detected when the IR is built or checked.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrError {
    #[error("Structural invariant violated at node '{node_id}': {message}")]
    StructuralInvariantViolation { node_id: String, message: String },

    #[error("Node '{node_id}' is declared as {expected} but carries a {found} config")]
    MalformedConfig {
        node_id: String,
        expected: String,
        found: String,
    },
}

impl IrError {
    pub(crate) fn violation(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        IrError::StructuralInvariantViolation {
            node_id: node_id.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur while reading a platform document into the unified IR.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("Failed to parse {platform} YAML: {message}")]
    Yaml { platform: Platform, message: String },

    #[error("Failed to read {platform} archive: {message}")]
    Archive { platform: Platform, message: String },

    #[error("Could not detect the source platform: {0}")]
    UnknownFormat(String),

    #[error("Node '{node_id}' has a node type '{type_name}' with no unified equivalent")]
    UnsupportedNodeType { node_id: String, type_name: String },

    #[error("Node '{node_id}' is missing required field '{field}'")]
    MissingField { node_id: String, field: String },

    #[error("Node '{node_id}' has an invalid value for '{field}': {message}")]
    InvalidField {
        node_id: String,
        field: String,
        message: String,
    },

    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Errors that can occur while generating a platform document from the unified IR.
#[derive(Error, Debug, Clone)]
pub enum GenerateError {
    #[error(
        "Reference to '{source_id}' from node '{node_id}' was never reconciled (pass {pass})"
    )]
    UnresolvedReference {
        source_id: String,
        node_id: String,
        pass: u8,
    },

    #[error("Node '{node_id}' of kind {kind} cannot be represented on {platform}")]
    UnsupportedNodeKind {
        node_id: String,
        kind: NodeKind,
        platform: Platform,
    },

    #[error("Failed to serialize {platform} document: {message}")]
    Serialize { platform: Platform, message: String },

    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Top-level error for a full `source bytes -> target bytes` conversion.
#[derive(Error, Debug, Clone)]
pub enum ConvertError {
    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Generation failed: {0}")]
    Generate(#[from] GenerateError),
}
