use crate::error::{GenerateError, ParseError};
use crate::ir::{NodeConfig, NodeKind, UnifiedDsl, invariants};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Magic bytes opening every ZIP local file header.
pub const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// The documents this crate can read and write.
///
/// `Unified` is the IR's own YAML form; the other three are vendor platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    #[serde(rename = "iflytek")]
    IFlytek,
    Dify,
    Coze,
    Unified,
}

impl Platform {
    pub const VENDORS: [Platform; 3] = [Platform::IFlytek, Platform::Dify, Platform::Coze];

    pub fn name(self) -> &'static str {
        match self {
            Platform::IFlytek => "iflytek",
            Platform::Dify => "dify",
            Platform::Coze => "coze",
            Platform::Unified => "unified",
        }
    }

    /// Identifies which platform exported `bytes`.
    pub fn detect(bytes: &[u8]) -> Result<Platform, ParseError> {
        if bytes.starts_with(ZIP_MAGIC) {
            return Ok(Platform::Coze);
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ParseError::UnknownFormat(format!("input is not UTF-8: {}", e)))?;
        let value: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| ParseError::UnknownFormat(format!("input is not YAML: {}", e)))?;
        let mapping = value
            .as_mapping()
            .ok_or_else(|| ParseError::UnknownFormat("top level is not a mapping".to_string()))?;
        let has = |key: &str| mapping.contains_key(key);

        if has("flowData") {
            Ok(Platform::IFlytek)
        } else if has("workflow") && has("app") {
            Ok(Platform::Dify)
        } else if has("schema_version") || has("nodes") {
            Ok(Platform::Coze)
        } else if has("metadata") && has("workflow") {
            Ok(Platform::Unified)
        } else {
            Err(ParseError::UnknownFormat(
                "no known top-level keys (flowData, app/workflow, schema_version, metadata)"
                    .to_string(),
            ))
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "iflytek" | "spark" | "xingchen" => Ok(Platform::IFlytek),
            "dify" => Ok(Platform::Dify),
            "coze" => Ok(Platform::Coze),
            "unified" | "ir" => Ok(Platform::Unified),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// Where a node sits relative to iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeScope {
    TopLevel,
    InIteration,
}

/// Reads one platform's export into the unified IR.
pub trait DslParser: Send + Sync {
    fn platform(&self) -> Platform;

    /// Cheap shape check of the raw input without building the IR.
    fn validate_input(&self, bytes: &[u8]) -> Result<(), ParseError>;

    fn parse(&self, bytes: &[u8]) -> Result<UnifiedDsl, ParseError>;
}

/// Writes the unified IR as one platform's native document.
pub trait DslGenerator: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether the platform can represent `kind` in `scope`. Callers that
    /// want placeholder substitution use this to find the nodes to replace.
    fn supports(&self, kind: NodeKind, scope: NodeScope) -> bool;

    /// Rejects IR this generator cannot emit before any id is assigned.
    fn validate(&self, dsl: &UnifiedDsl) -> Result<(), GenerateError> {
        invariants::check(dsl)?;
        for node in &dsl.workflow.nodes {
            if !self.supports(node.kind(), NodeScope::TopLevel) {
                return Err(self.unsupported(&node.id, node.kind()));
            }
            if let NodeConfig::Iteration(config) = &node.config {
                for inner in &config.sub_workflow.nodes {
                    if !self.supports(inner.kind(), NodeScope::InIteration) {
                        return Err(self.unsupported(&inner.id, inner.kind()));
                    }
                }
            }
        }
        Ok(())
    }

    fn generate(&self, dsl: &UnifiedDsl) -> Result<Vec<u8>, GenerateError>;

    fn unsupported(&self, node_id: &str, kind: NodeKind) -> GenerateError {
        GenerateError::UnsupportedNodeKind {
            node_id: node_id.to_string(),
            kind,
            platform: self.platform(),
        }
    }
}
