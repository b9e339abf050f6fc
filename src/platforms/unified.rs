//! The IR's own YAML form, readable and writable like any platform.

use crate::error::{GenerateError, ParseError};
use crate::ir::{NodeKind, UnifiedDsl};
use crate::platform::{DslGenerator, DslParser, NodeScope, Platform};

pub struct UnifiedFormat;

impl DslParser for UnifiedFormat {
    fn platform(&self) -> Platform {
        Platform::Unified
    }

    fn validate_input(&self, bytes: &[u8]) -> Result<(), ParseError> {
        self.parse(bytes).map(|_| ())
    }

    fn parse(&self, bytes: &[u8]) -> Result<UnifiedDsl, ParseError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Yaml {
            platform: Platform::Unified,
            message: e.to_string(),
        })?;
        UnifiedDsl::from_yaml(text)
    }
}

impl DslGenerator for UnifiedFormat {
    fn platform(&self) -> Platform {
        Platform::Unified
    }

    fn supports(&self, kind: NodeKind, scope: NodeScope) -> bool {
        !(scope == NodeScope::InIteration && kind == NodeKind::Iteration)
    }

    fn generate(&self, dsl: &UnifiedDsl) -> Result<Vec<u8>, GenerateError> {
        self.validate(dsl)?;
        dsl.to_yaml()
            .map(String::into_bytes)
            .map_err(|e| GenerateError::Serialize {
                platform: Platform::Unified,
                message: e.to_string(),
            })
    }
}
