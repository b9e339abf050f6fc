//! Prelude module for convenient imports
//!
//! Re-exports the types most conversions need.
//!
//! # Example
//!
//! ```rust,no_run
//! use kakehashi::prelude::*;
//!
//! # fn run_example() -> Result<(), ConvertError> {
//! let bytes = std::fs::read("flow.yml").unwrap_or_default();
//! let dsl = Converter::detecting(Platform::Unified).build().parse(&bytes)?;
//! println!("{} nodes", dsl.workflow.nodes.len());
//! # Ok(())
//! # }
//! ```

// Conversion entry points
pub use crate::convert::{Converter, ConverterBuilder, generator_for, parser_for};
pub use crate::platform::{DslGenerator, DslParser, NodeScope, Platform};
pub use crate::platforms::GeneratorOptions;

// Unified IR
pub use crate::ir::{
    ClassifierClass, ClassifierConfig, CodeConfig, CodeLanguage, ComparisonOperator, CompareValue,
    Condition, ConditionCase, ConditionConfig, DataType, Edge, EndConfig, EndOutputMode, Input,
    IterationConfig, IteratorSource, LlmConfig, Metadata, ModelSpec, Node, NodeConfig, NodeKind,
    Output, OutputSelector, StartConfig, UnifiedDsl, VariableReference, VariableSelector, Workflow,
};

// Error types
pub use crate::error::{ConvertError, GenerateError, IrError, ParseError};
