//! Serde model of a Coze workflow export.
//!
//! Loop bodies are nested: a `loop` node carries its own `blocks` and
//! `edges`, and talks to them through two reserved ports on itself.

use crate::ir::{ComparisonOperator, DataType, LogicalOperator, NodeKind, Position};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "1.0.0";
pub const START_ID: &str = "100001";
pub const END_ID: &str = "900001";
pub const COUNTER_BASE: u64 = 100002;

pub const LOOP_ENTRY_PORT: &str = "loop-function-inline-output";
pub const LOOP_EXIT_PORT: &str = "loop-function-inline-input";
pub const LOOP_OUTPUT_PORT: &str = "loop-output";

/// Case ids given to Coze condition branches, which carry none.
pub const CASE_ID_PREFIX: &str = "case_";
pub const ELSE_CASE_ID: &str = "case_else";
pub const INTENT_ID_PREFIX: &str = "intent_";
pub const DEFAULT_INTENT_ID: &str = "intent_default";

pub const KNOWN_NODE_TYPES: [&str; 7] = ["start", "end", "llm", "code", "condition", "intent", "loop"];

pub fn type_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Start => "start",
        NodeKind::End => "end",
        NodeKind::Llm => "llm",
        NodeKind::Code => "code",
        NodeKind::Condition => "condition",
        NodeKind::Classifier => "intent",
        NodeKind::Iteration => "loop",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CozeDocument {
    pub schema_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<CozeNode>,
    #[serde(default)]
    pub edges: Vec<CozeEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CozeNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<CozeInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<CozeOutput>,
    #[serde(default, skip_serializing_if = "serde_yaml::Value::is_null")]
    pub parameters: serde_yaml::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<CozeNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<CozeEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CozeInput {
    pub name: String,
    #[serde(rename = "type", default = "string_type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CozeValue>,
}

fn string_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CozeOutput {
    pub name: String,
    #[serde(rename = "type", default = "string_type")]
    pub data_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A value slot: a literal, or a reference to another block's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CozeValue {
    Literal {
        content: serde_json::Value,
    },
    Ref {
        source: RefSource,
        block_id: String,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefSource {
    BlockOutput,
    /// The enclosing loop's current item or index.
    LoopVariable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndParams {
    #[serde(default)]
    pub terminate_plan: TerminatePlan,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatePlan {
    #[default]
    ReturnVariables,
    UseAnswerContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeModel {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmParams {
    #[serde(default)]
    pub model: CozeModel,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeParams {
    /// 3 is Python, 5 is JavaScript.
    #[serde(default = "python")]
    pub language: u8,
    #[serde(default)]
    pub code: String,
}

fn python() -> u8 {
    PYTHON
}

pub const PYTHON: u8 = 3;
pub const JAVASCRIPT: u8 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionParams {
    /// Non-default branches in evaluation order. The else branch is implicit.
    #[serde(default)]
    pub branches: Vec<CozeBranch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CozeBranch {
    /// 1 is AND, 2 is OR.
    #[serde(default = "and")]
    pub logic: u8,
    #[serde(default)]
    pub conditions: Vec<CozeCondition>,
}

fn and() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CozeCondition {
    pub left: CozeValue,
    pub operator: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<CozeValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentParams {
    #[serde(default)]
    pub model: CozeModel,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,
    /// Non-default intents. The default intent is implicit.
    #[serde(default)]
    pub intents: Vec<CozeIntent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CozeIntent {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopParams {
    #[serde(default = "array_loop")]
    pub loop_type: String,
    pub input: CozeValue,
    pub output: CozeValue,
    #[serde(default)]
    pub parallel: bool,
}

fn array_loop() -> String {
    "array".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CozeEdge {
    pub source_node: String,
    pub target_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
}

pub fn logic_code(op: LogicalOperator) -> u8 {
    match op {
        LogicalOperator::And => 1,
        LogicalOperator::Or => 2,
    }
}

pub fn parse_logic(code: u8) -> LogicalOperator {
    match code {
        2 => LogicalOperator::Or,
        _ => LogicalOperator::And,
    }
}

const OPERATOR_CODES: [(ComparisonOperator, u8); 16] = [
    (ComparisonOperator::Equal, 1),
    (ComparisonOperator::NotEqual, 2),
    (ComparisonOperator::Greater, 3),
    (ComparisonOperator::GreaterOrEqual, 4),
    (ComparisonOperator::Less, 5),
    (ComparisonOperator::LessOrEqual, 6),
    (ComparisonOperator::Contains, 7),
    (ComparisonOperator::NotContains, 8),
    (ComparisonOperator::Empty, 9),
    (ComparisonOperator::NotEmpty, 10),
    (ComparisonOperator::Is, 11),
    (ComparisonOperator::IsNot, 12),
    (ComparisonOperator::StartWith, 13),
    (ComparisonOperator::EndWith, 14),
    (ComparisonOperator::Null, 15),
    (ComparisonOperator::NotNull, 16),
];

pub fn operator_code(op: ComparisonOperator) -> u8 {
    OPERATOR_CODES
        .iter()
        .find(|(candidate, _)| *candidate == op)
        .map_or(1, |(_, code)| *code)
}

pub fn parse_operator(code: u8) -> Option<ComparisonOperator> {
    OPERATOR_CODES
        .iter()
        .find(|(_, candidate)| *candidate == code)
        .map(|(op, _)| *op)
}

pub fn data_type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String => "string",
        DataType::Integer => "integer",
        DataType::Number => "float",
        DataType::Boolean => "boolean",
        DataType::Object => "object",
        DataType::ArrayString => "list<string>",
        DataType::ArrayInteger => "list<integer>",
        DataType::ArrayNumber => "list<float>",
        DataType::ArrayBoolean => "list<boolean>",
        DataType::ArrayObject => "list<object>",
        DataType::File => "file",
    }
}

pub fn parse_data_type(name: &str) -> DataType {
    match name {
        "integer" => DataType::Integer,
        "float" | "number" => DataType::Number,
        "boolean" => DataType::Boolean,
        "object" => DataType::Object,
        "list<string>" => DataType::ArrayString,
        "list<integer>" => DataType::ArrayInteger,
        "list<float>" | "list<number>" => DataType::ArrayNumber,
        "list<boolean>" => DataType::ArrayBoolean,
        "list<object>" => DataType::ArrayObject,
        "file" => DataType::File,
        _ => DataType::String,
    }
}
