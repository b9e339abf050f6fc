//! iFlytek Spark agent export (`flowMeta` + `flowData`).
//!
//! A node's kind is encoded in its id, `<prefix>::<uuid>`. Kind-specific
//! settings live in `nodeParam`, read into the typed structs below.

use crate::ir::{ComparisonOperator, DataType, NodeKind, Position};
use serde::{Deserialize, Serialize};

pub const DSL_VERSION: &str = "v1";
pub const CASE_PORT_PREFIX: &str = "branch_one_of";
pub const INTENT_PORT_PREFIX: &str = "intent-one-of";
pub const LOOP_START_PREFIX: &str = "iteration-node-start";
pub const LOOP_END_PREFIX: &str = "iteration-node-end";
/// The single output of a loop start node and input of a loop end node.
pub const LOOP_START_OUTPUT: &str = "input";
pub const LOOP_END_INPUT: &str = "output";
pub const ITERATION_INPUT: &str = "input";
pub const CLASSIFIER_INPUT: &str = "Query";
pub const DEFAULT_INTENT_TYPE: u8 = 1;
pub const NORMAL_INTENT_TYPE: u8 = 2;

pub fn kind_prefix(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Start => "node-start",
        NodeKind::End => "node-end",
        NodeKind::Llm => "spark-llm",
        NodeKind::Code => "ifly-code",
        NodeKind::Condition => "if-else",
        NodeKind::Classifier => "decision-making",
        NodeKind::Iteration => "iteration",
    }
}

/// What a node id's prefix says the node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparkKind {
    Node(NodeKind),
    LoopStart,
    LoopEnd,
}

pub fn parse_kind(id: &str) -> Option<SparkKind> {
    let prefix = id.split_once("::").map_or(id, |(prefix, _)| prefix);
    let kind = match prefix {
        LOOP_START_PREFIX => SparkKind::LoopStart,
        LOOP_END_PREFIX => SparkKind::LoopEnd,
        "node-start" => SparkKind::Node(NodeKind::Start),
        "node-end" => SparkKind::Node(NodeKind::End),
        "spark-llm" => SparkKind::Node(NodeKind::Llm),
        "ifly-code" => SparkKind::Node(NodeKind::Code),
        "if-else" => SparkKind::Node(NodeKind::Condition),
        "decision-making" => SparkKind::Node(NodeKind::Classifier),
        "iteration" => SparkKind::Node(NodeKind::Iteration),
        _ => return None,
    };
    Some(kind)
}

/// Display type and node-meta alias shown in the editor.
pub fn display_names(kind: SparkKind) -> (&'static str, &'static str) {
    match kind {
        SparkKind::Node(NodeKind::Start) => ("开始节点", "开始"),
        SparkKind::Node(NodeKind::End) => ("结束节点", "结束"),
        SparkKind::Node(NodeKind::Llm) => ("大模型", "大模型"),
        SparkKind::Node(NodeKind::Code) => ("代码", "代码"),
        SparkKind::Node(NodeKind::Condition) => ("分支器", "分支器"),
        SparkKind::Node(NodeKind::Classifier) => ("决策", "决策"),
        SparkKind::Node(NodeKind::Iteration) => ("迭代", "迭代"),
        SparkKind::LoopStart => ("迭代开始", "开始"),
        SparkKind::LoopEnd => ("迭代结束", "结束"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkDocument {
    pub flow_meta: FlowMeta,
    pub flow_data: FlowData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dsl_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowData {
    #[serde(default)]
    pub nodes: Vec<SparkNode>,
    #[serde(default)]
    pub edges: Vec<SparkEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkNode {
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub data: SparkNodeData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkNodeData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub node_meta: NodeMeta,
    #[serde(default)]
    pub inputs: Vec<SparkInput>,
    #[serde(default)]
    pub outputs: Vec<SparkOutput>,
    #[serde(default)]
    pub node_param: serde_yaml::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub alias_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkInput {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub schema: InputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type", default = "string_type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SparkValue>,
}

fn string_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum SparkValue {
    Ref(SparkRef),
    Literal(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkRef {
    pub node_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkOutput {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub schema: OutputSchema,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    #[serde(rename = "type", default = "string_type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyParam {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndParam {
    /// 0 returns variables, 1 renders `template`.
    #[serde(default)]
    pub output_mode: u8,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub stream_output: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmParam {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub system_template: String,
    #[serde(default)]
    pub template: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeParam {
    #[serde(default)]
    pub code: String,
    #[serde(default = "python")]
    pub code_language: String,
}

fn python() -> String {
    "python".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchParam {
    #[serde(default)]
    pub cases: Vec<SparkCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkCase {
    pub id: String,
    pub level: i32,
    #[serde(default = "and")]
    pub logical_operator: String,
    #[serde(default)]
    pub conditions: Vec<SparkCondition>,
}

fn and() -> String {
    "and".to_string()
}

/// Operands point at the node's own inputs by input id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkCondition {
    #[serde(default)]
    pub id: String,
    pub left_var_index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_var_index: Option<String>,
    pub compare_operator: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionParam {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub prompt_prefix: String,
    #[serde(default)]
    pub intent_chains: Vec<IntentChain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentChain {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "normal_intent")]
    pub intent_type: u8,
}

fn normal_intent() -> u8 {
    NORMAL_INTENT_TYPE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkEdge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(rename = "type", default = "custom_edge")]
    pub edge_type: String,
}

fn custom_edge() -> String {
    "customEdge".to_string()
}

pub fn operator_name(op: ComparisonOperator) -> &'static str {
    match op {
        ComparisonOperator::Contains => "contains",
        ComparisonOperator::NotContains => "not_contains",
        ComparisonOperator::StartWith => "start_with",
        ComparisonOperator::EndWith => "end_with",
        ComparisonOperator::Is => "is",
        ComparisonOperator::IsNot => "is_not",
        ComparisonOperator::Empty => "empty",
        ComparisonOperator::NotEmpty => "not_empty",
        ComparisonOperator::Equal => "eq",
        ComparisonOperator::NotEqual => "ne",
        ComparisonOperator::Greater => "gt",
        ComparisonOperator::Less => "lt",
        ComparisonOperator::GreaterOrEqual => "ge",
        ComparisonOperator::LessOrEqual => "le",
        ComparisonOperator::Null => "null",
        ComparisonOperator::NotNull => "not_null",
    }
}

pub fn parse_operator(name: &str) -> Option<ComparisonOperator> {
    let op = match name {
        "contains" => ComparisonOperator::Contains,
        "not_contains" => ComparisonOperator::NotContains,
        "start_with" => ComparisonOperator::StartWith,
        "end_with" => ComparisonOperator::EndWith,
        "is" => ComparisonOperator::Is,
        "is_not" => ComparisonOperator::IsNot,
        "empty" => ComparisonOperator::Empty,
        "not_empty" => ComparisonOperator::NotEmpty,
        "eq" => ComparisonOperator::Equal,
        "ne" => ComparisonOperator::NotEqual,
        "gt" => ComparisonOperator::Greater,
        "lt" => ComparisonOperator::Less,
        "ge" => ComparisonOperator::GreaterOrEqual,
        "le" => ComparisonOperator::LessOrEqual,
        "null" => ComparisonOperator::Null,
        "not_null" => ComparisonOperator::NotNull,
        _ => return None,
    };
    Some(op)
}

pub fn type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String => "string",
        DataType::Integer => "integer",
        DataType::Number => "number",
        DataType::Boolean => "boolean",
        DataType::Object => "object",
        DataType::ArrayString => "array-string",
        DataType::ArrayInteger => "array-integer",
        DataType::ArrayNumber => "array-number",
        DataType::ArrayBoolean => "array-boolean",
        DataType::ArrayObject => "array-object",
        DataType::File => "file",
    }
}

pub fn parse_type(name: &str) -> DataType {
    match name {
        "integer" => DataType::Integer,
        "number" => DataType::Number,
        "boolean" => DataType::Boolean,
        "object" => DataType::Object,
        "array-string" => DataType::ArrayString,
        "array-integer" => DataType::ArrayInteger,
        "array-number" => DataType::ArrayNumber,
        "array-boolean" => DataType::ArrayBoolean,
        "array-object" => DataType::ArrayObject,
        "file" => DataType::File,
        _ => DataType::String,
    }
}
