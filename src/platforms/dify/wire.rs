//! Dify app export (`app` + `workflow.graph`).

use crate::ir::{ComparisonOperator, DataType, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DSL_VERSION: &str = "0.1.5";
pub const NODE_TYPE: &str = "custom";
pub const ITERATION_START_NODE_TYPE: &str = "custom-iteration-start";
/// Port every non-branching node and the iteration node leave through.
pub const SOURCE_PORT: &str = "source";
pub const TARGET_PORT: &str = "target";
/// Output of the iteration start node, standing for the current item.
pub const ITEM_OUTPUT: &str = "item";
/// Selector root of Dify's system variables (`sys.query`, `sys.files`).
pub const SYSTEM_NODE: &str = "sys";
pub const ITERATION_Z_INDEX: i32 = 1002;

/// Every `data.type` the parser understands.
pub const KNOWN_NODE_TYPES: [&str; 9] = [
    "start",
    "end",
    "answer",
    "llm",
    "code",
    "if-else",
    "question-classifier",
    "iteration",
    "iteration-start",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyDocument {
    pub app: DifyApp,
    #[serde(default = "app_kind")]
    pub kind: String,
    #[serde(default)]
    pub version: String,
    pub workflow: DifyWorkflow,
}

fn app_kind() -> String {
    "app".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyApp {
    pub name: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub icon_background: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyWorkflow {
    pub graph: DifyGraph,
    #[serde(default)]
    pub features: serde_yaml::Mapping,
    #[serde(default)]
    pub environment_variables: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub conversation_variables: Vec<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifyGraph {
    #[serde(default)]
    pub nodes: Vec<DifyNode>,
    #[serde(default)]
    pub edges: Vec<DifyEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyNode {
    pub id: String,
    #[serde(rename = "type", default = "custom_type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<String>,
    #[serde(rename = "zIndex", default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
    pub data: DifyNodeData,
}

fn custom_type() -> String {
    NODE_TYPE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyNodeData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(rename = "isInIteration", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_in_iteration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_id: Option<String>,
    #[serde(flatten)]
    pub body: DifyNodeBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DifyNodeBody {
    Start(StartData),
    End(EndData),
    Answer(AnswerData),
    Llm(LlmData),
    Code(CodeData),
    IfElse(IfElseData),
    QuestionClassifier(ClassifierData),
    Iteration(IterationData),
    IterationStart(IterationStartData),
}

impl DifyNodeBody {
    pub fn type_name(&self) -> &'static str {
        match self {
            DifyNodeBody::Start(_) => "start",
            DifyNodeBody::End(_) => "end",
            DifyNodeBody::Answer(_) => "answer",
            DifyNodeBody::Llm(_) => "llm",
            DifyNodeBody::Code(_) => "code",
            DifyNodeBody::IfElse(_) => "if-else",
            DifyNodeBody::QuestionClassifier(_) => "question-classifier",
            DifyNodeBody::Iteration(_) => "iteration",
            DifyNodeBody::IterationStart(_) => "iteration-start",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartData {
    #[serde(default)]
    pub variables: Vec<StartVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartVariable {
    pub variable: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default = "text_input")]
    pub var_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

fn text_input() -> String {
    "text-input".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndData {
    #[serde(default)]
    pub outputs: Vec<SelectorVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorVariable {
    pub variable: String,
    pub value_selector: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerData {
    pub answer: String,
    #[serde(default)]
    pub variables: Vec<SelectorVariable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifyModel {
    pub provider: String,
    pub name: String,
    #[serde(default = "chat_mode")]
    pub mode: String,
    #[serde(default)]
    pub completion_params: CompletionParams,
}

fn chat_mode() -> String {
    "chat".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSetting {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub variable_selector: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionSetting {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmData {
    pub model: DifyModel,
    #[serde(default)]
    pub prompt_template: Vec<PromptMessage>,
    #[serde(default)]
    pub context: ContextSetting,
    #[serde(default)]
    pub vision: VisionSetting,
    #[serde(default)]
    pub variables: Vec<SelectorVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeOutput {
    #[serde(rename = "type")]
    pub output_type: String,
    #[serde(default)]
    pub children: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeData {
    #[serde(default = "python3")]
    pub code_language: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub variables: Vec<SelectorVariable>,
    #[serde(default)]
    pub outputs: BTreeMap<String, CodeOutput>,
}

fn python3() -> String {
    "python3".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IfElseData {
    #[serde(default)]
    pub cases: Vec<DifyCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyCase {
    pub case_id: String,
    #[serde(default = "and")]
    pub logical_operator: String,
    #[serde(default)]
    pub conditions: Vec<DifyCondition>,
}

fn and() -> String {
    "and".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyCondition {
    #[serde(default)]
    pub id: String,
    pub variable_selector: Vec<String>,
    pub comparison_operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(rename = "varType", default)]
    pub var_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyClass {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierData {
    pub model: DifyModel,
    #[serde(default)]
    pub query_variable_selector: Vec<String>,
    #[serde(default)]
    pub classes: Vec<DifyClass>,
    #[serde(default)]
    pub instruction: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationData {
    pub iterator_selector: Vec<String>,
    pub output_selector: Vec<String>,
    #[serde(default)]
    pub output_type: String,
    #[serde(default)]
    pub start_node_id: String,
    #[serde(default)]
    pub is_parallel: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationStartData {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyEdge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "sourceHandle", default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(rename = "targetHandle", default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(rename = "type", default = "custom_type")]
    pub edge_type: String,
    #[serde(default)]
    pub data: DifyEdgeData,
    #[serde(rename = "zIndex", default)]
    pub z_index: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifyEdgeData {
    #[serde(rename = "sourceType", default)]
    pub source_type: String,
    #[serde(rename = "targetType", default)]
    pub target_type: String,
    #[serde(rename = "isInIteration", default)]
    pub is_in_iteration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_id: Option<String>,
}

pub fn operator_name(op: ComparisonOperator) -> &'static str {
    match op {
        ComparisonOperator::Contains => "contains",
        ComparisonOperator::NotContains => "not contains",
        ComparisonOperator::StartWith => "start with",
        ComparisonOperator::EndWith => "end with",
        ComparisonOperator::Is => "is",
        ComparisonOperator::IsNot => "is not",
        ComparisonOperator::Empty => "empty",
        ComparisonOperator::NotEmpty => "not empty",
        ComparisonOperator::Equal => "=",
        ComparisonOperator::NotEqual => "≠",
        ComparisonOperator::Greater => ">",
        ComparisonOperator::Less => "<",
        ComparisonOperator::GreaterOrEqual => "≥",
        ComparisonOperator::LessOrEqual => "≤",
        ComparisonOperator::Null => "null",
        ComparisonOperator::NotNull => "not null",
    }
}

pub fn parse_operator(name: &str) -> Option<ComparisonOperator> {
    let op = match name {
        "contains" => ComparisonOperator::Contains,
        "not contains" => ComparisonOperator::NotContains,
        "start with" => ComparisonOperator::StartWith,
        "end with" => ComparisonOperator::EndWith,
        "is" => ComparisonOperator::Is,
        "is not" => ComparisonOperator::IsNot,
        "empty" => ComparisonOperator::Empty,
        "not empty" => ComparisonOperator::NotEmpty,
        "=" => ComparisonOperator::Equal,
        "≠" | "!=" => ComparisonOperator::NotEqual,
        ">" => ComparisonOperator::Greater,
        "<" => ComparisonOperator::Less,
        "≥" | ">=" => ComparisonOperator::GreaterOrEqual,
        "≤" | "<=" => ComparisonOperator::LessOrEqual,
        "null" => ComparisonOperator::Null,
        "not null" => ComparisonOperator::NotNull,
        _ => return None,
    };
    Some(op)
}

/// Start-variable control type for a value type.
pub fn variable_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Integer | DataType::Number => "number",
        DataType::File => "file",
        DataType::ArrayObject => "file-list",
        _ => "text-input",
    }
}

pub fn parse_variable_type(name: &str) -> DataType {
    match name {
        "number" => DataType::Number,
        "file" => DataType::File,
        "file-list" => DataType::ArrayObject,
        _ => DataType::String,
    }
}

/// Code output and end-variable value type.
pub fn value_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String => "string",
        DataType::Integer | DataType::Number => "number",
        DataType::Boolean => "boolean",
        DataType::Object => "object",
        DataType::File => "file",
        DataType::ArrayString => "array[string]",
        DataType::ArrayInteger | DataType::ArrayNumber => "array[number]",
        DataType::ArrayBoolean => "array[boolean]",
        DataType::ArrayObject => "array[object]",
    }
}

pub fn parse_value_type(name: &str) -> DataType {
    match name {
        "number" => DataType::Number,
        "boolean" => DataType::Boolean,
        "object" => DataType::Object,
        "file" => DataType::File,
        "array[string]" => DataType::ArrayString,
        "array[number]" => DataType::ArrayNumber,
        "array[boolean]" => DataType::ArrayBoolean,
        "array[object]" | "array[file]" => DataType::ArrayObject,
        _ => DataType::String,
    }
}
