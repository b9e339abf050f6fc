use super::dsl::Workflow;
use super::node::{NodeKind, VariableSelector};
use serde::{Deserialize, Serialize};

/// Level reserved for the default (else) branch of a condition node.
pub const DEFAULT_CASE_LEVEL: i32 = 999;

/// Per-kind node configuration. Closed: every consumer matches it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "kebab-case")]
pub enum NodeConfig {
    Start(StartConfig),
    End(EndConfig),
    Llm(LlmConfig),
    Code(CodeConfig),
    Condition(ConditionConfig),
    Classifier(ClassifierConfig),
    Iteration(IterationConfig),
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Start(_) => NodeKind::Start,
            NodeConfig::End(_) => NodeKind::End,
            NodeConfig::Llm(_) => NodeKind::Llm,
            NodeConfig::Code(_) => NodeKind::Code,
            NodeConfig::Condition(_) => NodeKind::Condition,
            NodeConfig::Classifier(_) => NodeKind::Classifier,
            NodeConfig::Iteration(_) => NodeKind::Iteration,
        }
    }

    pub fn as_condition(&self) -> Option<&ConditionConfig> {
        match self {
            NodeConfig::Condition(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_classifier(&self) -> Option<&ClassifierConfig> {
        match self {
            NodeConfig::Classifier(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_iteration(&self) -> Option<&IterationConfig> {
        match self {
            NodeConfig::Iteration(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StartConfig {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndOutputMode {
    /// The workflow returns its inputs as named variables.
    #[default]
    Variables,
    /// The workflow returns a rendered answer template.
    Template,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndConfig {
    #[serde(default)]
    pub mode: EndOutputMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub provider: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    pub model: ModelSpec,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodeLanguage {
    #[default]
    Python3,
    JavaScript,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeConfig {
    #[serde(default)]
    pub language: CodeLanguage,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// Comparison operators every platform can express under its own spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonOperator {
    Contains,
    NotContains,
    StartWith,
    EndWith,
    Is,
    IsNot,
    Empty,
    NotEmpty,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Null,
    NotNull,
}

impl ComparisonOperator {
    /// Operators that test the left-hand side alone.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            ComparisonOperator::Empty
                | ComparisonOperator::NotEmpty
                | ComparisonOperator::Null
                | ComparisonOperator::NotNull
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum CompareValue {
    #[default]
    None,
    Literal(serde_json::Value),
    Reference(VariableSelector),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub variable: VariableSelector,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: CompareValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionCase {
    pub case_id: String,
    pub level: i32,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConditionCase {
    pub fn is_default(&self) -> bool {
        self.level == DEFAULT_CASE_LEVEL
    }

    /// The else branch: level 999 and no conditions.
    pub fn default_branch(case_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            level: DEFAULT_CASE_LEVEL,
            logical_operator: LogicalOperator::And,
            conditions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub cases: Vec<ConditionCase>,
}

impl ConditionConfig {
    pub fn default_case(&self) -> Option<&ConditionCase> {
        self.cases.iter().find(|c| c.is_default())
    }

    pub fn case(&self, case_id: &str) -> Option<&ConditionCase> {
        self.cases.iter().find(|c| c.case_id == case_id)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierClass {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    pub model: ModelSpec,
    #[serde(default)]
    pub instructions: String,
    pub classes: Vec<ClassifierClass>,
}

impl ClassifierConfig {
    pub fn class(&self, class_id: &str) -> Option<&ClassifierClass> {
        self.classes.iter().find(|c| c.id == class_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IteratorSource {
    pub source_node: String,
    pub source_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSelector {
    pub node_id: String,
    pub output_name: String,
}

/// Output names an iteration exposes to its own sub-workflow.
pub const ITERATION_ITEM: &str = "item";
pub const ITERATION_INDEX: &str = "index";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationConfig {
    pub iterator: IteratorSource,
    pub output_selector: OutputSelector,
    #[serde(default)]
    pub parallel: bool,
    pub sub_workflow: Workflow,
}
