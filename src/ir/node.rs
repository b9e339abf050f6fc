use super::config::NodeConfig;
use crate::error::IrError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of node kinds every platform conversion routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Start,
    End,
    Llm,
    Code,
    Condition,
    Classifier,
    Iteration,
}

impl NodeKind {
    /// Kinds whose inputs may carry a `VariableReference`.
    pub fn carries_references(self) -> bool {
        !matches!(self, NodeKind::Start)
    }

    pub fn is_branching(self) -> bool {
        matches!(self, NodeKind::Condition | NodeKind::Classifier)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Start => "Start",
            NodeKind::End => "End",
            NodeKind::Llm => "LLM",
            NodeKind::Code => "Code",
            NodeKind::Condition => "Condition",
            NodeKind::Classifier => "Classifier",
            NodeKind::Iteration => "Iteration",
        };
        write!(f, "{}", name)
    }
}

/// Diagram coordinates. Carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Platform-neutral value types for node inputs and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Object,
    ArrayString,
    ArrayInteger,
    ArrayNumber,
    ArrayBoolean,
    ArrayObject,
    File,
}

impl DataType {
    pub fn is_array(self) -> bool {
        matches!(
            self,
            DataType::ArrayString
                | DataType::ArrayInteger
                | DataType::ArrayNumber
                | DataType::ArrayBoolean
                | DataType::ArrayObject
        )
    }

    /// The element type of an array type, or the type itself.
    pub fn element(self) -> DataType {
        match self {
            DataType::ArrayString => DataType::String,
            DataType::ArrayInteger => DataType::Integer,
            DataType::ArrayNumber => DataType::Number,
            DataType::ArrayBoolean => DataType::Boolean,
            DataType::ArrayObject => DataType::Object,
            other => other,
        }
    }

    /// The array type holding elements of this type.
    pub fn array_of(self) -> DataType {
        match self {
            DataType::String => DataType::ArrayString,
            DataType::Integer => DataType::ArrayInteger,
            DataType::Number => DataType::ArrayNumber,
            DataType::Boolean => DataType::ArrayBoolean,
            DataType::Object => DataType::ArrayObject,
            other => other,
        }
    }
}

/// Path to one node output: `[node_id, output_name, ...nested fields]`.
///
/// Always has at least two segments; construction rejects anything shorter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct VariableSelector(Vec<String>);

impl VariableSelector {
    pub fn new(node_id: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self(vec![node_id.into(), output_name.into()])
    }

    pub fn node_id(&self) -> &str {
        &self.0[0]
    }

    pub fn output_name(&self) -> &str {
        &self.0[1]
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The same path with the node segment replaced.
    pub fn with_node(&self, node_id: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments[0] = node_id.into();
        Self(segments)
    }

    /// The same nested path, rooted at another node output.
    pub fn retarget(&self, node_id: impl Into<String>, output_name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments[0] = node_id.into();
        segments[1] = output_name.into();
        Self(segments)
    }
}

impl TryFrom<Vec<String>> for VariableSelector {
    type Error = IrError;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        if segments.len() < 2 {
            return Err(IrError::violation(
                segments.first().cloned().unwrap_or_default(),
                format!(
                    "a variable selector needs at least two segments, found {:?}",
                    segments
                ),
            ));
        }
        Ok(Self(segments))
    }
}

impl From<VariableSelector> for Vec<String> {
    fn from(selector: VariableSelector) -> Self {
        selector.0
    }
}

impl fmt::Display for VariableSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Where an input's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VariableReference {
    NodeOutput {
        #[serde(rename = "nodeId")]
        node_id: String,
        #[serde(rename = "outputName")]
        output_name: String,
    },
    Literal {
        value: serde_json::Value,
    },
    Template {
        template: String,
    },
}

impl VariableReference {
    pub fn node_output(node_id: impl Into<String>, output_name: impl Into<String>) -> Self {
        VariableReference::NodeOutput {
            node_id: node_id.into(),
            output_name: output_name.into(),
        }
    }

    pub fn referenced_node(&self) -> Option<&str> {
        match self {
            VariableReference::NodeOutput { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

impl From<VariableSelector> for VariableReference {
    fn from(selector: VariableSelector) -> Self {
        VariableReference::node_output(selector.node_id(), selector.output_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<VariableReference>,
}

impl Input {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default: None,
            reference: None,
        }
    }

    pub fn referencing(
        name: impl Into<String>,
        data_type: DataType,
        node_id: impl Into<String>,
        output_name: impl Into<String>,
    ) -> Self {
        Self {
            reference: Some(VariableReference::node_output(node_id, output_name)),
            ..Self::new(name, data_type)
        }
    }

    pub fn literal(name: impl Into<String>, data_type: DataType, value: serde_json::Value) -> Self {
        Self {
            reference: Some(VariableReference::Literal { value }),
            ..Self::new(name, data_type)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl Output {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default: None,
            description: String::new(),
            required: false,
        }
    }
}

/// A single node of a unified workflow graph.
///
/// The node's kind is carried by its `config` variant, so a node can never
/// disagree with its own configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(flatten)]
    pub config: NodeConfig,
}

impl Node {
    pub fn new(id: impl Into<String>, title: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            position: Position::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    pub fn with_inputs(mut self, inputs: Vec<Input>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Ids of every node this node's inputs reference directly.
    pub fn referenced_nodes(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .filter_map(|i| i.reference.as_ref())
            .filter_map(VariableReference::referenced_node)
    }
}
