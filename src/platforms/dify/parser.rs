use super::wire::*;
use crate::error::ParseError;
use crate::ir::*;
use crate::platform::{DslParser, Platform};
use crate::platforms::{branch_handle, fold_loop_boundaries, read_yaml};
use ahash::{AHashMap, AHashSet};

pub struct DifyParser;

impl DslParser for DifyParser {
    fn platform(&self) -> Platform {
        Platform::Dify
    }

    fn validate_input(&self, bytes: &[u8]) -> Result<(), ParseError> {
        let value: serde_yaml::Value = read_yaml(Platform::Dify, bytes)?;
        let nodes = value
            .get("workflow")
            .and_then(|w| w.get("graph"))
            .and_then(|g| g.get("nodes"))
            .and_then(serde_yaml::Value::as_sequence)
            .ok_or_else(|| ParseError::MissingField {
                node_id: "<document>".to_string(),
                field: "workflow.graph.nodes".to_string(),
            })?;

        for node in nodes {
            let id = node.get("id").and_then(yaml_str).unwrap_or("<unknown>");
            let type_name = node
                .get("data")
                .and_then(|d| d.get("type"))
                .and_then(yaml_str)
                .ok_or_else(|| ParseError::MissingField {
                    node_id: id.to_string(),
                    field: "data.type".to_string(),
                })?;
            if !KNOWN_NODE_TYPES.contains(&type_name) {
                return Err(ParseError::UnsupportedNodeType {
                    node_id: id.to_string(),
                    type_name: type_name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn parse(&self, bytes: &[u8]) -> Result<UnifiedDsl, ParseError> {
        self.validate_input(bytes)?;
        let document: DifyDocument = read_yaml(Platform::Dify, bytes)?;
        let graph = &document.workflow.graph;

        let start_id = graph
            .nodes
            .iter()
            .find(|n| matches!(n.data.body, DifyNodeBody::Start(_)))
            .map(|n| n.id.clone());
        let reader = NodeReader { start_id };

        let mut top = Vec::new();
        let mut bodies: AHashMap<&str, Vec<Node>> = AHashMap::new();
        let mut boundaries: AHashMap<&str, AHashSet<String>> = AHashMap::new();

        for wire in &graph.nodes {
            let node = reader.read(wire)?;
            match wire.parent_id.as_deref().or(wire.data.iteration_id.as_deref()) {
                Some(parent) => {
                    if matches!(wire.data.body, DifyNodeBody::IterationStart(_)) {
                        boundaries.entry(parent).or_default().insert(wire.id.clone());
                    }
                    bodies.entry(parent).or_default().push(node);
                }
                None => top.push(node),
            }
        }

        let parent_of: AHashMap<&str, &str> = graph
            .nodes
            .iter()
            .filter_map(|n| {
                n.parent_id
                    .as_deref()
                    .or(n.data.iteration_id.as_deref())
                    .map(|p| (n.id.as_str(), p))
            })
            .collect();
        let cases: AHashMap<&str, &Node> = top
            .iter()
            .chain(bodies.values().flatten())
            .filter(|n| n.kind().is_branching())
            .map(|n| (n.id.as_str(), n))
            .collect();

        let mut top_edges = Vec::new();
        let mut body_edges: AHashMap<&str, Vec<Edge>> = AHashMap::new();
        for wire in &graph.edges {
            let handle = match cases.get(wire.source.as_str()) {
                Some(node) => branch_handle(node, wire.source_handle.as_deref()),
                None => None,
            };
            let edge = Edge {
                source: wire.source.clone(),
                target: wire.target.clone(),
                source_handle: handle,
                target_handle: None,
            };
            match parent_of.get(wire.source.as_str()) {
                Some(parent) => body_edges.entry(*parent).or_default().push(edge),
                None => top_edges.push(edge),
            }
        }

        for node in &mut top {
            let NodeConfig::Iteration(config) = &mut node.config else {
                continue;
            };
            let body = &mut config.sub_workflow;
            body.nodes = bodies.remove(node.id.as_str()).unwrap_or_default();
            body.edges = body_edges.remove(node.id.as_str()).unwrap_or_default();
            if let Some(found) = boundaries.get(node.id.as_str()) {
                fold_loop_boundaries(&node.id, body, found);
            }
        }

        let metadata = Metadata {
            name: document.app.name.clone(),
            description: document.app.description.clone(),
            source_platform: Some(Platform::Dify),
            source_version: Some(document.version.clone()).filter(|v| !v.is_empty()),
            tags: Vec::new(),
        };
        tracing::debug!(
            nodes = top.len(),
            edges = top_edges.len(),
            "parsed dify workflow"
        );
        Ok(UnifiedDsl::checked(metadata, Workflow::new(top, top_edges))?)
    }
}

fn yaml_str(value: &serde_yaml::Value) -> Option<&str> {
    value.as_str()
}

struct NodeReader {
    start_id: Option<String>,
}

impl NodeReader {
    fn read(&self, wire: &DifyNode) -> Result<Node, ParseError> {
        let data = &wire.data;
        let id = wire.id.as_str();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();

        let config = match &data.body {
            DifyNodeBody::Start(start) => {
                outputs = start
                    .variables
                    .iter()
                    .map(|v| Output {
                        required: v.required,
                        description: v.label.clone(),
                        ..Output::new(&v.variable, parse_variable_type(&v.var_type))
                    })
                    .collect();
                NodeConfig::Start(StartConfig {})
            }
            DifyNodeBody::IterationStart(_) => NodeConfig::Start(StartConfig {}),
            DifyNodeBody::End(end) => {
                inputs = self.selector_inputs(id, &end.outputs)?;
                NodeConfig::End(EndConfig::default())
            }
            DifyNodeBody::Answer(answer) => {
                inputs = self.selector_inputs(id, &answer.variables)?;
                NodeConfig::End(EndConfig {
                    mode: EndOutputMode::Template,
                    template: Some(answer.answer.clone()),
                    streaming: true,
                })
            }
            DifyNodeBody::Llm(llm) => {
                let joined = |role: &str| {
                    llm.prompt_template
                        .iter()
                        .filter(|m| m.role == role)
                        .map(|m| m.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                outputs.push(Output::new("text", DataType::String));
                NodeConfig::Llm(LlmConfig {
                    model: model_spec(&llm.model),
                    system_prompt: joined("system"),
                    user_prompt: joined("user"),
                })
            }
            DifyNodeBody::Code(code) => {
                inputs = self.selector_inputs(id, &code.variables)?;
                outputs = code
                    .outputs
                    .iter()
                    .map(|(name, o)| Output::new(name, parse_value_type(&o.output_type)))
                    .collect();
                let language = match code.code_language.as_str() {
                    "javascript" => CodeLanguage::JavaScript,
                    _ => CodeLanguage::Python3,
                };
                NodeConfig::Code(CodeConfig {
                    language,
                    code: code.code.clone(),
                })
            }
            DifyNodeBody::IfElse(if_else) => {
                let mut cases = Vec::with_capacity(if_else.cases.len() + 1);
                for (k, case) in if_else.cases.iter().enumerate() {
                    cases.push(ConditionCase {
                        case_id: case.case_id.clone(),
                        level: k as i32 + 1,
                        logical_operator: logical_operator(&case.logical_operator),
                        conditions: case
                            .conditions
                            .iter()
                            .map(|c| self.condition(id, c))
                            .collect::<Result<_, _>>()?,
                    });
                }
                cases.push(ConditionCase::default_branch(
                    crate::branch::CONDITION_DEFAULT_PORT,
                ));
                NodeConfig::Condition(ConditionConfig { cases })
            }
            DifyNodeBody::QuestionClassifier(classifier) => {
                if classifier.query_variable_selector.len() >= 2 {
                    let (node, output) = self.selector(id, &classifier.query_variable_selector)?;
                    inputs.push(Input::referencing("query", DataType::String, node, output));
                }
                outputs.push(Output::new("class_name", DataType::String));
                NodeConfig::Classifier(ClassifierConfig {
                    model: model_spec(&classifier.model),
                    instructions: classifier.instruction.clone(),
                    classes: classifier
                        .classes
                        .iter()
                        .map(|c| ClassifierClass {
                            id: c.id.clone(),
                            name: c.name.clone(),
                            description: String::new(),
                            is_default: false,
                        })
                        .collect(),
                })
            }
            DifyNodeBody::Iteration(iteration) => {
                let (source_node, source_output) =
                    self.selector(id, &iteration.iterator_selector)?;
                let (exit_node, exit_output) = self.selector(id, &iteration.output_selector)?;
                outputs.push(Output::new("output", parse_value_type(&iteration.output_type)));
                NodeConfig::Iteration(IterationConfig {
                    iterator: IteratorSource {
                        source_node,
                        source_output,
                    },
                    output_selector: OutputSelector {
                        node_id: exit_node,
                        output_name: exit_output,
                    },
                    parallel: iteration.is_parallel,
                    sub_workflow: Workflow::default(),
                })
            }
        };

        Ok(Node {
            id: wire.id.clone(),
            title: data.title.clone(),
            description: data.desc.clone(),
            position: wire.position,
            inputs,
            outputs,
            config,
        })
    }

    /// `[node, output, ..]` as an IR node-output pair. System variables are
    /// read from the start node.
    fn selector(&self, node_id: &str, selector: &[String]) -> Result<(String, String), ParseError> {
        match selector {
            [root, name, ..] if root == SYSTEM_NODE => {
                let start = self.start_id.clone().ok_or_else(|| ParseError::InvalidField {
                    node_id: node_id.to_string(),
                    field: "value_selector".to_string(),
                    message: format!("system variable '{}' without a start node", name),
                })?;
                Ok((start, format!("{}.{}", SYSTEM_NODE, name)))
            }
            [node, output, ..] => Ok((node.clone(), output.clone())),
            _ => Err(ParseError::InvalidField {
                node_id: node_id.to_string(),
                field: "value_selector".to_string(),
                message: format!("selector {:?} has fewer than two segments", selector),
            }),
        }
    }

    fn selector_inputs(
        &self,
        node_id: &str,
        variables: &[SelectorVariable],
    ) -> Result<Vec<Input>, ParseError> {
        variables
            .iter()
            .map(|v| {
                let (node, output) = self.selector(node_id, &v.value_selector)?;
                let data_type = v
                    .value_type
                    .as_deref()
                    .map_or(DataType::String, parse_value_type);
                Ok(Input::referencing(&v.variable, data_type, node, output))
            })
            .collect()
    }

    fn condition(&self, node_id: &str, wire: &DifyCondition) -> Result<Condition, ParseError> {
        let (node, output) = self.selector(node_id, &wire.variable_selector)?;
        let mut segments = vec![node, output];
        segments.extend(wire.variable_selector.iter().skip(2).cloned());
        let variable = VariableSelector::try_from(segments)?;
        let operator =
            parse_operator(&wire.comparison_operator).ok_or_else(|| ParseError::InvalidField {
                node_id: node_id.to_string(),
                field: "comparison_operator".to_string(),
                message: format!("unknown operator '{}'", wire.comparison_operator),
            })?;
        Ok(Condition {
            variable,
            operator,
            value: compare_value(operator, &wire.value),
        })
    }
}

/// A value that is exactly one `{{#node.output#}}` placeholder is a reference.
fn compare_value(operator: ComparisonOperator, value: &serde_json::Value) -> CompareValue {
    if operator.is_unary() {
        return CompareValue::None;
    }
    if let Some(text) = value.as_str() {
        let trimmed = text.trim();
        if let [template::Placeholder::NodeOutput { node_id, output }] =
            template::placeholders(trimmed).as_slice()
        {
            if template::node_output(node_id, output) == trimmed {
                return CompareValue::Reference(VariableSelector::new(*node_id, *output));
            }
        }
    }
    match value {
        serde_json::Value::Null => CompareValue::None,
        other => CompareValue::Literal(other.clone()),
    }
}

fn logical_operator(name: &str) -> LogicalOperator {
    match name {
        "or" => LogicalOperator::Or,
        _ => LogicalOperator::And,
    }
}

fn model_spec(model: &DifyModel) -> ModelSpec {
    ModelSpec {
        provider: model.provider.clone(),
        name: model.name.clone(),
        temperature: model.completion_params.temperature,
        max_tokens: model.completion_params.max_tokens,
    }
}
