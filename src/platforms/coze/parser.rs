use super::archive;
use super::wire::*;
use crate::error::ParseError;
use crate::ir::*;
use crate::platform::{DslParser, Platform, ZIP_MAGIC};
use crate::platforms::{branch_handle, read_yaml};
use serde::de::DeserializeOwned;
use std::borrow::Cow;

pub struct CozeParser;

/// The YAML document, unwrapped from its archive when zipped.
fn document_bytes(bytes: &[u8]) -> Result<Cow<'_, [u8]>, ParseError> {
    if bytes.starts_with(ZIP_MAGIC) {
        Ok(Cow::Owned(archive::read_document(bytes)?))
    } else {
        Ok(Cow::Borrowed(bytes))
    }
}

fn check_types(nodes: &[serde_yaml::Value]) -> Result<(), ParseError> {
    for node in nodes {
        let id = node
            .get("id")
            .and_then(|v| match v {
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                other => other.as_str().map(str::to_string),
            })
            .unwrap_or_else(|| "<unknown>".to_string());
        let type_name = node
            .get("type")
            .and_then(serde_yaml::Value::as_str)
            .ok_or_else(|| ParseError::MissingField {
                node_id: id.clone(),
                field: "type".to_string(),
            })?;
        if !KNOWN_NODE_TYPES.contains(&type_name) {
            return Err(ParseError::UnsupportedNodeType {
                node_id: id,
                type_name: type_name.to_string(),
            });
        }
        if let Some(blocks) = node.get("blocks").and_then(serde_yaml::Value::as_sequence) {
            check_types(blocks)?;
        }
    }
    Ok(())
}

impl DslParser for CozeParser {
    fn platform(&self) -> Platform {
        Platform::Coze
    }

    fn validate_input(&self, bytes: &[u8]) -> Result<(), ParseError> {
        let bytes = document_bytes(bytes)?;
        let value: serde_yaml::Value = read_yaml(Platform::Coze, &bytes)?;
        let nodes = value
            .get("nodes")
            .and_then(serde_yaml::Value::as_sequence)
            .ok_or_else(|| ParseError::MissingField {
                node_id: "<document>".to_string(),
                field: "nodes".to_string(),
            })?;
        check_types(nodes)
    }

    fn parse(&self, bytes: &[u8]) -> Result<UnifiedDsl, ParseError> {
        let bytes = document_bytes(bytes)?;
        self.validate_input(&bytes)?;
        let document: CozeDocument = read_yaml(Platform::Coze, &bytes)?;

        let workflow = read_workflow(&document.nodes, &document.edges, None)?;
        let metadata = Metadata {
            name: document.name.clone(),
            description: document.description.clone(),
            source_platform: Some(Platform::Coze),
            source_version: Some(document.schema_version.clone()).filter(|v| !v.is_empty()),
            tags: Vec::new(),
        };
        tracing::debug!(
            nodes = workflow.nodes.len(),
            edges = workflow.edges.len(),
            "parsed coze workflow"
        );
        Ok(UnifiedDsl::checked(metadata, workflow)?)
    }
}

/// Reads one block list. Inside a loop, edges to or from the loop node are
/// its entry and exit wiring and have no IR counterpart.
fn read_workflow(
    nodes: &[CozeNode],
    edges: &[CozeEdge],
    owner: Option<&str>,
) -> Result<Workflow, ParseError> {
    let nodes = nodes.iter().map(read_node).collect::<Result<Vec<_>, _>>()?;
    let edges = edges
        .iter()
        .filter(|e| owner.is_none_or(|o| e.source_node != o && e.target_node != o))
        .map(|e| Edge {
            source: e.source_node.clone(),
            target: e.target_node.clone(),
            source_handle: nodes
                .iter()
                .find(|n| n.id == e.source_node)
                .and_then(|n| port_handle(n, e.source_port.as_deref())),
            target_handle: None,
        })
        .collect();
    Ok(Workflow::new(nodes, edges))
}

/// IR handle for a positional Coze port.
fn port_handle(node: &Node, port: Option<&str>) -> Option<String> {
    let port = port?;
    let handle = match node.kind() {
        NodeKind::Condition => match port {
            "false" | "else" => ELSE_CASE_ID.to_string(),
            "true" => format!("{}0", CASE_ID_PREFIX),
            other => format!("{}{}", CASE_ID_PREFIX, other.strip_prefix("true_")?),
        },
        NodeKind::Classifier => match port {
            "default" => DEFAULT_INTENT_ID.to_string(),
            other => format!("{}{}", INTENT_ID_PREFIX, other.strip_prefix("branch_")?),
        },
        _ => return None,
    };
    branch_handle(node, Some(&handle))
}

fn params<T: DeserializeOwned + Default>(node: &CozeNode) -> Result<T, ParseError> {
    if node.parameters.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(node.parameters.clone()).map_err(|e| ParseError::InvalidField {
        node_id: node.id.clone(),
        field: "parameters".to_string(),
        message: e.to_string(),
    })
}

fn reference(value: &CozeValue) -> VariableReference {
    match value {
        CozeValue::Ref { block_id, name, .. } => VariableReference::node_output(block_id, name),
        CozeValue::Literal { content } => VariableReference::Literal {
            value: content.clone(),
        },
    }
}

fn selector(node_id: &str, value: &CozeValue) -> Result<VariableSelector, ParseError> {
    match value {
        CozeValue::Ref { block_id, name, .. } => {
            let mut segments = vec![block_id.clone()];
            segments.extend(name.split('.').map(str::to_string));
            Ok(VariableSelector::try_from(segments)?)
        }
        CozeValue::Literal { .. } => Err(ParseError::InvalidField {
            node_id: node_id.to_string(),
            field: "left".to_string(),
            message: "condition operand must reference a block output".to_string(),
        }),
    }
}

fn model_spec(model: &CozeModel) -> ModelSpec {
    ModelSpec {
        provider: model.provider.clone(),
        name: model.name.clone(),
        temperature: model.temperature,
        max_tokens: model.max_tokens,
    }
}

fn read_node(wire: &CozeNode) -> Result<Node, ParseError> {
    let id = wire.id.as_str();
    let inputs = wire
        .inputs
        .iter()
        .map(|i| Input {
            reference: i.value.as_ref().map(reference),
            ..Input::new(&i.name, parse_data_type(&i.data_type))
        })
        .collect();
    let outputs = wire
        .outputs
        .iter()
        .map(|o| Output {
            required: o.required,
            description: o.description.clone(),
            ..Output::new(&o.name, parse_data_type(&o.data_type))
        })
        .collect();

    let config = match wire.node_type.as_str() {
        "start" => NodeConfig::Start(StartConfig {}),
        "end" => {
            let end: EndParams = params(wire)?;
            let template = end.terminate_plan == TerminatePlan::UseAnswerContent;
            NodeConfig::End(EndConfig {
                mode: if template {
                    EndOutputMode::Template
                } else {
                    EndOutputMode::Variables
                },
                template: template.then_some(end.content),
                streaming: end.streaming,
            })
        }
        "llm" => {
            let llm: LlmParams = params(wire)?;
            NodeConfig::Llm(LlmConfig {
                model: model_spec(&llm.model),
                system_prompt: llm.system_prompt,
                user_prompt: llm.prompt,
            })
        }
        "code" => {
            let code: CodeParams = params(wire)?;
            NodeConfig::Code(CodeConfig {
                language: if code.language == JAVASCRIPT {
                    CodeLanguage::JavaScript
                } else {
                    CodeLanguage::Python3
                },
                code: code.code,
            })
        }
        "condition" => {
            let condition: ConditionParams = params(wire)?;
            let mut cases = Vec::with_capacity(condition.branches.len() + 1);
            for (k, branch) in condition.branches.iter().enumerate() {
                let conditions = branch
                    .conditions
                    .iter()
                    .map(|c| read_condition(id, c))
                    .collect::<Result<_, _>>()?;
                cases.push(ConditionCase {
                    case_id: format!("{}{}", CASE_ID_PREFIX, k),
                    level: k as i32 + 1,
                    logical_operator: parse_logic(branch.logic),
                    conditions,
                });
            }
            cases.push(ConditionCase::default_branch(ELSE_CASE_ID));
            NodeConfig::Condition(ConditionConfig { cases })
        }
        "intent" => {
            let intent: IntentParams = params(wire)?;
            let mut classes: Vec<ClassifierClass> = intent
                .intents
                .iter()
                .enumerate()
                .map(|(k, i)| ClassifierClass {
                    id: format!("{}{}", INTENT_ID_PREFIX, k),
                    name: i.name.clone(),
                    description: i.description.clone(),
                    is_default: false,
                })
                .collect();
            classes.push(ClassifierClass {
                id: DEFAULT_INTENT_ID.to_string(),
                name: "default".to_string(),
                description: String::new(),
                is_default: true,
            });
            NodeConfig::Classifier(ClassifierConfig {
                model: model_spec(&intent.model),
                instructions: intent.system_prompt,
                classes,
            })
        }
        "loop" => {
            let looped: LoopParams = params_required(wire)?;
            let CozeValue::Ref {
                block_id: source_node,
                name: source_output,
                ..
            } = looped.input
            else {
                return Err(invalid(id, "input", "loop input must reference a list"));
            };
            let CozeValue::Ref {
                block_id: exit_node,
                name: exit_output,
                ..
            } = looped.output
            else {
                return Err(invalid(id, "output", "loop output must reference a block"));
            };
            NodeConfig::Iteration(IterationConfig {
                iterator: IteratorSource {
                    source_node,
                    source_output,
                },
                output_selector: OutputSelector {
                    node_id: exit_node,
                    output_name: exit_output,
                },
                parallel: looped.parallel,
                sub_workflow: read_workflow(&wire.blocks, &wire.edges, Some(id))?,
            })
        }
        other => {
            return Err(ParseError::UnsupportedNodeType {
                node_id: id.to_string(),
                type_name: other.to_string(),
            });
        }
    };

    Ok(Node {
        id: wire.id.clone(),
        title: wire.title.clone(),
        description: wire.description.clone(),
        position: wire.position,
        inputs,
        outputs,
        config,
    })
}

fn params_required<T: DeserializeOwned>(node: &CozeNode) -> Result<T, ParseError> {
    if node.parameters.is_null() {
        return Err(ParseError::MissingField {
            node_id: node.id.clone(),
            field: "parameters".to_string(),
        });
    }
    serde_yaml::from_value(node.parameters.clone())
        .map_err(|e| invalid(&node.id, "parameters", &e.to_string()))
}

fn invalid(node_id: &str, field: &str, message: &str) -> ParseError {
    ParseError::InvalidField {
        node_id: node_id.to_string(),
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn read_condition(node_id: &str, wire: &CozeCondition) -> Result<Condition, ParseError> {
    let operator = parse_operator(wire.operator)
        .ok_or_else(|| invalid(node_id, "operator", &format!("unknown operator code {}", wire.operator)))?;
    let value = match &wire.right {
        _ if operator.is_unary() => CompareValue::None,
        None => CompareValue::None,
        Some(CozeValue::Literal { content }) => CompareValue::Literal(content.clone()),
        Some(right @ CozeValue::Ref { .. }) => CompareValue::Reference(selector(node_id, right)?),
    };
    Ok(Condition {
        variable: selector(node_id, &wire.left)?,
        operator,
        value,
    })
}
