use super::wire::*;
use crate::error::ParseError;
use crate::ir::*;
use crate::platform::{DslParser, Platform};
use crate::platforms::{branch_handle, fold_loop_boundaries, read_yaml, required};
use ahash::{AHashMap, AHashSet};
use serde::de::DeserializeOwned;

pub struct IFlytekParser;

impl DslParser for IFlytekParser {
    fn platform(&self) -> Platform {
        Platform::IFlytek
    }

    fn validate_input(&self, bytes: &[u8]) -> Result<(), ParseError> {
        let value: serde_yaml::Value = read_yaml(Platform::IFlytek, bytes)?;
        let nodes = value
            .get("flowData")
            .and_then(|d| d.get("nodes"))
            .and_then(serde_yaml::Value::as_sequence)
            .ok_or_else(|| ParseError::MissingField {
                node_id: "<document>".to_string(),
                field: "flowData.nodes".to_string(),
            })?;
        for node in nodes {
            let id = node
                .get("id")
                .and_then(serde_yaml::Value::as_str)
                .ok_or_else(|| ParseError::MissingField {
                    node_id: "<unknown>".to_string(),
                    field: "id".to_string(),
                })?;
            if parse_kind(id).is_none() {
                let type_name = node
                    .get("type")
                    .and_then(serde_yaml::Value::as_str)
                    .unwrap_or_else(|| id.split_once("::").map_or(id, |(p, _)| p));
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
        let document: SparkDocument = read_yaml(Platform::IFlytek, bytes)?;
        let flow = &document.flow_data;

        let mut top = Vec::new();
        let mut bodies: AHashMap<&str, Vec<Node>> = AHashMap::new();
        let mut boundaries: AHashMap<&str, AHashSet<String>> = AHashMap::new();
        let mut exits: AHashMap<&str, (String, String)> = AHashMap::new();

        for wire in &flow.nodes {
            let kind = required(parse_kind(&wire.id), &wire.id, "id")?;
            let node = read_node(wire, kind)?;
            let Some(parent) = wire.parent_id.as_deref() else {
                top.push(node);
                continue;
            };
            match kind {
                SparkKind::LoopStart => {
                    boundaries.entry(parent).or_default().insert(wire.id.clone());
                }
                SparkKind::LoopEnd => {
                    boundaries.entry(parent).or_default().insert(wire.id.clone());
                    let exit = node
                        .input(LOOP_END_INPUT)
                        .or_else(|| node.inputs.first())
                        .and_then(|i| i.reference.as_ref())
                        .and_then(|r| match r {
                            VariableReference::NodeOutput {
                                node_id,
                                output_name,
                            } => Some((node_id.clone(), output_name.clone())),
                            _ => None,
                        });
                    if let Some(exit) = exit {
                        exits.insert(parent, exit);
                    }
                }
                SparkKind::Node(_) => {}
            }
            bodies.entry(parent).or_default().push(node);
        }

        let parent_of: AHashMap<&str, &str> = flow
            .nodes
            .iter()
            .filter_map(|n| n.parent_id.as_deref().map(|p| (n.id.as_str(), p)))
            .collect();
        let branching: AHashMap<&str, &Node> = top
            .iter()
            .chain(bodies.values().flatten())
            .filter(|n| n.kind().is_branching())
            .map(|n| (n.id.as_str(), n))
            .collect();

        let mut top_edges = Vec::new();
        let mut body_edges: AHashMap<&str, Vec<Edge>> = AHashMap::new();
        for wire in &flow.edges {
            let handle = branching
                .get(wire.source.as_str())
                .and_then(|node| branch_handle(node, wire.source_handle.as_deref()));
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
            let (exit_node, exit_output) = required(
                exits.remove(node.id.as_str()),
                &node.id,
                LOOP_END_PREFIX,
            )?;
            config.output_selector = OutputSelector {
                node_id: exit_node,
                output_name: exit_output,
            };
            let body = &mut config.sub_workflow;
            body.nodes = bodies.remove(node.id.as_str()).unwrap_or_default();
            body.edges = body_edges.remove(node.id.as_str()).unwrap_or_default();
            if let Some(found) = boundaries.get(node.id.as_str()) {
                fold_loop_boundaries(&node.id, body, found);
            }
        }

        let meta = &document.flow_meta;
        let metadata = Metadata {
            name: meta.name.clone(),
            description: meta.description.clone(),
            source_platform: Some(Platform::IFlytek),
            source_version: Some(meta.dsl_version.clone()).filter(|v| !v.is_empty()),
            tags: Vec::new(),
        };
        tracing::debug!(
            nodes = top.len(),
            edges = top_edges.len(),
            "parsed iflytek workflow"
        );
        Ok(UnifiedDsl::checked(metadata, Workflow::new(top, top_edges))?)
    }
}

fn param<T: DeserializeOwned + Default>(wire: &SparkNode) -> Result<T, ParseError> {
    if wire.data.node_param.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(wire.data.node_param.clone()).map_err(|e| ParseError::InvalidField {
        node_id: wire.id.clone(),
        field: "nodeParam".to_string(),
        message: e.to_string(),
    })
}

fn read_input(input: &SparkInput) -> Input {
    let data_type = parse_type(&input.schema.data_type);
    match &input.schema.value {
        Some(SparkValue::Ref(r)) => Input::referencing(&input.name, data_type, &r.node_id, &r.name),
        Some(SparkValue::Literal(value)) => Input::literal(&input.name, data_type, value.clone()),
        None => Input::new(&input.name, data_type),
    }
}

fn read_output(output: &SparkOutput) -> Output {
    Output {
        name: output.name.clone(),
        data_type: parse_type(&output.schema.data_type),
        default: output.schema.default.clone(),
        description: output.schema.description.clone(),
        required: output.required,
    }
}

fn read_node(wire: &SparkNode, kind: SparkKind) -> Result<Node, ParseError> {
    let data = &wire.data;
    let mut inputs: Vec<Input> = data.inputs.iter().map(read_input).collect();
    let outputs: Vec<Output> = data.outputs.iter().map(read_output).collect();

    let config = match kind {
        SparkKind::Node(NodeKind::Start) | SparkKind::LoopStart => NodeConfig::Start(StartConfig {}),
        SparkKind::LoopEnd => NodeConfig::End(EndConfig::default()),
        SparkKind::Node(NodeKind::End) => {
            let end: EndParam = param(wire)?;
            let template = (end.output_mode == 1).then_some(end.template);
            NodeConfig::End(EndConfig {
                mode: if template.is_some() {
                    EndOutputMode::Template
                } else {
                    EndOutputMode::Variables
                },
                template,
                streaming: end.stream_output,
            })
        }
        SparkKind::Node(NodeKind::Llm) => {
            let llm: LlmParam = param(wire)?;
            NodeConfig::Llm(LlmConfig {
                model: ModelSpec {
                    provider: llm.source,
                    name: llm.domain,
                    temperature: llm.temperature,
                    max_tokens: llm.max_tokens,
                },
                system_prompt: llm.system_template,
                user_prompt: llm.template,
            })
        }
        SparkKind::Node(NodeKind::Code) => {
            let code: CodeParam = param(wire)?;
            NodeConfig::Code(CodeConfig {
                language: match code.code_language.as_str() {
                    "javascript" => CodeLanguage::JavaScript,
                    _ => CodeLanguage::Python3,
                },
                code: code.code,
            })
        }
        SparkKind::Node(NodeKind::Condition) => {
            let branch: BranchParam = param(wire)?;
            let cases = branch
                .cases
                .iter()
                .map(|case| read_case(wire, case))
                .collect::<Result<Vec<_>, _>>()?;
            inputs.clear();
            NodeConfig::Condition(ConditionConfig { cases })
        }
        SparkKind::Node(NodeKind::Classifier) => {
            let decision: DecisionParam = param(wire)?;
            for input in &mut inputs {
                if input.name == CLASSIFIER_INPUT {
                    input.name = "query".to_string();
                }
            }
            NodeConfig::Classifier(ClassifierConfig {
                model: ModelSpec {
                    provider: decision.source,
                    name: decision.domain,
                    temperature: decision.temperature,
                    max_tokens: None,
                },
                instructions: decision.prompt_prefix,
                classes: decision
                    .intent_chains
                    .into_iter()
                    .map(|intent| ClassifierClass {
                        is_default: intent.intent_type == DEFAULT_INTENT_TYPE,
                        id: intent.id,
                        name: intent.name,
                        description: intent.description,
                    })
                    .collect(),
            })
        }
        SparkKind::Node(NodeKind::Iteration) => {
            let source = data
                .inputs
                .iter()
                .find(|i| i.name == ITERATION_INPUT)
                .or_else(|| data.inputs.first())
                .and_then(|i| i.schema.value.as_ref())
                .and_then(|v| match v {
                    SparkValue::Ref(r) => Some(r),
                    SparkValue::Literal(_) => None,
                });
            let source = required(source, &wire.id, "inputs.input")?;
            NodeConfig::Iteration(IterationConfig {
                iterator: IteratorSource {
                    source_node: source.node_id.clone(),
                    source_output: source.name.clone(),
                },
                output_selector: OutputSelector {
                    node_id: String::new(),
                    output_name: String::new(),
                },
                parallel: false,
                sub_workflow: Workflow::default(),
            })
        }
    };

    Ok(Node {
        id: wire.id.clone(),
        title: data.label.clone(),
        description: data.description.clone(),
        position: wire.position,
        inputs,
        outputs,
        config,
    })
}

/// Condition operands are the node's own inputs, named by input id.
fn read_case(wire: &SparkNode, case: &SparkCase) -> Result<ConditionCase, ParseError> {
    let operand = |input_id: &str| {
        wire.data
            .inputs
            .iter()
            .find(|i| i.id == input_id)
            .and_then(|i| i.schema.value.as_ref())
    };
    let invalid = |field: &str, message: String| ParseError::InvalidField {
        node_id: wire.id.clone(),
        field: field.to_string(),
        message,
    };

    let mut conditions = Vec::with_capacity(case.conditions.len());
    for condition in &case.conditions {
        let variable = match operand(&condition.left_var_index) {
            Some(SparkValue::Ref(r)) => VariableSelector::new(&r.node_id, &r.name),
            _ => {
                return Err(invalid(
                    "leftVarIndex",
                    format!("'{}' is not a reference input", condition.left_var_index),
                ));
            }
        };
        let operator = parse_operator(&condition.compare_operator).ok_or_else(|| {
            invalid(
                "compareOperator",
                format!("unknown operator '{}'", condition.compare_operator),
            )
        })?;
        let value = match condition.right_var_index.as_deref().and_then(operand) {
            _ if operator.is_unary() => CompareValue::None,
            Some(SparkValue::Ref(r)) => CompareValue::Reference(VariableSelector::new(&r.node_id, &r.name)),
            Some(SparkValue::Literal(v)) => CompareValue::Literal(v.clone()),
            None => CompareValue::None,
        };
        conditions.push(Condition {
            variable,
            operator,
            value,
        });
    }

    Ok(ConditionCase {
        case_id: case.id.clone(),
        level: case.level,
        logical_operator: match case.logical_operator.as_str() {
            "or" => LogicalOperator::Or,
            _ => LogicalOperator::And,
        },
        conditions,
    })
}
