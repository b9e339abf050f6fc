use super::wire::*;
use crate::branch::PortScheme;
use crate::error::GenerateError;
use crate::generate::{
    EmitContext, Orchestrator, PlatformEmitter, PortConventions, ResolvedEdge, TargetProfile,
};
use crate::ir::*;
use crate::iteration::{Boundary, IterationShape};
use crate::platform::{DslGenerator, NodeScope, Platform};
use crate::platforms::{GeneratorOptions, write_yaml};
use crate::reconcile::{IdPolicy, IdStrategy, RandomIdFormat, SyntheticRole, SyntheticScheme};
use crate::reconcile::strategy::now_millis;
use ahash::AHashMap;

pub struct DifyGenerator {
    options: GeneratorOptions,
}

impl DifyGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }
}

impl DslGenerator for DifyGenerator {
    fn platform(&self) -> Platform {
        Platform::Dify
    }

    fn supports(&self, kind: NodeKind, scope: NodeScope) -> bool {
        match scope {
            NodeScope::TopLevel => true,
            NodeScope::InIteration => !matches!(kind, NodeKind::End | NodeKind::Iteration),
        }
    }

    fn generate(&self, dsl: &UnifiedDsl) -> Result<Vec<u8>, GenerateError> {
        self.validate(dsl)?;
        let graph = Orchestrator::new(self, self.options.seed).run(dsl)?;

        let nodes: Vec<DifyNode> = graph.nodes.into_iter().map(|n| n.node).collect();
        // Edge endpoint types follow the emitted node, so an End written as
        // `answer` is typed `answer` on its edges too.
        let emitted: AHashMap<&str, &'static str> = nodes
            .iter()
            .map(|n| (n.id.as_str(), n.data.body.type_name()))
            .collect();
        let edges: Vec<DifyEdge> = graph
            .edges
            .into_iter()
            .map(|e| {
                let mut wire = e.wire;
                if let Some(source_type) = emitted.get(wire.source.as_str()) {
                    wire.data.source_type = source_type.to_string();
                }
                if let Some(target_type) = emitted.get(wire.target.as_str()) {
                    wire.data.target_type = target_type.to_string();
                }
                wire
            })
            .collect();

        let chat = dsl.workflow.nodes.iter().any(|n| {
            matches!(&n.config, NodeConfig::End(end) if end.mode == EndOutputMode::Template)
        });
        let document = DifyDocument {
            app: DifyApp {
                name: dsl.metadata.name.clone(),
                mode: if chat { "advanced-chat" } else { "workflow" }.to_string(),
                description: dsl.metadata.description.clone(),
                icon: "🤖".to_string(),
                icon_background: "#FFEAD5".to_string(),
            },
            kind: "app".to_string(),
            version: DSL_VERSION.to_string(),
            workflow: DifyWorkflow {
                graph: DifyGraph {
                    nodes,
                    edges,
                },
                features: serde_yaml::Mapping::new(),
                environment_variables: Vec::new(),
                conversation_variables: Vec::new(),
            },
        };
        write_yaml(Platform::Dify, &document)
    }
}

impl PlatformEmitter for DifyGenerator {
    type Node = DifyNode;
    type Edge = DifyEdge;

    fn profile(&self) -> TargetProfile {
        TargetProfile {
            platform: Platform::Dify,
            id_policy: IdPolicy {
                roles: None,
                strategy: IdStrategy::CollisionCheckedRandom {
                    format: RandomIdFormat::Timestamp {
                        base_millis: self.options.timestamp_base.unwrap_or_else(now_millis),
                    },
                    max_attempts: self.options.max_attempts,
                },
                synthetic: SyntheticScheme::Suffix,
            },
            port_scheme: PortScheme::CaseId,
            iteration_shape: IterationShape::FlatWithParent {
                needs_start: true,
                needs_end: false,
                start_output: ITEM_OUTPUT,
            },
            conventions: PortConventions {
                default_source_port: Some(SOURCE_PORT),
                default_target_port: Some(TARGET_PORT),
                end_takes_target_port: true,
                iteration_output_port: Some(SOURCE_PORT),
            },
        }
    }

    fn emit_node(&self, node: &Node, ctx: &EmitContext<'_>) -> Result<DifyNode, GenerateError> {
        let body = match &node.config {
            NodeConfig::Start(_) => DifyNodeBody::Start(StartData {
                variables: node
                    .outputs
                    .iter()
                    .map(|o| StartVariable {
                        variable: o.name.clone(),
                        label: if o.description.is_empty() {
                            o.name.clone()
                        } else {
                            o.description.clone()
                        },
                        var_type: variable_type(o.data_type).to_string(),
                        required: o.required,
                        max_length: None,
                        options: Vec::new(),
                    })
                    .collect(),
            }),
            NodeConfig::End(end) => match end.mode {
                EndOutputMode::Variables => DifyNodeBody::End(EndData {
                    outputs: selector_variables(node, ctx)?,
                }),
                EndOutputMode::Template => {
                    let template = end.template.as_deref().unwrap_or_default();
                    DifyNodeBody::Answer(AnswerData {
                        answer: render(node, template, ctx)?,
                        variables: Vec::new(),
                    })
                }
            },
            NodeConfig::Llm(llm) => {
                let mut prompt_template = Vec::new();
                if !llm.system_prompt.is_empty() {
                    prompt_template.push(PromptMessage {
                        role: "system".to_string(),
                        text: render(node, &llm.system_prompt, ctx)?,
                    });
                }
                prompt_template.push(PromptMessage {
                    role: "user".to_string(),
                    text: render(node, &llm.user_prompt, ctx)?,
                });
                DifyNodeBody::Llm(LlmData {
                    model: dify_model(&llm.model),
                    prompt_template,
                    ..LlmData::default()
                })
            }
            NodeConfig::Code(code) => DifyNodeBody::Code(CodeData {
                code_language: match code.language {
                    CodeLanguage::Python3 => "python3",
                    CodeLanguage::JavaScript => "javascript",
                }
                .to_string(),
                code: code.code.clone(),
                variables: selector_variables(node, ctx)?,
                outputs: node
                    .outputs
                    .iter()
                    .map(|o| {
                        let output = CodeOutput {
                            output_type: value_type(o.data_type).to_string(),
                            children: None,
                        };
                        (o.name.clone(), output)
                    })
                    .collect(),
            }),
            NodeConfig::Condition(config) => DifyNodeBody::IfElse(if_else(node, config, ctx)?),
            NodeConfig::Classifier(config) => {
                let table = ctx.port_table(&node.id);
                let classes = config
                    .classes
                    .iter()
                    .map(|c| DifyClass {
                        id: table
                            .and_then(|t| t.port_of_handle(&c.id))
                            .unwrap_or(&c.id)
                            .to_string(),
                        name: c.name.clone(),
                    })
                    .collect();
                let query = node
                    .input("query")
                    .or_else(|| node.inputs.first())
                    .and_then(|i| i.reference.as_ref())
                    .and_then(|r| match r {
                        VariableReference::NodeOutput {
                            node_id,
                            output_name,
                        } => Some((node_id, output_name)),
                        _ => None,
                    });
                let query_variable_selector = match query {
                    Some((id, output)) => selector(&ctx.resolve_output(&node.id, id, output)?),
                    None => Vec::new(),
                };
                DifyNodeBody::QuestionClassifier(ClassifierData {
                    model: dify_model(&config.model),
                    query_variable_selector,
                    classes,
                    instruction: render(node, &config.instructions, ctx)?,
                })
            }
            NodeConfig::Iteration(config) => {
                let iterator = ctx.resolve_output(
                    &node.id,
                    &config.iterator.source_node,
                    &config.iterator.source_output,
                )?;
                let exit = ctx.require(&config.output_selector.node_id, &node.id)?;
                let output_type = node
                    .outputs
                    .first()
                    .map_or(DataType::ArrayString, |o| o.data_type);
                let start_node_id = ctx
                    .layout(&node.id)
                    .and_then(|l| l.start.as_ref())
                    .map(|b| b.target_id.clone())
                    .unwrap_or_default();
                DifyNodeBody::Iteration(IterationData {
                    iterator_selector: selector(&iterator),
                    output_selector: vec![
                        exit.to_string(),
                        config.output_selector.output_name.clone(),
                    ],
                    output_type: value_type(output_type).to_string(),
                    start_node_id,
                    is_parallel: config.parallel,
                })
            }
        };

        let parent = ctx.parent_id().map(str::to_string);
        Ok(DifyNode {
            id: ctx.target_id(node)?.to_string(),
            node_type: NODE_TYPE.to_string(),
            position: node.position,
            extent: parent.as_ref().map(|_| "parent".to_string()),
            z_index: parent.as_ref().map(|_| ITERATION_Z_INDEX),
            draggable: None,
            data: DifyNodeData {
                title: node.title.clone(),
                desc: node.description.clone(),
                is_in_iteration: parent.is_some(),
                iteration_id: parent.clone(),
                body,
            },
            parent_id: parent,
        })
    }

    fn emit_boundary(
        &self,
        boundary: &Boundary,
        role: SyntheticRole,
        owner: &Node,
        _config: &IterationConfig,
        ctx: &EmitContext<'_>,
    ) -> Result<DifyNode, GenerateError> {
        if role == SyntheticRole::LoopEnd {
            return Err(self.unsupported(&boundary.key, NodeKind::End));
        }
        let parent = ctx.require(&owner.id, &boundary.key)?.to_string();
        Ok(DifyNode {
            id: boundary.target_id.clone(),
            node_type: ITERATION_START_NODE_TYPE.to_string(),
            position: boundary.position,
            parent_id: Some(parent.clone()),
            extent: Some("parent".to_string()),
            z_index: Some(ITERATION_Z_INDEX),
            draggable: Some(false),
            data: DifyNodeData {
                title: String::new(),
                desc: String::new(),
                is_in_iteration: true,
                iteration_id: Some(parent),
                body: DifyNodeBody::IterationStart(IterationStartData {}),
            },
        })
    }

    fn emit_edge(&self, edge: &ResolvedEdge, _ctx: &EmitContext<'_>) -> Result<DifyEdge, GenerateError> {
        let in_iteration = edge.scope.is_some();
        let source_type = match edge.source_kind {
            NodeKind::Start if in_iteration => "iteration-start",
            kind => type_name(kind),
        };
        Ok(DifyEdge {
            id: format!(
                "{}-{}-{}-{}",
                edge.source,
                edge.source_port.as_deref().unwrap_or(SOURCE_PORT),
                edge.target,
                edge.target_port.as_deref().unwrap_or(TARGET_PORT)
            ),
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: edge.source_port.clone(),
            target_handle: edge.target_port.clone(),
            edge_type: NODE_TYPE.to_string(),
            data: DifyEdgeData {
                source_type: source_type.to_string(),
                target_type: type_name(edge.target_kind).to_string(),
                is_in_iteration: in_iteration,
                iteration_id: edge.scope.clone(),
            },
            z_index: if in_iteration { ITERATION_Z_INDEX } else { 0 },
        })
    }
}

fn type_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Start => "start",
        NodeKind::End => "end",
        NodeKind::Llm => "llm",
        NodeKind::Code => "code",
        NodeKind::Condition => "if-else",
        NodeKind::Classifier => "question-classifier",
        NodeKind::Iteration => "iteration",
    }
}

fn dify_model(model: &ModelSpec) -> DifyModel {
    DifyModel {
        provider: model.provider.clone(),
        name: model.name.clone(),
        mode: "chat".to_string(),
        completion_params: CompletionParams {
            temperature: model.temperature,
            max_tokens: model.max_tokens,
        },
    }
}

/// Dify prompts name node outputs directly, so input placeholders are
/// lowered before ids are reconciled.
fn render(node: &Node, text: &str, ctx: &EmitContext<'_>) -> Result<String, GenerateError> {
    ctx.render_template(node, &template::lower_inputs(text, &node.inputs))
}

fn selector(resolved: &crate::generate::ResolvedRef) -> Vec<String> {
    let mut segments = vec![resolved.node_id.clone(), resolved.output.clone()];
    segments.extend(resolved.path.iter().cloned());
    segments
}

fn selector_variables(
    node: &Node,
    ctx: &EmitContext<'_>,
) -> Result<Vec<SelectorVariable>, GenerateError> {
    let mut variables = Vec::new();
    for input in &node.inputs {
        match &input.reference {
            Some(VariableReference::NodeOutput {
                node_id,
                output_name,
            }) => {
                let resolved = ctx.resolve_output(&node.id, node_id, output_name)?;
                variables.push(SelectorVariable {
                    variable: input.name.clone(),
                    value_selector: selector(&resolved),
                    value_type: Some(value_type(input.data_type).to_string()),
                });
            }
            _ => tracing::debug!(
                node = %node.id,
                input = %input.name,
                "dify variables only take node references; input dropped"
            ),
        }
    }
    Ok(variables)
}

fn if_else(
    node: &Node,
    config: &ConditionConfig,
    ctx: &EmitContext<'_>,
) -> Result<IfElseData, GenerateError> {
    let Some(table) = ctx.port_table(&node.id) else {
        return Err(GenerateError::UnresolvedReference {
            source_id: node.id.clone(),
            node_id: node.id.clone(),
            pass: ctx.pass,
        });
    };
    let mut cases = Vec::new();
    for assignment in table.branches() {
        let Some(case) = config.case(&assignment.handle) else {
            continue;
        };
        let mut conditions = Vec::with_capacity(case.conditions.len());
        for (i, condition) in case.conditions.iter().enumerate() {
            let variable = ctx.resolve_selector(&node.id, &condition.variable)?;
            let value = match &condition.value {
                CompareValue::None => serde_json::Value::String(String::new()),
                CompareValue::Literal(value) => value.clone(),
                CompareValue::Reference(reference) => {
                    let resolved = ctx.resolve_selector(&node.id, reference)?;
                    serde_json::Value::String(template::node_output(
                        &resolved.node_id,
                        &resolved.output,
                    ))
                }
            };
            conditions.push(DifyCondition {
                id: format!("{}-{}", assignment.port, i),
                variable_selector: selector(&variable),
                comparison_operator: operator_name(condition.operator).to_string(),
                value,
                var_type: "string".to_string(),
            });
        }
        cases.push(DifyCase {
            case_id: assignment.port.clone(),
            logical_operator: match case.logical_operator {
                LogicalOperator::And => "and",
                LogicalOperator::Or => "or",
            }
            .to_string(),
            conditions,
        });
    }
    Ok(IfElseData { cases })
}
