use super::archive;
use super::wire::*;
use crate::branch::PortScheme;
use crate::error::GenerateError;
use crate::generate::{
    EmitContext, Orchestrator, PlatformEmitter, PortConventions, ResolvedEdge, ResolvedRef,
    TargetProfile,
};
use crate::ir::*;
use crate::iteration::{Boundary, IterationShape};
use crate::platform::{DslGenerator, NodeScope, Platform};
use crate::platforms::{GeneratorOptions, write_yaml};
use crate::reconcile::{IdPolicy, IdStrategy, RoleIds, SyntheticRole, SyntheticScheme};
use ahash::AHashMap;
use serde::Serialize;

pub struct CozeGenerator {
    options: GeneratorOptions,
}

impl CozeGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }
}

impl DslGenerator for CozeGenerator {
    fn platform(&self) -> Platform {
        Platform::Coze
    }

    fn supports(&self, kind: NodeKind, scope: NodeScope) -> bool {
        match scope {
            NodeScope::TopLevel => true,
            NodeScope::InIteration => !matches!(
                kind,
                NodeKind::Start | NodeKind::End | NodeKind::Iteration
            ),
        }
    }

    fn generate(&self, dsl: &UnifiedDsl) -> Result<Vec<u8>, GenerateError> {
        self.validate(dsl)?;
        let graph = Orchestrator::new(self, self.options.seed).run(dsl)?;

        let mut blocks: AHashMap<String, Vec<CozeNode>> = AHashMap::new();
        let mut top = Vec::new();
        for emitted in graph.nodes {
            match emitted.parent {
                Some(parent) => blocks.entry(parent).or_default().push(emitted.node),
                None => top.push(emitted.node),
            }
        }
        let mut loop_edges: AHashMap<String, Vec<CozeEdge>> = AHashMap::new();
        let mut edges = Vec::new();
        for emitted in graph.edges {
            match emitted.resolved.scope {
                Some(scope) => loop_edges.entry(scope).or_default().push(emitted.wire),
                None => edges.push(emitted.wire),
            }
        }
        for node in &mut top {
            node.blocks = blocks.remove(&node.id).unwrap_or_default();
            node.edges = loop_edges.remove(&node.id).unwrap_or_default();
        }

        let document = CozeDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            name: dsl.metadata.name.clone(),
            description: dsl.metadata.description.clone(),
            nodes: top,
            edges,
        };
        let yaml = write_yaml(Platform::Coze, &document)?;
        if self.options.archive {
            archive::write_document(&yaml)
        } else {
            Ok(yaml)
        }
    }
}

impl PlatformEmitter for CozeGenerator {
    type Node = CozeNode;
    type Edge = CozeEdge;

    fn profile(&self) -> TargetProfile {
        TargetProfile {
            platform: Platform::Coze,
            id_policy: IdPolicy {
                roles: Some(RoleIds {
                    start: START_ID.to_string(),
                    end: END_ID.to_string(),
                }),
                strategy: IdStrategy::Counter {
                    base: self.options.counter_base.unwrap_or(COUNTER_BASE),
                },
                synthetic: SyntheticScheme::Suffix,
            },
            port_scheme: PortScheme::Positional,
            iteration_shape: IterationShape::NestedBlocks {
                entry_port: LOOP_ENTRY_PORT,
                exit_port: LOOP_EXIT_PORT,
            },
            conventions: PortConventions {
                default_source_port: None,
                default_target_port: None,
                end_takes_target_port: false,
                iteration_output_port: Some(LOOP_OUTPUT_PORT),
            },
        }
    }

    fn emit_node(&self, node: &Node, ctx: &EmitContext<'_>) -> Result<CozeNode, GenerateError> {
        let mut inputs = node.inputs.clone();
        let parameters = match &node.config {
            NodeConfig::Start(_) => serde_yaml::Value::Null,
            NodeConfig::End(end) => {
                let template = end.mode == EndOutputMode::Template;
                let content = match &end.template {
                    Some(text) if template => lift(text, &mut inputs),
                    _ => String::new(),
                };
                to_params(&EndParams {
                    terminate_plan: if template {
                        TerminatePlan::UseAnswerContent
                    } else {
                        TerminatePlan::ReturnVariables
                    },
                    content,
                    streaming: end.streaming,
                })?
            }
            NodeConfig::Llm(llm) => {
                let system_prompt = lift(&llm.system_prompt, &mut inputs);
                let prompt = lift(&llm.user_prompt, &mut inputs);
                to_params(&LlmParams {
                    model: coze_model(&llm.model),
                    system_prompt,
                    prompt,
                })?
            }
            NodeConfig::Code(code) => to_params(&CodeParams {
                language: match code.language {
                    CodeLanguage::Python3 => PYTHON,
                    CodeLanguage::JavaScript => JAVASCRIPT,
                },
                code: code.code.clone(),
            })?,
            NodeConfig::Condition(config) => to_params(&condition_params(node, config, ctx)?)?,
            NodeConfig::Classifier(config) => {
                let system_prompt = lift(&config.instructions, &mut inputs);
                let table = ctx.port_table(&node.id);
                let intents = match table {
                    Some(table) => table
                        .branches()
                        .filter_map(|a| config.class(&a.handle))
                        .map(|c| CozeIntent {
                            name: c.name.clone(),
                            description: c.description.clone(),
                        })
                        .collect(),
                    None => Vec::new(),
                };
                to_params(&IntentParams {
                    model: coze_model(&config.model),
                    system_prompt,
                    intents,
                })?
            }
            NodeConfig::Iteration(config) => {
                let input = ctx.resolve_output(
                    &node.id,
                    &config.iterator.source_node,
                    &config.iterator.source_output,
                )?;
                let body = ctx.layout(&node.id).map_or(*ctx, |l| ctx.within(l));
                let output = body.resolve_output(
                    &node.id,
                    &config.output_selector.node_id,
                    &config.output_selector.output_name,
                )?;
                to_params(&LoopParams {
                    loop_type: "array".to_string(),
                    input: coze_value(&input),
                    output: coze_value(&output),
                    parallel: config.parallel,
                })?
            }
        };

        Ok(CozeNode {
            id: ctx.target_id(node)?.to_string(),
            node_type: type_name(node.kind()).to_string(),
            title: node.title.clone(),
            description: node.description.clone(),
            position: node.position,
            inputs: coze_inputs(node, &inputs, ctx)?,
            outputs: node
                .outputs
                .iter()
                .map(|o| CozeOutput {
                    name: o.name.clone(),
                    data_type: data_type_name(o.data_type).to_string(),
                    required: o.required,
                    description: o.description.clone(),
                })
                .collect(),
            parameters,
            blocks: Vec::new(),
            edges: Vec::new(),
        })
    }

    fn emit_boundary(
        &self,
        boundary: &Boundary,
        _role: SyntheticRole,
        _owner: &Node,
        _config: &IterationConfig,
        _ctx: &EmitContext<'_>,
    ) -> Result<CozeNode, GenerateError> {
        Err(self.unsupported(&boundary.key, NodeKind::Start))
    }

    fn emit_edge(&self, edge: &ResolvedEdge, _ctx: &EmitContext<'_>) -> Result<CozeEdge, GenerateError> {
        Ok(CozeEdge {
            source_node: edge.source.clone(),
            target_node: edge.target.clone(),
            source_port: edge.source_port.clone(),
            target_port: edge.target_port.clone(),
        })
    }
}

fn lift(text: &str, inputs: &mut Vec<Input>) -> String {
    let (lifted, added) = template::lift_node_outputs(text, inputs);
    inputs.extend(added);
    lifted
}

fn to_params<T: Serialize>(params: &T) -> Result<serde_yaml::Value, GenerateError> {
    serde_yaml::to_value(params).map_err(|e| GenerateError::Serialize {
        platform: Platform::Coze,
        message: e.to_string(),
    })
}

/// References to the enclosing loop read its loop variable.
fn coze_value(resolved: &ResolvedRef) -> CozeValue {
    let mut name = resolved.output.clone();
    for segment in &resolved.path {
        name.push('.');
        name.push_str(segment);
    }
    CozeValue::Ref {
        source: if resolved.loop_variable {
            RefSource::LoopVariable
        } else {
            RefSource::BlockOutput
        },
        block_id: resolved.node_id.clone(),
        name,
    }
}

fn coze_model(model: &ModelSpec) -> CozeModel {
    CozeModel {
        provider: model.provider.clone(),
        name: model.name.clone(),
        temperature: model.temperature,
        max_tokens: model.max_tokens,
    }
}

fn coze_inputs(node: &Node, inputs: &[Input], ctx: &EmitContext<'_>) -> Result<Vec<CozeInput>, GenerateError> {
    inputs
        .iter()
        .map(|input| {
            let value = match &input.reference {
                Some(VariableReference::NodeOutput {
                    node_id,
                    output_name,
                }) => Some(coze_value(&ctx.resolve_output(&node.id, node_id, output_name)?)),
                Some(VariableReference::Literal { value }) => Some(CozeValue::Literal {
                    content: value.clone(),
                }),
                Some(VariableReference::Template { template }) => Some(CozeValue::Literal {
                    content: serde_json::Value::String(ctx.render_template(node, template)?),
                }),
                None => input
                    .default
                    .clone()
                    .map(|content| CozeValue::Literal { content }),
            };
            Ok(CozeInput {
                name: input.name.clone(),
                data_type: data_type_name(input.data_type).to_string(),
                value,
            })
        })
        .collect()
}

/// Branches in port order. The else branch stays implicit.
fn condition_params(
    node: &Node,
    config: &ConditionConfig,
    ctx: &EmitContext<'_>,
) -> Result<ConditionParams, GenerateError> {
    let Some(table) = ctx.port_table(&node.id) else {
        return Ok(ConditionParams::default());
    };
    let mut branches = Vec::new();
    for assignment in table.branches() {
        let Some(case) = config.case(&assignment.handle) else {
            continue;
        };
        let conditions = case
            .conditions
            .iter()
            .map(|c| {
                let left = coze_value(&ctx.resolve_selector(&node.id, &c.variable)?);
                let right = match &c.value {
                    CompareValue::None => None,
                    CompareValue::Literal(content) => Some(CozeValue::Literal {
                        content: content.clone(),
                    }),
                    CompareValue::Reference(selector) => {
                        Some(coze_value(&ctx.resolve_selector(&node.id, selector)?))
                    }
                };
                Ok(CozeCondition {
                    left,
                    operator: operator_code(c.operator),
                    right,
                })
            })
            .collect::<Result<_, GenerateError>>()?;
        branches.push(CozeBranch {
            logic: logic_code(case.logical_operator),
            conditions,
        });
    }
    Ok(ConditionParams { branches })
}
