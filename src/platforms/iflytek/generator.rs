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
use serde::Serialize;

pub struct IFlytekGenerator {
    options: GeneratorOptions,
}

impl IFlytekGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }
}

impl DslGenerator for IFlytekGenerator {
    fn platform(&self) -> Platform {
        Platform::IFlytek
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
        let document = SparkDocument {
            flow_meta: FlowMeta {
                name: dsl.metadata.name.clone(),
                description: dsl.metadata.description.clone(),
                dsl_version: DSL_VERSION.to_string(),
            },
            flow_data: FlowData {
                nodes: graph.nodes.into_iter().map(|n| n.node).collect(),
                edges: graph.edges.into_iter().map(|e| e.wire).collect(),
            },
        };
        write_yaml(Platform::IFlytek, &document)
    }
}

impl PlatformEmitter for IFlytekGenerator {
    type Node = SparkNode;
    type Edge = SparkEdge;

    fn profile(&self) -> TargetProfile {
        TargetProfile {
            platform: Platform::IFlytek,
            id_policy: IdPolicy {
                roles: None,
                strategy: IdStrategy::CollisionCheckedRandom {
                    format: RandomIdFormat::PrefixedUuid {
                        prefix: kind_prefix,
                    },
                    max_attempts: self.options.max_attempts,
                },
                synthetic: SyntheticScheme::PrefixSwap {
                    start_prefix: LOOP_START_PREFIX,
                    end_prefix: LOOP_END_PREFIX,
                },
            },
            port_scheme: PortScheme::Generated {
                case_prefix: CASE_PORT_PREFIX,
                intent_prefix: INTENT_PORT_PREFIX,
            },
            iteration_shape: IterationShape::FlatWithParent {
                needs_start: true,
                needs_end: true,
                start_output: LOOP_START_OUTPUT,
            },
            conventions: PortConventions {
                default_source_port: None,
                default_target_port: None,
                end_takes_target_port: false,
                iteration_output_port: None,
            },
        }
    }

    fn emit_node(&self, node: &Node, ctx: &EmitContext<'_>) -> Result<SparkNode, GenerateError> {
        let target = ctx.target_id(node)?;
        let mut builder = NodeBuilder::new(target, SparkKind::Node(node.kind()), ctx);
        builder.outputs(&node.outputs);

        match &node.config {
            NodeConfig::Start(_) => {
                builder.param(&EmptyParam {})?;
            }
            NodeConfig::End(end) => {
                let mut inputs = node.inputs.clone();
                let template = match (&end.mode, &end.template) {
                    (EndOutputMode::Template, Some(text)) => lift(text, &mut inputs),
                    _ => String::new(),
                };
                builder.inputs(node, &inputs)?;
                builder.param(&EndParam {
                    output_mode: u8::from(end.mode == EndOutputMode::Template),
                    template,
                    stream_output: end.streaming,
                })?;
            }
            NodeConfig::Llm(llm) => {
                let mut inputs = node.inputs.clone();
                let system_template = lift(&llm.system_prompt, &mut inputs);
                let template = lift(&llm.user_prompt, &mut inputs);
                builder.inputs(node, &inputs)?;
                builder.param(&LlmParam {
                    domain: llm.model.name.clone(),
                    source: llm.model.provider.clone(),
                    temperature: llm.model.temperature,
                    max_tokens: llm.model.max_tokens,
                    system_template,
                    template,
                })?;
            }
            NodeConfig::Code(code) => {
                builder.inputs(node, &node.inputs)?;
                builder.param(&CodeParam {
                    code: code.code.clone(),
                    code_language: match code.language {
                        CodeLanguage::Python3 => "python",
                        CodeLanguage::JavaScript => "javascript",
                    }
                    .to_string(),
                })?;
            }
            NodeConfig::Condition(config) => {
                let cases = builder.cases(node, config)?;
                builder.param(&BranchParam { cases })?;
            }
            NodeConfig::Classifier(config) => {
                let mut inputs = node.inputs.clone();
                for input in &mut inputs {
                    if input.name == "query" {
                        input.name = CLASSIFIER_INPUT.to_string();
                    }
                }
                let prompt_prefix = lift(&config.instructions, &mut inputs);
                builder.inputs(node, &inputs)?;
                let intent_chains = intents(node, config, ctx)?;
                builder.param(&DecisionParam {
                    domain: config.model.name.clone(),
                    source: config.model.provider.clone(),
                    temperature: config.model.temperature,
                    prompt_prefix,
                    intent_chains,
                })?;
            }
            NodeConfig::Iteration(config) => {
                let iterator = ctx.resolve_output(
                    &node.id,
                    &config.iterator.source_node,
                    &config.iterator.source_output,
                )?;
                builder.push_input(ITERATION_INPUT, DataType::ArrayString, Some(reference(&iterator)));
                if node.outputs.is_empty() {
                    builder.outputs(&[Output::new(LOOP_END_INPUT, DataType::ArrayString)]);
                }
                builder.param(&EmptyParam {})?;
            }
        }

        Ok(builder.finish(node.title.clone(), node.description.clone(), node.position))
    }

    fn emit_boundary(
        &self,
        boundary: &Boundary,
        role: SyntheticRole,
        owner: &Node,
        config: &IterationConfig,
        ctx: &EmitContext<'_>,
    ) -> Result<SparkNode, GenerateError> {
        let element = owner
            .outputs
            .first()
            .map_or(DataType::String, |o| o.data_type.element());
        let (kind, title) = match role {
            SyntheticRole::LoopStart => (SparkKind::LoopStart, format!("{} start", owner.title)),
            SyntheticRole::LoopEnd => (SparkKind::LoopEnd, format!("{} end", owner.title)),
        };
        let mut builder = NodeBuilder::new(&boundary.target_id, kind, ctx);
        match role {
            SyntheticRole::LoopStart => {
                builder.outputs(&[Output::new(LOOP_START_OUTPUT, element)]);
                builder.param(&EmptyParam {})?;
            }
            SyntheticRole::LoopEnd => {
                let exit = ctx.resolve_output(
                    &boundary.key,
                    &config.output_selector.node_id,
                    &config.output_selector.output_name,
                )?;
                builder.push_input(LOOP_END_INPUT, element, Some(reference(&exit)));
                builder.outputs(&[Output::new(LOOP_END_INPUT, element)]);
                builder.param(&EndParam::default())?;
            }
        }
        Ok(builder.finish(title, String::new(), boundary.position))
    }

    fn emit_edge(&self, edge: &ResolvedEdge, _ctx: &EmitContext<'_>) -> Result<SparkEdge, GenerateError> {
        Ok(SparkEdge {
            id: format!(
                "reactflow__edge-{}{}-{}{}",
                edge.source,
                edge.source_port.as_deref().unwrap_or_default(),
                edge.target,
                edge.target_port.as_deref().unwrap_or_default()
            ),
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: edge.source_port.clone(),
            target_handle: edge.target_port.clone(),
            edge_type: "customEdge".to_string(),
        })
    }
}

/// iFlytek prompts only name the node's own inputs.
fn lift(text: &str, inputs: &mut Vec<Input>) -> String {
    let (lifted, added) = template::lift_node_outputs(text, inputs);
    inputs.extend(added);
    lifted
}

fn reference(resolved: &crate::generate::ResolvedRef) -> SparkValue {
    let mut name = resolved.output.clone();
    for segment in &resolved.path {
        name.push('.');
        name.push_str(segment);
    }
    SparkValue::Ref(SparkRef {
        node_id: resolved.node_id.clone(),
        name,
    })
}

fn intents(
    node: &Node,
    config: &ClassifierConfig,
    ctx: &EmitContext<'_>,
) -> Result<Vec<IntentChain>, GenerateError> {
    let table = ctx
        .port_table(&node.id)
        .ok_or_else(|| GenerateError::UnresolvedReference {
            source_id: node.id.clone(),
            node_id: node.id.clone(),
            pass: ctx.pass,
        })?;
    Ok(table
        .assignments
        .iter()
        .map(|a| {
            let class = config.class(&a.handle);
            IntentChain {
                id: a.port.clone(),
                name: class.map_or_else(|| "default".to_string(), |c| c.name.clone()),
                description: class.map(|c| c.description.clone()).unwrap_or_default(),
                intent_type: if a.is_default() {
                    DEFAULT_INTENT_TYPE
                } else {
                    NORMAL_INTENT_TYPE
                },
            }
        })
        .collect())
}

/// Accumulates one wire node's inputs, outputs and parameters.
struct NodeBuilder<'c, 'a> {
    id: String,
    kind: SparkKind,
    ctx: &'c EmitContext<'a>,
    inputs: Vec<SparkInput>,
    outputs: Vec<SparkOutput>,
    param: serde_yaml::Value,
}

impl<'c, 'a> NodeBuilder<'c, 'a> {
    fn new(id: &str, kind: SparkKind, ctx: &'c EmitContext<'a>) -> Self {
        Self {
            id: id.to_string(),
            kind,
            ctx,
            inputs: Vec::new(),
            outputs: Vec::new(),
            param: serde_yaml::Value::Null,
        }
    }

    fn push_input(&mut self, name: &str, data_type: DataType, value: Option<SparkValue>) -> String {
        let id = format!("{}-input-{}", self.id, self.inputs.len());
        self.inputs.push(SparkInput {
            id: id.clone(),
            name: name.to_string(),
            schema: InputSchema {
                data_type: type_name(data_type).to_string(),
                value,
            },
        });
        id
    }

    fn inputs(&mut self, node: &Node, inputs: &[Input]) -> Result<(), GenerateError> {
        for input in inputs {
            let value = match &input.reference {
                Some(VariableReference::NodeOutput {
                    node_id,
                    output_name,
                }) => Some(reference(&self.ctx.resolve_output(&node.id, node_id, output_name)?)),
                Some(VariableReference::Literal { value }) => Some(SparkValue::Literal(value.clone())),
                Some(VariableReference::Template { template }) => Some(SparkValue::Literal(
                    serde_json::Value::String(self.ctx.render_template(node, template)?),
                )),
                None => input.default.clone().map(SparkValue::Literal),
            };
            self.push_input(&input.name, input.data_type, value);
        }
        Ok(())
    }

    fn outputs(&mut self, outputs: &[Output]) {
        for output in outputs {
            self.outputs.push(SparkOutput {
                id: format!("{}-output-{}", self.id, self.outputs.len()),
                name: output.name.clone(),
                schema: OutputSchema {
                    data_type: type_name(output.data_type).to_string(),
                    default: output.default.clone(),
                    description: output.description.clone(),
                },
                required: output.required,
            });
        }
    }

    /// Cases in port order; each operand becomes an input the case points at.
    fn cases(&mut self, node: &Node, config: &ConditionConfig) -> Result<Vec<SparkCase>, GenerateError> {
        let ctx = self.ctx;
        let table = ctx
            .port_table(&node.id)
            .ok_or_else(|| GenerateError::UnresolvedReference {
                source_id: node.id.clone(),
                node_id: node.id.clone(),
                pass: ctx.pass,
            })?;

        let mut cases = Vec::with_capacity(table.len());
        for assignment in &table.assignments {
            let case = config.case(&assignment.handle);
            let mut conditions = Vec::new();
            for (i, condition) in case.iter().flat_map(|c| c.conditions.iter()).enumerate() {
                let left = ctx.resolve_selector(&node.id, &condition.variable)?;
                let left_id = self.push_input(
                    &format!("input_{}", self.inputs.len()),
                    DataType::String,
                    Some(reference(&left)),
                );
                let right = match &condition.value {
                    CompareValue::None => None,
                    CompareValue::Literal(value) => Some(SparkValue::Literal(value.clone())),
                    CompareValue::Reference(selector) => {
                        Some(reference(&ctx.resolve_selector(&node.id, selector)?))
                    }
                };
                let right_id = right.map(|value| {
                    self.push_input(
                        &format!("input_{}", self.inputs.len()),
                        DataType::String,
                        Some(value),
                    )
                });
                conditions.push(SparkCondition {
                    id: format!("{}-{}", assignment.port, i),
                    left_var_index: left_id,
                    right_var_index: right_id,
                    compare_operator: operator_name(condition.operator).to_string(),
                });
            }
            cases.push(SparkCase {
                id: assignment.port.clone(),
                level: assignment
                    .index
                    .map_or(DEFAULT_CASE_LEVEL, |k| k as i32 + 1),
                logical_operator: match case.map(|c| c.logical_operator) {
                    Some(LogicalOperator::Or) => "or",
                    _ => "and",
                }
                .to_string(),
                conditions,
            });
        }
        Ok(cases)
    }

    fn param<T: Serialize>(&mut self, param: &T) -> Result<(), GenerateError> {
        self.param = serde_yaml::to_value(param).map_err(|e| GenerateError::Serialize {
            platform: Platform::IFlytek,
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn finish(self, title: String, description: String, position: Position) -> SparkNode {
        let (node_type, alias_name) = display_names(self.kind);
        SparkNode {
            id: self.id,
            node_type: node_type.to_string(),
            position,
            parent_id: self.ctx.parent_id().map(str::to_string),
            data: SparkNodeData {
                label: title,
                description,
                node_meta: NodeMeta {
                    node_type: "基础节点".to_string(),
                    alias_name: alias_name.to_string(),
                },
                inputs: self.inputs,
                outputs: self.outputs,
                node_param: self.param,
            },
        }
    }
}
