//! Common IR fixtures shared by the integration tests.
use kakehashi::prelude::*;

#[allow(dead_code)]
pub const USER_INPUT: &str = "AGENT_USER_INPUT";

#[allow(dead_code)]
pub fn model() -> ModelSpec {
    ModelSpec {
        provider: "openai".to_string(),
        name: "gpt-4o".to_string(),
        temperature: Some(0.7),
        max_tokens: None,
    }
}

#[allow(dead_code)]
pub fn metadata(name: &str) -> Metadata {
    Metadata {
        name: name.to_string(),
        description: format!("{} fixture", name),
        ..Metadata::default()
    }
}

#[allow(dead_code)]
pub fn start_node(id: &str) -> Node {
    Node::new(id, "Start", NodeConfig::Start(StartConfig {})).with_outputs(vec![
        Output {
            required: true,
            ..Output::new(USER_INPUT, DataType::String)
        },
        Output::new("documents", DataType::ArrayString),
    ])
}

/// An LLM node prompting with `source.output`.
#[allow(dead_code)]
pub fn llm_node(id: &str, source: &str, output: &str) -> Node {
    Node::new(
        id,
        format!("LLM {}", id),
        NodeConfig::Llm(LlmConfig {
            model: model(),
            system_prompt: "You are a helpful assistant.".to_string(),
            user_prompt: "{{query}}".to_string(),
        }),
    )
    .with_inputs(vec![Input::referencing("query", DataType::String, source, output)])
    .with_outputs(vec![Output::new("text", DataType::String)])
    .at(300.0, 0.0)
}

#[allow(dead_code)]
pub fn code_node(id: &str, source: &str, output: &str) -> Node {
    Node::new(
        id,
        format!("Code {}", id),
        NodeConfig::Code(CodeConfig {
            language: CodeLanguage::Python3,
            code: "def main(arg):\n    return {'result': arg}".to_string(),
        }),
    )
    .with_inputs(vec![Input::referencing("arg", DataType::String, source, output)])
    .with_outputs(vec![Output::new("result", DataType::String)])
}

#[allow(dead_code)]
pub fn end_node(id: &str, source: &str, output: &str) -> Node {
    Node::new(id, "End", NodeConfig::End(EndConfig::default()))
        .with_inputs(vec![Input::referencing("answer", DataType::String, source, output)])
        .at(600.0, 0.0)
}

/// `start -> llm -> end`, with the LLM reading the user input and the end
/// node returning the LLM's text.
#[allow(dead_code)]
pub fn simple_chain() -> UnifiedDsl {
    UnifiedDsl::new(
        metadata("chain"),
        Workflow::new(
            vec![
                start_node("start"),
                llm_node("llm", "start", USER_INPUT),
                end_node("end", "llm", "text"),
            ],
            vec![Edge::new("start", "llm"), Edge::new("llm", "end")],
        ),
    )
}

#[allow(dead_code)]
pub fn case(case_id: &str, level: i32, source: &str) -> ConditionCase {
    if level == 999 {
        return ConditionCase::default_branch(case_id);
    }
    ConditionCase {
        case_id: case_id.to_string(),
        level,
        logical_operator: Default::default(),
        conditions: vec![Condition {
            variable: VariableSelector::new(source, USER_INPUT),
            operator: ComparisonOperator::Contains,
            value: CompareValue::Literal(serde_json::json!(case_id)),
        }],
    }
}

#[allow(dead_code)]
pub fn condition_node(id: &str, cases: Vec<ConditionCase>) -> Node {
    Node::new(id, "Route", NodeConfig::Condition(ConditionConfig { cases }))
}

/// A condition whose cases sit at levels 5, 2, 999 and 8, each branch
/// leading to its own code node.
#[allow(dead_code)]
pub fn branching_workflow() -> UnifiedDsl {
    let cases = vec![
        case("A", 5, "start"),
        case("B", 2, "start"),
        case("D", 999, "start"),
        case("C", 8, "start"),
    ];
    let mut nodes = vec![start_node("start"), condition_node("cond", cases)];
    let mut edges = vec![Edge::new("start", "cond")];
    for handle in ["A", "B", "C", "D"] {
        let target = format!("code_{}", handle.to_lowercase());
        nodes.push(code_node(&target, "start", USER_INPUT));
        edges.push(Edge::from_handle("cond", handle, &target));
        edges.push(Edge::new(&target, "end"));
    }
    nodes.push(end_node("end", "code_a", "result"));
    UnifiedDsl::new(metadata("branching"), Workflow::new(nodes, edges))
}

#[allow(dead_code)]
pub fn class(id: &str, name: &str, is_default: bool) -> ClassifierClass {
    ClassifierClass {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        is_default,
    }
}

#[allow(dead_code)]
pub fn classifier_node(id: &str, classes: Vec<ClassifierClass>) -> Node {
    Node::new(
        id,
        "Classify",
        NodeConfig::Classifier(ClassifierConfig {
            model: model(),
            instructions: "Sort the request.".to_string(),
            classes,
        }),
    )
    .with_inputs(vec![Input::referencing("query", DataType::String, "start", USER_INPUT)])
    .with_outputs(vec![Output::new("class_name", DataType::String)])
}

/// A classifier with three classes; only `billing` and `support` have an
/// outgoing edge, declared in that order. `other` is the default.
#[allow(dead_code)]
pub fn classifier_workflow() -> UnifiedDsl {
    let classes = vec![
        class("support", "Support", false),
        class("billing", "Billing", false),
        class("other", "Other", true),
    ];
    UnifiedDsl::new(
        metadata("classifier"),
        Workflow::new(
            vec![
                start_node("start"),
                classifier_node("cls", classes),
                code_node("code_billing", "start", USER_INPUT),
                code_node("code_support", "start", USER_INPUT),
                end_node("end", "code_support", "result"),
            ],
            vec![
                Edge::new("start", "cls"),
                Edge::from_handle("cls", "billing", "code_billing"),
                Edge::from_handle("cls", "support", "code_support"),
                Edge::new("code_billing", "end"),
                Edge::new("code_support", "end"),
            ],
        ),
    )
}

/// An iteration over `start.documents`; its body is a single code node
/// reading the current item.
#[allow(dead_code)]
pub fn iteration_node(id: &str, body: Workflow, exit_node: &str, exit_output: &str) -> Node {
    Node::new(
        id,
        format!("Loop {}", id),
        NodeConfig::Iteration(IterationConfig {
            iterator: IteratorSource {
                source_node: "start".to_string(),
                source_output: "documents".to_string(),
            },
            output_selector: OutputSelector {
                node_id: exit_node.to_string(),
                output_name: exit_output.to_string(),
            },
            parallel: false,
            sub_workflow: body,
        }),
    )
    .with_outputs(vec![Output::new("output", DataType::ArrayString)])
}

#[allow(dead_code)]
pub fn iteration_workflow() -> UnifiedDsl {
    let body = Workflow::new(vec![code_node("body_code", "loop", "item")], Vec::new());
    UnifiedDsl::new(
        metadata("iteration"),
        Workflow::new(
            vec![
                start_node("start"),
                iteration_node("loop", body, "body_code", "result"),
                end_node("end", "loop", "output"),
            ],
            vec![Edge::new("start", "loop"), Edge::new("loop", "end")],
        ),
    )
}

/// Two sibling iterations, each routing on a condition whose only real case
/// is called `X`.
#[allow(dead_code)]
pub fn sibling_iterations() -> UnifiedDsl {
    let body = |suffix: &str| {
        let cond = format!("cond_{}", suffix);
        let yes = format!("yes_{}", suffix);
        let no = format!("no_{}", suffix);
        let loop_id = format!("loop_{}", suffix);
        Workflow::new(
            vec![
                condition_node(
                    &cond,
                    vec![case("X", 1, &loop_id), ConditionCase::default_branch("else")],
                ),
                code_node(&yes, &loop_id, "item"),
                code_node(&no, &loop_id, "item"),
            ],
            vec![Edge::from_handle(&cond, "X", &yes), Edge::from_handle(&cond, "else", &no)],
        )
    };
    UnifiedDsl::new(
        metadata("siblings"),
        Workflow::new(
            vec![
                start_node("start"),
                iteration_node("loop_a", body("a"), "yes_a", "result"),
                iteration_node("loop_b", body("b"), "yes_b", "result"),
                end_node("end", "loop_b", "output"),
            ],
            vec![
                Edge::new("start", "loop_a"),
                Edge::new("loop_a", "loop_b"),
                Edge::new("loop_b", "end"),
            ],
        ),
    )
}
