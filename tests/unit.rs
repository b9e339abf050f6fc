//! Unit tests for the unified IR: errors, invariants, templates and platforms.
mod common;
use common::*;
use kakehashi::ir::template::{self, Placeholder};
use kakehashi::ir::{ITERATION_ITEM, invariants};
use kakehashi::prelude::*;

#[test]
fn test_error_display() {
    let err = GenerateError::UnresolvedReference {
        source_id: "ghost".to_string(),
        node_id: "llm".to_string(),
        pass: 2,
    };
    assert_eq!(
        err.to_string(),
        "Reference to 'ghost' from node 'llm' was never reconciled (pass 2)"
    );

    let err = ParseError::UnsupportedNodeType {
        node_id: "n1".to_string(),
        type_name: "http-request".to_string(),
    };
    assert!(err.to_string().contains("http-request"));

    let err: ConvertError = ParseError::UnknownFormat("empty".to_string()).into();
    assert!(err.to_string().starts_with("Parse failed:"));
}

#[test]
fn test_fixtures_pass_invariants() {
    for dsl in [
        simple_chain(),
        branching_workflow(),
        classifier_workflow(),
        iteration_workflow(),
        sibling_iterations(),
    ] {
        assert!(invariants::check(&dsl).is_ok(), "{} failed", dsl.metadata.name);
    }
}

#[test]
fn test_duplicate_node_ids_rejected() {
    let mut dsl = simple_chain();
    dsl.workflow.nodes.push(code_node("llm", "start", USER_INPUT));
    let err = invariants::check(&dsl).unwrap_err();
    assert!(matches!(err, IrError::StructuralInvariantViolation { ref node_id, .. } if node_id == "llm"));
}

#[test]
fn test_ids_must_be_unique_across_iteration_bodies() {
    let mut dsl = iteration_workflow();
    dsl.workflow.nodes.push(code_node("body_code", "start", USER_INPUT));
    assert!(invariants::check(&dsl).is_err());
}

#[test]
fn test_condition_default_rules() {
    let two_defaults = condition_node(
        "cond",
        vec![
            case("A", 1, "start"),
            ConditionCase::default_branch("x"),
            ConditionCase::default_branch("y"),
        ],
    );
    let dsl = UnifiedDsl::new(
        metadata("defaults"),
        Workflow::new(vec![start_node("start"), two_defaults], Vec::new()),
    );
    assert!(invariants::check(&dsl).is_err());

    let mut default_with_conditions = case("D", 999, "start");
    default_with_conditions.conditions = case("A", 1, "start").conditions;
    let dsl = UnifiedDsl::new(
        metadata("defaults"),
        Workflow::new(
            vec![start_node("start"), condition_node("cond", vec![default_with_conditions])],
            Vec::new(),
        ),
    );
    assert!(invariants::check(&dsl).is_err());
}

#[test]
fn test_duplicate_levels_rejected() {
    let cond = condition_node("cond", vec![case("A", 3, "start"), case("B", 3, "start")]);
    let dsl = UnifiedDsl::new(
        metadata("levels"),
        Workflow::new(vec![start_node("start"), cond], Vec::new()),
    );
    let err = invariants::check(&dsl).unwrap_err();
    assert!(err.to_string().contains("level 3"));
}

#[test]
fn test_two_flagged_default_classes_rejected() {
    let cls = classifier_node(
        "cls",
        vec![class("a", "A", true), class("b", "B", true)],
    );
    let dsl = UnifiedDsl::new(
        metadata("classes"),
        Workflow::new(vec![start_node("start"), cls], Vec::new()),
    );
    assert!(invariants::check(&dsl).is_err());
}

#[test]
fn test_nested_iteration_rejected() {
    let inner_body = Workflow::new(vec![code_node("deep", "inner", ITERATION_ITEM)], Vec::new());
    let inner = iteration_node("inner", inner_body, "deep", "result");
    let outer_body = Workflow::new(vec![inner], Vec::new());
    let dsl = UnifiedDsl::new(
        metadata("nested"),
        Workflow::new(
            vec![start_node("start"), iteration_node("outer", outer_body, "inner", "output")],
            Vec::new(),
        ),
    );
    let err = invariants::check(&dsl).unwrap_err();
    assert!(matches!(err, IrError::StructuralInvariantViolation { ref node_id, .. } if node_id == "inner"));
}

#[test]
fn test_edge_endpoint_must_exist_in_scope() {
    let mut dsl = simple_chain();
    dsl.workflow.edges.push(Edge::new("llm", "missing"));
    let err = invariants::check(&dsl).unwrap_err();
    assert!(err.to_string().contains("missing"));

    // A body node is not visible to top-level edges.
    let mut dsl = iteration_workflow();
    dsl.workflow.edges.push(Edge::new("start", "body_code"));
    assert!(invariants::check(&dsl).is_err());
}

fn violation_at(dsl: &UnifiedDsl) -> String {
    match invariants::check(dsl) {
        Err(IrError::StructuralInvariantViolation { node_id, .. }) => node_id,
        other => panic!("expected a violation, got {:?}", other),
    }
}

#[test]
fn test_forward_reference_rejected() {
    let mut dsl = simple_chain();
    dsl.workflow.nodes[1].inputs[0] = Input::referencing("query", DataType::String, "end", "answer");
    assert_eq!(violation_at(&dsl), "llm");
    assert!(UnifiedDsl::checked(dsl.metadata.clone(), dsl.workflow.clone()).is_err());

    let mut dsl = simple_chain();
    if let NodeConfig::Llm(config) = &mut dsl.workflow.nodes[1].config {
        config.system_prompt = "Continue from {{#end.answer#}}".to_string();
    }
    assert_eq!(violation_at(&dsl), "llm");
}

#[test]
fn test_top_level_cannot_read_iteration_body() {
    let mut dsl = iteration_workflow();
    dsl.workflow.nodes[2].inputs[0] =
        Input::referencing("answer", DataType::String, "body_code", "result");
    assert_eq!(violation_at(&dsl), "end");
}

#[test]
fn test_body_reads_through_enclosing_iteration() {
    let mut dsl = iteration_workflow();
    if let NodeConfig::Iteration(config) = &mut dsl.workflow.nodes[1].config {
        config.sub_workflow.nodes[0].inputs[0] =
            Input::referencing("arg", DataType::String, "start", USER_INPUT);
    }
    assert!(invariants::check(&dsl).is_ok());

    // `end` runs after the loop, so the body may not read it.
    if let NodeConfig::Iteration(config) = &mut dsl.workflow.nodes[1].config {
        config.sub_workflow.nodes[0].inputs[0] =
            Input::referencing("arg", DataType::String, "end", "answer");
    }
    assert_eq!(violation_at(&dsl), "body_code");
}

#[test]
fn test_iterator_and_condition_sources_must_be_upstream() {
    let mut dsl = iteration_workflow();
    if let NodeConfig::Iteration(config) = &mut dsl.workflow.nodes[1].config {
        config.iterator.source_node = "end".to_string();
    }
    assert_eq!(violation_at(&dsl), "loop");

    let mut dsl = branching_workflow();
    if let NodeConfig::Condition(config) = &mut dsl.workflow.nodes[1].config {
        config.cases[0].conditions[0].value =
            CompareValue::Reference(VariableSelector::new("code_b", "result"));
    }
    assert_eq!(violation_at(&dsl), "cond");
}

#[test]
fn test_unknown_reference_left_to_generation() {
    let mut dsl = simple_chain();
    dsl.workflow.nodes[1].inputs[0] = Input::referencing("query", DataType::String, "ghost", "text");
    assert!(invariants::check(&dsl).is_ok());
}

#[test]
fn test_checked_constructor_validates() {
    let dsl = simple_chain();
    assert!(UnifiedDsl::checked(dsl.metadata.clone(), dsl.workflow.clone()).is_ok());

    let mut workflow = dsl.workflow.clone();
    workflow.edges.push(Edge::new("nowhere", "end"));
    assert!(UnifiedDsl::checked(dsl.metadata, workflow).is_err());
}

#[test]
fn test_selector_needs_two_segments() {
    let short = VariableSelector::try_from(vec!["start".to_string()]);
    assert!(short.is_err());

    let nested =
        VariableSelector::try_from(vec!["llm".to_string(), "json".to_string(), "field".to_string()])
            .unwrap();
    assert_eq!(nested.node_id(), "llm");
    assert_eq!(nested.output_name(), "json");
    assert_eq!(nested.segments().len(), 3);

    let parsed: Result<VariableSelector, _> = serde_json::from_str(r#"["only"]"#);
    assert!(parsed.is_err());
}

#[test]
fn test_template_placeholders() {
    let found = template::placeholders("Hi {{name}}, see {{#llm.text#}} and {{ #bad }}");
    assert_eq!(
        found,
        vec![
            Placeholder::Input("name"),
            Placeholder::NodeOutput {
                node_id: "llm",
                output: "text"
            },
        ]
    );
}

#[test]
fn test_lift_reuses_existing_inputs() {
    let existing = vec![Input::referencing("q", DataType::String, "start", "query")];
    let (text, added) = template::lift_node_outputs(
        "{{#start.query#}} / {{#llm.text#}} / {{#llm.text#}}",
        &existing,
    );
    assert_eq!(text, "{{q}} / {{text}} / {{text}}");
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].name, "text");
    assert_eq!(
        added[0].reference,
        Some(VariableReference::node_output("llm", "text"))
    );
}

#[test]
fn test_lift_avoids_name_clashes() {
    let existing = vec![Input::literal("text", DataType::String, serde_json::json!("fixed"))];
    let (text, added) = template::lift_node_outputs("{{#llm.text#}}", &existing);
    assert_eq!(text, "{{text_1}}");
    assert_eq!(added[0].name, "text_1");
}

#[test]
fn test_lower_keeps_literal_inputs() {
    let inputs = vec![
        Input::referencing("query", DataType::String, "start", USER_INPUT),
        Input::literal("tone", DataType::String, serde_json::json!("formal")),
    ];
    let lowered = template::lower_inputs("{{query}} in a {{tone}} tone, {{unknown}}", &inputs);
    assert_eq!(
        lowered,
        "{{#start.AGENT_USER_INPUT#}} in a {{tone}} tone, {{unknown}}"
    );
}

#[test]
fn test_platform_names() {
    assert_eq!("dify".parse::<Platform>(), Ok(Platform::Dify));
    assert_eq!("Spark".parse::<Platform>(), Ok(Platform::IFlytek));
    assert_eq!("ir".parse::<Platform>(), Ok(Platform::Unified));
    assert!("n8n".parse::<Platform>().is_err());
    assert_eq!(Platform::IFlytek.to_string(), "iflytek");
}

#[test]
fn test_platform_detection() {
    assert_eq!(Platform::detect(b"flowData:\n  nodes: []\n").unwrap(), Platform::IFlytek);
    assert_eq!(
        Platform::detect(b"app:\n  name: x\nworkflow:\n  graph: {}\n").unwrap(),
        Platform::Dify
    );
    assert_eq!(Platform::detect(b"schema_version: 1.0.0\nnodes: []\n").unwrap(), Platform::Coze);
    assert_eq!(Platform::detect(b"PK\x03\x04rest").unwrap(), Platform::Coze);
    assert_eq!(
        Platform::detect(b"metadata:\n  name: x\nworkflow:\n  nodes: []\n").unwrap(),
        Platform::Unified
    );
    assert!(matches!(
        Platform::detect(b"kind: Deployment\n"),
        Err(ParseError::UnknownFormat(_))
    ));
}
