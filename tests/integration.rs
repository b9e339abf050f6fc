//! End-to-end tests: generate a platform document, read it back, convert across platforms.
mod common;
use common::*;
use kakehashi::convert::detect;
use kakehashi::prelude::*;

fn options() -> GeneratorOptions {
    GeneratorOptions {
        seed: 21,
        timestamp_base: Some(1_700_000_000_000),
        ..GeneratorOptions::default()
    }
}

fn round_trip(platform: Platform, dsl: &UnifiedDsl) -> UnifiedDsl {
    let bytes = generator_for(platform, options()).generate(dsl).unwrap();
    assert_eq!(detect(&bytes).unwrap(), platform);
    parser_for(platform).parse(&bytes).unwrap()
}

fn kinds(workflow: &Workflow) -> Vec<NodeKind> {
    workflow.nodes.iter().map(Node::kind).collect()
}

fn node_of(workflow: &Workflow, kind: NodeKind) -> &Node {
    workflow.first_of_kind(kind).unwrap()
}

fn referenced(input: &Input) -> (&str, &str) {
    match &input.reference {
        Some(VariableReference::NodeOutput {
            node_id,
            output_name,
        }) => (node_id.as_str(), output_name.as_str()),
        other => panic!("expected a node output reference, got {:?}", other),
    }
}

/// The chain's shape survives: three nodes, two edges and the end node
/// still reading the LLM's text.
fn assert_chain(parsed: &UnifiedDsl) {
    let workflow = &parsed.workflow;
    assert_eq!(
        kinds(workflow),
        vec![NodeKind::Start, NodeKind::Llm, NodeKind::End]
    );
    assert_eq!(workflow.edges.len(), 2);

    let llm = node_of(workflow, NodeKind::Llm);
    let end = node_of(workflow, NodeKind::End);
    let answer = end.inputs.iter().find(|i| i.name == "answer").unwrap();
    assert_eq!(referenced(answer), (llm.id.as_str(), "text"));
    assert!(workflow.outgoing(&llm.id).any(|e| e.target == end.id));
}

#[test]
fn test_dify_round_trip() {
    let parsed = round_trip(Platform::Dify, &simple_chain());
    assert_chain(&parsed);
    assert_eq!(parsed.metadata.name, "chain");
    assert_eq!(parsed.metadata.source_platform, Some(Platform::Dify));

    let start = node_of(&parsed.workflow, NodeKind::Start);
    let llm = node_of(&parsed.workflow, NodeKind::Llm);
    let NodeConfig::Llm(config) = &llm.config else {
        unreachable!()
    };
    assert_eq!(
        config.user_prompt,
        format!("{{{{#{}.{}#}}}}", start.id, USER_INPUT)
    );
    assert_eq!(config.model.name, "gpt-4o");
}

#[test]
fn test_dify_answer_edges_are_typed_answer() {
    let mut dsl = simple_chain();
    dsl.workflow.nodes[2].config = NodeConfig::End(EndConfig {
        mode: EndOutputMode::Template,
        template: Some("{{answer}}".to_string()),
        streaming: true,
    });
    let bytes = generator_for(Platform::Dify, options()).generate(&dsl).unwrap();
    let document: serde_yaml::Value = serde_yaml::from_slice(&bytes).unwrap();
    assert_eq!(document["app"]["mode"].as_str(), Some("advanced-chat"));

    let graph = &document["workflow"]["graph"];
    let nodes = graph["nodes"].as_sequence().unwrap();
    let answer = nodes
        .iter()
        .find(|n| n["data"]["type"].as_str() == Some("answer"))
        .unwrap();
    let llm = nodes
        .iter()
        .find(|n| n["data"]["type"].as_str() == Some("llm"))
        .unwrap();
    let edges = graph["edges"].as_sequence().unwrap();
    let into_answer = edges.iter().find(|e| e["target"] == answer["id"]).unwrap();
    assert_eq!(into_answer["data"]["targetType"].as_str(), Some("answer"));
    assert_eq!(into_answer["data"]["sourceType"].as_str(), Some("llm"));
    assert_eq!(into_answer["source"], llm["id"]);
    assert!(edges.iter().all(|e| e["data"]["targetType"].as_str() != Some("end")));

    let parsed = parser_for(Platform::Dify).parse(&bytes).unwrap();
    let end = node_of(&parsed.workflow, NodeKind::End);
    let NodeConfig::End(config) = &end.config else {
        unreachable!()
    };
    assert_eq!(config.mode, EndOutputMode::Template);
}

#[test]
fn test_dify_iteration_round_trip() {
    let parsed = round_trip(Platform::Dify, &iteration_workflow());
    let loop_node = node_of(&parsed.workflow, NodeKind::Iteration);
    let NodeConfig::Iteration(config) = &loop_node.config else {
        unreachable!()
    };

    let body = &config.sub_workflow;
    assert_eq!(kinds(body), vec![NodeKind::Code]);
    assert!(body.edges.is_empty());
    assert_eq!(referenced(&body.nodes[0].inputs[0]), (loop_node.id.as_str(), "item"));
    assert_eq!(config.output_selector.node_id, body.nodes[0].id);
    assert_eq!(config.output_selector.output_name, "result");
}

#[test]
fn test_dify_condition_round_trip() {
    let parsed = round_trip(Platform::Dify, &branching_workflow());
    let cond = node_of(&parsed.workflow, NodeKind::Condition);
    let NodeConfig::Condition(config) = &cond.config else {
        unreachable!()
    };
    assert_eq!(config.cases.len(), 4);
    assert!(config.default_case().is_some());

    let handles: Vec<_> = parsed
        .workflow
        .outgoing(&cond.id)
        .filter_map(|e| e.source_handle.clone())
        .collect();
    assert_eq!(handles.len(), 4);
    for handle in handles {
        assert!(config.case(&handle).is_some(), "dangling handle {}", handle);
    }
}

#[test]
fn test_dify_rejects_unknown_node_types() {
    let yaml = r#"
app:
  name: fetcher
  mode: workflow
kind: app
version: 0.1.5
workflow:
  graph:
    nodes:
      - id: "1"
        type: custom
        data:
          type: http-request
          title: Fetch
    edges: []
"#;
    match parser_for(Platform::Dify).parse(yaml.as_bytes()) {
        Err(ParseError::UnsupportedNodeType { node_id, type_name }) => {
            assert_eq!(node_id, "1");
            assert_eq!(type_name, "http-request");
        }
        other => panic!("expected an unsupported node type, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_iflytek_round_trip() {
    let parsed = round_trip(Platform::IFlytek, &simple_chain());
    assert_chain(&parsed);
    assert!(node_of(&parsed.workflow, NodeKind::Llm).id.starts_with("spark-llm::"));
    assert_eq!(parsed.metadata.source_version.as_deref(), Some("v1"));
}

#[test]
fn test_iflytek_folds_loop_boundaries() {
    let parsed = round_trip(Platform::IFlytek, &iteration_workflow());
    assert_eq!(
        kinds(&parsed.workflow),
        vec![NodeKind::Start, NodeKind::Iteration, NodeKind::End]
    );

    let loop_node = node_of(&parsed.workflow, NodeKind::Iteration);
    let NodeConfig::Iteration(config) = &loop_node.config else {
        unreachable!()
    };
    let body = &config.sub_workflow;
    assert_eq!(kinds(body), vec![NodeKind::Code]);
    assert!(body.edges.is_empty());
    assert_eq!(referenced(&body.nodes[0].inputs[0]), (loop_node.id.as_str(), "item"));
    assert_eq!(config.output_selector.node_id, body.nodes[0].id);

    let start = node_of(&parsed.workflow, NodeKind::Start);
    assert_eq!(config.iterator.source_node, start.id);
    assert_eq!(config.iterator.source_output, "documents");
}

#[test]
fn test_iflytek_condition_round_trip() {
    let parsed = round_trip(Platform::IFlytek, &branching_workflow());
    let cond = node_of(&parsed.workflow, NodeKind::Condition);
    let NodeConfig::Condition(config) = &cond.config else {
        unreachable!()
    };
    let levels: Vec<i32> = config.cases.iter().map(|c| c.level).collect();
    assert_eq!(levels, vec![1, 2, 3, 999]);
    assert_eq!(config.cases[0].conditions.len(), 1);
    assert_eq!(
        config.cases[0].conditions[0].value,
        CompareValue::Literal(serde_json::json!("B"))
    );
    let start = node_of(&parsed.workflow, NodeKind::Start);
    assert_eq!(config.cases[0].conditions[0].variable.node_id(), start.id);

    assert_eq!(
        parsed
            .workflow
            .outgoing(&cond.id)
            .filter(|e| e.source_handle.is_some())
            .count(),
        4
    );
}

#[test]
fn test_coze_round_trip() {
    let parsed = round_trip(Platform::Coze, &simple_chain());
    assert_chain(&parsed);
    let ids: Vec<&str> = parsed.workflow.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["100001", "100002", "900001"]);
}

#[test]
fn test_coze_archive_round_trip() {
    let bytes = generator_for(
        Platform::Coze,
        GeneratorOptions {
            archive: true,
            ..options()
        },
    )
    .generate(&iteration_workflow())
    .unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert_eq!(detect(&bytes).unwrap(), Platform::Coze);

    let parsed = parser_for(Platform::Coze).parse(&bytes).unwrap();
    let loop_node = node_of(&parsed.workflow, NodeKind::Iteration);
    let NodeConfig::Iteration(config) = &loop_node.config else {
        unreachable!()
    };
    let body = &config.sub_workflow;
    assert_eq!(kinds(body), vec![NodeKind::Code]);
    assert!(body.edges.is_empty());
    assert_eq!(referenced(&body.nodes[0].inputs[0]), (loop_node.id.as_str(), "item"));
    assert_eq!(config.output_selector.node_id, body.nodes[0].id);
}

#[test]
fn test_coze_archive_ignores_declared_entry_size() {
    use kakehashi::platforms::coze::archive::{read_document, write_document};

    let document = b"schema_version: 1.0.0\nnodes: []\nedges: []\n".to_vec();
    let mut bytes = write_document(&document).unwrap();
    assert_eq!(read_document(&bytes).unwrap(), document);

    // Claim a 2 GiB entry in both the local and the central header.
    let declared = 0x7fff_ffffu32.to_le_bytes();
    for (signature, offset) in [([0x50, 0x4b, 0x03, 0x04], 22), ([0x50, 0x4b, 0x01, 0x02], 24)] {
        let at = bytes.windows(4).position(|w| w == signature).unwrap();
        bytes[at + offset..at + offset + 4].copy_from_slice(&declared);
    }
    // The lie may be rejected, but must never reserve the declared size.
    if let Ok(read) = read_document(&bytes) {
        assert!(read.len() < 1 << 20);
    }
}

#[test]
fn test_coze_branch_handles() {
    let parsed = round_trip(Platform::Coze, &branching_workflow());
    let cond = node_of(&parsed.workflow, NodeKind::Condition);
    let target_of = |handle: &str| {
        parsed
            .workflow
            .outgoing(&cond.id)
            .find(|e| e.source_handle.as_deref() == Some(handle))
            .map(|e| parsed.workflow.node(&e.target).unwrap().title.clone())
    };
    // Cases are renumbered by level: B, A, C, then the else branch.
    assert_eq!(target_of("case_0").as_deref(), Some("Code code_b"));
    assert_eq!(target_of("case_1").as_deref(), Some("Code code_a"));
    assert_eq!(target_of("case_2").as_deref(), Some("Code code_c"));
    assert_eq!(target_of("case_else").as_deref(), Some("Code code_d"));
}

#[test]
fn test_coze_classifier_gains_default_edge() {
    let parsed = round_trip(Platform::Coze, &classifier_workflow());
    let cls = node_of(&parsed.workflow, NodeKind::Classifier);
    let NodeConfig::Classifier(config) = &cls.config else {
        unreachable!()
    };
    assert_eq!(config.classes.len(), 3);
    assert!(config.class("intent_default").is_some_and(|c| c.is_default));

    let default_target = parsed
        .workflow
        .outgoing(&cls.id)
        .find(|e| e.source_handle.as_deref() == Some("intent_default"))
        .map(|e| parsed.workflow.node(&e.target).unwrap().title.clone());
    assert_eq!(default_target.as_deref(), Some("Code code_support"));
}

#[test]
fn test_unified_round_trip_is_lossless() {
    for dsl in [
        simple_chain(),
        branching_workflow(),
        classifier_workflow(),
        iteration_workflow(),
        sibling_iterations(),
    ] {
        let bytes = generator_for(Platform::Unified, options()).generate(&dsl).unwrap();
        assert_eq!(detect(&bytes).unwrap(), Platform::Unified);
        let parsed = parser_for(Platform::Unified).parse(&bytes).unwrap();
        assert_eq!(parsed, dsl);
    }
}

#[test]
fn test_converter_across_platforms() {
    let dify = generator_for(Platform::Dify, options())
        .generate(&iteration_workflow())
        .unwrap();

    let to_coze = Converter::builder(Platform::Dify, Platform::Coze)
        .with_seed(4)
        .build();
    let coze = to_coze.convert(&dify).unwrap();

    let to_iflytek = Converter::detecting(Platform::IFlytek).with_seed(4).build();
    assert_eq!(to_iflytek.source_of(&coze).unwrap(), Platform::Coze);
    let iflytek = to_iflytek.convert(&coze).unwrap();

    let parsed = parser_for(Platform::IFlytek).parse(&iflytek).unwrap();
    assert_eq!(
        kinds(&parsed.workflow),
        vec![NodeKind::Start, NodeKind::Iteration, NodeKind::End]
    );
    let end = node_of(&parsed.workflow, NodeKind::End);
    let loop_node = node_of(&parsed.workflow, NodeKind::Iteration);
    assert_eq!(referenced(&end.inputs[0]).0, loop_node.id);
}

#[test]
fn test_converter_is_deterministic() {
    let source = generator_for(Platform::Unified, options())
        .generate(&branching_workflow())
        .unwrap();
    let converter = Converter::detecting(Platform::IFlytek).with_seed(17).build();
    assert_eq!(converter.convert(&source).unwrap(), converter.convert(&source).unwrap());
}

#[test]
fn test_unknown_format() {
    let converter = Converter::detecting(Platform::Dify).build();
    match converter.convert(b"just: [a, plain, list]\n") {
        Err(ConvertError::Parse(ParseError::UnknownFormat(_))) => {}
        other => panic!("expected an unknown format error, got {:?}", other.map(|_| ())),
    }
    assert!(converter.convert(&[0xff, 0xfe, 0x00]).is_err());
}
