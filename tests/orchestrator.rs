//! Tests for the multi-pass generation pipeline.
mod common;
use common::*;
use kakehashi::generate::{Orchestrator, RESOLUTION_PASS};
use kakehashi::platforms::coze::wire::{CozeDocument, CozeValue};
use kakehashi::platforms::iflytek::wire::{SparkDocument, SparkValue};
use kakehashi::platforms::{CozeGenerator, DifyGenerator, IFlytekGenerator};
use kakehashi::prelude::*;

fn options(seed: u64) -> GeneratorOptions {
    GeneratorOptions {
        seed,
        timestamp_base: Some(1_700_000_000_000),
        ..GeneratorOptions::default()
    }
}

#[test]
fn test_simple_chain_on_coze() {
    let bytes = CozeGenerator::new(options(0)).generate(&simple_chain()).unwrap();
    let document: CozeDocument = serde_yaml::from_slice(&bytes).unwrap();

    let ids: Vec<&str> = document.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["100001", "100002", "900001"]);
    assert_eq!(document.edges.len(), 2);

    let end = &document.nodes[2];
    match &end.inputs[0].value {
        Some(CozeValue::Ref { block_id, name, .. }) => {
            assert_eq!(block_id, "100002");
            assert_eq!(name, "text");
        }
        other => panic!("end input should reference the LLM, got {:?}", other),
    }
}

#[test]
fn test_simple_chain_on_iflytek() {
    let bytes = IFlytekGenerator::new(options(0)).generate(&simple_chain()).unwrap();
    let document: SparkDocument = serde_yaml::from_slice(&bytes).unwrap();
    let nodes = &document.flow_data.nodes;
    assert_eq!(nodes.len(), 3);
    assert!(nodes[0].id.starts_with("node-start::"));
    assert!(nodes[2].id.starts_with("node-end::"));

    let answer = nodes[2]
        .data
        .inputs
        .iter()
        .find(|i| i.name == "answer")
        .unwrap();
    match &answer.schema.value {
        Some(SparkValue::Ref(r)) => {
            assert!(r.node_id.starts_with("spark-llm::"));
            assert_eq!(r.node_id, nodes[1].id);
            assert_eq!(r.name, "text");
        }
        other => panic!("end input should reference the LLM, got {:?}", other),
    }
    assert!(document.flow_data.edges.iter().all(|e| e.source_handle.is_none()));
}

#[test]
fn test_same_seed_is_byte_identical() {
    for dsl in [simple_chain(), branching_workflow(), iteration_workflow()] {
        let dify = |seed| DifyGenerator::new(options(seed)).generate(&dsl).unwrap();
        assert_eq!(dify(9), dify(9));

        let iflytek = |seed| IFlytekGenerator::new(options(seed)).generate(&dsl).unwrap();
        assert_eq!(iflytek(9), iflytek(9));

        let coze = |archive| {
            CozeGenerator::new(GeneratorOptions {
                archive,
                ..options(9)
            })
            .generate(&dsl)
            .unwrap()
        };
        assert_eq!(coze(false), coze(false));
        assert_eq!(coze(true), coze(true));
    }
}

#[test]
fn test_different_seed_changes_random_ids() {
    let dsl = simple_chain();
    let a = IFlytekGenerator::new(options(1)).generate(&dsl).unwrap();
    let b = IFlytekGenerator::new(options(2)).generate(&dsl).unwrap();
    assert_ne!(a, b);

    let a = DifyGenerator::new(options(1)).generate(&dsl).unwrap();
    let b = DifyGenerator::new(options(2)).generate(&dsl).unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_classifier_default_edge_is_synthesized() {
    let generator = CozeGenerator::new(options(0));
    let graph = Orchestrator::new(&generator, 0)
        .run(&classifier_workflow())
        .unwrap();

    let synthesized: Vec<_> = graph.synthesized_edges().collect();
    assert_eq!(synthesized.len(), 1);
    let edge = &synthesized[0].resolved;
    assert_eq!(edge.source_port.as_deref(), Some("default"));

    let support = graph
        .nodes
        .iter()
        .find(|n| n.source_id == "code_support")
        .unwrap();
    assert_eq!(edge.target, support.target_id);

    let branch_ports: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| e.resolved.source_kind == NodeKind::Classifier && !e.resolved.synthesized)
        .filter_map(|e| e.resolved.source_port.as_deref())
        .collect();
    assert_eq!(branch_ports, vec!["branch_0", "branch_1"]);
}

#[test]
fn test_covered_default_port_is_left_alone() {
    let mut dsl = classifier_workflow();
    dsl.workflow
        .edges
        .push(Edge::from_handle("cls", "other", "code_billing"));
    let generator = CozeGenerator::new(options(0));
    let graph = Orchestrator::new(&generator, 0).run(&dsl).unwrap();
    assert_eq!(graph.synthesized_edges().count(), 0);
}

#[test]
fn test_unresolved_reference_is_fatal() {
    let mut dsl = simple_chain();
    dsl.workflow.nodes[1].inputs[0] = Input::referencing("query", DataType::String, "ghost", "text");

    let generator = CozeGenerator::new(options(0));
    match Orchestrator::new(&generator, 0).run(&dsl) {
        Err(GenerateError::UnresolvedReference {
            source_id,
            node_id,
            pass,
        }) => {
            assert_eq!(source_id, "ghost");
            assert_eq!(node_id, "llm");
            assert_eq!(pass, RESOLUTION_PASS);
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("a reference to a missing node must fail"),
    }
}

#[test]
fn test_unsupported_kind_inside_loop() {
    let mut dsl = iteration_workflow();
    if let NodeConfig::Iteration(config) = &mut dsl.workflow.nodes[1].config {
        let body = &mut config.sub_workflow;
        body.nodes.push(end_node("inner_end", "body_code", "result"));
        body.edges.push(Edge::new("body_code", "inner_end"));
    }
    let err = DifyGenerator::new(options(0)).generate(&dsl).unwrap_err();
    match err {
        GenerateError::UnsupportedNodeKind {
            node_id,
            kind,
            platform,
        } => {
            assert_eq!(node_id, "inner_end");
            assert_eq!(kind, NodeKind::End);
            assert_eq!(platform, Platform::Dify);
        }
        other => panic!("unexpected error {:?}", other),
    }

    let generator = DifyGenerator::new(options(0));
    assert!(generator.supports(NodeKind::End, NodeScope::TopLevel));
    assert!(!generator.supports(NodeKind::Iteration, NodeScope::InIteration));
    assert!(generator.supports(NodeKind::Start, NodeScope::InIteration));
}

#[test]
fn test_port_conventions_per_platform() {
    let dsl = iteration_workflow();

    let dify = DifyGenerator::new(options(0));
    let graph = Orchestrator::new(&dify, 0).run(&dsl).unwrap();
    let top: Vec<_> = graph.edges_in(None).map(|e| &e.resolved).collect();
    assert!(top.iter().all(|e| e.source_port.as_deref() == Some("source")));
    assert!(top.iter().all(|e| e.target_port.as_deref() == Some("target")));

    let coze = CozeGenerator::new(options(0));
    let graph = Orchestrator::new(&coze, 0).run(&dsl).unwrap();
    let leaving_loop = graph
        .edges_in(None)
        .find(|e| e.resolved.source_kind == NodeKind::Iteration)
        .unwrap();
    assert_eq!(leaving_loop.resolved.source_port.as_deref(), Some("loop-output"));
    assert_eq!(leaving_loop.resolved.target_port, None);

    let iflytek = IFlytekGenerator::new(options(0));
    let graph = Orchestrator::new(&iflytek, 0).run(&dsl).unwrap();
    assert!(graph.edges.iter().all(|e| e.resolved.source_port.is_none()));
    assert!(graph.edges.iter().all(|e| e.resolved.target_port.is_none()));
}

#[test]
fn test_condition_ports_per_platform() {
    let dsl = branching_workflow();
    let ports_of = |edges: Vec<(String, Option<String>)>| -> Vec<Option<String>> {
        edges.into_iter().map(|(_, p)| p).collect()
    };

    let coze = CozeGenerator::new(options(0));
    let graph = Orchestrator::new(&coze, 0).run(&dsl).unwrap();
    let condition_edges: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| e.resolved.source_kind == NodeKind::Condition)
        .map(|e| (e.resolved.target.clone(), e.resolved.source_port.clone()))
        .collect();
    // Edges are declared A, B, C, D.
    assert_eq!(
        ports_of(condition_edges),
        vec![
            Some("true_1".to_string()),
            Some("true".to_string()),
            Some("true_2".to_string()),
            Some("false".to_string()),
        ]
    );

    let iflytek = IFlytekGenerator::new(options(0));
    let graph = Orchestrator::new(&iflytek, 0).run(&dsl).unwrap();
    let ports: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| e.resolved.source_kind == NodeKind::Condition)
        .filter_map(|e| e.resolved.source_port.clone())
        .collect();
    assert_eq!(ports.len(), 4);
    assert!(ports.iter().all(|p| p.starts_with("branch_one_of::")));
}

#[test]
fn test_emission_order() {
    let generator = IFlytekGenerator::new(options(0));
    let graph = Orchestrator::new(&generator, 0).run(&iteration_workflow()).unwrap();
    let order: Vec<_> = graph
        .nodes
        .iter()
        .map(|n| (n.source_id.as_str(), n.parent.is_some()))
        .collect();
    assert_eq!(order.len(), 6);
    assert_eq!(order[0], ("start", false));
    assert_eq!(order[1], ("loop", false));
    assert!(order[2].0.ends_with("#start") && order[2].1);
    assert_eq!(order[3], ("body_code", true));
    assert!(order[4].0.ends_with("#end") && order[4].1);
    assert_eq!(order[5], ("end", false));

    let last_top = graph.edges.iter().rposition(|e| e.resolved.scope.is_none()).unwrap();
    let first_body = graph.edges.iter().position(|e| e.resolved.scope.is_some()).unwrap();
    assert!(last_top < first_body);
}
