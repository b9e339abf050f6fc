//! Tests for branch and intent port mapping.
mod common;
use common::*;
use kakehashi::branch::*;
use kakehashi::prelude::*;
use kakehashi::reconcile::{IdPolicy, IdReconciler, IdStrategy, SyntheticScheme};

fn reconciler() -> IdReconciler {
    IdReconciler::new(
        IdPolicy {
            roles: None,
            strategy: IdStrategy::Counter { base: 1 },
            synthetic: SyntheticScheme::Suffix,
        },
        0,
    )
}

fn condition_config() -> ConditionConfig {
    ConditionConfig {
        cases: vec![
            case("A", 5, "start"),
            case("B", 2, "start"),
            case("D", 999, "start"),
            case("C", 8, "start"),
        ],
    }
}

fn classifier_config() -> ClassifierConfig {
    ClassifierConfig {
        model: model(),
        instructions: String::new(),
        classes: vec![
            class("a", "Alpha", false),
            class("b", "Beta", false),
            class("c", "Gamma", false),
            class("d", "Other", true),
        ],
    }
}

#[test]
fn test_condition_ports_follow_level_order() {
    let mut engine = BranchPortEngine::new(PortScheme::Positional);
    let table = engine.map_condition("cond", &condition_config(), &mut reconciler());
    assert_eq!(table.resolve("B"), Some("true"));
    assert_eq!(table.resolve("A"), Some("true_1"));
    assert_eq!(table.resolve("C"), Some("true_2"));
    assert_eq!(table.resolve("D"), Some("false"));
    assert_eq!(table.default_port(), Some("false"));

    let order: Vec<&str> = table.branches().map(|a| a.handle.as_str()).collect();
    assert_eq!(order, vec!["B", "A", "C"]);
}

#[test]
fn test_condition_without_default_still_has_else_port() {
    let config = ConditionConfig {
        cases: vec![case("only", 1, "start")],
    };
    let mut engine = BranchPortEngine::new(PortScheme::Positional);
    let table = engine.map_condition("cond", &config, &mut reconciler());
    let default = table.default_assignment().unwrap();
    assert_eq!(default.handle, "");
    assert_eq!(default.port, "false");
    assert_eq!(table.resolve("else"), Some("false"));
}

#[test]
fn test_legacy_handle_aliases() {
    let mut engine = BranchPortEngine::new(PortScheme::Positional);
    engine.map_condition("cond", &condition_config(), &mut reconciler());
    assert_eq!(engine.resolve_handle("cond", "true_0"), Some("true"));
    assert_eq!(engine.resolve_handle("cond", "true_2"), Some("true_2"));
    assert_eq!(engine.resolve_handle("cond", "1"), Some("true_1"));
    assert_eq!(engine.resolve_handle("cond", "else"), Some("false"));
    assert_eq!(engine.resolve_handle("cond", "false"), Some("false"));
    assert_eq!(engine.resolve_handle("cond", "nope"), None);
    assert_eq!(engine.resolve_handle("other", "B"), None);
}

#[test]
fn test_case_id_scheme_keeps_later_ids() {
    let mut engine = BranchPortEngine::new(PortScheme::CaseId);
    let table = engine.map_condition("cond", &condition_config(), &mut reconciler());
    assert_eq!(table.resolve("B"), Some("true"));
    assert_eq!(table.resolve("A"), Some("A"));
    assert_eq!(table.resolve("C"), Some("C"));
    assert_eq!(table.resolve("D"), Some("false"));
    assert_eq!(table.resolve("true_0"), Some("true"));
}

#[test]
fn test_case_id_scheme_reserved_id_skips_taken_names() {
    let config = ConditionConfig {
        cases: vec![
            case("B", 1, "start"),
            case("true", 2, "start"),
            case("true_1", 3, "start"),
            case("false", 4, "start"),
            case("D", 999, "start"),
        ],
    };
    let mut engine = BranchPortEngine::new(PortScheme::CaseId);
    let table = engine.map_condition("cond", &config, &mut reconciler());
    assert_eq!(table.resolve("B"), Some("true"));
    assert_eq!(table.resolve("true"), Some("true_2"));
    assert_eq!(table.resolve("true_1"), Some("true_1"));
    assert_eq!(table.resolve("false"), Some("true_3"));
    assert_eq!(table.resolve("D"), Some("false"));

    let mut ports: Vec<&str> = table.assignments.iter().map(|a| a.port.as_str()).collect();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), table.len());
}

#[test]
fn test_generated_scheme_is_stable_per_node() {
    let scheme = PortScheme::Generated {
        case_prefix: "branch_one_of",
        intent_prefix: "intent-one-of",
    };
    let mut ids = reconciler();
    let mut engine = BranchPortEngine::new(scheme);
    let first = engine.map_condition("cond", &condition_config(), &mut ids).clone();
    assert_eq!(first.len(), 4);
    assert!(first.assignments.iter().all(|a| a.port.starts_with("branch_one_of::")));

    let again = engine.map_condition("cond", &condition_config(), &mut ids);
    assert_eq!(&first, again);

    let table = engine.map_classifier("cls", &classifier_config(), &[], &mut ids);
    assert!(table.assignments.iter().all(|a| a.port.starts_with("intent-one-of::")));
}

#[test]
fn test_classifier_ports_follow_edge_order() {
    let edges = [
        Edge::from_handle("cls", "c", "x"),
        Edge::from_handle("cls", "a", "y"),
        Edge::from_handle("cls", "c", "z"),
    ];
    let outgoing: Vec<&Edge> = edges.iter().collect();
    let mut engine = BranchPortEngine::new(PortScheme::Positional);
    let table = engine.map_classifier("cls", &classifier_config(), &outgoing, &mut reconciler());

    assert_eq!(table.resolve("c"), Some("branch_0"));
    assert_eq!(table.resolve("a"), Some("branch_1"));
    assert_eq!(table.resolve("b"), Some("branch_2"));
    assert_eq!(table.resolve("d"), Some("default"));
    assert_eq!(table.port_of_handle("d"), Some("default"));
}

#[test]
fn test_classifier_without_default_class() {
    let config = ClassifierConfig {
        classes: vec![class("a", "Alpha", false), class("b", "Beta", false)],
        ..classifier_config()
    };

    let mut positional = BranchPortEngine::new(PortScheme::Positional);
    let table = positional.map_classifier("cls", &config, &[], &mut reconciler());
    let default = table.default_assignment().unwrap();
    assert_eq!(default.handle, "");
    assert_eq!(default.port, "default");

    let mut by_id = BranchPortEngine::new(PortScheme::CaseId);
    let table = by_id.map_classifier("cls", &config, &[], &mut reconciler());
    assert_eq!(table.default_port(), None);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_default_class_heuristics() {
    assert!(looks_like_default("Default route"));
    assert!(looks_like_default("其他问题"));
    assert!(looks_like_default("FALLBACK"));
    assert!(!looks_like_default("Billing"));

    let by_name = vec![class("a", "Billing", false), class("b", "默认", false)];
    assert_eq!(find_default_class(&by_name), Some(1));

    let mut by_description = vec![class("a", "Billing", false), class("b", "Misc", false)];
    by_description[1].description = "fallback for everything else".to_string();
    assert_eq!(find_default_class(&by_description), Some(1));

    let flagged = vec![class("a", "Default", false), class("b", "Misc", true)];
    assert_eq!(find_default_class(&flagged), Some(1));

    let none = vec![class("a", "Billing", false)];
    assert_eq!(find_default_class(&none), None);
}
