//! Tests for identifier reconciliation and id generation policies.
use kakehashi::generate::RESOLUTION_PASS;
use kakehashi::prelude::*;
use kakehashi::reconcile::*;

fn kind_prefix(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Iteration => "iteration",
        _ => "node",
    }
}

fn uuid_policy() -> IdPolicy {
    IdPolicy {
        roles: None,
        strategy: IdStrategy::CollisionCheckedRandom {
            format: RandomIdFormat::PrefixedUuid { prefix: kind_prefix },
            max_attempts: 100,
        },
        synthetic: SyntheticScheme::PrefixSwap {
            start_prefix: "iteration-node-start",
            end_prefix: "iteration-node-end",
        },
    }
}

fn timestamp_policy(base_millis: u64, max_attempts: u32) -> IdPolicy {
    IdPolicy {
        roles: None,
        strategy: IdStrategy::CollisionCheckedRandom {
            format: RandomIdFormat::Timestamp { base_millis },
            max_attempts,
        },
        synthetic: SyntheticScheme::Suffix,
    }
}

fn counter_policy() -> IdPolicy {
    IdPolicy {
        roles: Some(RoleIds {
            start: "100001".to_string(),
            end: "900001".to_string(),
        }),
        strategy: IdStrategy::Counter { base: 100002 },
        synthetic: SyntheticScheme::Suffix,
    }
}

#[test]
fn test_reconcile_is_idempotent_and_injective() {
    let mut ids = IdReconciler::new(uuid_policy(), 42);
    let first = ids.reconcile("llm_1", NodeKind::Llm);
    let again = ids.reconcile("llm_1", NodeKind::Llm);
    assert_eq!(first, again);
    assert!(first.starts_with("node::"));

    let mut seen = std::collections::HashSet::new();
    for i in 0..200 {
        let target = ids.reconcile(&format!("code_{}", i), NodeKind::Code);
        assert!(seen.insert(target));
    }
    assert!(!seen.contains(&first));
    assert_eq!(ids.len(), 201);
    assert_eq!(ids.source_of(&first), Some("llm_1"));
    assert_eq!(ids.kind_of("llm_1"), Some(NodeKind::Llm));
}

#[test]
fn test_role_ids_and_counter() {
    let mut ids = IdReconciler::new(counter_policy(), 0);
    assert_eq!(ids.reconcile("start", NodeKind::Start), "100001");
    assert_eq!(ids.reconcile("second_start", NodeKind::Start), "100002");
    assert_eq!(ids.reconcile("end", NodeKind::End), "900001");
    assert_eq!(ids.reconcile("llm", NodeKind::Llm), "100003");
    assert_eq!(ids.reconcile("start", NodeKind::Start), "100001");
}

#[test]
fn test_counter_skips_claimed_ids() {
    let mut generator = IdGenerator::new(counter_policy(), 0);
    assert!(generator.claim("100002"));
    assert_eq!(generator.next_id(NodeKind::Code), "100003");
    assert!(generator.is_used("100001"));
}

#[test]
fn test_same_seed_same_ids() {
    let run = |seed: u64| {
        let mut ids = IdReconciler::new(timestamp_policy(1_700_000_000_000, 100), seed);
        ["a", "b", "c"]
            .iter()
            .map(|s| ids.reconcile(s, NodeKind::Code))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(7), run(7));
    assert_ne!(run(7), run(8));
    for id in run(7) {
        let millis: u64 = id.parse().unwrap();
        assert!(millis >= 1_700_000_000_000);
        assert!(millis < 1_700_000_001_000_000);
    }
}

#[test]
fn test_nanosecond_fallback_after_exhausted_attempts() {
    let mut probe = IdGenerator::new(timestamp_policy(0, 1), 3);
    let first = probe.next_id(NodeKind::Code);

    let mut generator = IdGenerator::new(timestamp_policy(0, 1), 3);
    generator.claim(&first);
    let fallback = generator.next_id(NodeKind::Code);
    assert_ne!(fallback, first);
    assert!(fallback.len() >= 19, "expected a nanosecond id, got {}", fallback);
    assert!(fallback.chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn test_synthetic_ids_swap_prefix() {
    let mut ids = IdReconciler::new(uuid_policy(), 1);
    let owner = ids.reconcile("loop", NodeKind::Iteration);
    let (_, tail) = owner.split_once("::").unwrap();

    let start = ids
        .register_synthetic("loop", SyntheticRole::LoopStart, NodeKind::Start)
        .unwrap();
    assert_eq!(start, format!("iteration-node-start::{}", tail));
    assert_eq!(
        ids.derive_synthetic("loop", SyntheticRole::LoopEnd),
        Some(format!("iteration-node-end::{}", tail))
    );

    let key = IdReconciler::synthetic_key("loop", SyntheticRole::LoopStart);
    assert_eq!(ids.resolve(&key), Some(start.as_str()));
    assert_eq!(ids.source_of(&start), Some(key.as_str()));
    assert_eq!(
        ids.register_synthetic("loop", SyntheticRole::LoopStart, NodeKind::Start)
            .unwrap(),
        start
    );
}

#[test]
fn test_synthetic_suffix_scheme() {
    assert_eq!(
        SyntheticScheme::Suffix.derive("1718000000123", SyntheticRole::LoopStart),
        "1718000000123start"
    );
}

#[test]
fn test_synthetic_before_owner_fails() {
    let mut ids = IdReconciler::new(uuid_policy(), 1);
    let err = ids
        .register_synthetic("loop", SyntheticRole::LoopStart, NodeKind::Start)
        .unwrap_err();
    assert!(matches!(err, GenerateError::UnresolvedReference { ref source_id, .. } if source_id == "loop"));
    assert_eq!(ids.derive_synthetic("loop", SyntheticRole::LoopStart), None);
}

#[test]
fn test_require_reports_unreconciled_ids() {
    let mut ids = IdReconciler::new(counter_policy(), 0);
    ids.reconcile("llm", NodeKind::Llm);
    assert!(ids.require("llm", "end", RESOLUTION_PASS).is_ok());

    match ids.require("ghost", "llm", RESOLUTION_PASS) {
        Err(GenerateError::UnresolvedReference {
            source_id,
            node_id,
            pass,
        }) => {
            assert_eq!(source_id, "ghost");
            assert_eq!(node_id, "llm");
            assert_eq!(pass, 2);
        }
        other => panic!("expected an unresolved reference, got {:?}", other),
    }
}

#[test]
fn test_titles_and_port_ids() {
    let mut ids = IdReconciler::new(uuid_policy(), 5);
    let target = ids.reconcile("llm", NodeKind::Llm);
    ids.record_title(&target, "Summarize");
    assert_eq!(ids.title_of(&target), Some("Summarize"));

    let port = ids.fresh_port_id("branch_one_of");
    assert!(port.starts_with("branch_one_of::"));
    assert_ne!(port, ids.fresh_port_id("branch_one_of"));
}
