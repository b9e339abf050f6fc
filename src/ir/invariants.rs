//! Structural checks run when a `UnifiedDsl` is constructed.
//!
//! These are the invariants generation relies on. Anything richer (required
//! start/end nodes, config completeness) belongs to an external validator.

use super::config::{CompareValue, DEFAULT_CASE_LEVEL, NodeConfig};
use super::dsl::{UnifiedDsl, Workflow};
use super::node::{Node, NodeKind};
use super::template::{self, Placeholder};
use crate::error::IrError;
use ahash::AHashSet;

pub fn check(dsl: &UnifiedDsl) -> Result<(), IrError> {
    let mut global = AHashSet::new();
    check_workflow(&dsl.workflow, None, &mut global)?;
    check_references(&dsl.workflow, &global)
}

fn check_workflow<'a>(
    workflow: &'a Workflow,
    owner: Option<&str>,
    global: &mut AHashSet<&'a str>,
) -> Result<(), IrError> {
    let mut seen = AHashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) || !global.insert(node.id.as_str()) {
            return Err(IrError::violation(&node.id, "duplicate node id"));
        }
    }

    for edge in &workflow.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !seen.contains(endpoint.as_str()) {
                return Err(IrError::violation(
                    owner.unwrap_or(endpoint.as_str()),
                    format!(
                        "edge {} -> {} names node '{}' which is not in this workflow",
                        edge.source, edge.target, endpoint
                    ),
                ));
            }
        }
    }

    for node in &workflow.nodes {
        match &node.config {
            NodeConfig::Condition(config) => {
                let defaults = config.cases.iter().filter(|c| c.is_default()).count();
                if defaults > 1 {
                    return Err(IrError::violation(
                        &node.id,
                        format!("{} default cases (level {})", defaults, DEFAULT_CASE_LEVEL),
                    ));
                }
                if let Some(case) = config.default_case() {
                    if !case.conditions.is_empty() {
                        return Err(IrError::violation(
                            &node.id,
                            format!("default case '{}' carries conditions", case.case_id),
                        ));
                    }
                }
                let mut levels = AHashSet::new();
                let mut case_ids = AHashSet::new();
                for case in &config.cases {
                    if !case_ids.insert(case.case_id.as_str()) {
                        return Err(IrError::violation(
                            &node.id,
                            format!("duplicate case id '{}'", case.case_id),
                        ));
                    }
                    if !case.is_default() && !levels.insert(case.level) {
                        return Err(IrError::violation(
                            &node.id,
                            format!("two cases share level {}", case.level),
                        ));
                    }
                }
            }
            NodeConfig::Classifier(config) => {
                let flagged = config.classes.iter().filter(|c| c.is_default).count();
                if flagged > 1 {
                    return Err(IrError::violation(
                        &node.id,
                        format!("{} classes are flagged as default", flagged),
                    ));
                }
                let mut class_ids = AHashSet::new();
                for class in &config.classes {
                    if !class_ids.insert(class.id.as_str()) {
                        return Err(IrError::violation(
                            &node.id,
                            format!("duplicate class id '{}'", class.id),
                        ));
                    }
                }
            }
            NodeConfig::Iteration(config) => {
                if owner.is_some() {
                    return Err(IrError::violation(
                        &node.id,
                        "iterations may only be nested one level deep",
                    ));
                }
                if config.iterator.source_output.is_empty() {
                    return Err(IrError::violation(&node.id, "iterator has no source output"));
                }
                if config.output_selector.output_name.is_empty() {
                    return Err(IrError::violation(
                        &node.id,
                        "output selector has no output name",
                    ));
                }
                if let Some(inner) = config
                    .sub_workflow
                    .nodes
                    .iter()
                    .find(|n| n.kind() == NodeKind::Iteration)
                {
                    return Err(IrError::violation(
                        &inner.id,
                        format!("iteration nested inside iteration '{}'", node.id),
                    ));
                }
                check_workflow(&config.sub_workflow, Some(&node.id), global)?;
            }
            NodeConfig::Start(_)
            | NodeConfig::End(_)
            | NodeConfig::Llm(_)
            | NodeConfig::Code(_) => {}
        }
    }
    Ok(())
}

/// Every node-output reference must name an upstream node: an edge ancestor
/// in its own workflow, or for a body node the owning iteration and that
/// iteration's ancestors. Ids naming no node at all are left to generation,
/// which reports them as unresolved references.
fn check_references(top: &Workflow, known: &AHashSet<&str>) -> Result<(), IrError> {
    for node in &top.nodes {
        let upstream = ancestors(top, &node.id);
        check_node_references(node, &upstream, known)?;

        let NodeConfig::Iteration(config) = &node.config else {
            continue;
        };
        let body = &config.sub_workflow;
        for inner in &body.nodes {
            let mut allowed = ancestors(body, &inner.id);
            allowed.insert(node.id.as_str());
            allowed.extend(upstream.iter().copied());
            check_node_references(inner, &allowed, known)?;
        }
    }
    Ok(())
}

fn check_node_references(
    node: &Node,
    allowed: &AHashSet<&str>,
    known: &AHashSet<&str>,
) -> Result<(), IrError> {
    match referenced_ids(node)
        .into_iter()
        .find(|id| known.contains(id) && !allowed.contains(id))
    {
        Some(id) => Err(IrError::violation(
            &node.id,
            format!("references '{}', which is not upstream of it", id),
        )),
        None => Ok(()),
    }
}

/// Sources reachable backwards along edges from `node_id`.
fn ancestors<'a>(workflow: &'a Workflow, node_id: &'a str) -> AHashSet<&'a str> {
    let mut found = AHashSet::new();
    let mut pending = vec![node_id];
    while let Some(current) = pending.pop() {
        for edge in workflow.edges.iter().filter(|e| e.target == current) {
            if found.insert(edge.source.as_str()) {
                pending.push(edge.source.as_str());
            }
        }
    }
    found
}

/// Node ids named by inputs, condition operands, the iterator source and
/// `{{#node.output#}}` placeholders.
fn referenced_ids(node: &Node) -> Vec<&str> {
    let mut ids: Vec<&str> = node.referenced_nodes().collect();
    let mut texts: Vec<&str> = Vec::new();
    match &node.config {
        NodeConfig::Llm(config) => {
            texts.push(&config.system_prompt);
            texts.push(&config.user_prompt);
        }
        NodeConfig::End(config) => texts.extend(config.template.as_deref()),
        NodeConfig::Classifier(config) => texts.push(&config.instructions),
        NodeConfig::Condition(config) => {
            for condition in config.cases.iter().flat_map(|c| &c.conditions) {
                ids.push(condition.variable.node_id());
                if let CompareValue::Reference(selector) = &condition.value {
                    ids.push(selector.node_id());
                }
            }
        }
        NodeConfig::Iteration(config) => ids.push(&config.iterator.source_node),
        NodeConfig::Start(_) | NodeConfig::Code(_) => {}
    }
    for text in texts {
        ids.extend(
            template::placeholders(text)
                .into_iter()
                .filter_map(|p| match p {
                    Placeholder::NodeOutput { node_id, .. } => Some(node_id),
                    Placeholder::Input(_) => None,
                }),
        );
    }
    ids
}
