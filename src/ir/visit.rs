//! Mutable walks over every place a node names another node's output.

use super::config::{CompareValue, NodeConfig};
use super::node::{Node, VariableReference, VariableSelector};
use super::template::{self, Placeholder};

/// Calls `f(node_id, output)` for every node-output reference held by `node`:
/// input references, template placeholders, condition operands and the
/// iterator source. A `Some` return replaces that reference.
pub fn rewrite_references<F>(node: &mut Node, mut f: F)
where
    F: FnMut(&str, &str) -> Option<(String, String)>,
{
    for input in &mut node.inputs {
        if let Some(VariableReference::NodeOutput {
            node_id,
            output_name,
        }) = &mut input.reference
        {
            if let Some((n, o)) = f(node_id, output_name) {
                *node_id = n;
                *output_name = o;
            }
        }
    }

    match &mut node.config {
        NodeConfig::Llm(config) => {
            rewrite_text(&mut config.system_prompt, &mut f);
            rewrite_text(&mut config.user_prompt, &mut f);
        }
        NodeConfig::End(config) => {
            if let Some(text) = &mut config.template {
                rewrite_text(text, &mut f);
            }
        }
        NodeConfig::Classifier(config) => rewrite_text(&mut config.instructions, &mut f),
        NodeConfig::Condition(config) => {
            for condition in config.cases.iter_mut().flat_map(|c| c.conditions.iter_mut()) {
                rewrite_selector(&mut condition.variable, &mut f);
                if let CompareValue::Reference(selector) = &mut condition.value {
                    rewrite_selector(selector, &mut f);
                }
            }
        }
        NodeConfig::Iteration(config) => {
            let iterator = &mut config.iterator;
            if let Some((n, o)) = f(&iterator.source_node, &iterator.source_output) {
                iterator.source_node = n;
                iterator.source_output = o;
            }
        }
        NodeConfig::Start(_) | NodeConfig::Code(_) => {}
    }
}

fn rewrite_text<F>(text: &mut String, f: &mut F)
where
    F: FnMut(&str, &str) -> Option<(String, String)>,
{
    let rewritten = template::rewrite(text, |p| match p {
        Placeholder::NodeOutput { node_id, output } => {
            f(node_id, output).map(|(n, o)| template::node_output(&n, &o))
        }
        Placeholder::Input(_) => None,
    });
    *text = rewritten;
}

fn rewrite_selector<F>(selector: &mut VariableSelector, f: &mut F)
where
    F: FnMut(&str, &str) -> Option<(String, String)>,
{
    if let Some((n, o)) = f(selector.node_id(), selector.output_name()) {
        *selector = selector.retarget(n, o);
    }
}
