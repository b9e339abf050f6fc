//! Placeholder scanning for prompt and answer templates.
//!
//! Two placeholder forms are recognised:
//! - `{{#node_id.output#}}` names a node output directly,
//! - `{{name}}` names one of the owning node's inputs.

use super::node::{DataType, Input, VariableReference};

/// One placeholder found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder<'a> {
    NodeOutput { node_id: &'a str, output: &'a str },
    Input(&'a str),
}

impl Placeholder<'_> {
    pub fn render(&self) -> String {
        match self {
            Placeholder::NodeOutput { node_id, output } => node_output(node_id, output),
            Placeholder::Input(name) => input(name),
        }
    }
}

pub fn node_output(node_id: &str, output: &str) -> String {
    format!("{{{{#{}.{}#}}}}", node_id, output)
}

pub fn input(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

/// Classifies the text between `{{` and `}}`.
fn classify(inner: &str) -> Option<Placeholder<'_>> {
    let trimmed = inner.trim();
    if let Some(body) = trimmed.strip_prefix('#').and_then(|b| b.strip_suffix('#')) {
        let (node_id, output) = body.split_once('.')?;
        if node_id.is_empty() || output.is_empty() {
            return None;
        }
        return Some(Placeholder::NodeOutput { node_id, output });
    }
    let is_name = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');
    is_name.then_some(Placeholder::Input(trimmed))
}

/// Every placeholder in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        if let Some(p) = classify(&after[..end]) {
            found.push(p);
        }
        rest = &after[end + 2..];
    }
    found
}

/// Rewrites placeholders in `text`. Returning `None` keeps a placeholder as written.
pub fn rewrite<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&Placeholder<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        out.push_str(&rest[..start]);
        let whole = &rest[start..start + 2 + end + 2];
        match classify(&after[..end]).and_then(|p| f(&p)) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Replaces every `{{#node.output#}}` with an input placeholder, for platforms
/// whose prompts can only name the node's own inputs.
///
/// An existing input that already references the same output is reused;
/// otherwise a new input named after the output is added, suffixed until
/// the name is free.
pub fn lift_node_outputs(text: &str, existing: &[Input]) -> (String, Vec<Input>) {
    let mut added: Vec<Input> = Vec::new();
    let rendered = rewrite(text, |p| {
        let Placeholder::NodeOutput { node_id, output } = p else {
            return None;
        };
        let matches = |i: &&Input| {
            matches!(
                &i.reference,
                Some(VariableReference::NodeOutput { node_id: n, output_name: o })
                    if n == node_id && o == output
            )
        };
        if let Some(found) = existing.iter().chain(added.iter()).find(matches) {
            return Some(input(&found.name));
        }
        let taken = |name: &str| {
            existing
                .iter()
                .chain(added.iter())
                .any(|i| i.name == name)
        };
        let mut name = output.to_string();
        let mut suffix = 1;
        while taken(&name) {
            name = format!("{}_{}", output, suffix);
            suffix += 1;
        }
        added.push(Input::referencing(&name, DataType::String, *node_id, *output));
        Some(input(&name))
    });
    (rendered, added)
}

/// Replaces `{{name}}` placeholders whose input references a node output with
/// the direct `{{#node.output#}}` form. Other placeholders are kept.
pub fn lower_inputs(text: &str, inputs: &[Input]) -> String {
    rewrite(text, |p| {
        let Placeholder::Input(name) = p else {
            return None;
        };
        let found = inputs.iter().find(|i| i.name == *name)?;
        match &found.reference {
            Some(VariableReference::NodeOutput {
                node_id,
                output_name,
            }) => Some(node_output(node_id, output_name)),
            _ => None,
        }
    })
}

