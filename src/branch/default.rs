//! Best-effort detection of a classifier's default class.
//!
//! The explicit `is_default` flag always wins. Only when no class carries it
//! do we fall back to matching names, then descriptions, against a small set
//! of markers. The fallback is a heuristic: it can miss, and it can match a
//! class that merely mentions one of the markers.

use crate::ir::ClassifierClass;

/// Markers matched case-insensitively against class names and descriptions.
pub const DEFAULT_MARKERS: [&str; 4] = ["default", "默认", "fallback", "其他"];

pub fn looks_like_default(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DEFAULT_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Index of the default class, if any can be found.
pub fn find_default_class(classes: &[ClassifierClass]) -> Option<usize> {
    if let Some(flagged) = classes.iter().position(|c| c.is_default) {
        return Some(flagged);
    }
    classes
        .iter()
        .position(|c| looks_like_default(&c.name))
        .or_else(|| classes.iter().position(|c| looks_like_default(&c.description)))
}
