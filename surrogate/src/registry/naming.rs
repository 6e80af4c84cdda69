//! Task name validation policy.

use regex::Regex;
use std::sync::OnceLock;

/// Reserved leaf name that can never be installed (used historically to try
/// to smuggle a package marker file in as a task).
const RESERVED_LEAF: &str = "__init__";

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w+\.\w+\.\w+$").expect("static regex is valid"))
}

/// Checks a task name against the dotted three-segment naming policy.
///
/// A valid name matches `\w+\.\w+\.\w+` and does not end with the reserved
/// `__init__` leaf.
pub fn valid_task_name(name: &str) -> bool {
    if !name_pattern().is_match(name) {
        return false;
    }
    !ends_with_reserved_leaf(name)
}

/// Whether `name`'s final dotted segment is the reserved `__init__` leaf.
pub fn ends_with_reserved_leaf(name: &str) -> bool {
    name.rsplit('.').next() == Some(RESERVED_LEAF)
}

/// Split a validated three-segment name into its path components.
///
/// Panics if `name` is not already known to be valid; callers must check
/// [`valid_task_name`] first.
pub fn split_segments(name: &str) -> (&str, &str, &str) {
    let mut parts = name.splitn(3, '.');
    let seg1 = parts.next().expect("valid name has segment 1");
    let seg2 = parts.next().expect("valid name has segment 2");
    let seg3 = parts.next().expect("valid name has segment 3");
    (seg1, seg2, seg3)
}
