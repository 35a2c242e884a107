//! AST model consumed by the replty flow evaluator.
//!
//! The parser itself lives outside this workspace. What it hands us is fixed
//! here: a tree of [`Node`]s, each carrying a byte range into the source
//! text and exposing its non-null children in source order.
//!
//! # Architecture
//!
//! - [`node`]: `Node`, `NodeKind` and the helper structs (`Call`, `Parameters`)
//! - [`layout`]: renders an AST back to source text, assigning byte ranges
//! - [`locate`]: finds the ancestor path of the node under the cursor

pub mod layout;
pub mod node;

pub use rowan::{TextRange, TextSize};

pub use crate::layout::layout;
pub use crate::node::{Call, CallOperator, Node, NodeKind, Parameters, VarKind};

/// Find the node under the cursor.
///
/// Returns the ancestor path from `root` down to the innermost node whose
/// END offset equals `offset`. Children are searched first-to-last and the
/// first match wins, so the deepest node ending at the cursor is preferred
/// over any ancestor that happens to end there as well.
pub fn locate(root: &Node, offset: TextSize) -> Option<Vec<&Node>> {
    let mut path = Vec::new();
    if locate_into(root, offset, &mut path) {
        path.reverse();
        Some(path)
    } else {
        None
    }
}

fn locate_into<'a>(node: &'a Node, offset: TextSize, path: &mut Vec<&'a Node>) -> bool {
    for child in node.children() {
        if locate_into(child, offset, path) {
            path.push(node);
            return true;
        }
    }
    if node.range.end() == offset {
        path.push(node);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::build::*;

    #[test]
    fn locate_finds_innermost_node_at_end_offset() {
        let (src, ast) = layout(program(vec![
            lvar_write("a", int(1)),
            call(Some(lvar("a")), CallOperator::Dot, "", vec![]),
        ]));
        assert_eq!(src, "a = 1\na.");

        let path = locate(&ast, TextSize::of(src.as_str())).unwrap();
        let target = path.last().unwrap();
        assert!(matches!(&target.kind, NodeKind::Call(c) if c.name.is_empty()));
        assert!(matches!(path[0].kind, NodeKind::Program(_)));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn locate_prefers_first_matching_child() {
        let (src, ast) = layout(program(vec![lvar("foo")]));
        let path = locate(&ast, TextSize::of(src.as_str())).unwrap();
        assert!(matches!(&path.last().unwrap().kind, NodeKind::VarRead { name, .. } if name == "foo"));
    }

    #[test]
    fn locate_misses_when_nothing_ends_at_offset() {
        let (_, ast) = layout(program(vec![lvar_write("abc", int(12))]));
        assert!(locate(&ast, TextSize::from(2)).is_none());
    }
}
