//! Comment binding ("decoration") for syntax nodes
//!
//! tree-sitter keeps comments as extra nodes wherever they occur. Weaving
//! needs them attached to what they annotate: a run of own-line comments
//! directly above a declaration or statement is its leading annotation, and
//! a comment starting on the line a node ends on is its trailing annotation.

use std::collections::HashMap;
use std::ops::Range;

use tree_sitter::Node;

use crate::directive::Directive;
use crate::source::{children, SourceFile};

/// A comment bound to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub range: Range<usize>,
    pub text: String,
    /// 0-based row of the first line.
    pub row: usize,
    /// 0-based row of the last line.
    pub end_row: usize,
}

impl Comment {
    pub fn directive(&self) -> Option<Directive> {
        Directive::parse(&self.text)
    }
}

/// Leading and trailing comments keyed by node id.
#[derive(Debug, Default)]
pub struct Decorations {
    leading: HashMap<usize, Vec<Comment>>,
    trailing: HashMap<usize, Vec<Comment>>,
}

/// A node viewed together with its bound comments.
#[derive(Debug, Clone, Copy)]
pub struct AnnotatedNode<'t, 'd> {
    pub node: Node<'t>,
    pub leading: &'d [Comment],
    pub trailing: &'d [Comment],
}

impl<'t, 'd> AnnotatedNode<'t, 'd> {
    /// Directives among the leading comments, closest to the node last.
    pub fn directives(&self) -> impl Iterator<Item = Directive> + 'd {
        let leading: &'d [Comment] = self.leading;
        leading.iter().filter_map(Comment::directive)
    }

    pub fn directive(&self, name: &str) -> Option<Directive> {
        self.directives().filter(|d| d.name == name).last()
    }
}

/// Node kinds that only group statements; comments preceding them belong to
/// their first statement.
const STATEMENT_CONTAINERS: &[&str] = &["statement_list"];

impl Decorations {
    pub fn new(file: &SourceFile) -> Self {
        let mut decorations = Self::default();
        decorations.visit(file, file.root());
        decorations
    }

    pub fn annotate<'t>(&self, node: Node<'t>) -> AnnotatedNode<'t, '_> {
        AnnotatedNode {
            node,
            leading: self.leading(node),
            trailing: self.trailing(node),
        }
    }

    pub fn leading(&self, node: Node<'_>) -> &[Comment] {
        self.leading
            .get(&node.id())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn trailing(&self, node: Node<'_>) -> &[Comment] {
        self.trailing
            .get(&node.id())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn visit(&mut self, file: &SourceFile, node: Node<'_>) {
        let kids = children(node);
        let mut pending: Vec<Comment> = Vec::new();
        let mut previous: Option<Node<'_>> = None;

        for child in &kids {
            if child.kind() == "comment" {
                let comment = Comment {
                    range: child.byte_range(),
                    text: file.node_text(*child).to_string(),
                    row: child.start_position().row,
                    end_row: child.end_position().row,
                };

                let trails_previous = previous
                    .map(|prev| prev.end_position().row == comment.row)
                    .unwrap_or(false);
                if trails_previous && pending.is_empty() {
                    if let Some(prev) = previous {
                        self.trailing.entry(prev.id()).or_default().push(comment);
                    }
                    continue;
                }

                // A blank line separates comment groups.
                if pending
                    .last()
                    .map(|last| comment.row > last.end_row + 1)
                    .unwrap_or(false)
                {
                    pending.clear();
                }
                if own_line(file, child.start_byte()) {
                    pending.push(comment);
                } else {
                    pending.clear();
                }
                continue;
            }

            if !pending.is_empty() {
                let adjacent = pending
                    .last()
                    .map(|last| child.start_position().row <= last.end_row + 1)
                    .unwrap_or(false);
                if adjacent {
                    let target = first_statement(*child);
                    self.leading
                        .entry(target.id())
                        .or_default()
                        .append(&mut pending);
                }
                pending.clear();
            }

            if child.is_named() {
                previous = Some(*child);
            }
            self.visit(file, *child);
        }
    }
}

fn first_statement(node: Node<'_>) -> Node<'_> {
    if STATEMENT_CONTAINERS.contains(&node.kind()) {
        if let Some(first) = children(node).into_iter().find(|c| c.kind() != "comment") {
            return first_statement(first);
        }
    }
    node
}

/// True when only whitespace precedes `offset` on its line.
fn own_line(file: &SourceFile, offset: usize) -> bool {
    let start = file.line_start(offset);
    file.slice(start..offset).trim().is_empty()
}
