//! Go source files parsed with tree-sitter

use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

use crate::ParseError;

/// Reusable Go parser. Not `Sync`; create one per thread.
pub struct GoParser {
    parser: Parser,
}

impl GoParser {
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| ParseError::Language(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Parse a complete source file. Files tree-sitter cannot parse cleanly
    /// are rejected so they reach the compiler untouched.
    pub fn parse(
        &mut self,
        path: impl Into<PathBuf>,
        text: impl Into<String>,
    ) -> Result<SourceFile, ParseError> {
        let path = path.into();
        let text = text.into();
        let tree = self
            .parser
            .parse(&text, None)
            .ok_or_else(|| ParseError::NoTree(path.clone()))?;

        if let Some(bad) = first_error(tree.root_node()) {
            let pos = bad.start_position();
            debug!(path = %path.display(), line = pos.row + 1, kind = bad.kind(), "syntax error");
            return Err(ParseError::Syntax {
                path,
                line: pos.row + 1,
                column: pos.column + 1,
            });
        }

        Ok(SourceFile { path, text, tree })
    }

    /// Parse a fragment that may contain errors (template validation).
    pub fn parse_fragment(&mut self, text: &str) -> Option<Tree> {
        self.parser.parse(text, None)
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    children(node).into_iter().find_map(first_error).or(Some(node))
}

/// A parsed Go file that owns its text and tree.
pub struct SourceFile {
    path: PathBuf,
    text: String,
    tree: Tree,
}

impl SourceFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn node_text(&self, node: Node<'_>) -> &str {
        &self.text[node.byte_range()]
    }

    pub fn slice(&self, range: Range<usize>) -> &str {
        &self.text[range]
    }

    /// Name from the package clause.
    pub fn package_name(&self) -> Option<&str> {
        let clause = self.package_clause()?;
        named_children(clause)
            .into_iter()
            .find(|n| n.kind() == "package_identifier")
            .map(|n| self.node_text(n))
    }

    pub fn package_clause(&self) -> Option<Node<'_>> {
        children(self.root())
            .into_iter()
            .find(|n| n.kind() == "package_clause")
    }

    /// Byte offset of the start of the line containing `offset`.
    pub fn line_start(&self, offset: usize) -> usize {
        self.text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
    }

    /// 1-based line and column of a byte offset, as `//line` directives count.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = self.text[..offset].matches('\n').count() + 1;
        let col = offset - self.line_start(offset) + 1;
        (line, col)
    }
}

/// All children of a node, including anonymous tokens and comments.
pub fn children(node: Node<'_>) -> Vec<Node<'_>> {
    (0..node.child_count()).filter_map(|i| node.child(i)).collect()
}

/// Named children of a node, including comments.
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    (0..node.named_child_count())
        .filter_map(|i| node.named_child(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_name() {
        let mut parser = GoParser::new().unwrap();
        let file = parser
            .parse("main.go", "package main\n\nfunc main() {}\n")
            .unwrap();
        assert_eq!(file.package_name(), Some("main"));
        assert_eq!(file.line_col(14), (3, 1));
    }

    #[test]
    fn test_syntax_error_location() {
        let mut parser = GoParser::new().unwrap();
        let err = parser
            .parse("broken.go", "package main\n\nfunc main() {\n")
            .err()
            .unwrap();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.to_string().starts_with("broken.go:"));
    }
}
