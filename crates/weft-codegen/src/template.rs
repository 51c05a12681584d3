//! Structural code templates
//!
//! A template is Go source with holes:
//!
//! ```text
//! __weft_span, {{ param-of-type "context.Context" }} := wtrace.Start({{ param-of-type "context.Context" }}, "{{ func-name }}")
//! ```
//!
//! Templates are parsed once, when the catalog is compiled. Each hole is
//! replaced by a placeholder identifier and the result is parsed in a wrapper
//! matching where the template will be spliced (an expression, a statement
//! list or top-level declarations). The syntax tree tells us where every
//! placeholder sits, so substituting a hole never depends on textual
//! accidents: a binary expression substituted into an operand position is
//! parenthesized, a value substituted into a string literal is escaped.
//! Identifiers naming one of the template's import aliases become alias
//! leaves, rendered with whatever name the woven file imports the package as.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tree_sitter::Node;
use weft_core::TypeName;
use weft_parser::GoParser;

use crate::error::TemplateError;

const HOLE_OPEN: &str = "{{";
const HOLE_CLOSE: &str = "}}";
const PLACEHOLDER_PREFIX: &str = "__weft_hole_";

/// Where the rendered template is spliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateContext {
    Expression,
    Statements,
    Declarations,
}

impl TemplateContext {
    fn name(self) -> &'static str {
        match self {
            TemplateContext::Expression => "an expression",
            TemplateContext::Statements => "statements",
            TemplateContext::Declarations => "declarations",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            TemplateContext::Expression => "package p\n\nvar _ = ",
            TemplateContext::Statements => "package p\n\nfunc _() {\n",
            TemplateContext::Declarations => "package p\n\n",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            TemplateContext::Statements => "\n}\n",
            _ => "\n",
        }
    }
}

/// A value a hole can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hole {
    /// The matched node, including edits already applied inside it.
    Expr,
    /// Receiver name of the enclosing method.
    Receiver,
    /// Name of the enclosing function.
    FuncName,
    /// Name of the N-th parameter of the enclosing function.
    Param(usize),
    ParamOfType(TypeName),
    ResultOfType(TypeName),
    /// Argument of the directive that selected the node.
    Directive {
        key: String,
        default: Option<String>,
    },
    /// Identifier the matched expression is assigned to.
    Assigned,
    PackageName,
    ImportPath,
}

impl Hole {
    fn parse(source: &str) -> Result<Self, TemplateError> {
        let words = split_words(source).ok_or_else(|| TemplateError::UnknownHole(source.into()))?;
        let unknown = || TemplateError::UnknownHole(source.to_string());
        let words: Vec<&str> = words.iter().map(String::as_str).collect();

        let hole = match words.as_slice() {
            ["expr"] => Hole::Expr,
            ["receiver"] => Hole::Receiver,
            ["func-name"] => Hole::FuncName,
            ["param", n] => Hole::Param(n.parse().map_err(|_| unknown())?),
            ["param-of-type", ty] => Hole::ParamOfType(ty.parse().map_err(|_| unknown())?),
            ["result-of-type", ty] => Hole::ResultOfType(ty.parse().map_err(|_| unknown())?),
            ["directive", key] => Hole::Directive {
                key: key.to_string(),
                default: None,
            },
            ["directive", key, default] => Hole::Directive {
                key: key.to_string(),
                default: Some(default.to_string()),
            },
            ["assigned"] => Hole::Assigned,
            ["package-name"] => Hole::PackageName,
            ["import-path"] => Hole::ImportPath,
            _ => return Err(unknown()),
        };
        Ok(hole)
    }
}

/// Whitespace split keeping double-quoted words (quotes removed) together.
fn split_words(s: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut chars = s.trim().chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut word = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => word.push(chars.next()?),
                    '"' => {
                        closed = true;
                        break;
                    }
                    c => word.push(c),
                }
            }
            if !closed {
                return None;
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }
        words.push(word);
    }
    Some(words)
}

/// How a substituted value must be adjusted for its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Operand of a selector, call, index or operator: non-primary
    /// expressions are parenthesized.
    Operand,
    Free,
    /// Inside an interpreted string literal: the value is escaped.
    InString,
}

/// Value bound to a hole at one matched node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub text: String,
    /// Primary expressions never need parentheses.
    pub primary: bool,
}

impl Binding {
    pub fn identifier(name: impl Into<String>) -> Self {
        Self {
            text: name.into(),
            primary: true,
        }
    }
}

/// Supplies hole values and package names while rendering.
pub trait TemplateEnv {
    fn bind(&self, hole: &Hole) -> Option<Binding>;

    /// Name the woven file uses for the package imported under `alias`.
    fn package_name(&self, alias: &str, path: &str) -> String;
}

/// A hole with no value at the node being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnboundHole(pub String);

impl fmt::Display for UnboundHole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{ {} }}}} has no value here", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Hole {
        hole: Hole,
        source: String,
        placement: Placement,
    },
    Alias(String),
}

/// Output of one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Imports the rendered text relies on: (alias, path) pairs, blank
    /// imports included.
    pub imports: Vec<(String, String)>,
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTemplate {
    source: String,
    context: TemplateContext,
    segments: Vec<Segment>,
    imports: BTreeMap<String, String>,
}

impl CodeTemplate {
    pub fn compile(
        parser: &mut GoParser,
        source: &str,
        imports: &BTreeMap<String, String>,
        context: TemplateContext,
    ) -> Result<Self, TemplateError> {
        let source = source.trim();
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (alias, path) in imports.iter().filter(|(alias, _)| *alias != "_") {
            if let Some(first) = seen.insert(path, alias) {
                return Err(TemplateError::DuplicateImport {
                    path: path.clone(),
                    first: first.to_string(),
                    second: alias.clone(),
                });
            }
        }
        let (substituted, holes) = extract_holes(source)?;

        let prefix = context.prefix();
        let wrapped = format!("{}{}{}", prefix, substituted, context.suffix());
        let base = prefix.len();
        let tree = parser
            .parse_fragment(&wrapped)
            .ok_or(TemplateError::Syntax {
                context: context.name(),
                line: 1,
                column: 1,
            })?;
        let root = tree.root_node();
        if let Some(bad) = first_error(root) {
            let pos = bad.start_position();
            return Err(TemplateError::Syntax {
                context: context.name(),
                // rows counted from the start of the template text
                line: (pos.row + 1).saturating_sub(prefix.matches('\n').count()),
                column: pos.column + 1,
            });
        }

        // (start, end, segment) in `substituted` coordinates
        let mut spans: Vec<(usize, usize, Segment)> = Vec::new();
        for (index, (hole, hole_source)) in holes.into_iter().enumerate() {
            let placeholder = format!("{}{}", PLACEHOLDER_PREFIX, index);
            let mut search = 0;
            let start = loop {
                let found = substituted[search..]
                    .find(&placeholder)
                    .map(|i| search + i)
                    .ok_or_else(|| TemplateError::UnknownHole(hole_source.clone()))?;
                // `__weft_hole_1` must not match inside `__weft_hole_10`
                let next = substituted.as_bytes().get(found + placeholder.len());
                if next.map(|b| b.is_ascii_digit()).unwrap_or(false) {
                    search = found + placeholder.len();
                    continue;
                }
                break found;
            };
            let end = start + placeholder.len();
            let placement = placement_of(&wrapped, root, base + start, base + end)
                .map_err(|_| TemplateError::HoleInRawString(hole_source.clone()))?;
            spans.push((
                start,
                end,
                Segment::Hole {
                    hole,
                    source: hole_source,
                    placement,
                },
            ));
        }

        let mut used = BTreeSet::new();
        for (start, end) in alias_leaves(&wrapped, root, imports) {
            if start < base || end > base + substituted.len() {
                continue;
            }
            let alias = wrapped[start..end].to_string();
            used.insert(alias.clone());
            spans.push((start - base, end - base, Segment::Alias(alias)));
        }

        for (alias, path) in imports {
            if alias != "_" && !used.contains(alias) {
                return Err(TemplateError::UnusedImport {
                    alias: alias.clone(),
                    path: path.clone(),
                });
            }
        }

        spans.sort_by_key(|(start, _, _)| *start);
        let mut segments = Vec::new();
        let mut cursor = 0;
        for (start, end, segment) in spans {
            if start > cursor {
                segments.push(Segment::Text(substituted[cursor..start].to_string()));
            }
            segments.push(segment);
            cursor = end;
        }
        if cursor < substituted.len() {
            segments.push(Segment::Text(substituted[cursor..].to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            context,
            segments,
            imports: imports.clone(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn context(&self) -> TemplateContext {
        self.context
    }

    pub fn imports(&self) -> &BTreeMap<String, String> {
        &self.imports
    }

    pub fn render(&self, env: &dyn TemplateEnv) -> Result<Rendered, UnboundHole> {
        let mut text = String::with_capacity(self.source.len());
        let mut imports: Vec<(String, String)> = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Alias(alias) => {
                    // compile() only emits aliases that are keys of `imports`
                    let Some(path) = self.imports.get(alias) else {
                        continue;
                    };
                    text.push_str(&env.package_name(alias, path));
                    if !imports.iter().any(|(a, _)| a == alias) {
                        imports.push((alias.clone(), path.clone()));
                    }
                }
                Segment::Hole {
                    hole,
                    source,
                    placement,
                } => {
                    let binding = env.bind(hole).ok_or_else(|| UnboundHole(source.clone()))?;
                    match placement {
                        Placement::InString => text.push_str(&go_escape(&binding.text)),
                        Placement::Operand if !binding.primary => {
                            text.push('(');
                            text.push_str(&binding.text);
                            text.push(')');
                        }
                        _ => text.push_str(&binding.text),
                    }
                }
            }
        }

        if let Some(path) = self.imports.get("_") {
            imports.push(("_".to_string(), path.clone()));
        }
        Ok(Rendered { text, imports })
    }
}

/// Replace `{{ ... }}` holes with numbered placeholders.
fn extract_holes(source: &str) -> Result<(String, Vec<(Hole, String)>), TemplateError> {
    let mut out = String::with_capacity(source.len());
    let mut holes = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(open) = rest.find(HOLE_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + HOLE_OPEN.len()..];
        let close = after
            .find(HOLE_CLOSE)
            .ok_or(TemplateError::UnterminatedHole(offset + open))?;
        let hole_source = after[..close].trim().to_string();
        let hole = Hole::parse(&hole_source)?;
        out.push_str(&format!("{}{}", PLACEHOLDER_PREFIX, holes.len()));
        holes.push((hole, hole_source));

        let consumed = open + HOLE_OPEN.len() + close + HOLE_CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok((out, holes))
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    weft_parser::children(node)
        .into_iter()
        .find_map(first_error)
        .or(Some(node))
}

/// Parent kinds whose operand slot binds tighter than any binary operator.
const OPERAND_PARENTS: &[(&str, &str)] = &[
    ("selector_expression", "operand"),
    ("call_expression", "function"),
    ("index_expression", "operand"),
    ("slice_expression", "operand"),
    ("type_assertion_expression", "operand"),
];

/// Classify a placeholder; `Err` for positions that cannot take a value.
fn placement_of(text: &str, root: Node<'_>, start: usize, end: usize) -> Result<Placement, ()> {
    let Some(node) = root.descendant_for_byte_range(start, end) else {
        return Ok(Placement::Free);
    };

    let mut current = Some(node);
    while let Some(n) = current {
        match n.kind() {
            "interpreted_string_literal" => return Ok(Placement::InString),
            "raw_string_literal" => return Err(()),
            "comment" => return Ok(Placement::Free),
            _ => {}
        }
        current = n.parent();
    }

    // Placeholder glued to other characters (`x__weft_hole_0`) is plain text.
    if node.byte_range() != (start..end) || !text[start..end].starts_with(PLACEHOLDER_PREFIX) {
        return Ok(Placement::Free);
    }

    let Some(parent) = node.parent() else {
        return Ok(Placement::Free);
    };
    match parent.kind() {
        "unary_expression" | "binary_expression" => Ok(Placement::Operand),
        kind => {
            let is_operand = OPERAND_PARENTS.iter().any(|(k, field)| {
                *k == kind
                    && parent
                        .child_by_field_name(field)
                        .map(|c| c.id() == node.id())
                        .unwrap_or(false)
            });
            Ok(if is_operand {
                Placement::Operand
            } else {
                Placement::Free
            })
        }
    }
}

/// Byte ranges of identifiers that refer to a template import alias.
fn alias_leaves(
    text: &str,
    root: Node<'_>,
    imports: &BTreeMap<String, String>,
) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let package = match node.kind() {
            "selector_expression" => node
                .child_by_field_name("operand")
                .filter(|n| n.kind() == "identifier"),
            "qualified_type" => node.child_by_field_name("package"),
            _ => None,
        };
        if let Some(p) = package {
            if imports.contains_key(&text[p.byte_range()]) {
                out.push((p.start_byte(), p.end_byte()));
            }
        }
        stack.extend(weft_parser::named_children(node));
    }
    out
}

/// Escape text for use inside a Go interpreted string literal.
pub fn go_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Env;

    impl TemplateEnv for Env {
        fn bind(&self, hole: &Hole) -> Option<Binding> {
            match hole {
                Hole::Expr => Some(Binding {
                    text: "a + b".to_string(),
                    primary: false,
                }),
                Hole::FuncName => Some(Binding::identifier("Handle\"Quoted\"")),
                Hole::ParamOfType(ty) if ty.to_string() == "context.Context" => {
                    Some(Binding::identifier("ctx"))
                }
                _ => None,
            }
        }

        fn package_name(&self, alias: &str, _path: &str) -> String {
            format!("__weft_{}", alias)
        }
    }

    fn compile(
        source: &str,
        imports: &[(&str, &str)],
        context: TemplateContext,
    ) -> Result<CodeTemplate, TemplateError> {
        let mut parser = GoParser::new()?;
        let imports = imports
            .iter()
            .map(|(a, p)| (a.to_string(), p.to_string()))
            .collect();
        CodeTemplate::compile(&mut parser, source, &imports, context)
    }

    #[test]
    fn test_operand_holes_are_parenthesized() {
        let t = compile(
            "{{ expr }}.String() + {{ expr }}",
            &[],
            TemplateContext::Expression,
        )
        .unwrap();
        assert_eq!(t.render(&Env).unwrap().text, "(a + b).String() + (a + b)");

        let t = compile("wrap({{ expr }})", &[], TemplateContext::Expression).unwrap();
        assert_eq!(t.render(&Env).unwrap().text, "wrap(a + b)");
    }

    #[test]
    fn test_string_holes_are_escaped() {
        let t = compile(
            r#"trace.Start({{ param-of-type "context.Context" }}, "{{ func-name }}")"#,
            &[("trace", "example.com/runtime/trace")],
            TemplateContext::Expression,
        )
        .unwrap();
        let rendered = t.render(&Env).unwrap();
        assert_eq!(
            rendered.text,
            r#"__weft_trace.Start(ctx, "Handle\"Quoted\"")"#
        );
        assert_eq!(
            rendered.imports,
            vec![("trace".to_string(), "example.com/runtime/trace".to_string())]
        );
    }

    #[test]
    fn test_statement_template_with_type_alias() {
        let t = compile(
            "var __weft_opts []grpc.ServerOption\n_ = __weft_opts",
            &[("grpc", "google.golang.org/grpc")],
            TemplateContext::Statements,
        )
        .unwrap();
        assert_eq!(
            t.render(&Env).unwrap().text,
            "var __weft_opts []__weft_grpc.ServerOption\n_ = __weft_opts"
        );
    }

    #[test]
    fn test_unbound_hole() {
        let t = compile("f({{ receiver }})", &[], TemplateContext::Expression).unwrap();
        assert_eq!(t.render(&Env), Err(UnboundHole("receiver".to_string())));
    }

    #[test]
    fn test_load_time_errors() {
        assert!(matches!(
            compile("f({{ nope }})", &[], TemplateContext::Expression),
            Err(TemplateError::UnknownHole(_))
        ));
        assert!(matches!(
            compile("f({{ expr )", &[], TemplateContext::Expression),
            Err(TemplateError::UnterminatedHole(2))
        ));
        assert!(matches!(
            compile("f(", &[], TemplateContext::Expression),
            Err(TemplateError::Syntax { .. })
        ));
        assert!(matches!(
            compile("f()", &[("unused", "example.com/unused")], TemplateContext::Expression),
            Err(TemplateError::UnusedImport { .. })
        ));
        assert!(matches!(
            compile("f(`{{ expr }}`)", &[], TemplateContext::Expression),
            Err(TemplateError::HoleInRawString(_))
        ));
        assert!(matches!(
            compile(
                "a.F(b.G())",
                &[("a", "example.com/x"), ("b", "example.com/x")],
                TemplateContext::Expression
            ),
            Err(TemplateError::DuplicateImport { .. })
        ));
    }

    #[test]
    fn test_blank_import_is_always_reported() {
        let t = compile(
            "//go:linkname __weft_enabled example.com/runtime.enabled\nvar __weft_enabled bool",
            &[("_", "unsafe")],
            TemplateContext::Declarations,
        )
        .unwrap();
        let rendered = t.render(&Env).unwrap();
        assert_eq!(rendered.imports, vec![("_".to_string(), "unsafe".to_string())]);
    }

    #[test]
    fn test_hole_parsing() {
        assert_eq!(
            Hole::parse(r#"directive "name" "fallback value""#).unwrap(),
            Hole::Directive {
                key: "name".to_string(),
                default: Some("fallback value".to_string()),
            }
        );
        assert_eq!(Hole::parse("param 2").unwrap(), Hole::Param(2));
        assert!(Hole::parse("param two").is_err());
    }
}
