//! Applying advice at matched nodes
//!
//! Every advice kind turns into exactly one edit (a replacement or an
//! insertion) wrapped in a marked region. Placement keeps the original text
//! on its original lines:
//! - statements are spliced inline (`{/*begin*/a(); defer b(); /*end*/`)
//! - struct fields and call arguments go right before the closing token
//! - declarations go at the end of the file
//!
//! A second weave of woven output must change nothing, so each edit first
//! checks the regions already present in the file.

use std::ops::Range;

use tracing::{debug, warn};
use tree_sitter::Node;
use weft_core::{ReferenceKind, ReferenceMap, TypeName};
use weft_parser::function::{enclosing_function, is_function};
use weft_parser::imports::default_package_name;
use weft_parser::types::expression_list;
use weft_parser::{children, named_children, FunctionInfo, MarkerAttrs, Region};

use crate::catalog::{Advice, Aspect};
use crate::edits::EditSet;
use crate::error::{Diagnostic, DiagnosticCategory, DiagnosticLocation};
use crate::imports::ImportPlan;
use crate::matcher::{assigned_name, MatchContext};
use crate::template::{Binding, CodeTemplate, Hole, Rendered, TemplateEnv};

/// Statement node kinds that can be spliced around inside a block.
const STATEMENT_KINDS: &[&str] = &[
    "expression_statement",
    "short_var_declaration",
    "assignment_statement",
    "inc_statement",
    "dec_statement",
    "send_statement",
    "var_declaration",
    "const_declaration",
    "type_declaration",
    "return_statement",
    "go_statement",
    "defer_statement",
    "if_statement",
    "for_statement",
    "expression_switch_statement",
    "type_switch_statement",
    "select_statement",
    "labeled_statement",
    "goto_statement",
    "break_statement",
    "continue_statement",
    "fallthrough_statement",
    "block",
];

const STATEMENT_CONTAINERS: &[&str] = &[
    "statement_list",
    "block",
    "expression_case",
    "default_case",
    "type_case",
    "communication_case",
];

const EXPRESSION_KINDS: &[&str] = &[
    "identifier",
    "call_expression",
    "selector_expression",
    "composite_literal",
    "unary_expression",
    "binary_expression",
    "index_expression",
    "slice_expression",
    "type_assertion_expression",
    "type_conversion_expression",
    "parenthesized_expression",
    "func_literal",
    "interpreted_string_literal",
    "raw_string_literal",
    "int_literal",
    "float_literal",
    "imaginary_literal",
    "rune_literal",
    "true",
    "false",
    "nil",
    "iota",
];

/// Expressions that never need parentheses as an operand.
const PRIMARY_KINDS: &[&str] = &[
    "identifier",
    "call_expression",
    "selector_expression",
    "composite_literal",
    "index_expression",
    "slice_expression",
    "type_assertion_expression",
    "type_conversion_expression",
    "parenthesized_expression",
    "interpreted_string_literal",
    "raw_string_literal",
    "int_literal",
    "float_literal",
    "imaginary_literal",
    "rune_literal",
    "true",
    "false",
    "nil",
    "iota",
];

/// Marker attributes of the generated import region.
pub const IMPORTS_KIND: &str = "imports";
pub const IMPORTS_ASPECT: &str = "weft";

/// Why one advice was not applied at one node.
pub(crate) enum Skip {
    /// The node already carries this advice from an earlier weave.
    AlreadyWoven,
    Reported(DiagnosticCategory, String),
}

impl Skip {
    fn unsupported(kind: &str, node: Node<'_>) -> Self {
        Skip::Reported(
            DiagnosticCategory::UnsupportedSite,
            format!("{} advice cannot apply to a {}", kind, node.kind()),
        )
    }
}

/// Per-file weaving state.
pub(crate) struct Weaver<'a, 'f> {
    pub ctx: MatchContext<'a, 'f>,
    pub regions: Vec<Region>,
    pub edits: EditSet<'f>,
    pub plan: ImportPlan,
    pub references: ReferenceMap,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'a, 'f> Weaver<'a, 'f> {
    pub fn apply_aspect(&mut self, aspect: &Aspect, node: Node<'f>) {
        for advice in &aspect.advice {
            match self.apply(aspect, advice, node) {
                Ok(()) => debug!(
                    aspect = %aspect.id,
                    kind = advice.kind(),
                    line = node.start_position().row + 1,
                    "applied advice"
                ),
                Err(Skip::AlreadyWoven) => debug!(
                    aspect = %aspect.id,
                    kind = advice.kind(),
                    "advice already present"
                ),
                Err(Skip::Reported(category, message)) => {
                    let line = node.start_position().row + 1;
                    let diagnostic = Diagnostic::new(category, message).at(DiagnosticLocation::new()
                        .in_file(self.ctx.file.path())
                        .at_line(line)
                        .in_aspect(&aspect.id));
                    warn!("{}", diagnostic);
                    self.diagnostics.push(diagnostic);
                }
            }
        }
    }

    fn apply(&mut self, aspect: &Aspect, advice: &Advice, node: Node<'f>) -> Result<(), Skip> {
        let kind = advice.kind();
        match advice {
            Advice::WrapExpression(template) => {
                if !EXPRESSION_KINDS.contains(&node.kind()) {
                    return Err(Skip::unsupported(kind, node));
                }
                self.replace(aspect, kind, template, node, node)
            }

            Advice::ReplaceCallee(template) => {
                let callee = (node.kind() == "call_expression")
                    .then(|| node.child_by_field_name("function"))
                    .flatten()
                    .ok_or_else(|| Skip::unsupported(kind, node))?;
                self.replace(aspect, kind, template, node, callee)
            }

            Advice::PrependStatements(template) => {
                let at = if is_function(node) {
                    let body = node
                        .child_by_field_name("body")
                        .ok_or_else(|| Skip::unsupported(kind, node))?;
                    body.start_byte() + 1
                } else {
                    enclosing_statement(node)
                        .ok_or_else(|| Skip::unsupported(kind, node))?
                        .start_byte()
                };
                self.check_insert(at, aspect, kind)?;
                let rendered = self.render(aspect, template, node, node)?;
                let body = format!("{}; ", rendered.text);
                self.insert(aspect, kind, at, body, rendered)
            }

            Advice::AppendStatements(template) => {
                if is_function(node) {
                    return Err(Skip::unsupported(kind, node));
                }
                if let Some(header) = header_statement(node) {
                    return Err(Skip::Reported(
                        DiagnosticCategory::UnsupportedSite,
                        format!(
                            "{} advice cannot follow a {} in the header of a {}",
                            kind,
                            header.kind(),
                            header.parent().map(|p| p.kind()).unwrap_or("statement")
                        ),
                    ));
                }
                let at = enclosing_statement(node)
                    .ok_or_else(|| Skip::unsupported(kind, node))?
                    .end_byte();
                self.check_insert(at, aspect, kind)?;
                let rendered = self.render(aspect, template, node, node)?;
                let body = format!("; {}", rendered.text);
                self.insert(aspect, kind, at, body, rendered)
            }

            Advice::InjectDeclarations { template, links } => {
                let woven = self
                    .regions
                    .iter()
                    .any(|r| r.attrs.aspect == aspect.id && r.attrs.kind == kind);
                if woven || self.edits.contains(&aspect.id, kind) {
                    return Err(Skip::AlreadyWoven);
                }
                let text = self.ctx.file.text();
                let at = text.len();
                let rendered = self.render(aspect, template, node, node)?;
                let lead = if text.ends_with('\n') { "\n" } else { "\n\n" };
                let body = format!("{}{}\n", lead, rendered.text);
                self.insert(aspect, kind, at, body, rendered)?;
                for link in links {
                    self.references.add(link.clone(), ReferenceKind::RelocationTarget);
                }
                Ok(())
            }

            Advice::AddStructField { name, ty } => self.add_struct_field(aspect, kind, node, name, ty),

            Advice::AssignValue(template) => self.assign_value(aspect, kind, template, node),

            Advice::AppendArguments { ty, values } => {
                self.append_arguments(aspect, kind, node, ty, values)
            }
        }
    }

    fn add_struct_field(
        &mut self,
        aspect: &Aspect,
        kind: &str,
        node: Node<'f>,
        name: &str,
        ty: &TypeName,
    ) -> Result<(), Skip> {
        let fields = (node.kind() == "type_spec")
            .then(|| node.child_by_field_name("type"))
            .flatten()
            .filter(|t| t.kind() == "struct_type")
            .and_then(|t| {
                named_children(t)
                    .into_iter()
                    .find(|c| c.kind() == "field_declaration_list")
            })
            .ok_or_else(|| Skip::unsupported(kind, node))?;

        let file = self.ctx.file;
        let declarations: Vec<Node<'f>> = named_children(fields)
            .into_iter()
            .filter(|c| c.kind() == "field_declaration")
            .collect();
        let exists = declarations.iter().any(|decl| {
            let mut cursor = decl.walk();
            let found = decl
                .children_by_field_name("name", &mut cursor)
                .any(|n| file.node_text(n) == name);
            found
        });
        if exists {
            return Err(Skip::AlreadyWoven);
        }

        let close = children(fields)
            .into_iter()
            .rev()
            .find(|c| c.kind() == "}")
            .ok_or_else(|| Skip::unsupported(kind, node))?;
        let at = close.start_byte();
        self.check_insert(at, aspect, kind)?;

        let same_row = declarations
            .last()
            .map(|d| d.end_position().row == close.start_position().row)
            .unwrap_or(false);
        let (type_text, imports) = self.type_expr(ty);
        let body = format!("{}{} {}", if same_row { "; " } else { "" }, name, type_text);
        self.insert(
            aspect,
            kind,
            at,
            body,
            Rendered {
                text: String::new(),
                imports,
            },
        )
    }

    fn assign_value(
        &mut self,
        aspect: &Aspect,
        kind: &str,
        template: &CodeTemplate,
        node: Node<'f>,
    ) -> Result<(), Skip> {
        if !matches!(node.kind(), "var_spec" | "const_spec") {
            return Err(Skip::unsupported(kind, node));
        }
        let mut cursor = node.walk();
        let names = node.children_by_field_name("name", &mut cursor).count();
        if names != 1 {
            return Err(Skip::Reported(
                DiagnosticCategory::UnsupportedSite,
                format!("{} advice needs a single-name declaration, found {}", kind, names),
            ));
        }

        match node.child_by_field_name("value") {
            Some(value) => {
                let target = expression_list(value).into_iter().next().unwrap_or(value);
                self.replace(aspect, kind, template, node, target)
            }
            None => {
                let ty = node
                    .child_by_field_name("type")
                    .filter(|_| node.kind() == "var_spec")
                    .ok_or_else(|| Skip::unsupported(kind, node))?;
                let at = ty.end_byte();
                self.check_insert(at, aspect, kind)?;
                let rendered = self.render(aspect, template, node, node)?;
                let body = format!(" = {}", rendered.text);
                self.insert(aspect, kind, at, body, rendered)
            }
        }
    }

    fn append_arguments(
        &mut self,
        aspect: &Aspect,
        kind: &str,
        node: Node<'f>,
        ty: &TypeName,
        values: &[CodeTemplate],
    ) -> Result<(), Skip> {
        let args = (node.kind() == "call_expression")
            .then(|| node.child_by_field_name("arguments"))
            .flatten()
            .ok_or_else(|| Skip::unsupported(kind, node))?;

        let mut rendered = Rendered::default();
        let mut texts = Vec::with_capacity(values.len());
        for value in values {
            let r = self.render(aspect, value, node, node)?;
            texts.push(r.text);
            rendered.imports.extend(r.imports);
        }
        let joined = texts.join(", ");

        let items: Vec<Node<'f>> = named_children(args)
            .into_iter()
            .filter(|c| c.kind() != "comment")
            .collect();

        // f(a, rest...) becomes f(a, append(append([]T(nil), rest...), v)...)
        if let Some(spread) = items.iter().find(|c| c.kind() == "variadic_argument") {
            let Some(rest) = named_children(*spread).into_iter().find(|c| c.kind() != "comment")
            else {
                return Err(Skip::unsupported(kind, node));
            };
            if self.overlaps_region(rest.byte_range()) {
                return Err(Skip::AlreadyWoven);
            }
            let (type_text, type_imports) = self.type_expr(ty);
            rendered.imports.extend(type_imports);
            let inner = self.edits.render_range(rest.byte_range());
            let body = format!("append(append([]{}(nil), {}...), {})", type_text, inner, joined);
            return self.commit_replace(aspect, kind, rest.byte_range(), body, rendered);
        }

        let close = children(args)
            .into_iter()
            .rev()
            .find(|c| c.kind() == ")")
            .ok_or_else(|| Skip::unsupported(kind, node))?;
        let at = close.start_byte();
        self.check_insert(at, aspect, kind)?;

        let trailing_comma = close
            .prev_sibling()
            .map(|p| p.kind() == ",")
            .unwrap_or(false);
        let body = match (items.is_empty(), trailing_comma) {
            (true, _) => joined,
            (false, true) => format!("{},", joined),
            (false, false) => format!(", {}", joined),
        };
        self.insert(aspect, kind, at, body, rendered)
    }

    /// Replace `target` with the rendered template; holes other than
    /// `expr` read from `node`.
    fn replace(
        &mut self,
        aspect: &Aspect,
        kind: &str,
        template: &CodeTemplate,
        node: Node<'f>,
        target: Node<'f>,
    ) -> Result<(), Skip> {
        if self.overlaps_region(target.byte_range()) {
            return Err(Skip::AlreadyWoven);
        }
        let rendered = self.render(aspect, template, node, target)?;
        let body = rendered.text.clone();
        self.commit_replace(aspect, kind, target.byte_range(), body, rendered)
    }

    fn commit_replace(
        &mut self,
        aspect: &Aspect,
        kind: &str,
        range: Range<usize>,
        body: String,
        rendered: Rendered,
    ) -> Result<(), Skip> {
        let attrs = MarkerAttrs::new(kind, &aspect.id);
        self.edits.replace(range, attrs, body).map_err(|c| {
            Skip::Reported(
                DiagnosticCategory::Conflict,
                format!("overlaps {} advice of aspect {}", c.with.kind, c.with.aspect),
            )
        })?;
        self.commit_imports(&rendered);
        Ok(())
    }

    fn insert(
        &mut self,
        aspect: &Aspect,
        kind: &str,
        at: usize,
        body: String,
        rendered: Rendered,
    ) -> Result<(), Skip> {
        let attrs = MarkerAttrs::new(kind, &aspect.id);
        self.edits.insert(at, attrs, body).map_err(|c| {
            Skip::Reported(
                DiagnosticCategory::Conflict,
                format!("falls inside {} advice of aspect {}", c.with.kind, c.with.aspect),
            )
        })?;
        self.commit_imports(&rendered);
        Ok(())
    }

    fn commit_imports(&mut self, rendered: &Rendered) {
        for (alias, path) in &rendered.imports {
            self.plan.add(alias, path);
            self.references.add(path.clone(), ReferenceKind::ImportStatement);
        }
    }

    fn render(
        &self,
        aspect: &Aspect,
        template: &CodeTemplate,
        node: Node<'f>,
        target: Node<'f>,
    ) -> Result<Rendered, Skip> {
        let env = NodeEnv {
            weaver: self,
            aspect,
            node,
            target,
        };
        template.render(&env).map_err(|unbound| {
            Skip::Reported(DiagnosticCategory::UnboundHole, unbound.to_string())
        })
    }

    /// Go type expression for `ty` in this file, plus the import it needs.
    fn type_expr(&self, ty: &TypeName) -> (String, Vec<(String, String)>) {
        let star = if ty.pointer { "*" } else { "" };
        match &ty.name.path {
            Some(path) if Some(path.as_str()) != self.ctx.package_path => {
                let alias = default_package_name(path);
                let local = self.plan.preview(&alias, path);
                (
                    format!("{}{}.{}", star, local, ty.name.name),
                    vec![(alias, path.clone())],
                )
            }
            _ => (format!("{}{}", star, ty.name.name), Vec::new()),
        }
    }

    fn overlaps_region(&self, range: Range<usize>) -> bool {
        self.regions.iter().any(|r| r.overlaps(&range))
    }

    /// Refuse an insertion that an earlier weave (or this one) already made.
    fn check_insert(&self, at: usize, aspect: &Aspect, kind: &str) -> Result<(), Skip> {
        if self.edits.has_insert_at(at, &aspect.id, kind) {
            return Err(Skip::AlreadyWoven);
        }
        if self
            .regions
            .iter()
            .any(|r| r.range.start < at && at < r.range.end)
        {
            return Err(Skip::AlreadyWoven);
        }
        if region_chain(&self.regions, at)
            .any(|r| r.attrs.aspect == aspect.id && r.attrs.kind == kind)
        {
            return Err(Skip::AlreadyWoven);
        }
        Ok(())
    }
}

/// Regions forming an unbroken run through offset `at`.
fn region_chain(regions: &[Region], at: usize) -> impl Iterator<Item = &Region> {
    let mut chain = Vec::new();
    let mut cursor = at;
    while let Some(r) = regions.iter().find(|r| r.range.end == cursor && !r.range.is_empty()) {
        chain.push(r);
        cursor = r.range.start;
    }
    cursor = at;
    while let Some(r) = regions.iter().find(|r| r.range.start == cursor && !r.range.is_empty()) {
        chain.push(r);
        cursor = r.range.end;
    }
    chain.into_iter()
}

/// The statement directly inside a block that contains `node`.
pub fn enclosing_statement(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = Some(node);
    while let Some(n) = current {
        let parent = n.parent()?;
        if STATEMENT_KINDS.contains(&n.kind()) && STATEMENT_CONTAINERS.contains(&parent.kind()) {
            return Some(n);
        }
        if parent.kind() == "source_file" {
            return None;
        }
        current = Some(parent);
    }
    None
}

/// Simple statement in the header of an `if`, `switch` or `for` holding
/// `node`. Names it declares are only in scope inside that statement.
pub fn header_statement(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        if STATEMENT_CONTAINERS.contains(&parent.kind()) {
            return None;
        }
        match parent.kind() {
            "if_statement" | "expression_switch_statement" | "type_switch_statement" => {
                if parent
                    .child_by_field_name("initializer")
                    .is_some_and(|init| init.id() == current.id())
                {
                    return Some(current);
                }
            }
            "for_clause" => return Some(current),
            _ => {}
        }
        current = parent;
    }
    None
}

/// Hole values at one matched node.
struct NodeEnv<'w, 'a, 'f> {
    weaver: &'w Weaver<'a, 'f>,
    aspect: &'w Aspect,
    node: Node<'f>,
    /// Node `{{ expr }}` stands for.
    target: Node<'f>,
}

impl NodeEnv<'_, '_, '_> {
    fn function(&self) -> Option<FunctionInfo<'_>> {
        let func = if is_function(self.node) {
            self.node
        } else {
            enclosing_function(self.node)?
        };
        FunctionInfo::from_node(self.weaver.ctx.types, func)
    }
}

impl TemplateEnv for NodeEnv<'_, '_, '_> {
    fn bind(&self, hole: &Hole) -> Option<Binding> {
        let referenceable = |name: Option<&String>| name.filter(|n| *n != "_").cloned();
        match hole {
            Hole::Expr => Some(Binding {
                text: self.weaver.edits.render_range(self.target.byte_range()),
                primary: PRIMARY_KINDS.contains(&self.target.kind()),
            }),
            Hole::Receiver => {
                let info = self.function()?;
                referenceable(info.receiver.as_ref()?.name.as_ref()).map(Binding::identifier)
            }
            Hole::FuncName => self.function()?.name.map(Binding::identifier),
            Hole::Param(n) => {
                let info = self.function()?;
                referenceable(info.params.get(*n)?.name.as_ref()).map(Binding::identifier)
            }
            Hole::ParamOfType(ty) => {
                let info = self.function()?;
                let (_, param) = info.param_of_type(ty)?;
                referenceable(param.name.as_ref()).map(Binding::identifier)
            }
            Hole::ResultOfType(ty) => {
                let info = self.function()?;
                let (_, result) = info.result_of_type(ty)?;
                referenceable(result.name.as_ref()).map(Binding::identifier)
            }
            Hole::Directive { key, default } => {
                let annotated = self.weaver.ctx.decorations.annotate(self.node);
                let value = annotated
                    .directives()
                    .filter(|d| {
                        self.aspect.directives.is_empty()
                            || self.aspect.directives.iter().any(|name| *name == d.name)
                    })
                    .last()
                    .and_then(|d| d.arg(key).map(str::to_string));
                value.or_else(|| default.clone()).map(|text| Binding {
                    text,
                    primary: false,
                })
            }
            Hole::Assigned => {
                assigned_name(self.weaver.ctx.file, self.node).map(Binding::identifier)
            }
            Hole::PackageName => self
                .weaver
                .ctx
                .file
                .package_name()
                .map(Binding::identifier),
            Hole::ImportPath => self.weaver.ctx.package_path.map(|p| Binding {
                text: p.to_string(),
                primary: false,
            }),
        }
    }

    fn package_name(&self, alias: &str, path: &str) -> String {
        self.weaver.plan.preview(alias, path)
    }
}
