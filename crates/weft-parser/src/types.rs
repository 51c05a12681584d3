//! Best-effort static type inference
//!
//! There is no full type checker here. Types are read from explicit
//! annotations (parameters, results, receivers, `var x T`) and inferred from
//! initializers whose type is syntactically evident (`T{}`, `&T{}`,
//! `new(T)`, literals). Everything else resolves to `None` and type-based
//! predicates fail closed.

use std::collections::HashMap;

use tree_sitter::Node;
use weft_core::{QualifiedName, TypeName};

use crate::function::{enclosing_function, FunctionInfo};
use crate::imports::ImportTable;
use crate::source::{children, named_children, SourceFile};

const PREDECLARED: &[&str] = &[
    "any", "bool", "byte", "comparable", "complex64", "complex128", "error", "float32",
    "float64", "int", "int8", "int16", "int32", "int64", "rune", "string", "uint", "uint8",
    "uint16", "uint32", "uint64", "uintptr",
];

pub struct TypeResolver<'f> {
    file: &'f SourceFile,
    imports: &'f ImportTable,
    package_path: Option<String>,
    globals: HashMap<String, Option<TypeName>>,
}

impl<'f> TypeResolver<'f> {
    pub fn new(file: &'f SourceFile, imports: &'f ImportTable, package_path: Option<&str>) -> Self {
        let mut resolver = Self {
            file,
            imports,
            package_path: package_path.map(str::to_string),
            globals: HashMap::new(),
        };

        let mut globals = HashMap::new();
        for decl in children(file.root())
            .into_iter()
            .filter(|n| n.kind() == "var_declaration")
        {
            for spec in descendants_of_kind(decl, "var_spec") {
                for (name, ty) in resolver.spec_bindings(spec) {
                    globals.insert(name, ty);
                }
            }
        }
        resolver.globals = globals;
        resolver
    }

    pub fn file(&self) -> &'f SourceFile {
        self.file
    }

    pub fn imports(&self) -> &'f ImportTable {
        self.imports
    }

    pub fn package_path(&self) -> Option<&str> {
        self.package_path.as_deref()
    }

    /// Resolve a type expression node to a qualified type name.
    pub fn resolve_type_expr(&self, node: Node<'_>) -> Option<TypeName> {
        match node.kind() {
            "type_identifier" => {
                let name = self.file.node_text(node);
                if PREDECLARED.contains(&name) {
                    return Some(TypeName {
                        pointer: false,
                        name: QualifiedName::local(name),
                    });
                }
                Some(TypeName {
                    pointer: false,
                    name: QualifiedName {
                        path: self.package_path.clone(),
                        name: name.to_string(),
                    },
                })
            }
            "qualified_type" => {
                let package = node.child_by_field_name("package")?;
                let name = node.child_by_field_name("name")?;
                let path = self.imports.path_for(self.file.node_text(package))?;
                Some(TypeName::named(path, self.file.node_text(name)))
            }
            "pointer_type" => {
                let inner = named_children(node).into_iter().last()?;
                let resolved = self.resolve_type_expr(inner)?;
                if resolved.pointer {
                    None
                } else {
                    Some(resolved.pointer_to())
                }
            }
            "generic_type" => self.resolve_type_expr(node.child_by_field_name("type")?),
            "parenthesized_type" => self.resolve_type_expr(named_children(node).into_iter().next()?),
            _ => {
                let text: String = self
                    .file
                    .node_text(node)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                Some(TypeName {
                    pointer: false,
                    name: QualifiedName::local(text),
                })
            }
        }
    }

    /// Static type of an expression, when evident.
    pub fn type_of(&self, expr: Node<'_>) -> Option<TypeName> {
        match expr.kind() {
            "identifier" => self.lookup(self.file.node_text(expr), expr).flatten(),
            "composite_literal" => self.resolve_type_expr(expr.child_by_field_name("type")?),
            "unary_expression" => {
                let operator = expr.child_by_field_name("operator")?;
                if self.file.node_text(operator) != "&" {
                    return None;
                }
                let operand = expr.child_by_field_name("operand")?;
                if operand.kind() != "composite_literal" {
                    return None;
                }
                let ty = self.type_of(operand)?;
                (!ty.pointer).then(|| ty.pointer_to())
            }
            "call_expression" => {
                let function = expr.child_by_field_name("function")?;
                if function.kind() != "identifier" || self.file.node_text(function) != "new" {
                    return None;
                }
                let args = expr.child_by_field_name("arguments")?;
                let first = named_children(args).into_iter().find(|n| n.kind() != "comment")?;
                let ty = self.resolve_type_expr(first)?;
                (!ty.pointer).then(|| ty.pointer_to())
            }
            "type_conversion_expression" => {
                self.resolve_type_expr(expr.child_by_field_name("type")?)
            }
            "parenthesized_expression" => {
                self.type_of(named_children(expr).into_iter().find(|n| n.kind() != "comment")?)
            }
            "interpreted_string_literal" | "raw_string_literal" => Some(local("string")),
            "int_literal" => Some(local("int")),
            "float_literal" => Some(local("float64")),
            "rune_literal" => Some(local("rune")),
            "true" | "false" => Some(local("bool")),
            _ => None,
        }
    }

    /// Names declared by a `var_spec`/`const_spec` with their types.
    pub fn spec_bindings(&self, spec: Node<'_>) -> Vec<(String, Option<TypeName>)> {
        let mut cursor = spec.walk();
        let names: Vec<String> = spec
            .children_by_field_name("name", &mut cursor)
            .map(|n| self.file.node_text(n).to_string())
            .collect();

        if let Some(ty) = spec.child_by_field_name("type") {
            let resolved = self.resolve_type_expr(ty);
            return names.into_iter().map(|n| (n, resolved.clone())).collect();
        }

        let values: Vec<Node<'_>> = spec
            .child_by_field_name("value")
            .map(expression_list)
            .unwrap_or_default();
        let positional = values.len() == names.len();
        names
            .into_iter()
            .enumerate()
            .map(|(i, n)| {
                let ty = if positional {
                    self.type_of(values[i])
                } else {
                    None
                };
                (n, ty)
            })
            .collect()
    }

    /// Whether `ident` refers to a local or package-level variable rather
    /// than, for example, an imported package of the same name.
    pub fn is_variable(&self, ident: Node<'_>) -> bool {
        self.lookup(self.file.node_text(ident), ident).is_some()
    }

    /// `Some(type)` when `name` is declared at `at`; the type itself may be unknown.
    fn lookup(&self, name: &str, at: Node<'_>) -> Option<Option<TypeName>> {
        let mut scope = enclosing_function(at);
        while let Some(func) = scope {
            // A declaration in an inner scope shadows outer ones even when
            // its type is unknown.
            if let Some(declared) = self.lookup_in_function(name, func, at) {
                return Some(declared);
            }
            scope = func.parent().and_then(enclosing_function);
        }
        self.globals.get(name).cloned()
    }

    fn lookup_in_function(
        &self,
        name: &str,
        func: Node<'_>,
        at: Node<'_>,
    ) -> Option<Option<TypeName>> {
        let mut found: Option<Option<TypeName>> = None;
        if let Some(body) = func.child_by_field_name("body") {
            self.scan_declarations(body, name, at, &mut found);
        }
        if found.is_some() {
            return found;
        }

        let info = FunctionInfo::from_node(self, func)?;
        info.receiver
            .iter()
            .chain(info.params.iter())
            .chain(info.results.iter())
            .find(|p| p.name.as_deref() == Some(name))
            .map(|p| p.ty.clone())
    }

    /// Record the last declaration of `name` that ends before `at`.
    fn scan_declarations(
        &self,
        node: Node<'_>,
        name: &str,
        at: Node<'_>,
        found: &mut Option<Option<TypeName>>,
    ) {
        if node.start_byte() >= at.start_byte() {
            return;
        }
        // Declarations inside nested function literals are not visible
        // unless the lookup happens inside that literal.
        if node.kind() == "func_literal"
            && !(node.start_byte() <= at.start_byte() && at.end_byte() <= node.end_byte())
        {
            return;
        }

        if node.end_byte() <= at.start_byte() {
            match node.kind() {
                "var_spec" => {
                    for (declared, ty) in self.spec_bindings(node) {
                        if declared == name {
                            *found = Some(ty);
                        }
                    }
                }
                "short_var_declaration" => {
                    let left = node
                        .child_by_field_name("left")
                        .map(expression_list)
                        .unwrap_or_default();
                    let right = node
                        .child_by_field_name("right")
                        .map(expression_list)
                        .unwrap_or_default();
                    for (i, ident) in left.iter().enumerate() {
                        if self.file.node_text(*ident) == name {
                            let ty = if left.len() == right.len() {
                                self.type_of(right[i])
                            } else {
                                None
                            };
                            *found = Some(ty);
                        }
                    }
                }
                _ => {}
            }
        }

        for child in named_children(node) {
            self.scan_declarations(child, name, at, found);
        }
    }
}

fn local(name: &str) -> TypeName {
    TypeName {
        pointer: false,
        name: QualifiedName::local(name),
    }
}

/// Elements of an `expression_list`, or the node itself when it is a single expression.
pub fn expression_list(node: Node<'_>) -> Vec<Node<'_>> {
    if node.kind() == "expression_list" {
        named_children(node)
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .collect()
    } else {
        vec![node]
    }
}

pub fn descendants_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == kind {
            out.push(current);
            continue;
        }
        let mut kids = named_children(current);
        kids.reverse();
        stack.extend(kids);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::GoParser;

    const SOURCE: &str = r#"package app

import (
	"context"
	nethttp "net/http"
)

var defaultClient = &nethttp.Client{}

func serve(ctx context.Context, req *nethttp.Request) {
	mux := nethttp.NewServeMux()
	srv := nethttp.Server{Handler: mux}
	var name string
	use(ctx, req, srv, name, defaultClient, mux)
}
"#;

    fn find_call_args<'t>(file: &'t SourceFile) -> Vec<Node<'t>> {
        let call = descendants_of_kind(file.root(), "call_expression")
            .into_iter()
            .find(|c| {
                c.child_by_field_name("function")
                    .map(|f| file.node_text(f) == "use")
                    .unwrap_or(false)
            })
            .unwrap();
        named_children(call.child_by_field_name("arguments").unwrap())
    }

    #[test]
    fn test_infers_identifier_types() {
        let mut parser = GoParser::new().unwrap();
        let file = parser.parse("app.go", SOURCE).unwrap();
        let imports = ImportTable::new(&file);
        let resolver = TypeResolver::new(&file, &imports, Some("example.com/app"));

        let types: Vec<Option<String>> = find_call_args(&file)
            .into_iter()
            .map(|arg| resolver.type_of(arg).map(|t| t.to_string()))
            .collect();

        assert_eq!(
            types,
            vec![
                Some("context.Context".to_string()),
                Some("*net/http.Request".to_string()),
                Some("net/http.Server".to_string()),
                Some("string".to_string()),
                Some("*net/http.Client".to_string()),
                // constructor results are not inferred
                None,
            ]
        );
    }
}
