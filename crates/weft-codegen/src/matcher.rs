//! Join-point evaluation
//!
//! Predicates are pure: evaluating a join point never changes the context,
//! so one node can be tested against every aspect of a catalog in any order.
//! Type-based predicates fail closed when a type cannot be inferred.

use tree_sitter::Node;
use weft_core::{FunctionShape, JoinPoint, QualifiedName, Signature, TypeName};
use weft_parser::function::{enclosing_function, is_function};
use weft_parser::types::expression_list;
use weft_parser::{named_children, Decorations, FunctionInfo, ImportTable, SourceFile, TypeResolver};

/// Static context of the file being woven.
pub struct MatchContext<'a, 'f> {
    pub file: &'f SourceFile,
    pub imports: &'a ImportTable,
    pub decorations: &'a Decorations,
    pub types: &'a TypeResolver<'f>,
    /// Import path of the package being compiled, when known.
    pub package_path: Option<&'a str>,
}

impl MatchContext<'_, '_> {
    pub fn matches(&self, join_point: &JoinPoint, node: Node<'_>) -> bool {
        match join_point {
            JoinPoint::Call(name) => self.is_call_to(node, name),
            JoinPoint::MethodCall { receiver, name } => self.is_method_call(node, receiver, name),
            JoinPoint::CompositeLiteral { ty, field } => match field {
                None => self.is_literal_of(node, ty),
                Some(field) => self.is_literal_field(node, ty, field),
            },
            JoinPoint::TypeDeclaration(name) => {
                node.kind() == "type_spec"
                    && node
                        .child_by_field_name("name")
                        .map(|n| self.file.node_text(n) == name)
                        .unwrap_or(false)
            }
            JoinPoint::Function(shape) => self.is_function_like(node, shape),
            JoinPoint::Directive(name) => self.decorations.annotate(node).directive(name).is_some(),
            JoinPoint::ImportPresent(path) => self.imports.imports(path),
            JoinPoint::PackageName(name) => self.file.package_name() == Some(name.as_str()),
            JoinPoint::ImportPath(path) => self.package_path == Some(path.as_str()),
            JoinPoint::ValueDeclaration { name, ty } => self.is_value_declaration(node, name, ty),
            JoinPoint::FunctionBody(inner) => {
                let mut scope = enclosing_function(node);
                while let Some(func) = scope {
                    if self.matches(inner, func) {
                        return true;
                    }
                    scope = enclosing_function(func);
                }
                false
            }
            JoinPoint::AllOf(items) => items.iter().all(|jp| self.matches(jp, node)),
            JoinPoint::OneOf(items) => items.iter().any(|jp| self.matches(jp, node)),
            JoinPoint::Not(inner) => !self.matches(inner, node),
        }
    }

    fn is_call_to(&self, node: Node<'_>, name: &QualifiedName) -> bool {
        if node.kind() != "call_expression" {
            return false;
        }
        let Some(function) = node.child_by_field_name("function") else {
            return false;
        };

        match function.kind() {
            "identifier" => {
                // unqualified: a builtin/local function, or a function of the
                // package being compiled
                self.file.node_text(function) == name.name
                    && (name.path.is_none() || name.path.as_deref() == self.package_path)
            }
            "selector_expression" => {
                let (Some(operand), Some(field)) = (
                    function.child_by_field_name("operand"),
                    function.child_by_field_name("field"),
                ) else {
                    return false;
                };
                let Some(path) = &name.path else {
                    return false;
                };
                operand.kind() == "identifier"
                    && self.file.node_text(field) == name.name
                    && self.package_ref(operand) == Some(path.as_str())
            }
            _ => false,
        }
    }

    /// Import path when `ident` names an imported package rather than a
    /// variable shadowing it.
    fn package_ref(&self, ident: Node<'_>) -> Option<&str> {
        let path = self.imports.path_for(self.file.node_text(ident))?;
        if self.types.is_variable(ident) {
            return None;
        }
        Some(path)
    }

    fn is_method_call(&self, node: Node<'_>, receiver: &TypeName, name: &str) -> bool {
        if node.kind() != "call_expression" {
            return false;
        }
        let Some(function) = node
            .child_by_field_name("function")
            .filter(|f| f.kind() == "selector_expression")
        else {
            return false;
        };
        let (Some(operand), Some(field)) = (
            function.child_by_field_name("operand"),
            function.child_by_field_name("field"),
        ) else {
            return false;
        };
        if self.file.node_text(field) != name {
            return false;
        }
        if operand.kind() == "identifier" && self.package_ref(operand).is_some() {
            return false;
        }
        // Go auto-dereferences and auto-addresses receivers, so pointer-ness
        // is not significant here.
        self.types
            .type_of(operand)
            .map(|ty| ty.same_base(receiver))
            .unwrap_or(false)
    }

    fn is_literal_of(&self, node: Node<'_>, ty: &TypeName) -> bool {
        if ty.pointer {
            if node.kind() != "unary_expression" {
                return false;
            }
            return self.types.type_of(node).as_ref() == Some(ty);
        }
        node.kind() == "composite_literal"
            && node
                .child_by_field_name("type")
                .and_then(|t| self.types.resolve_type_expr(t))
                .as_ref()
                == Some(ty)
    }

    /// `node` is the value keyed by `field` inside a literal of type `ty`.
    fn is_literal_field(&self, node: Node<'_>, ty: &TypeName, field: &str) -> bool {
        let Some(keyed) = literal_element_parent(node) else {
            return false;
        };
        let Some((key, value)) = keyed_parts(keyed) else {
            return false;
        };
        if unwrap_literal_element(value).id() != node.id()
            || self.file.node_text(unwrap_literal_element(key)) != field
        {
            return false;
        }
        // keyed_element -> literal_value -> composite_literal
        let Some(literal) = keyed
            .parent()
            .and_then(|lv| lv.parent())
            .filter(|l| l.kind() == "composite_literal")
        else {
            return false;
        };
        let base = TypeName {
            pointer: false,
            name: ty.name.clone(),
        };
        self.is_literal_of(literal, &base)
    }

    fn is_function_like(&self, node: Node<'_>, shape: &FunctionShape) -> bool {
        if !is_function(node) {
            return false;
        }
        let Some(info) = FunctionInfo::from_node(self.types, node) else {
            return false;
        };

        if let Some(name) = &shape.name {
            if info.name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(receiver) = &shape.receiver {
            let matches = info
                .receiver
                .as_ref()
                .and_then(|r| r.ty.as_ref())
                .map(|ty| ty == receiver)
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }
        if let Some(signature) = &shape.signature {
            if !signature_matches(&info, signature) {
                return false;
            }
        }
        if let Some(ty) = &shape.has_parameter {
            if info.param_of_type(ty).is_none() {
                return false;
            }
        }
        true
    }

    fn is_value_declaration(
        &self,
        node: Node<'_>,
        name: &Option<String>,
        ty: &Option<TypeName>,
    ) -> bool {
        if !matches!(node.kind(), "var_spec" | "const_spec") {
            return false;
        }
        self.types.spec_bindings(node).iter().any(|(declared, declared_ty)| {
            name.as_ref().map(|n| n == declared).unwrap_or(true)
                && ty
                    .as_ref()
                    .map(|t| declared_ty.as_ref() == Some(t))
                    .unwrap_or(true)
        })
    }
}

fn signature_matches(info: &FunctionInfo<'_>, signature: &Signature) -> bool {
    let args: Vec<Option<&TypeName>> = signature.args.iter().map(Some).collect();
    let results: Vec<Option<&TypeName>> = signature.results.iter().map(Some).collect();
    info.param_types() == args && info.result_types() == results
}

fn literal_element_parent(node: Node<'_>) -> Option<Node<'_>> {
    let parent = node.parent()?;
    let element = if parent.kind() == "literal_element" {
        parent
    } else {
        node
    };
    element.parent().filter(|p| p.kind() == "keyed_element")
}

fn keyed_parts(keyed: Node<'_>) -> Option<(Node<'_>, Node<'_>)> {
    match (
        keyed.child_by_field_name("key"),
        keyed.child_by_field_name("value"),
    ) {
        (Some(key), Some(value)) => Some((key, value)),
        _ => {
            let kids: Vec<Node<'_>> = named_children(keyed)
                .into_iter()
                .filter(|n| n.kind() != "comment")
                .collect();
            match kids.as_slice() {
                [key, value] => Some((*key, *value)),
                _ => None,
            }
        }
    }
}

fn unwrap_literal_element(node: Node<'_>) -> Node<'_> {
    if node.kind() == "literal_element" {
        if let Some(inner) = named_children(node).into_iter().find(|n| n.kind() != "comment") {
            return inner;
        }
    }
    node
}

/// Left-hand identifier receiving `node` in an assignment or declaration.
pub fn assigned_name(file: &SourceFile, node: Node<'_>) -> Option<String> {
    let mut value = node;
    let mut parent = node.parent()?;
    while parent.kind() == "parenthesized_expression" {
        value = parent;
        parent = parent.parent()?;
    }
    let list = if parent.kind() == "expression_list" {
        let list = parent;
        parent = parent.parent()?;
        Some(list)
    } else {
        None
    };

    let (left, right) = match parent.kind() {
        "short_var_declaration" | "assignment_statement" => (
            parent.child_by_field_name("left")?,
            parent.child_by_field_name("right")?,
        ),
        "var_spec" => {
            let mut cursor = parent.walk();
            let names: Vec<Node<'_>> = parent.children_by_field_name("name", &mut cursor).collect();
            let values = expression_list(parent.child_by_field_name("value")?);
            let index = values.iter().position(|v| v.id() == value.id())?;
            return (names.len() == values.len())
                .then(|| file.node_text(names[index]).to_string());
        }
        _ => return None,
    };

    let right_items = expression_list(list.unwrap_or(right));
    let index = right_items.iter().position(|v| v.id() == value.id())?;
    let left_items = expression_list(left);
    if left_items.len() != right_items.len() {
        return None;
    }
    let target = left_items[index];
    (target.kind() == "identifier" && file.node_text(target) != "_")
        .then(|| file.node_text(target).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_parser::types::descendants_of_kind;
    use weft_parser::GoParser;

    const SOURCE: &str = r#"package server

import (
	"context"
	"net/http"

	"github.com/gorilla/mux"
)

type Config struct {
	Addr string
}

var enabled bool = false

//weft:span name:serve
func serve(ctx context.Context) error {
	r := mux.NewRouter()
	client := &http.Client{}
	client.Do(nil)
	cfg := Config{Addr: ":8080"}
	_ = cfg
	return http.ListenAndServe(cfg.Addr, r)
}

func shadow() {
	http := struct{ Get func(string) }{}
	http.Get("x")
}
"#;

    struct Fixture {
        file: SourceFile,
    }

    impl Fixture {
        fn new() -> Self {
            let mut parser = GoParser::new().unwrap();
            Self {
                file: parser.parse("server.go", SOURCE).unwrap(),
            }
        }

        fn count(&self, jp: &str, package_path: Option<&str>) -> usize {
            let jp: JoinPoint = weft_core::yaml::from_str(jp).unwrap();
            let imports = ImportTable::new(&self.file);
            let decorations = Decorations::new(&self.file);
            let types = TypeResolver::new(&self.file, &imports, package_path);
            let ctx = MatchContext {
                file: &self.file,
                imports: &imports,
                decorations: &decorations,
                types: &types,
                package_path,
            };
            let mut count = 0;
            let mut stack = vec![self.file.root()];
            while let Some(node) = stack.pop() {
                if ctx.matches(&jp, node) {
                    count += 1;
                }
                stack.extend(weft_parser::children(node));
            }
            count
        }
    }

    #[test]
    fn test_call_by_qualified_name() {
        let f = Fixture::new();
        assert_eq!(f.count("call: github.com/gorilla/mux.NewRouter", None), 1);
        assert_eq!(f.count("call: net/http.ListenAndServe", None), 1);
        // `http` is shadowed by a local variable in shadow()
        assert_eq!(f.count("call: net/http.Get", None), 0);
    }

    #[test]
    fn test_method_call_by_receiver_type() {
        let f = Fixture::new();
        let jp = "method-call:\n  receiver: \"*net/http.Client\"\n  name: Do";
        assert_eq!(f.count(jp, None), 1);
    }

    #[test]
    fn test_composite_literals() {
        let f = Fixture::new();
        assert_eq!(f.count("composite-literal:\n  type: \"*net/http.Client\"", None), 1);
        assert_eq!(
            f.count(
                "composite-literal:\n  type: example.com/server.Config\n  field: Addr",
                Some("example.com/server")
            ),
            1
        );
    }

    #[test]
    fn test_function_and_directive() {
        let f = Fixture::new();
        let jp = r#"
all-of:
  - directive: "weft:span"
  - function:
      has-parameter: context.Context
      signature:
        args: [context.Context]
        results: [error]
"#;
        assert_eq!(f.count(jp, None), 1);
        assert_eq!(f.count("function:\n  name: shadow", None), 1);
        assert!(f.count("function-body:\n  function:\n    name: serve", None) > 0);
    }

    #[test]
    fn test_file_and_value_predicates() {
        let f = Fixture::new();
        assert!(f.count("import-present: context", None) > 0);
        assert_eq!(f.count("package-name: other", None), 0);
        assert_eq!(
            f.count("value-declaration:\n  name: enabled\n  type: bool", None),
            1
        );
        assert_eq!(f.count("type-declaration: Config", None), 1);
    }

    #[test]
    fn test_assigned_name() {
        let f = Fixture::new();
        let call = descendants_of_kind(f.file.root(), "call_expression")
            .into_iter()
            .find(|c| f.file.node_text(*c) == "mux.NewRouter()")
            .unwrap();
        assert_eq!(assigned_name(&f.file, call).as_deref(), Some("r"));
    }
}
