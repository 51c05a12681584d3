//! Function, method and function-literal signatures

use tree_sitter::Node;
use weft_core::TypeName;

use crate::source::named_children;
use crate::types::TypeResolver;

const FUNCTION_KINDS: &[&str] = &["function_declaration", "method_declaration", "func_literal"];

/// One parameter, result or receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    /// Type as written, without the `...` of a variadic parameter.
    pub type_text: String,
    pub ty: Option<TypeName>,
    pub variadic: bool,
}

impl Param {
    /// Usable as an expression in generated code.
    pub fn is_referenceable(&self) -> bool {
        matches!(self.name.as_deref(), Some(name) if name != "_")
    }
}

#[derive(Debug, Clone)]
pub struct FunctionInfo<'t> {
    pub node: Node<'t>,
    /// `None` for function literals.
    pub name: Option<String>,
    pub receiver: Option<Param>,
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    pub body: Option<Node<'t>>,
}

impl<'t> FunctionInfo<'t> {
    pub fn from_node(resolver: &TypeResolver<'_>, node: Node<'t>) -> Option<Self> {
        if !is_function(node) {
            return None;
        }
        let file = resolver.file();

        let name = match node.kind() {
            "func_literal" => None,
            _ => node
                .child_by_field_name("name")
                .map(|n| file.node_text(n).to_string()),
        };

        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|list| read_params(resolver, list).into_iter().next());

        let params = node
            .child_by_field_name("parameters")
            .map(|list| read_params(resolver, list))
            .unwrap_or_default();

        let results = match node.child_by_field_name("result") {
            Some(list) if list.kind() == "parameter_list" => read_params(resolver, list),
            Some(ty) => vec![Param {
                name: None,
                type_text: file.node_text(ty).to_string(),
                ty: resolver.resolve_type_expr(ty),
                variadic: false,
            }],
            None => Vec::new(),
        };

        Some(Self {
            node,
            name,
            receiver,
            params,
            results,
            body: node.child_by_field_name("body"),
        })
    }

    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
    }

    /// First parameter with the given static type.
    pub fn param_of_type(&self, ty: &TypeName) -> Option<(usize, &Param)> {
        self.params
            .iter()
            .enumerate()
            .find(|(_, p)| !p.variadic && p.ty.as_ref() == Some(ty))
    }

    /// First named result with the given static type.
    pub fn result_of_type(&self, ty: &TypeName) -> Option<(usize, &Param)> {
        self.results
            .iter()
            .enumerate()
            .find(|(_, p)| p.ty.as_ref() == Some(ty))
    }

    pub fn param_types(&self) -> Vec<Option<&TypeName>> {
        self.params.iter().map(|p| p.ty.as_ref()).collect()
    }

    pub fn result_types(&self) -> Vec<Option<&TypeName>> {
        self.results.iter().map(|p| p.ty.as_ref()).collect()
    }
}

pub fn is_function(node: Node<'_>) -> bool {
    FUNCTION_KINDS.contains(&node.kind())
}

/// Innermost function, method or function literal strictly enclosing `node`.
pub fn enclosing_function(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node.parent();
    while let Some(n) = current {
        if is_function(n) {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

fn read_params(resolver: &TypeResolver<'_>, list: Node<'_>) -> Vec<Param> {
    let file = resolver.file();
    let mut params = Vec::new();

    for decl in named_children(list) {
        let variadic = match decl.kind() {
            "parameter_declaration" => false,
            "variadic_parameter_declaration" => true,
            _ => continue,
        };
        let Some(ty_node) = decl.child_by_field_name("type") else {
            continue;
        };
        let type_text = file.node_text(ty_node).to_string();
        let ty = resolver.resolve_type_expr(ty_node);

        let mut cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut cursor)
            .map(|n| file.node_text(n).to_string())
            .collect();

        if names.is_empty() {
            params.push(Param {
                name: None,
                type_text,
                ty,
                variadic,
            });
            continue;
        }
        for name in names {
            params.push(Param {
                name: Some(name),
                type_text: type_text.clone(),
                ty: ty.clone(),
                variadic,
            });
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::ImportTable;
    use crate::source::GoParser;
    use crate::types::descendants_of_kind;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"package store

import "context"

type Store struct{}

func (s *Store) Get(ctx context.Context, keys ...string) (value []byte, err error) {
	run := func(int, string) error { return nil }
	_ = run
	return nil, nil
}
"#;

    #[test]
    fn test_method_signature() {
        let mut parser = GoParser::new().unwrap();
        let file = parser.parse("store.go", SOURCE).unwrap();
        let imports = ImportTable::new(&file);
        let resolver = TypeResolver::new(&file, &imports, Some("example.com/store"));

        let method = descendants_of_kind(file.root(), "method_declaration")[0];
        let info = FunctionInfo::from_node(&resolver, method).unwrap();

        assert_eq!(info.name.as_deref(), Some("Get"));
        assert!(info.is_method());
        assert_eq!(
            info.receiver.as_ref().and_then(|r| r.ty.clone()),
            Some(TypeName::named("example.com/store", "Store").pointer_to())
        );
        assert_eq!(info.params.len(), 2);
        assert!(info.params[1].variadic);
        assert_eq!(info.params[1].type_text, "string");

        let ctx: TypeName = "context.Context".parse().unwrap();
        let (index, param) = info.param_of_type(&ctx).unwrap();
        assert_eq!(index, 0);
        assert_eq!(param.name.as_deref(), Some("ctx"));

        let error: TypeName = "error".parse().unwrap();
        assert_eq!(info.result_of_type(&error).unwrap().1.name.as_deref(), Some("err"));
    }

    #[test]
    fn test_function_literal_unnamed_params() {
        let mut parser = GoParser::new().unwrap();
        let file = parser.parse("store.go", SOURCE).unwrap();
        let imports = ImportTable::new(&file);
        let resolver = TypeResolver::new(&file, &imports, None);

        let literal = descendants_of_kind(file.root(), "func_literal")[0];
        let info = FunctionInfo::from_node(&resolver, literal).unwrap();
        assert_eq!(info.name, None);
        assert_eq!(info.params.len(), 2);
        assert!(info.params.iter().all(|p| !p.is_referenceable()));
        assert_eq!(info.results.len(), 1);
        assert_eq!(
            enclosing_function(literal).map(|n| n.kind()),
            Some("method_declaration")
        );
    }
}
