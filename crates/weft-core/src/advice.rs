//! Advice: the structural edits applied at matched join points

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::TypeName;

/// Code template source plus the imports it structurally requires.
///
/// Keys of `imports` are the aliases the template text uses to refer to a
/// package; the weaver substitutes the file-local name it actually imports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub template: String,
    #[serde(default)]
    pub imports: BTreeMap<String, String>,
}

impl TemplateSpec {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            imports: BTreeMap::new(),
        }
    }

    pub fn with_import(mut self, alias: impl Into<String>, path: impl Into<String>) -> Self {
        self.imports.insert(alias.into(), path.into());
        self
    }
}

/// One mutation performed at a matched node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdviceSpec {
    /// Replace the matched expression; `{{ expr }}` embeds the original.
    WrapExpression(TemplateSpec),

    /// Insert statements before the match (at body start for functions).
    PrependStatements(TemplateSpec),

    /// Insert statements after the statement enclosing the match.
    AppendStatements(TemplateSpec),

    /// Add top-level declarations once per file. `links` lists import paths
    /// the declarations reach through linker relocations only.
    InjectDeclarations {
        template: String,
        #[serde(default)]
        imports: BTreeMap<String, String>,
        #[serde(default)]
        links: Vec<String>,
    },

    /// Append a field to the matched struct type declaration.
    AddStructField {
        name: String,
        #[serde(rename = "type")]
        ty: TypeName,
    },

    /// Replace (or supply) the initializer of the matched value declaration.
    AssignValue(TemplateSpec),

    /// Replace the target of the matched call with a same-signature function.
    ReplaceCallee(TemplateSpec),

    /// Append arguments of the given type to the matched call.
    AppendArguments {
        #[serde(rename = "type")]
        ty: TypeName,
        values: Vec<TemplateSpec>,
    },
}

impl AdviceSpec {
    /// Stable kind name, used in generated region markers.
    pub fn kind(&self) -> &'static str {
        match self {
            AdviceSpec::WrapExpression(_) => "wrap-expression",
            AdviceSpec::PrependStatements(_) => "prepend-statements",
            AdviceSpec::AppendStatements(_) => "append-statements",
            AdviceSpec::InjectDeclarations { .. } => "inject-declarations",
            AdviceSpec::AddStructField { .. } => "add-struct-field",
            AdviceSpec::AssignValue(_) => "assign-value",
            AdviceSpec::ReplaceCallee(_) => "replace-callee",
            AdviceSpec::AppendArguments { .. } => "append-arguments",
        }
    }

    /// Every import path this advice may introduce, including link-only ones.
    pub fn referenced_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        match self {
            AdviceSpec::WrapExpression(t)
            | AdviceSpec::PrependStatements(t)
            | AdviceSpec::AppendStatements(t)
            | AdviceSpec::AssignValue(t)
            | AdviceSpec::ReplaceCallee(t) => paths.extend(t.imports.values().map(String::as_str)),
            AdviceSpec::InjectDeclarations { imports, links, .. } => {
                paths.extend(imports.values().map(String::as_str));
                paths.extend(links.iter().map(String::as_str));
            }
            AdviceSpec::AddStructField { ty, .. } => {
                if let Some(path) = &ty.name.path {
                    paths.push(path);
                }
            }
            AdviceSpec::AppendArguments { values, .. } => {
                for value in values {
                    paths.extend(value.imports.values().map(String::as_str));
                }
            }
        }
        paths
    }
}
