//! The compiled aspect catalog
//!
//! A `CatalogSpec` is plain data read from YAML. Compiling it parses every
//! advice template once; a catalog with a malformed template is rejected as
//! a whole, listing every problem. The compiled catalog is immutable and is
//! passed explicitly to whatever weaves.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};
use weft_core::{ActivationFlags, AdviceSpec, AspectSpec, CatalogSpec, JoinPoint, TypeName};
use weft_parser::GoParser;

use crate::error::{BatchErrors, TemplateError};
use crate::template::{CodeTemplate, TemplateContext};

/// Catalog shipped with the binary.
pub const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.yaml");

#[derive(Debug, Clone)]
pub enum Advice {
    WrapExpression(CodeTemplate),
    PrependStatements(CodeTemplate),
    AppendStatements(CodeTemplate),
    InjectDeclarations {
        template: CodeTemplate,
        links: Vec<String>,
    },
    AddStructField {
        name: String,
        ty: TypeName,
    },
    AssignValue(CodeTemplate),
    ReplaceCallee(CodeTemplate),
    AppendArguments {
        ty: TypeName,
        values: Vec<CodeTemplate>,
    },
}

impl Advice {
    fn compile(parser: &mut GoParser, spec: &AdviceSpec) -> Result<Self, TemplateError> {
        use TemplateContext::*;

        let advice = match spec {
            AdviceSpec::WrapExpression(t) => {
                Advice::WrapExpression(CodeTemplate::compile(parser, &t.template, &t.imports, Expression)?)
            }
            AdviceSpec::PrependStatements(t) => Advice::PrependStatements(CodeTemplate::compile(
                parser,
                &t.template,
                &t.imports,
                Statements,
            )?),
            AdviceSpec::AppendStatements(t) => Advice::AppendStatements(CodeTemplate::compile(
                parser,
                &t.template,
                &t.imports,
                Statements,
            )?),
            AdviceSpec::InjectDeclarations {
                template,
                imports,
                links,
            } => Advice::InjectDeclarations {
                template: CodeTemplate::compile(parser, template, imports, Declarations)?,
                links: links.clone(),
            },
            AdviceSpec::AddStructField { name, ty } => Advice::AddStructField {
                name: name.clone(),
                ty: ty.clone(),
            },
            AdviceSpec::AssignValue(t) => {
                Advice::AssignValue(CodeTemplate::compile(parser, &t.template, &t.imports, Expression)?)
            }
            AdviceSpec::ReplaceCallee(t) => {
                Advice::ReplaceCallee(CodeTemplate::compile(parser, &t.template, &t.imports, Expression)?)
            }
            AdviceSpec::AppendArguments { ty, values } => Advice::AppendArguments {
                ty: ty.clone(),
                values: values
                    .iter()
                    .map(|v| CodeTemplate::compile(parser, &v.template, &v.imports, Expression))
                    .collect::<Result<_, _>>()?,
            },
        };
        Ok(advice)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Advice::WrapExpression(_) => "wrap-expression",
            Advice::PrependStatements(_) => "prepend-statements",
            Advice::AppendStatements(_) => "append-statements",
            Advice::InjectDeclarations { .. } => "inject-declarations",
            Advice::AddStructField { .. } => "add-struct-field",
            Advice::AssignValue(_) => "assign-value",
            Advice::ReplaceCallee(_) => "replace-callee",
            Advice::AppendArguments { .. } => "append-arguments",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Aspect {
    pub id: String,
    pub join_point: JoinPoint,
    pub advice: Vec<Advice>,
    pub flags: BTreeMap<String, String>,
    pub internal_only: bool,
    /// Directive names the join point selects on; `directive` holes read
    /// their arguments from these.
    pub directives: Vec<String>,
    /// Import paths the advice may introduce.
    pub referenced_paths: Vec<String>,
    /// Decided from file-level context only; evaluated once per file.
    pub file_scoped: bool,
}

impl Aspect {
    fn compile(parser: &mut GoParser, spec: &AspectSpec) -> Result<Self, TemplateError> {
        let mut advice = Vec::with_capacity(spec.advice.len());
        let mut referenced_paths: Vec<String> = Vec::new();
        for a in &spec.advice {
            advice.push(Advice::compile(parser, a).map_err(|e| e.in_advice(&spec.id, a.kind()))?);
            for path in a.referenced_paths() {
                if !referenced_paths.iter().any(|p| p == path) {
                    referenced_paths.push(path.to_string());
                }
            }
        }
        if let Some(ty) = spec.advice.iter().find_map(|a| match a {
            AdviceSpec::AppendArguments { ty, .. } => ty.name.path.clone(),
            _ => None,
        }) {
            if !referenced_paths.contains(&ty) {
                referenced_paths.push(ty);
            }
        }

        Ok(Self {
            id: spec.id.clone(),
            join_point: spec.join_point.clone(),
            advice,
            flags: spec.flags.clone(),
            internal_only: spec.internal_only,
            directives: spec
                .join_point
                .directives()
                .into_iter()
                .map(str::to_string)
                .collect(),
            referenced_paths,
            file_scoped: spec.join_point.is_file_scoped(),
        })
    }

    /// Whether the aspect is switched on by `flags`.
    pub fn enabled(&self, flags: &ActivationFlags) -> bool {
        flags.satisfies(&self.flags)
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    spec: CatalogSpec,
    aspects: Vec<Aspect>,
    fingerprint: String,
}

impl Catalog {
    pub fn compile(spec: CatalogSpec) -> Result<Self, TemplateError> {
        spec.validate()?;
        let mut parser = GoParser::new()?;
        let mut errors = BatchErrors::new();
        let mut aspects = Vec::with_capacity(spec.aspects.len());

        for aspect in &spec.aspects {
            match Aspect::compile(&mut parser, aspect) {
                Ok(compiled) => aspects.push(compiled),
                Err(e) => errors.add(e),
            }
        }
        errors.into_result()?;

        let fingerprint = spec.fingerprint();
        debug!(aspects = aspects.len(), %fingerprint, "compiled catalog");
        Ok(Self {
            spec,
            aspects,
            fingerprint,
        })
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, TemplateError> {
        Self::compile(CatalogSpec::from_yaml_str(source)?)
    }

    pub fn builtin() -> Result<Self, TemplateError> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    /// Load a catalog file, or the built-in catalog when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        match path {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("reading catalog {}", path.display()))?;
                let catalog = Self::from_yaml_str(&source)
                    .with_context(|| format!("loading catalog {}", path.display()))?;
                info!(path = %path.display(), aspects = catalog.aspects.len(), "loaded catalog");
                Ok(catalog)
            }
            None => Self::builtin().context("loading built-in catalog"),
        }
    }

    pub fn aspects(&self) -> &[Aspect] {
        &self.aspects
    }

    pub fn spec(&self) -> &CatalogSpec {
        &self.spec
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_runtime_package(&self, import_path: &str) -> bool {
        self.spec.is_runtime_package(import_path)
    }

    /// Every import path any aspect may introduce.
    pub fn referenced_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .aspects
            .iter()
            .flat_map(|a| a.referenced_paths.iter().map(String::as_str))
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }
}
