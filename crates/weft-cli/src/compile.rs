//! Compile steps: weave the package, then extend its import configuration

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context as _, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use weft_codegen::WeaveError;
use weft_core::{ReferenceKind, ReferenceMap};
use weft_registry::{augment_compile, CompileAugmentation, PackageRegister, Resolver, Session};

use crate::command::ToolInvocation;
use crate::{exit_code, run_status, Context};

/// A compile invocation rewritten to use woven sources.
#[derive(Debug)]
pub struct PreparedCompile {
    pub invocation: ToolInvocation,
    pub package_path: Option<String>,
    pub references: ReferenceMap,
    pub augmentation: CompileAugmentation,
    /// How many source files were replaced by woven copies.
    pub woven: usize,
    /// Holds the woven copies until the compiler has read them.
    scratch: Option<TempDir>,
}

impl PreparedCompile {
    fn unchanged(invocation: ToolInvocation) -> Self {
        Self {
            package_path: invocation.package_path().map(String::from),
            invocation,
            references: ReferenceMap::new(),
            augmentation: CompileAugmentation::default(),
            woven: 0,
            scratch: None,
        }
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }
}

pub fn run(ctx: &Context, invocation: ToolInvocation) -> Result<i32> {
    if invocation.is_version_query() {
        return run_version_query(ctx, &invocation);
    }

    let session = ctx.session_for(invocation.output().as_deref());
    let resolver = ctx.resolver(&invocation)?;
    let prepared = prepare(ctx, invocation, &resolver)?;

    let code = run_status(prepared.invocation.command())?;
    if code != 0 {
        return Ok(code);
    }
    finish(&prepared, session.as_ref())?;
    Ok(0)
}

/// Weave every source file of the package, substitute the woven copies in
/// the command line and add the packages they import to the import
/// configuration.
pub fn prepare(
    ctx: &Context,
    mut invocation: ToolInvocation,
    resolver: &dyn Resolver,
) -> Result<PreparedCompile> {
    let sources = invocation.source_files();
    let Some(package_path) = invocation.package_path().map(String::from) else {
        return Ok(PreparedCompile::unchanged(invocation));
    };
    if sources.is_empty() {
        return Ok(PreparedCompile::unchanged(invocation));
    }

    let mut files = Vec::with_capacity(sources.len());
    for (_, path) in &sources {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {} of {}", path.display(), package_path))?;
        files.push((absolute(path), text));
    }

    let injector = ctx.injector();
    let mut outcomes = Vec::with_capacity(files.len());
    for ((index, path), outcome) in sources
        .iter()
        .zip(injector.weave_package(&files, Some(&package_path)))
    {
        match outcome {
            Ok(outcome) => outcomes.push((*index, outcome)),
            // the compiler reports the problem itself
            Err(WeaveError::Parse(e)) => {
                warn!(file = %path.display(), error = %e, "cannot parse, compiling unchanged")
            }
            Err(e) => {
                return Err(e).with_context(|| format!("weaving {}", path.display()));
            }
        }
    }

    let mut references = ReferenceMap::new();
    for (_, outcome) in &outcomes {
        references.merge(&outcome.references);
    }

    let mut scratch = None;
    let mut woven = 0;
    if outcomes.iter().any(|(_, o)| o.modified) {
        let dir = tempfile::Builder::new()
            .prefix("weft-")
            .tempdir()
            .context("creating directory for woven sources")?;
        for (index, outcome) in outcomes.iter().filter(|(_, o)| o.modified) {
            let target = woven_path(dir.path(), &outcome.path);
            let text = format!("//line {}:1\n{}", outcome.path.display(), outcome.source);
            std::fs::write(&target, text)
                .with_context(|| format!("writing woven copy of {}", outcome.path.display()))?;
            debug!(file = %outcome.path.display(), woven = %target.display(), "substituted woven source");
            invocation.replace_arg(*index, target.to_string_lossy());
            woven += 1;
        }
        scratch = Some(dir);
    }

    let augmentation = match invocation.importcfg() {
        Some(importcfg) => {
            let mut register = PackageRegister::read(&importcfg)
                .with_context(|| format!("reading import configuration {}", importcfg.display()))?;
            let augmentation = augment_compile(&references, &mut register, resolver)
                .with_context(|| format!("resolving packages woven into {}", package_path))?;
            if !augmentation.added.is_empty() {
                register.write_atomic(&importcfg).with_context(|| {
                    format!("rewriting import configuration {}", importcfg.display())
                })?;
            }
            augmentation
        }
        None => CompileAugmentation {
            link_deps: references
                .paths_of_kind(ReferenceKind::RelocationTarget)
                .collect(),
            ..Default::default()
        },
    };

    if woven > 0 {
        info!(package = %package_path, files = woven, added = augmentation.added.len(), "wove package");
    }
    Ok(PreparedCompile {
        invocation,
        package_path: Some(package_path),
        references,
        augmentation,
        woven,
        scratch,
    })
}

/// After a successful compile: embed the link-deps manifest in the archive
/// and record added packages for the link step.
pub fn finish(prepared: &PreparedCompile, session: Option<&Session>) -> Result<()> {
    let augmentation = &prepared.augmentation;

    if !augmentation.link_deps.is_empty() {
        let output = prepared
            .invocation
            .output()
            .context("compile has link-time dependencies but no -o archive")?;
        augmentation
            .link_deps
            .write_to_archive(&output)
            .with_context(|| format!("embedding link-deps manifest in {}", output.display()))?;
    }

    if !augmentation.added.is_empty() {
        let package = prepared.package_path.as_deref().unwrap_or_default();
        match session {
            Some(session) => session
                .store(package, &augmentation.added)
                .with_context(|| format!("recording packages added to {}", package))?,
            None => warn!(
                package,
                "no build session, the link step will not see packages added here"
            ),
        }
    }
    Ok(())
}

/// Answer `-V=full` with the tool's own answer, stamped with this weft
/// build and catalog so woven and plain builds never share cache entries.
pub fn run_version_query(ctx: &Context, invocation: &ToolInvocation) -> Result<i32> {
    let output = invocation
        .command()
        .stderr(Stdio::inherit())
        .output()
        .with_context(|| format!("running {}", invocation.tool.display()))?;
    if !output.status.success() {
        return Ok(exit_code(output.status));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stamp = version_stamp(ctx.catalog.fingerprint());
    let mut lines = stdout.lines();
    if let Some(first) = lines.next() {
        println!("{}", stamp_version_line(first, &stamp));
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(0)
}

pub fn version_stamp(fingerprint: &str) -> String {
    format!("weft@{}:{}", env!("CARGO_PKG_VERSION"), fingerprint)
}

/// `compile version go1.22.1` gets ` <stamp>` appended. Development
/// toolchains identify themselves by their trailing `buildID=` field alone,
/// so there the stamp joins that field.
pub fn stamp_version_line(line: &str, stamp: &str) -> String {
    match line.rsplit_once(' ') {
        Some((head, last)) if last.starts_with("buildID=") => {
            format!("{} {}+{}", head, last, stamp)
        }
        _ => format!("{} {}", line.trim_end(), stamp),
    }
}

fn woven_path(dir: &Path, original: &Path) -> PathBuf {
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source.go".to_string());
    dir.join(name)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
