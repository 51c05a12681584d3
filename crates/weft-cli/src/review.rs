//! `weft weave` and `weft unweave`: inspect what weaving does to one file

use std::path::Path;

use anyhow::{Context as _, Result};
use weft_codegen::{unweave, WeaveOutcome};

use crate::Context;

/// Weave `path` as a file of package `package_path`.
pub fn weave_file(ctx: &Context, path: &Path, package_path: Option<&str>) -> Result<WeaveOutcome> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    ctx.injector()
        .weave(path, &text, package_path)
        .with_context(|| format!("weaving {}", path.display()))
}

/// `path` with every generated region removed.
pub fn unweave_file(path: &Path) -> Result<String> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    unweave(&text).with_context(|| format!("unweaving {}", path.display()))
}
