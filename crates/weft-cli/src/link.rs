//! Link steps: complete the link import configuration before linking

use anyhow::{Context as _, Result};
use tracing::{debug, info, warn};
use weft_registry::{augment_link, PackageRegister, Resolver, Session};

use crate::command::ToolInvocation;
use crate::compile::run_version_query;
use crate::{run_status, Context};

pub fn run(ctx: &Context, invocation: ToolInvocation) -> Result<i32> {
    if invocation.is_version_query() {
        return run_version_query(ctx, &invocation);
    }

    let session = ctx.session_for(invocation.output().as_deref());
    let resolver = ctx.resolver(&invocation)?;
    prepare(&invocation, session.as_ref(), &resolver)?;
    run_status(invocation.command())
}

/// Merge the packages compile steps of this build recorded, then follow the
/// link-deps manifests of every archive. The link import configuration is
/// replaced only when something was added. Returns how many packages were.
pub fn prepare(
    invocation: &ToolInvocation,
    session: Option<&Session>,
    resolver: &dyn Resolver,
) -> Result<usize> {
    let Some(importcfg) = invocation.importcfg() else {
        debug!("link without -importcfg, nothing to complete");
        return Ok(0);
    };

    let recorded = match session {
        Some(session) => session
            .load()
            .with_context(|| format!("reading build session {}", session.dir().display()))?,
        None => {
            warn!("no build session, packages added by compile steps may be missing");
            Default::default()
        }
    };

    let mut register = PackageRegister::read(&importcfg)
        .with_context(|| format!("reading link configuration {}", importcfg.display()))?;
    let added = augment_link(&mut register, recorded.values(), resolver)
        .with_context(|| format!("completing link configuration {}", importcfg.display()))?;

    if added > 0 {
        register
            .write_atomic(&importcfg)
            .with_context(|| format!("rewriting link configuration {}", importcfg.display()))?;
        info!(added, config = %importcfg.display(), "completed link configuration");
    }
    Ok(added)
}
