//! Library interface for the weft toolchain proxy
//!
//! `weft toolexec <tool> <args>` is what `go build -toolexec` runs in place of
//! every toolchain command. Compiles get their sources woven and their import
//! configuration extended, links get the link-time dependencies of every
//! archive, and everything else runs untouched.

pub mod command;
pub mod compile;
pub mod gowrap;
pub mod link;
pub mod review;

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{Context as _, Result};
use tracing::debug;
use weft_codegen::{Catalog, Injector};
use weft_core::ActivationFlags;
use weft_registry::{GoListResolver, ResolutionStack, Session};

pub use command::{ToolInvocation, ToolKind};

/// Environment variables the `go` wrapper hands down to `toolexec` processes.
pub const LOG_ENV: &str = "WEFT_LOG";
pub const LOG_FORMAT_ENV: &str = "WEFT_LOG_FORMAT";
pub const CATALOG_ENV: &str = "WEFT_CATALOG";
pub const FLAGS_ENV: &str = "WEFT_FLAGS";
pub const SESSION_ENV: &str = "WEFT_SESSION";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

/// Options every subcommand accepts. The `go` wrapper passes them on to the
/// `toolexec` processes it spawns through the environment.
#[derive(Debug, Clone, clap::Args)]
pub struct GlobalOptions {
    /// Log filter, e.g. `info` or `weft_codegen=debug`
    #[arg(long, env = "WEFT_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    /// Log line format on stderr
    #[arg(long, env = "WEFT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Aspect catalog (YAML) replacing the built-in one
    #[arg(long, env = "WEFT_CATALOG", global = true)]
    pub catalog: Option<PathBuf>,

    /// Activation flag `key=value`; repeat or separate with commas
    #[arg(
        long = "flag",
        env = "WEFT_FLAGS",
        value_delimiter = ',',
        default_value = "http-mode=wrap",
        global = true
    )]
    pub flags: Vec<String>,

    /// Build session token shared by the compile and link steps of one build
    #[arg(long, env = "WEFT_SESSION", global = true)]
    pub session: Option<String>,
}

impl GlobalOptions {
    pub fn context(&self) -> Result<Context> {
        Context::load(self.catalog.as_deref(), &self.flags, self.session.clone())
    }

    /// The options as environment variables.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            (LOG_ENV, self.log_level.clone()),
            (LOG_FORMAT_ENV, self.log_format.as_str().to_string()),
            (FLAGS_ENV, self.flags.join(",")),
        ];
        if let Some(catalog) = &self.catalog {
            env.push((CATALOG_ENV, catalog.display().to_string()));
        }
        if let Some(session) = &self.session {
            env.push((SESSION_ENV, session.clone()));
        }
        env
    }
}

/// Everything one weft process works with, loaded once at start-up.
#[derive(Debug)]
pub struct Context {
    pub catalog: Catalog,
    pub flags: ActivationFlags,
    /// Explicit build session token.
    pub session: Option<String>,
    /// Import paths being resolved by parent processes.
    pub stack: ResolutionStack,
}

impl Context {
    pub fn new(catalog: Catalog, flags: ActivationFlags) -> Self {
        Self {
            catalog,
            flags,
            session: None,
            stack: ResolutionStack::new(),
        }
    }

    pub fn load(
        catalog: Option<&Path>,
        flags: &[String],
        session: Option<String>,
    ) -> Result<Self> {
        let catalog = Catalog::load(catalog)?;
        let flags = ActivationFlags::parse(flags.iter().map(String::as_str))
            .context("parsing activation flags")?;
        debug!(aspects = catalog.aspects().len(), fingerprint = catalog.fingerprint(), "loaded configuration");
        Ok(Self {
            catalog,
            flags,
            session,
            stack: ResolutionStack::from_env(),
        })
    }

    pub fn injector(&self) -> Injector<'_> {
        Injector::new(&self.catalog, self.flags.clone())
            .with_resolving(self.stack.iter().map(String::from))
    }

    /// Session of the build a tool writing `output` belongs to.
    pub fn session_for(&self, output: Option<&Path>) -> Option<Session> {
        match &self.session {
            Some(token) => Some(Session::from_token(token)),
            None => output.and_then(Session::from_output),
        }
    }

    /// Resolver running nested go commands of the toolchain `invocation`
    /// belongs to, themselves proxied through this executable.
    pub fn resolver(&self, invocation: &ToolInvocation) -> Result<GoListResolver> {
        let exe = current_exe()?;
        Ok(GoListResolver::new(self.stack.clone())
            .with_go(invocation.go_binary())
            .with_toolexec(weft_registry::resolver::self_toolexec(&exe)))
    }
}

pub(crate) fn current_exe() -> Result<PathBuf> {
    std::env::current_exe().context("locating the weft executable")
}

/// Run a command to completion and return its exit code.
pub(crate) fn run_status(mut command: Command) -> Result<i32> {
    let status: ExitStatus = command
        .status()
        .with_context(|| format!("running {:?}", command.get_program()))?;
    Ok(exit_code(status))
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Dispatch one `-toolexec` invocation. Returns the exit code to leave with.
pub fn toolexec(ctx: &Context, argv: Vec<String>) -> Result<i32> {
    let invocation = ToolInvocation::parse(argv)?;
    debug!(tool = %invocation.tool.display(), kind = ?invocation.kind, "toolexec");

    match invocation.kind {
        ToolKind::Compile => compile::run(ctx, invocation),
        ToolKind::Link => link::run(ctx, invocation),
        ToolKind::Other => run_status(invocation.command()),
    }
}
