//! `weft go ...`: run the go command with weft as its `-toolexec`

use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tracing::debug;
use weft_registry::resolver::self_toolexec;
use weft_registry::Session;

use crate::{current_exe, run_status, GlobalOptions, SESSION_ENV};

/// Subcommands that build, and so accept `-toolexec`.
const BUILDING_SUBCOMMANDS: &[&str] = &["build", "install", "run", "test", "vet"];

/// `args` with `-toolexec <toolexec>` inserted right after the subcommand,
/// when the subcommand builds anything.
pub fn go_args(args: &[String], toolexec: &str) -> Vec<String> {
    let mut out = args.to_vec();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "-C" => index += 2,
            flag if flag.starts_with('-') => index += 1,
            _ => break,
        }
    }
    if args
        .get(index)
        .is_some_and(|sub| BUILDING_SUBCOMMANDS.contains(&sub.as_str()))
    {
        out.splice(
            index + 1..index + 1,
            ["-toolexec".to_string(), toolexec.to_string()],
        );
    }
    out
}

/// Run `go <args>` under a dedicated build session, cleared afterwards.
pub fn run(options: &GlobalOptions, args: &[String]) -> Result<i32> {
    let toolexec = self_toolexec(&current_exe()?);
    let token = options.session.clone().unwrap_or_else(fresh_token);
    let session = Session::from_token(&token);

    let mut command = Command::new("go");
    command.args(go_args(args, &toolexec));
    for (key, value) in options.env() {
        command.env(key, value);
    }
    command.env(SESSION_ENV, &token);
    debug!(session = session.id(), ?command, "running go");

    let code = run_status(command);
    session.clear();
    code
}

fn fresh_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("go-{}-{}", std::process::id(), nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_toolexec_follows_subcommand() {
        assert_eq!(
            go_args(&args(&["build", "-o", "app", "./..."]), "/bin/weft toolexec"),
            args(&["build", "-toolexec", "/bin/weft toolexec", "-o", "app", "./..."])
        );
        assert_eq!(
            go_args(&args(&["-C", "sub", "test", "./..."]), "weft toolexec"),
            args(&["-C", "sub", "test", "-toolexec", "weft toolexec", "./..."])
        );
    }

    #[test]
    fn test_other_subcommands_are_untouched() {
        for sub in ["mod", "env", "version", "list"] {
            let input = args(&[sub, "tidy"]);
            assert_eq!(go_args(&input, "weft toolexec"), input);
        }
    }
}
