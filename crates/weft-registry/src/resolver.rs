//! Locating package archives for import paths introduced by weaving

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::importcfg::PackageRegister;

/// Environment variable carrying the in-progress resolution stack into
/// nested build processes.
pub const RESOLVING_ENV: &str = "WEFT_RESOLVING";

/// Import paths that never have an archive of their own.
const PSEUDO_PACKAGES: &[&str] = &["unsafe", "C"];

/// Finds the archives of packages and of everything they depend on.
pub trait Resolver {
    /// Returns a register covering every path in `paths` and its transitive
    /// dependencies.
    fn resolve(&self, paths: &[String]) -> Result<PackageRegister>;
}

/// A register resolves exactly the packages it lists.
impl Resolver for PackageRegister {
    fn resolve(&self, paths: &[String]) -> Result<PackageRegister> {
        let mut out = PackageRegister::new();
        for path in paths {
            let archive = self.archive(path).ok_or_else(|| RegistryError::Unresolved {
                import_path: path.clone(),
                reason: "not in the package register".to_string(),
            })?;
            out.insert(path.clone(), archive);
        }
        Ok(out)
    }
}

/// Import paths currently being resolved by this process or its ancestors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionStack {
    paths: Vec<String>,
}

impl ResolutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack inherited from the parent process.
    pub fn from_env() -> Self {
        std::env::var(RESOLVING_ENV)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        Self {
            paths: value
                .split([',', '\n'])
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.paths.iter().any(|p| p == import_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The stack with `paths` on top. Refuses paths already on the stack.
    pub fn push(&self, paths: &[String]) -> Result<Self> {
        let mut next = self.clone();
        for path in paths {
            if next.contains(path) {
                return Err(RegistryError::CycleDetected {
                    import_path: path.clone(),
                    stack: self.to_env_value(),
                });
            }
            next.paths.push(path.clone());
        }
        Ok(next)
    }

    pub fn to_env_value(&self) -> String {
        self.paths.join(",")
    }
}

/// Resolver backed by `go list -json -deps -export`.
#[derive(Debug, Clone)]
pub struct GoListResolver {
    go: PathBuf,
    toolexec: Option<String>,
    stack: ResolutionStack,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GoListPackage {
    import_path: String,
    #[serde(default)]
    export: Option<String>,
    #[serde(default)]
    error: Option<GoListError>,
}

#[derive(Debug, Deserialize)]
struct GoListError {
    #[serde(rename = "Err")]
    err: String,
}

/// Parsed `go list` output: the archives found, and the requested paths
/// (with a reason) that have none.
#[derive(Debug, Default)]
pub struct ListedPackages {
    pub register: PackageRegister,
    pub missing: Vec<(String, String)>,
}

impl GoListResolver {
    pub fn new(stack: ResolutionStack) -> Self {
        Self {
            go: PathBuf::from("go"),
            toolexec: None,
            stack,
        }
    }

    pub fn with_go(mut self, go: impl Into<PathBuf>) -> Self {
        self.go = go.into();
        self
    }

    /// Nested builds run through this `-toolexec` command, so resolved
    /// packages are woven like the rest of the build.
    pub fn with_toolexec(mut self, toolexec: impl Into<String>) -> Self {
        self.toolexec = Some(toolexec.into());
        self
    }

    pub fn stack(&self) -> &ResolutionStack {
        &self.stack
    }

    fn go_command(&self, subcommand: &str, stack: &ResolutionStack) -> Command {
        let mut command = Command::new(&self.go);
        command.arg(subcommand);
        if let Some(toolexec) = &self.toolexec {
            command.arg("-toolexec").arg(toolexec);
        }
        command.env(RESOLVING_ENV, stack.to_env_value());
        command
    }

    fn run(&self, mut command: Command) -> Result<String> {
        let rendered = format!("{:?}", command);
        debug!(command = %rendered, "running");
        let output = command.output().map_err(|e| RegistryError::Command {
            command: rendered.clone(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(RegistryError::Command {
                command: rendered,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn list(&self, paths: &[String], stack: &ResolutionStack) -> Result<ListedPackages> {
        let mut command = self.go_command("list", stack);
        command.args(["-e", "-json", "-deps", "-export", "--"]).args(paths);
        let stdout = self.run(command)?;
        parse_go_list(&stdout, paths)
    }

    fn build(&self, paths: &[String], stack: &ResolutionStack) -> Result<()> {
        let mut command = self.go_command("build", stack);
        command.arg("--").args(paths);
        self.run(command).map(|_| ())
    }
}

impl Resolver for GoListResolver {
    fn resolve(&self, paths: &[String]) -> Result<PackageRegister> {
        let requested: Vec<String> = paths
            .iter()
            .filter(|p| !PSEUDO_PACKAGES.contains(&p.as_str()))
            .cloned()
            .collect();
        if requested.is_empty() {
            return Ok(PackageRegister::new());
        }
        let stack = self.stack.push(&requested)?;

        let listed = self.list(&requested, &stack)?;
        if listed.missing.is_empty() {
            info!(packages = requested.len(), archives = listed.register.len(), "resolved archives");
            return Ok(listed.register);
        }

        // export data missing or stale: build once, then ask again
        let stale: Vec<String> = listed.missing.iter().map(|(p, _)| p.clone()).collect();
        warn!(packages = ?stale, "export data missing, rebuilding once");
        self.build(&stale, &stack)?;

        let listed = self.list(&requested, &stack)?;
        if let Some((import_path, reason)) = listed.missing.into_iter().next() {
            return Err(RegistryError::Unresolved {
                import_path,
                reason: format!("{} (after one rebuild)", reason),
            });
        }
        info!(packages = requested.len(), archives = listed.register.len(), "resolved archives after rebuild");
        Ok(listed.register)
    }
}

/// Parse the concatenated JSON objects printed by `go list -json`.
pub fn parse_go_list(output: &str, requested: &[String]) -> Result<ListedPackages> {
    let mut listed = ListedPackages::default();
    let mut errors = Vec::new();

    for package in serde_json::Deserializer::from_str(output).into_iter::<GoListPackage>() {
        let package = package?;
        match (package.export.filter(|e| !e.is_empty()), package.error) {
            (Some(export), None) => {
                listed.register.insert(package.import_path, PathBuf::from(export));
            }
            (_, Some(error)) => errors.push((package.import_path, error.err)),
            (None, None) => errors.push((package.import_path, "no export data".to_string())),
        }
    }

    let wanted: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
    for path in &wanted {
        if listed.register.contains(path) {
            continue;
        }
        let reason = errors
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| "not listed by go list".to_string());
        listed.missing.push((path.to_string(), reason));
    }
    Ok(listed)
}

/// `-toolexec` value running `exe toolexec`, quoted the way the go command
/// splits it.
pub fn self_toolexec(exe: &Path) -> String {
    let exe = exe.display().to_string();
    if exe.contains(char::is_whitespace) {
        format!("'{}' toolexec", exe)
    } else {
        format!("{} toolexec", exe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use weft_test_fixtures::{go_list_output, go_list_package};

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_go_list_collects_exports() {
        let output = go_list_output(&[
            go_list_package("unsafe", None, &[]),
            go_list_package("context", Some("/cache/context.a"), &[]),
            go_list_package(
                "github.com/weft-dev/weft/runtime/trace",
                Some("/cache/trace.a"),
                &["context"],
            ),
        ]);
        let listed =
            parse_go_list(&output, &paths(&["github.com/weft-dev/weft/runtime/trace"])).unwrap();
        assert!(listed.missing.is_empty());
        assert_eq!(listed.register.len(), 2);
        assert_eq!(
            listed.register.archive("context"),
            Some(Path::new("/cache/context.a"))
        );
    }

    #[test]
    fn test_parse_go_list_reports_missing_export() {
        let output = go_list_output(&[go_list_package("example.com/stale", None, &[])]);
        let listed = parse_go_list(&output, &paths(&["example.com/stale", "example.com/absent"]))
            .unwrap();
        assert_eq!(
            listed.missing,
            vec![
                ("example.com/absent".to_string(), "not listed by go list".to_string()),
                ("example.com/stale".to_string(), "no export data".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_go_list_rejects_garbage() {
        assert!(matches!(
            parse_go_list("{\"ImportPath\": ", &[]),
            Err(RegistryError::Json(_))
        ));
    }

    #[test]
    fn test_stack_refuses_reentry() {
        let stack = ResolutionStack::parse("example.com/a,\nexample.com/b");
        assert!(stack.contains("example.com/b"));

        let pushed = stack.push(&paths(&["example.com/c"])).unwrap();
        assert_eq!(pushed.to_env_value(), "example.com/a,example.com/b,example.com/c");

        let err = pushed.push(&paths(&["example.com/a"])).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::CycleDetected { ref import_path, .. } if import_path == "example.com/a"
        ));
    }

    #[test]
    fn test_register_as_resolver() {
        let register = PackageRegister::parse("packagefile a=/a.a\npackagefile b=/b.a\n").unwrap();
        let resolved = register.resolve(&paths(&["b"])).unwrap();
        assert_eq!(resolved.dump(), "packagefile b=/b.a\n");
        assert!(matches!(
            register.resolve(&paths(&["c"])),
            Err(RegistryError::Unresolved { .. })
        ));
    }

    #[test]
    fn test_toolexec_value_quotes_spaces() {
        assert_eq!(self_toolexec(Path::new("/usr/bin/weft")), "/usr/bin/weft toolexec");
        assert_eq!(
            self_toolexec(Path::new("/opt/my tools/weft")),
            "'/opt/my tools/weft' toolexec"
        );
    }

    #[test]
    fn test_pseudo_packages_need_no_lookup() {
        let resolver = GoListResolver::new(ResolutionStack::new()).with_go("/nonexistent/go");
        assert!(resolver.resolve(&paths(&["unsafe"])).unwrap().is_empty());
    }
}
