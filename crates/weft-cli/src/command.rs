//! Classifying the tool invocations the go command hands to `-toolexec`

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Result};

/// Compile and link flags that take a separate value argument.
const VALUE_FLAGS: &[&str] = &[
    "-D",
    "-I",
    "-L",
    "-asmhdr",
    "-buildid",
    "-buildmode",
    "-c",
    "-embedcfg",
    "-extld",
    "-extldflags",
    "-goversion",
    "-importcfg",
    "-installsuffix",
    "-lang",
    "-o",
    "-p",
    "-pgoprofile",
    "-symabis",
    "-trimpath",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Compile,
    Link,
    Other,
}

/// One tool command line, e.g. `.../pkg/tool/linux_amd64/compile -o ... a.go`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: PathBuf,
    pub args: Vec<String>,
    pub kind: ToolKind,
}

impl ToolInvocation {
    pub fn parse(argv: Vec<String>) -> Result<Self> {
        let mut argv = argv.into_iter();
        let Some(tool) = argv.next() else {
            bail!("toolexec: missing tool command");
        };
        let tool = PathBuf::from(tool);
        let kind = match tool_name(&tool).as_str() {
            "compile" => ToolKind::Compile,
            "link" => ToolKind::Link,
            _ => ToolKind::Other,
        };
        Ok(Self {
            tool,
            args: argv.collect(),
            kind,
        })
    }

    /// Value of `-name value` or `-name=value`.
    pub fn flag(&self, name: &str) -> Option<&str> {
        let mut args = self.args.iter();
        while let Some(arg) = args.next() {
            if arg == "--" {
                break;
            }
            if arg == name {
                return args.next().map(String::as_str);
            }
            if let Some(value) = arg.strip_prefix(name).and_then(|rest| rest.strip_prefix('=')) {
                return Some(value);
            }
        }
        None
    }

    pub fn package_path(&self) -> Option<&str> {
        self.flag("-p")
    }

    pub fn importcfg(&self) -> Option<PathBuf> {
        self.flag("-importcfg").map(PathBuf::from)
    }

    pub fn output(&self) -> Option<PathBuf> {
        self.flag("-o").map(PathBuf::from)
    }

    /// `-V=full`, the toolchain version query the go command uses as a cache key.
    pub fn is_version_query(&self) -> bool {
        self.args.iter().any(|a| a == "-V=full")
    }

    /// Go source files, with their position in `args`.
    pub fn source_files(&self) -> Vec<(usize, PathBuf)> {
        let mut files = Vec::new();
        let mut takes_value = false;
        let mut after_dashdash = false;
        for (index, arg) in self.args.iter().enumerate() {
            if takes_value {
                takes_value = false;
                continue;
            }
            if !after_dashdash && arg == "--" {
                after_dashdash = true;
                continue;
            }
            if !after_dashdash && arg.starts_with('-') {
                takes_value = VALUE_FLAGS.contains(&arg.as_str());
                continue;
            }
            if arg.ends_with(".go") {
                files.push((index, PathBuf::from(arg)));
            }
        }
        files
    }

    pub fn replace_arg(&mut self, index: usize, value: impl Into<String>) {
        self.args[index] = value.into();
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.tool);
        command.args(&self.args);
        command
    }

    /// The `go` binary of the toolchain this tool belongs to
    /// (`$GOROOT/pkg/tool/<os_arch>/<tool>` -> `$GOROOT/bin/go`), or `go`.
    pub fn go_binary(&self) -> PathBuf {
        self.tool
            .ancestors()
            .nth(4)
            .map(|goroot| goroot.join("bin").join(go_exe()))
            .filter(|go| go.is_file())
            .unwrap_or_else(|| PathBuf::from("go"))
    }
}

fn tool_name(tool: &Path) -> String {
    let tool = tool.to_string_lossy();
    let base = tool.rsplit(['/', '\\']).next().unwrap_or_default();
    base.strip_suffix(".exe").unwrap_or(base).to_string()
}

fn go_exe() -> &'static str {
    if cfg!(windows) {
        "go.exe"
    } else {
        "go"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn invocation(argv: &[&str]) -> ToolInvocation {
        ToolInvocation::parse(argv.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_classifies_by_tool_name() {
        assert_eq!(invocation(&["/go/pkg/tool/linux_amd64/compile"]).kind, ToolKind::Compile);
        assert_eq!(invocation(&["C:\\go\\link.exe"]).kind, ToolKind::Link);
        assert_eq!(invocation(&["/go/pkg/tool/linux_amd64/asm"]).kind, ToolKind::Other);
        assert!(ToolInvocation::parse(Vec::new()).is_err());
    }

    #[test]
    fn test_compile_flags_and_sources() {
        let inv = invocation(&[
            "compile",
            "-o",
            "/tmp/go-build1/b001/_pkg_.a",
            "-trimpath",
            "/tmp/go-build1/b001=>",
            "-p",
            "example.com/app",
            "-lang=go1.22",
            "-importcfg",
            "/tmp/go-build1/b001/importcfg",
            "-pack",
            "./main.go",
            "./handler.go",
        ]);
        assert_eq!(inv.package_path(), Some("example.com/app"));
        assert_eq!(inv.flag("-lang"), Some("go1.22"));
        assert_eq!(inv.importcfg(), Some(PathBuf::from("/tmp/go-build1/b001/importcfg")));
        assert_eq!(
            inv.source_files(),
            vec![(10, PathBuf::from("./main.go")), (11, PathBuf::from("./handler.go"))]
        );
        assert!(!inv.is_version_query());
    }

    #[test]
    fn test_flag_values_are_not_sources() {
        let inv = invocation(&["compile", "-o", "weird.go", "-V=full"]);
        assert!(inv.source_files().is_empty());
        assert!(inv.is_version_query());
    }
}
