//! Snapshot tests for the text files weft writes for the go toolchain

use insta::assert_snapshot;
use weft_registry::{LinkDeps, PackageRegister};

#[test]
fn test_snapshot_completed_link_configuration() -> Result<(), Box<dyn std::error::Error>> {
    let mut register = PackageRegister::parse(
        "# import config\nmodinfo \"x\"\npackagefile net/http=/cache/http.a\nimportmap golang.org/x/net=vendor/golang.org/x/net\n",
    )?;
    let mut added = PackageRegister::new();
    added.insert("github.com/weft-dev/weft/runtime/nethttp", "/cache/nethttp.a");
    added.insert("net/http", "/elsewhere/http.a");
    register.merge_missing(&added);

    assert_snapshot!("completed_link_configuration", register.dump());
    Ok(())
}

#[test]
fn test_snapshot_link_deps_manifest() {
    let deps: LinkDeps = [
        "github.com/weft-dev/weft/runtime/internal/boot",
        "github.com/weft-dev/weft/runtime/nethttp",
        "github.com/weft-dev/weft/runtime/internal/boot",
    ]
    .into_iter()
    .collect();

    assert_snapshot!("link_deps_manifest", deps.to_string());
}
