use pretty_assertions::assert_eq;
use std::path::PathBuf;
use weft_codegen::{unweave, Catalog, DiagnosticCategory, Injector};
use weft_core::{ActivationFlags, ReferenceKind, ReferenceMap};
use weft_test_fixtures::{
    CONFIG_CATALOG, CONFIG_GO, GRPC_GO, IGNORED_GO, MAIN_GO, MAIN_HTTP_GO, PLAIN_GO, SERVER_GO,
    SPAN_GO,
};

fn wrap_mode() -> ActivationFlags {
    ActivationFlags::parse_list("http-mode=wrap").unwrap()
}

#[test]
fn test_middleware_is_registered_after_router_construction() -> Result<(), Box<dyn std::error::Error>>
{
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, wrap_mode());
    let outcome = injector.weave("server.go", SERVER_GO, Some("example.com/server"))?;

    assert!(outcome.modified);
    assert!(outcome.diagnostics.is_empty());
    assert!(outcome.source.contains(
        "r := mux.NewRouter()/*weft:begin kind=append-statements aspect=gorilla-mux*/; r.Use(__weft_wmux.Middleware())/*weft:end*/\n"
    ));
    assert!(outcome.source.contains(
        "Handler: /*weft:begin kind=wrap-expression aspect=net-http-server orig=r*/__weft_whttp.WrapHandler(r)/*weft:end*/,"
    ));
    assert!(outcome.source.contains(
        "return /*weft:begin kind=replace-callee aspect=net-http-get orig=http.Get*/__weft_whttp.Get/*weft:end*/(url)"
    ));
    assert!(outcome.source.starts_with(
        "package server/*weft:begin kind=imports aspect=weft*/; import (__weft_wmux \"github.com/weft-dev/weft/runtime/gorillamux\"; __weft_whttp \"github.com/weft-dev/weft/runtime/nethttp\")/*weft:end*/\n"
    ));

    // every original line keeps its number
    assert_eq!(outcome.source.lines().count(), SERVER_GO.lines().count());
    Ok(())
}

#[test]
fn test_span_directive_uses_context_parameter() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, ActivationFlags::new());
    let outcome = injector.weave("store.go", SPAN_GO, Some("example.com/store"))?;

    assert!(outcome.modified);
    assert!(outcome.source.contains(
        "func (s *Store) Load(ctx context.Context, key string) ([]byte, error) {/*weft:begin kind=prepend-statements aspect=span-directive*/__weft_span, ctx := __weft_wtrace.StartSpan(ctx, \"store.load\", \"Load\"); defer __weft_span.End(); /*weft:end*/\n"
    ));

    // Compact has no context.Context to hand over
    assert!(outcome.source.contains("func Compact(level int) error {\n\treturn nil\n}"));
    assert_eq!(outcome.diagnostics.len(), 1);
    let diagnostic = &outcome.diagnostics[0];
    assert_eq!(diagnostic.category, DiagnosticCategory::UnboundHole);
    assert_eq!(diagnostic.location.aspect.as_deref(), Some("span-directive"));
    assert_eq!(diagnostic.location.line, Some(19));
    Ok(())
}

#[test]
fn test_weaving_woven_output_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, wrap_mode());

    for (name, source, package) in [
        ("server.go", SERVER_GO, "example.com/server"),
        ("store.go", SPAN_GO, "example.com/store"),
        ("rpc.go", GRPC_GO, "example.com/rpc"),
        ("main.go", MAIN_GO, "main"),
        ("fetch.go", MAIN_HTTP_GO, "main"),
    ] {
        let first = injector.weave(name, source, Some(package))?;
        assert!(first.modified, "{} should be woven", name);

        let second = injector.weave(name, &first.source, Some(package))?;
        assert!(!second.modified, "{} was woven twice", name);
        assert_eq!(second.source, first.source);
        assert_eq!(second.references, first.references);
    }
    Ok(())
}

#[test]
fn test_unweave_restores_every_sample() -> Result<(), Box<dyn std::error::Error>> {
    let builtin = Catalog::builtin()?;
    let config = Catalog::from_yaml_str(CONFIG_CATALOG)?;

    let samples = [
        (&builtin, SERVER_GO, "example.com/server"),
        (&builtin, SPAN_GO, "example.com/store"),
        (&builtin, IGNORED_GO, "example.com/client"),
        (&builtin, GRPC_GO, "example.com/rpc"),
        (&builtin, MAIN_GO, "main"),
        (&builtin, MAIN_HTTP_GO, "main"),
        (&builtin, PLAIN_GO, "example.com/mathx"),
        (&config, CONFIG_GO, "example.com/config"),
    ];
    for (catalog, source, package) in samples {
        let injector = Injector::new(catalog, wrap_mode());
        let woven = injector.weave("sample.go", source, Some(package))?;
        assert_eq!(unweave(&woven.source)?, source);
    }
    Ok(())
}

#[test]
fn test_unmatched_file_is_not_rewritten() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, wrap_mode());
    let outcome = injector.weave("clamp.go", PLAIN_GO, Some("example.com/mathx"))?;

    assert!(!outcome.modified);
    assert_eq!(outcome.source, PLAIN_GO);
    assert!(outcome.references.is_empty());
    Ok(())
}

#[test]
fn test_ignored_function_is_left_alone() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, wrap_mode());
    let outcome = injector.weave("client.go", IGNORED_GO, Some("example.com/client"))?;

    assert!(outcome.modified);
    assert!(outcome
        .source
        .contains("//weft:ignore\nfunc Raw(url string) (*http.Response, error) {\n\treturn http.Get(url)\n}"));
    assert_eq!(outcome.source.matches("aspect=net-http-get").count(), 1);
    Ok(())
}

#[test]
fn test_report_mode_selects_other_aspects() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let report = Injector::new(&catalog, ActivationFlags::parse_list("http-mode=report")?);
    let outcome = report.weave("client.go", IGNORED_GO, Some("example.com/client"))?;
    assert!(!outcome.modified);
    assert_eq!(outcome.source, IGNORED_GO);
    Ok(())
}

#[test]
fn test_grpc_options_are_appended() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, ActivationFlags::new());
    let outcome = injector.weave("rpc.go", GRPC_GO, Some("example.com/rpc"))?;

    assert!(outcome.source.contains(
        "plain := grpc.NewServer(/*weft:begin kind=append-arguments aspect=grpc-server*/__weft_wgrpc.StatsHandler()/*weft:end*/)"
    ));
    assert!(outcome.source.contains(
        "spread := grpc.NewServer(/*weft:begin kind=append-arguments aspect=grpc-server orig=opts*/append(append([]__weft_grpc.ServerOption(nil), opts...), __weft_wgrpc.StatsHandler())/*weft:end*/...)"
    ));
    assert_eq!(
        outcome.references.get("google.golang.org/grpc"),
        Some(ReferenceKind::ImportStatement)
    );
    Ok(())
}

#[test]
fn test_every_advice_kind() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::from_yaml_str(CONFIG_CATALOG)?;
    let injector = Injector::new(&catalog, ActivationFlags::new());
    let outcome = injector.weave("config.go", CONFIG_GO, Some("example.com/config"))?;
    let source = &outcome.source;

    assert!(source.contains(
        "\tName string\n/*weft:begin kind=add-struct-field aspect=options-tracer*/Tracer *__weft_trace.Tracer/*weft:end*/}"
    ));
    assert!(source.contains(
        "var Verbose bool/*weft:begin kind=assign-value aspect=verbose-on*/ = true/*weft:end*/\n"
    ));
    assert!(source.contains(
        "var Retries = /*weft:begin kind=assign-value aspect=more-retries orig=3*/3 * 2/*weft:end*/\n"
    ));
    assert!(source.contains(
        "resp, err := /*weft:begin kind=wrap-expression aspect=client-do orig=c.Do(nil)*/__weft_rhttp.Report(c.Do(nil))/*weft:end*/\n"
    ));
    assert!(source.ends_with(
        "}\n/*weft:begin kind=inject-declarations aspect=config-marker*/\n//go:linkname __weft_config example.com/runtime/config.Loaded\nvar __weft_config bool\n/*weft:end*/"
    ));

    assert_eq!(
        outcome.references.get("example.com/runtime/config"),
        Some(ReferenceKind::RelocationTarget)
    );
    assert_eq!(outcome.references.get("unsafe"), Some(ReferenceKind::ImportStatement));
    assert_eq!(
        outcome.references.get("example.com/runtime/trace"),
        Some(ReferenceKind::ImportStatement)
    );
    Ok(())
}

#[test]
fn test_runtime_boot_is_enabled_inside_runtime() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, ActivationFlags::new());
    let outcome = injector.weave(
        "boot.go",
        weft_test_fixtures::BOOT_GO,
        Some(weft_test_fixtures::BOOT_IMPORT_PATH),
    )?;
    assert!(outcome.source.contains(
        "var Enabled bool/*weft:begin kind=assign-value aspect=runtime-boot-enable*/ = true/*weft:end*/"
    ));
    Ok(())
}

#[test]
fn test_package_weave_keeps_order_and_merges_commutatively() -> Result<(), Box<dyn std::error::Error>>
{
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, wrap_mode());
    let files: Vec<(PathBuf, String)> = vec![
        ("main.go".into(), MAIN_GO.to_string()),
        ("fetch.go".into(), MAIN_HTTP_GO.to_string()),
    ];
    let mut reversed = files.clone();
    reversed.reverse();

    let merge = |files: &[(PathBuf, String)]| -> Result<ReferenceMap, Box<dyn std::error::Error>> {
        let mut merged = ReferenceMap::new();
        let outcomes = injector.weave_package(files, Some("main"));
        for (outcome, (path, _)) in outcomes.into_iter().zip(files) {
            let outcome = outcome?;
            assert_eq!(&outcome.path, path);
            merged.merge(&outcome.references);
        }
        Ok(merged)
    };

    let forward = merge(&files)?;
    assert_eq!(forward, merge(&reversed)?);
    assert_eq!(
        forward.get("github.com/weft-dev/weft/runtime/internal/boot"),
        Some(ReferenceKind::RelocationTarget)
    );
    assert_eq!(
        forward.get("github.com/weft-dev/weft/runtime/nethttp"),
        Some(ReferenceKind::ImportStatement)
    );
    assert_eq!(
        forward.get("github.com/weft-dev/weft/runtime/sql"),
        Some(ReferenceKind::ImportStatement)
    );
    Ok(())
}

#[test]
fn test_router_bound_in_statement_header_is_not_followed() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, wrap_mode());
    let samples = [
        "package routes\n\nimport \"github.com/gorilla/mux\"\n\nfunc build() {\n\tif r := mux.NewRouter(); r != nil {\n\t\t_ = r\n\t}\n}\n",
        "package routes\n\nimport \"github.com/gorilla/mux\"\n\nfunc build() {\n\tswitch r := mux.NewRouter(); {\n\tdefault:\n\t\t_ = r\n\t}\n}\n",
    ];

    for source in samples {
        let outcome = injector.weave("routes.go", source, Some("example.com/routes"))?;
        assert!(!outcome.source.contains("weft:begin"), "{}", outcome.source);
        assert_eq!(outcome.diagnostics.len(), 1);
        let diagnostic = &outcome.diagnostics[0];
        assert_eq!(diagnostic.category, DiagnosticCategory::UnsupportedSite);
        assert_eq!(diagnostic.location.aspect.as_deref(), Some("gorilla-mux"));
    }

    // inside the body the router is in scope
    let nested = "package routes\n\nimport \"github.com/gorilla/mux\"\n\nfunc build() {\n\tif true {\n\t\tr := mux.NewRouter()\n\t\t_ = r\n\t}\n}\n";
    let outcome = injector.weave("routes.go", nested, Some("example.com/routes"))?;
    assert!(outcome
        .source
        .contains("r := mux.NewRouter()/*weft:begin kind=append-statements aspect=gorilla-mux*/; r.Use(__weft_wmux.Middleware())/*weft:end*/\n"));
    Ok(())
}

#[test]
fn test_marker_text_in_user_comments_is_kept() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::builtin()?;
    let injector = Injector::new(&catalog, wrap_mode());
    let source = MAIN_HTTP_GO.replacen(
        "func fetch() {",
        "/*weft:end*/\n/*weft:begin kind=x aspect=y*/\nfunc fetch() {",
        1,
    );

    let outcome = injector.weave("fetch.go", &source, Some("main"))?;
    assert!(outcome.modified);
    assert!(outcome.source.contains("/*weft:end*/\n/*weft:begin kind=x aspect=y*/\nfunc fetch() {"));
    assert_eq!(unweave(&outcome.source)?, source);
    Ok(())
}
