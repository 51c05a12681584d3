use pretty_assertions::assert_eq;
use std::path::Path;
use weft_core::{ReferenceKind, ReferenceMap};
use weft_registry::{
    archive, augment_compile, augment_link, LinkDeps, PackageRegister, Session,
};

const RUNTIME_HTTP: &str = "github.com/weft-dev/weft/runtime/nethttp";
const RUNTIME_BOOT: &str = "github.com/weft-dev/weft/runtime/internal/boot";

#[test]
fn test_shared_reference_gets_one_entry() -> Result<(), Box<dyn std::error::Error>> {
    let mut first = ReferenceMap::new();
    first.add(RUNTIME_HTTP, ReferenceKind::ImportStatement);
    let mut second = ReferenceMap::new();
    second.add(RUNTIME_HTTP, ReferenceKind::ImportStatement);
    second.add("net/http", ReferenceKind::ImportStatement);

    let mut merged = ReferenceMap::new();
    merged.merge(&first);
    merged.merge(&second);

    let available = PackageRegister::parse(&format!(
        "packagefile {}=/cache/nethttp.a\npackagefile net/http=/cache/http.a\n",
        RUNTIME_HTTP
    ))?;
    let mut register = PackageRegister::parse("packagefile net/http=/build/http.a\n")?;
    let augmentation = augment_compile(&merged, &mut register, &available)?;

    assert_eq!(augmentation.added.len(), 1);
    assert_eq!(
        register
            .dump()
            .lines()
            .filter(|l| l.starts_with(&format!("packagefile {}=", RUNTIME_HTTP)))
            .count(),
        1
    );
    Ok(())
}

#[test]
fn test_link_only_dependency_reaches_link_configuration() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempfile::tempdir()?;
    let session = Session::in_dir(dir.path(), "/tmp/go-build42");

    // compile step of the main package
    let main_archive = dir.path().join("main.a");
    archive::create(&main_archive)?;
    archive::write_member(&main_archive, "__.PKGDEF", b"go object\n")?;

    let mut references = ReferenceMap::new();
    references.add(RUNTIME_BOOT, ReferenceKind::RelocationTarget);
    references.add(RUNTIME_HTTP, ReferenceKind::ImportStatement);

    let boot_archive = dir.path().join("boot.a");
    let http_archive = dir.path().join("nethttp.a");
    archive::create(&boot_archive)?;
    archive::create(&http_archive)?;
    let mut available = PackageRegister::new();
    available.insert(RUNTIME_BOOT, &boot_archive);
    available.insert(RUNTIME_HTTP, &http_archive);

    let mut compile_cfg = PackageRegister::parse("packagefile fmt=/cache/fmt.a\n")?;
    let augmentation = augment_compile(&references, &mut compile_cfg, &available)?;
    assert!(!compile_cfg.contains(RUNTIME_BOOT));
    augmentation.link_deps.write_to_archive(&main_archive)?;
    session.store("main", &augmentation.added)?;

    // link step
    let mut link_cfg = PackageRegister::new();
    link_cfg.insert("main", &main_archive);
    let recorded = session.load()?;
    let added = augment_link(&mut link_cfg, recorded.values(), &available)?;

    assert_eq!(added, 2);
    assert_eq!(link_cfg.archive(RUNTIME_BOOT), Some(boot_archive.as_path()));
    assert_eq!(link_cfg.archive(RUNTIME_HTTP), Some(http_archive.as_path()));
    assert_eq!(
        LinkDeps::from_archive(&main_archive)?.map(|d| d.len()),
        Some(2)
    );
    assert_eq!(
        archive::read_member(&main_archive, "__.PKGDEF")?.as_deref(),
        Some(&b"go object\n"[..])
    );
    session.clear();
    assert!(!Path::new(session.dir()).exists());
    Ok(())
}
