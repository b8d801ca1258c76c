use lode_core::dependency::{GitReference, SourceSpec};
use lode_core::manifest::Manifest;
use std::path::{Path, PathBuf};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn test_parse_full_fixture() {
    let manifest = Manifest::from_path(&fixtures_dir().join("full.toml")).unwrap();
    assert_eq!(manifest.package.name, "web-app");
    assert_eq!(manifest.package.runtime.as_deref(), Some("3.11"));
    assert_eq!(manifest.package.description.as_deref(), Some("A web application"));
    assert!(manifest.resolver.allow_prereleases);
    assert!(manifest.resolver.prefer_prebuilt);
    assert_eq!(
        manifest.registry.as_ref().map(|r| r.url.as_str()),
        Some("https://mirror.example.com")
    );
    assert_eq!(manifest.dependencies.len(), 5);
}

#[test]
fn test_parse_minimal_fixture() {
    let manifest = Manifest::from_path(&fixtures_dir().join("minimal.toml")).unwrap();
    assert_eq!(manifest.package.name, "tiny");
    assert!(manifest.dependencies.is_empty());
    assert!(manifest.environment.is_empty());
    assert!(manifest.registry.is_none());
}

#[test]
fn test_direct_dependencies_resolve_sources() {
    let manifest = Manifest::from_path(&fixtures_dir().join("full.toml")).unwrap();
    let deps = manifest.direct_dependencies(Path::new("/work/app")).unwrap();
    let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["colorama", "http", "local-lib", "requests", "tool"]);

    let local = &deps[2];
    assert_eq!(
        local.source,
        SourceSpec::Path(PathBuf::from("/work/app/../local-lib"))
    );

    let tool = &deps[4];
    assert_eq!(
        tool.source,
        SourceSpec::Git {
            url: "https://example.com/tool.git".into(),
            reference: GitReference::Rev("v1.2.0".into()),
        }
    );

    let http = &deps[1];
    assert!(http.extras.contains("socks"));
    assert!(!deps[0].marker.is_any());
}

#[test]
fn test_missing_file_is_manifest_error() {
    let err = Manifest::from_path(&fixtures_dir().join("does-not-exist.toml")).unwrap_err();
    assert!(err.to_string().contains("Manifest error"));
}

#[test]
fn test_bad_constraint_surfaces_on_conversion() {
    let manifest = Manifest::from_str(
        "[package]\nname = \"a\"\nversion = \"1.0\"\n\n[dependencies]\nb = \">>1\"\n",
    )
    .unwrap();
    let err = manifest.direct_dependencies(Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("b"));
}

#[test]
fn test_declared_environment_overrides_host() {
    let manifest = Manifest::from_path(&fixtures_dir().join("full.toml")).unwrap();
    let env = manifest.target_environment();
    assert_eq!(env.get("os"), Some("linux"));
    assert_eq!(env.get("runtime_version"), Some("3.11"));
}
