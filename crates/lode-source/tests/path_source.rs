use lode_core::config::NetworkConfig;
use lode_core::constraint::VersionConstraint;
use lode_core::dependency::{Dependency, SourceSpec};
use lode_core::package::{PackageName, SourceLocator};
use lode_source::download::Downloader;
use lode_source::set::SourceSet;
use std::path::Path;

fn write_manifest(dir: &Path, body: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("Lode.toml"), body).unwrap();
}

#[tokio::test]
async fn test_path_dependencies_register_transitively() {
    let tmp = tempfile::tempdir().unwrap();
    let outer = tmp.path().join("outer");
    let inner = tmp.path().join("inner");
    write_manifest(
        &outer,
        "[package]\nname = \"outer\"\nversion = \"0.2.0\"\n\n[dependencies]\ninner = { path = \"../inner\" }\n",
    );
    write_manifest(&inner, "[package]\nname = \"inner\"\nversion = \"0.1.0\"\n");

    // The registry is never contacted for path packages.
    let set = SourceSet::new(
        "http://127.0.0.1:9",
        Downloader::new(NetworkConfig::default()).unwrap(),
        tmp.path().join("cache"),
    );
    let outer_name = PackageName::new("outer").unwrap();
    set.register(
        &Dependency::new(outer_name.clone(), VersionConstraint::any())
            .with_source(SourceSpec::Path(outer.clone())),
    );

    let versions = set.versions(&outer_name).await.unwrap();
    assert_eq!(versions.len(), 1);
    let candidate = set.metadata(&outer_name, &versions[0].version).await.unwrap();
    assert!(matches!(candidate.source, SourceLocator::Path { .. }));

    let inner_name = PackageName::new("inner").unwrap();
    let inner_versions = set.versions(&inner_name).await.unwrap();
    assert_eq!(inner_versions[0].version.to_string(), "0.1.0");

    let artifact = set
        .artifact(
            &outer_name,
            &candidate.version,
            &candidate.source,
            &candidate.hash,
        )
        .await
        .unwrap();
    assert_eq!(artifact.hash, candidate.hash);
}
