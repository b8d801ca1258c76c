use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use lode_core::constraint::VersionConstraint;
use lode_core::dependency::Dependency;
use lode_core::marker::{EnvironmentMarker, TargetEnvironment};
use lode_core::package::{ContentHash, PackageCandidate, PackageName, SourceLocator, VersionEntry};
use lode_core::version::Version;
use lode_resolver::graph::GraphNode;
use lode_resolver::provider::DependencyProvider;
use lode_resolver::resolver::{resolve, Resolution};
use lode_resolver::solver::{RootPackage, SolverOptions};
use lode_util::errors::{LodeError, LodeResult};

fn n(s: &str) -> PackageName {
    PackageName::new(s).unwrap()
}

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

fn dep(name: &str, constraint: &str) -> Dependency {
    Dependency::new(n(name), VersionConstraint::parse(constraint).unwrap())
}

/// An in-memory package index.
#[derive(Default)]
struct Index {
    packages: BTreeMap<PackageName, BTreeMap<Version, PackageCandidate>>,
    metadata_calls: AtomicUsize,
}

impl Index {
    fn candidate(name: &str, version: &str, deps: Vec<Dependency>) -> PackageCandidate {
        PackageCandidate {
            name: n(name),
            version: v(version),
            dependencies: deps,
            extras: BTreeMap::new(),
            source: SourceLocator::Registry {
                url: "https://index.example".into(),
            },
            hash: ContentHash::sha256(format!("{name}-{version}").as_bytes()),
            prebuilt: false,
        }
    }

    fn add(&mut self, name: &str, version: &str, deps: &[(&str, &str)]) -> &mut Self {
        let deps = deps.iter().map(|(d, c)| dep(d, c)).collect();
        self.insert(Self::candidate(name, version, deps))
    }

    fn insert(&mut self, candidate: PackageCandidate) -> &mut Self {
        self.packages
            .entry(candidate.name.clone())
            .or_default()
            .insert(candidate.version.clone(), candidate);
        self
    }
}

#[async_trait]
impl DependencyProvider for Index {
    async fn available_versions(&self, name: &PackageName) -> LodeResult<Arc<Vec<VersionEntry>>> {
        let versions = self.packages.get(name).ok_or_else(|| LodeError::NotFound {
            package: name.to_string(),
            version: None,
        })?;
        Ok(Arc::new(
            versions
                .values()
                .map(|c| VersionEntry {
                    version: c.version.clone(),
                    prebuilt: c.prebuilt,
                })
                .collect(),
        ))
    }

    async fn candidate(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> LodeResult<Arc<PackageCandidate>> {
        self.metadata_calls.fetch_add(1, Ordering::Relaxed);
        self.packages
            .get(name)
            .and_then(|versions| versions.get(version))
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| LodeError::NotFound {
                package: name.to_string(),
                version: Some(version.to_string()),
            })
    }
}

fn root(deps: Vec<Dependency>) -> RootPackage {
    RootPackage {
        name: n("app"),
        version: v("0.1.0"),
        dependencies: deps,
    }
}

fn linux() -> SolverOptions {
    SolverOptions {
        environment: TargetEnvironment::new().with("os", "linux"),
        ..SolverOptions::default()
    }
}

async fn solve(index: &Index, deps: Vec<Dependency>, options: &SolverOptions) -> Resolution {
    resolve(&root(deps), index, options).await.unwrap()
}

async fn report(index: &Index, deps: Vec<Dependency>) -> String {
    match resolve(&root(deps), index, &linux()).await {
        Err(LodeError::Unsatisfiable { report }) => report,
        other => panic!("expected a conflict, got {other:?}"),
    }
}

fn chosen(resolution: &Resolution, name: &str) -> Option<String> {
    resolution
        .graph
        .get(&n(name))
        .map(|node| node.version.to_string())
}

#[tokio::test]
async fn test_resolves_transitive_chain() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[("b", "^1.0")])
        .add("b", "1.0.0", &[])
        .add("b", "1.4.2", &[("c", ">=0.3")])
        .add("b", "2.0.0", &[])
        .add("c", "0.3.0", &[])
        .add("c", "0.4.0", &[]);

    let resolution = solve(&index, vec![dep("a", "*")], &linux()).await;
    assert_eq!(chosen(&resolution, "a").as_deref(), Some("1.0.0"));
    assert_eq!(chosen(&resolution, "b").as_deref(), Some("1.4.2"));
    assert_eq!(chosen(&resolution, "c").as_deref(), Some("0.4.0"));
    assert_eq!(resolution.graph.len(), 3);
}

#[tokio::test]
async fn test_every_edge_is_satisfied() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[("shared", ">=1.0, <3.0")])
        .add("b", "1.0.0", &[("shared", "^2.0")])
        .add("shared", "1.0.0", &[])
        .add("shared", "2.1.0", &[])
        .add("shared", "3.0.0", &[]);

    let resolution = solve(&index, vec![dep("a", "*"), dep("b", "*")], &linux()).await;
    assert_eq!(chosen(&resolution, "shared").as_deref(), Some("2.1.0"));
    for (_, target, edge) in resolution.graph.edges() {
        assert!(
            edge.constraint.allows(target.version()),
            "{} does not satisfy {}",
            target,
            edge.constraint
        );
    }
}

#[tokio::test]
async fn test_resolution_is_deterministic() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[("c", "*"), ("d", "<2")])
        .add("b", "1.0.0", &[("c", "^1"), ("d", "*")])
        .add("c", "1.0.0", &[])
        .add("c", "1.2.0", &[("d", ">=1.1")])
        .add("d", "1.0.0", &[])
        .add("d", "1.1.0", &[])
        .add("d", "2.0.0", &[]);
    let deps = vec![dep("b", "*"), dep("a", "*")];

    let first = solve(&index, deps.clone(), &linux()).await;
    let second = solve(&index, deps, &linux()).await;
    let render = |r: &Resolution| r.graph.to_lock("sha256:00").to_toml_string().unwrap();
    assert_eq!(render(&first), render(&second));
}

#[tokio::test]
async fn test_conflicting_direct_dependencies() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[("x", ">=2.0")])
        .add("b", "1.0.0", &[("x", "<2.0")])
        .add("x", "1.0.0", &[])
        .add("x", "2.0.0", &[]);

    let report = report(&index, vec![dep("a", "*"), dep("b", "*")]).await;
    assert!(report.contains("a (1.0.0) depends on x (>=2.0)"), "{report}");
    assert!(report.contains("b (1.0.0) depends on x (<2.0)"), "{report}");
    assert!(report.trim_end().ends_with("version solving failed."), "{report}");
}

#[tokio::test]
async fn test_backtracks_to_older_version() {
    let mut index = Index::default();
    index
        .add("foo", "1.0.0", &[])
        .add("foo", "2.0.0", &[("bar", "^1.0.0")])
        .add("bar", "1.0.0", &[("foo", "^1.0.0")]);

    let resolution = solve(&index, vec![dep("foo", ">=1.0.0")], &linux()).await;
    assert_eq!(chosen(&resolution, "foo").as_deref(), Some("1.0.0"));
    assert_eq!(chosen(&resolution, "bar"), None);
    assert!(resolution.attempted_solutions >= 2);
}

#[tokio::test]
async fn test_backtracks_across_packages() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[("x", "^1")])
        .add("a", "2.0.0", &[("x", "^2")])
        .add("b", "1.0.0", &[("x", "^1")])
        .add("x", "1.0.0", &[])
        .add("x", "2.0.0", &[]);

    let resolution = solve(&index, vec![dep("a", "*"), dep("b", "*")], &linux()).await;
    assert_eq!(chosen(&resolution, "a").as_deref(), Some("1.0.0"));
    assert_eq!(chosen(&resolution, "x").as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn test_missing_package_is_explained() {
    let index = Index::default();
    let report = report(&index, vec![dep("ghost", "^1")]).await;
    assert!(report.contains("ghost doesn't exist"), "{report}");
}

#[tokio::test]
async fn test_avoids_version_with_missing_dependency() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[])
        .add("a", "2.0.0", &[("ghost", "*")]);

    let resolution = solve(&index, vec![dep("a", "*")], &linux()).await;
    assert_eq!(chosen(&resolution, "a").as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn test_no_matching_versions_is_explained() {
    let mut index = Index::default();
    index.add("a", "1.0.0", &[]);
    let report = report(&index, vec![dep("a", ">=5")]).await;
    assert!(report.contains("no versions of a match >=5"), "{report}");
}

#[tokio::test]
async fn test_locked_versions_are_preferred() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[])
        .add("a", "1.1.0", &[])
        .add("a", "1.2.0", &[]);

    let mut options = linux();
    options.locked.insert(n("a"), v("1.1.0"));
    let locked = solve(&index, vec![dep("a", "^1")], &options).await;
    assert_eq!(chosen(&locked, "a").as_deref(), Some("1.1.0"));

    // A lock that no longer satisfies the manifest is ignored.
    let moved = solve(&index, vec![dep("a", ">=1.2")], &options).await;
    assert_eq!(chosen(&moved, "a").as_deref(), Some("1.2.0"));

    options.use_latest.insert(n("a"));
    let latest = solve(&index, vec![dep("a", "^1")], &options).await;
    assert_eq!(chosen(&latest, "a").as_deref(), Some("1.2.0"));
}

#[tokio::test]
async fn test_prerelease_policy() {
    let mut index = Index::default();
    index.add("a", "1.0.0", &[]).add("a", "2.0.0-beta.1", &[]);

    let stable = solve(&index, vec![dep("a", "*")], &linux()).await;
    assert_eq!(chosen(&stable, "a").as_deref(), Some("1.0.0"));

    let named = solve(&index, vec![dep("a", ">=2.0.0-beta.1")], &linux()).await;
    assert_eq!(chosen(&named, "a").as_deref(), Some("2.0.0-beta.1"));

    let mut options = linux();
    options.allow_prereleases = true;
    let allowed = solve(&index, vec![dep("a", "*")], &options).await;
    assert_eq!(chosen(&allowed, "a").as_deref(), Some("2.0.0-beta.1"));

    let mut only_pre = Index::default();
    only_pre.add("b", "0.1.0-alpha", &[]);
    let fallback = solve(&only_pre, vec![dep("b", "*")], &linux()).await;
    assert_eq!(chosen(&fallback, "b").as_deref(), Some("0.1.0-alpha"));
}

#[tokio::test]
async fn test_prefer_prebuilt() {
    let mut index = Index::default();
    let mut prebuilt = Index::candidate("a", "1.0.0", vec![]);
    prebuilt.prebuilt = true;
    index.insert(prebuilt).add("a", "1.1.0", &[]);

    let newest = solve(&index, vec![dep("a", "*")], &linux()).await;
    assert_eq!(chosen(&newest, "a").as_deref(), Some("1.1.0"));

    let mut options = linux();
    options.prefer_prebuilt = true;
    let built = solve(&index, vec![dep("a", "*")], &options).await;
    assert_eq!(chosen(&built, "a").as_deref(), Some("1.0.0"));
    assert!(built.graph.get(&n("a")).unwrap().prebuilt);
}

#[tokio::test]
async fn test_markers_gate_edges() {
    let mut index = Index::default();
    index
        .add("colorama", "0.4.6", &[])
        .add("uvloop", "0.19.0", &[])
        .add("futuristic", "1.0.0", &[]);

    let deps = vec![
        dep("colorama", "*").with_marker(EnvironmentMarker::parse("os == \"windows\"").unwrap()),
        dep("uvloop", "*").with_marker(EnvironmentMarker::parse("os == \"linux\"").unwrap()),
        // Unknown to the target: kept, and recorded for install time.
        dep("futuristic", "*")
            .with_marker(EnvironmentMarker::parse("gpu == \"cuda\"").unwrap()),
    ];
    let resolution = solve(&index, deps, &linux()).await;
    assert_eq!(chosen(&resolution, "colorama"), None);
    assert!(chosen(&resolution, "uvloop").is_some());

    let lock = resolution.graph.to_lock("sha256:00");
    let futuristic = lock.get(&n("futuristic")).unwrap();
    assert_eq!(futuristic.markers.to_string(), "gpu == \"cuda\"");
}

#[tokio::test]
async fn test_extras_pull_in_extra_dependencies() {
    let mut index = Index::default();
    let mut http = Index::candidate("http", "1.0.0", vec![dep("idna", "*")]);
    http.extras.insert("socks".into(), vec![dep("pysocks", "^1.5")]);
    index
        .insert(http)
        .add("idna", "3.6.0", &[])
        .add("pysocks", "1.7.1", &[]);

    let plain = solve(&index, vec![dep("http", "*")], &linux()).await;
    assert_eq!(chosen(&plain, "pysocks"), None);

    let with_socks = solve(&index, vec![dep("http", "*").with_extras(["socks"])], &linux()).await;
    assert_eq!(chosen(&with_socks, "pysocks").as_deref(), Some("1.7.1"));
    let lock = with_socks.graph.to_lock("sha256:00");
    assert_eq!(
        lock.get(&n("http")).unwrap().dependencies,
        vec![n("idna"), n("pysocks")]
    );
}

#[tokio::test]
async fn test_dependency_cycles_resolve() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[("b", "*")])
        .add("b", "1.0.0", &[("a", "*")]);

    let resolution = solve(&index, vec![dep("a", "*")], &linux()).await;
    assert_eq!(resolution.graph.len(), 2);
    let root_deps: Vec<String> = resolution
        .graph
        .dependencies_of(resolution.graph.root())
        .iter()
        .map(|(idx, _)| resolution.graph.node(*idx).name().to_string())
        .collect();
    assert_eq!(root_deps, ["a"]);
    assert!(matches!(
        resolution.graph.node(resolution.graph.root()),
        GraphNode::Root { .. }
    ));
}

#[tokio::test]
async fn test_lock_round_trip() {
    let mut index = Index::default();
    index
        .add("a", "1.0.0", &[("b", "*")])
        .add("b", "2.0.0", &[]);
    let resolution = solve(&index, vec![dep("a", "*")], &linux()).await;

    let lock = resolution.graph.to_lock("sha256:00");
    let text = lock.to_toml_string().unwrap();
    let parsed = lode_core::lockfile::LockFile::parse(&text).unwrap();
    assert_eq!(parsed, lock);
}
