//! Diffing a locked graph against an environment.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;

use lode_core::marker::TargetEnvironment;
use lode_core::package::PackageName;
use lode_core::version::Version;
use lode_resolver::graph::{DependencyGraph, ResolvedNode};

use crate::environment::InstallRecord;

/// One package to fetch and promote.
#[derive(Debug, Clone)]
pub struct InstallStep {
    pub package: ResolvedNode,
    /// Locked dependencies, by name.
    pub dependencies: Vec<PackageName>,
    /// The version being replaced, if any.
    pub replaces: Option<Version>,
}

impl InstallStep {
    pub fn record(&self) -> InstallRecord {
        InstallRecord {
            name: self.package.name.clone(),
            version: self.package.version.clone(),
            hash: self.package.hash.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

/// What an install run has to do.
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    /// Dependencies before dependents.
    pub to_install: Vec<InstallStep>,
    /// Dependents before dependencies.
    pub to_remove: Vec<InstallRecord>,
    pub unchanged: Vec<PackageName>,
    /// Locked packages whose markers do not hold on this environment.
    pub inactive: Vec<PackageName>,
}

impl InstallPlan {
    /// Compare `graph` with what is `installed`.
    ///
    /// A package is reinstalled when its version or content hash differs
    /// from the lock. Installed packages that are not locked, or whose
    /// markers are false for `env`, are removed.
    pub fn new(
        graph: &DependencyGraph,
        installed: &BTreeMap<PackageName, InstallRecord>,
        env: &TargetEnvironment,
    ) -> Self {
        let mut plan = InstallPlan::default();
        let mut wanted = BTreeSet::new();

        for package in graph.install_order() {
            if !package.markers.is_active(env) {
                tracing::debug!("{} skipped: markers `{}` are false", package.name, package.markers);
                plan.inactive.push(package.name.clone());
                continue;
            }
            wanted.insert(package.name.clone());

            let current = installed.get(&package.name);
            if current.is_some_and(|r| r.version == package.version && r.hash == package.hash) {
                plan.unchanged.push(package.name.clone());
                continue;
            }
            let dependencies = graph
                .find(&package.name)
                .map(|idx| {
                    graph
                        .dependencies_of(idx)
                        .into_iter()
                        .map(|(dep, _)| graph.node(dep).name().clone())
                        .collect()
                })
                .unwrap_or_default();
            plan.to_install.push(InstallStep {
                package: package.clone(),
                dependencies,
                replaces: current.map(|r| r.version.clone()),
            });
        }

        let stale: Vec<&InstallRecord> = installed
            .values()
            .filter(|r| !wanted.contains(&r.name))
            .collect();
        plan.to_remove = removal_order(&stale);
        plan.unchanged.sort();
        plan
    }

    /// Nothing to install and nothing to remove.
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty() && self.to_remove.is_empty()
    }
}

/// Order `records` so that a package is removed before anything it
/// depends on.
fn removal_order(records: &[&InstallRecord]) -> Vec<InstallRecord> {
    let mut graph: DiGraph<&InstallRecord, ()> = DiGraph::new();
    let index: BTreeMap<&PackageName, _> = records
        .iter()
        .map(|r| (&r.name, graph.add_node(*r)))
        .collect();
    for record in records {
        for dep in &record.dependencies {
            if let Some(&to) = index.get(dep) {
                graph.add_edge(index[&record.name], to, ());
            }
        }
    }
    // tarjan_scc yields dependencies first; removal wants the reverse.
    tarjan_scc(&graph)
        .into_iter()
        .rev()
        .flat_map(|mut component| {
            component.sort_by(|a, b| graph[*a].name.cmp(&graph[*b].name));
            component
        })
        .map(|idx| graph[idx].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::lockfile::{LockEntry, LockFile};
    use lode_core::marker::EnvironmentMarker;
    use lode_core::package::{ContentHash, SourceLocator};

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    fn entry(n: &str, v: &str, deps: &[&str]) -> LockEntry {
        LockEntry {
            name: name(n),
            version: Version::parse(v).unwrap(),
            source: SourceLocator::Registry {
                url: "https://registry.example".into(),
            },
            hash: ContentHash::sha256(format!("{n}-{v}").as_bytes()),
            prebuilt: false,
            markers: EnvironmentMarker::default(),
            dependencies: deps.iter().map(|d| name(d)).collect(),
        }
    }

    fn record_of(e: &LockEntry) -> InstallRecord {
        InstallRecord {
            name: e.name.clone(),
            version: e.version.clone(),
            hash: e.hash.clone(),
            dependencies: e.dependencies.clone(),
        }
    }

    fn graph(entries: Vec<LockEntry>) -> DependencyGraph {
        let lock = LockFile::new("sha256:00", entries);
        DependencyGraph::from_lock(&lock, name("app"), Version::parse("0.1.0").unwrap(), &[])
    }

    fn names(steps: &[InstallStep]) -> Vec<&str> {
        steps.iter().map(|s| s.package.name.as_str()).collect()
    }

    #[test]
    fn fresh_environment_installs_dependencies_first() {
        let g = graph(vec![
            entry("app-lib", "1.0.0", &["core"]),
            entry("core", "2.0.0", &[]),
            entry("util", "1.0.0", &["core"]),
        ]);
        let plan = InstallPlan::new(&g, &BTreeMap::new(), &TargetEnvironment::new());
        let order = names(&plan.to_install);
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], "core");
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn matching_packages_are_unchanged() {
        let core = entry("core", "2.0.0", &[]);
        let installed = BTreeMap::from([(core.name.clone(), record_of(&core))]);
        let g = graph(vec![core, entry("util", "1.0.0", &["core"])]);
        let plan = InstallPlan::new(&g, &installed, &TargetEnvironment::new());
        assert_eq!(plan.unchanged, vec![name("core")]);
        assert_eq!(names(&plan.to_install), vec!["util"]);
        assert_eq!(plan.to_install[0].dependencies, vec![name("core")]);
    }

    #[test]
    fn wrong_version_or_hash_is_reinstalled() {
        let locked = entry("core", "2.0.0", &[]);
        let old = record_of(&entry("core", "1.0.0", &[]));
        let installed = BTreeMap::from([(old.name.clone(), old)]);
        let plan = InstallPlan::new(&graph(vec![locked.clone()]), &installed, &TargetEnvironment::new());
        assert_eq!(plan.to_install[0].replaces, Some(Version::parse("1.0.0").unwrap()));

        let mut tampered = record_of(&locked);
        tampered.hash = ContentHash::sha256(b"other");
        let installed = BTreeMap::from([(tampered.name.clone(), tampered)]);
        let plan = InstallPlan::new(&graph(vec![locked]), &installed, &TargetEnvironment::new());
        assert_eq!(names(&plan.to_install), vec!["core"]);
    }

    #[test]
    fn unlocked_packages_are_removed_dependents_first() {
        let base = entry("base", "1.0.0", &[]);
        let mid = entry("mid", "1.0.0", &["base"]);
        let top = entry("top", "1.0.0", &["mid"]);
        let installed: BTreeMap<_, _> = [&base, &mid, &top]
            .into_iter()
            .map(|e| (e.name.clone(), record_of(e)))
            .collect();
        let plan = InstallPlan::new(&graph(vec![]), &installed, &TargetEnvironment::new());
        let removed: Vec<&str> = plan.to_remove.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(removed, vec!["top", "mid", "base"]);
    }

    #[test]
    fn inactive_markers_are_skipped_and_removed() {
        let mut win = entry("winlib", "1.0.0", &[]);
        win.markers = EnvironmentMarker::parse("os == \"windows\"").unwrap();
        let installed = BTreeMap::from([(win.name.clone(), record_of(&win))]);
        let env = TargetEnvironment::new().with("os", "linux");
        let plan = InstallPlan::new(&graph(vec![win]), &installed, &env);
        assert_eq!(plan.inactive, vec![name("winlib")]);
        assert!(plan.to_install.is_empty());
        assert_eq!(plan.to_remove.len(), 1);
    }
}
