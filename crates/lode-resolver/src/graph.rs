//! The resolved dependency graph and its lock file projection.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use lode_core::constraint::VersionConstraint;
use lode_core::lockfile::{LockEntry, LockFile};
use lode_core::marker::EnvironmentMarker;
use lode_core::package::{ContentHash, PackageName, SourceLocator};
use lode_core::version::Version;

/// One chosen package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    pub name: PackageName,
    pub version: Version,
    pub source: SourceLocator,
    pub hash: ContentHash,
    pub prebuilt: bool,
    /// Condition under which the package is needed at all.
    pub markers: EnvironmentMarker,
}

/// A node of the graph: the project itself or a chosen package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphNode {
    Root { name: PackageName, version: Version },
    Package(ResolvedNode),
}

impl GraphNode {
    pub fn name(&self) -> &PackageName {
        match self {
            GraphNode::Root { name, .. } => name,
            GraphNode::Package(node) => &node.name,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            GraphNode::Root { version, .. } => version,
            GraphNode::Package(node) => &node.version,
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name(), self.version())
    }
}

/// Edge label: the requirement that produced the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepEdge {
    pub constraint: VersionConstraint,
    pub marker: EnvironmentMarker,
}

/// A resolved dependency graph backed by petgraph. Exactly one node per
/// package name; edges point from dependent to dependency.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<GraphNode, DepEdge>,
    index: BTreeMap<PackageName, NodeIndex>,
    root: NodeIndex,
}

impl DependencyGraph {
    pub fn new(root_name: PackageName, root_version: Version) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(GraphNode::Root {
            name: root_name,
            version: root_version,
        });
        Self {
            graph,
            index: BTreeMap::new(),
            root,
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Add a package, or return the node already holding that name.
    pub fn add_package(&mut self, node: ResolvedNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.name) {
            return idx;
        }
        let name = node.name.clone();
        let idx = self.graph.add_node(GraphNode::Package(node));
        self.index.insert(name, idx);
        idx
    }

    /// Add a dependency edge. A second edge between the same nodes is merged:
    /// constraints intersect, markers widen.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        match self.graph.find_edge(from, to) {
            Some(existing) => {
                let current = &mut self.graph[existing];
                current.constraint = current.constraint.intersect(&edge.constraint);
                current.marker = current.marker.clone().or(edge.marker);
            }
            None => {
                self.graph.add_edge(from, to, edge);
            }
        }
    }

    pub fn find(&self, name: &PackageName) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    /// The chosen package at `idx`; `None` for the root.
    pub fn package(&self, idx: NodeIndex) -> Option<&ResolvedNode> {
        match &self.graph[idx] {
            GraphNode::Package(node) => Some(node),
            GraphNode::Root { .. } => None,
        }
    }

    pub fn get(&self, name: &PackageName) -> Option<&ResolvedNode> {
        self.find(name).and_then(|idx| self.package(idx))
    }

    /// All chosen packages, by name.
    pub fn packages(&self) -> impl Iterator<Item = &ResolvedNode> {
        self.index.values().filter_map(|&idx| self.package(idx))
    }

    /// Direct dependencies of a node, by name.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        let mut deps: Vec<(NodeIndex, &DepEdge)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect();
        deps.sort_by(|a, b| self.graph[a.0].name().cmp(self.graph[b.0].name()));
        deps
    }

    /// Reverse dependencies (who depends on this node), by name.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        let mut deps: Vec<(NodeIndex, &DepEdge)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect();
        deps.sort_by(|a, b| self.graph[a.0].name().cmp(self.graph[b.0].name()));
        deps
    }

    /// Every edge as `(dependent, dependency, edge)`.
    pub fn edges(&self) -> impl Iterator<Item = (&GraphNode, &GraphNode, &DepEdge)> {
        self.graph
            .edge_references()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()], e.weight()))
    }

    /// Recompute each package's marker from the edges that reach it.
    ///
    /// Nodes are visited breadth first from the root, by name. A package's
    /// marker is the disjunction over its incoming edges of the edge marker
    /// and the dependent's marker; edges from packages visited later (cycle
    /// back edges) are ignored.
    pub fn propagate_markers(&mut self) {
        let mut order: Vec<NodeIndex> = Vec::new();
        let mut seen: HashSet<NodeIndex> = HashSet::from([self.root]);
        let mut queue = VecDeque::from([self.root]);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for (dep, _) in self.dependencies_of(idx) {
                if seen.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        let position: BTreeMap<NodeIndex, usize> =
            order.iter().enumerate().map(|(i, &idx)| (idx, i)).collect();
        let mut markers: BTreeMap<NodeIndex, EnvironmentMarker> = BTreeMap::new();
        markers.insert(self.root, EnvironmentMarker::Any);

        for &idx in order.iter().skip(1) {
            let mut marker: Option<EnvironmentMarker> = None;
            for (parent, edge) in self.dependents_of(idx) {
                if position.get(&parent).map_or(true, |&p| p >= position[&idx]) {
                    continue;
                }
                let Some(parent_marker) = markers.get(&parent) else {
                    continue;
                };
                let reach = parent_marker.clone().and(edge.marker.clone());
                marker = Some(match marker {
                    Some(m) => m.or(reach),
                    None => reach,
                });
            }
            markers.insert(idx, marker.unwrap_or(EnvironmentMarker::Any));
        }

        for (idx, marker) in markers {
            if let GraphNode::Package(node) = &mut self.graph[idx] {
                node.markers = marker;
            }
        }
    }

    /// Packages ordered so that every package comes after its dependencies.
    /// Members of a dependency cycle are ordered by name.
    pub fn install_order(&self) -> Vec<&ResolvedNode> {
        tarjan_scc(&self.graph)
            .into_iter()
            .flat_map(|mut component| {
                component.sort_by(|a, b| self.graph[*a].name().cmp(self.graph[*b].name()));
                component
            })
            .filter_map(|idx| self.package(idx))
            .collect()
    }

    /// The lock file recording this graph.
    pub fn to_lock(&self, fingerprint: impl Into<String>) -> LockFile {
        let entries = self
            .index
            .values()
            .filter_map(|&idx| {
                let node = self.package(idx)?;
                Some(LockEntry {
                    name: node.name.clone(),
                    version: node.version.clone(),
                    source: node.source.clone(),
                    hash: node.hash.clone(),
                    prebuilt: node.prebuilt,
                    markers: node.markers.clone(),
                    dependencies: self
                        .dependencies_of(idx)
                        .into_iter()
                        .map(|(dep, _)| self.graph[dep].name().clone())
                        .collect(),
                })
            })
            .collect();
        LockFile::new(fingerprint, entries)
    }

    /// Rebuild a graph from a lock file. `direct` names the root's direct
    /// dependencies; when empty, every package nothing else depends on is
    /// treated as direct.
    pub fn from_lock(
        lock: &LockFile,
        root_name: PackageName,
        root_version: Version,
        direct: &[PackageName],
    ) -> Self {
        let mut graph = Self::new(root_name, root_version);
        for entry in &lock.packages {
            graph.add_package(ResolvedNode {
                name: entry.name.clone(),
                version: entry.version.clone(),
                source: entry.source.clone(),
                hash: entry.hash.clone(),
                prebuilt: entry.prebuilt,
                markers: entry.markers.clone(),
            });
        }
        for entry in &lock.packages {
            let Some(from) = graph.find(&entry.name) else {
                continue;
            };
            for dep in &entry.dependencies {
                if let Some(to) = graph.find(dep) {
                    let edge = pinned_edge(&graph.graph[to]);
                    graph.add_edge(from, to, edge);
                }
            }
        }

        let roots: Vec<NodeIndex> = if direct.is_empty() {
            graph
                .index
                .values()
                .copied()
                .filter(|&idx| graph.dependents_of(idx).is_empty())
                .collect()
        } else {
            direct.iter().filter_map(|name| graph.find(name)).collect()
        };
        let root = graph.root;
        for idx in roots {
            let edge = pinned_edge(&graph.graph[idx]);
            graph.add_edge(root, idx, edge);
        }
        graph
    }

    /// Print the dependency tree to a string.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = format!("{}\n", self.graph[self.root]);
        let mut visited = HashSet::from([self.root]);
        let deps = self.dependencies_of(self.root);
        let count = deps.len();
        for (i, (idx, _)) in deps.into_iter().enumerate() {
            self.print_subtree(&mut output, idx, "", i == count - 1, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        if !visited.insert(idx) {
            // Cycle back to an ancestor.
            output.push_str(&format!("{prefix}{connector}{node} (*)\n"));
            return;
        }
        output.push_str(&format!("{prefix}{connector}{node}\n"));

        if max_depth.is_some_and(|max| depth >= max) {
            visited.remove(&idx);
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, _)) in deps.into_iter().enumerate() {
            self.print_subtree(
                output,
                child,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// A shortest path from the root to `target`, root first.
    pub fn find_path(&self, target: &PackageName) -> Option<Vec<&GraphNode>> {
        let target = self.find(target)?;
        let mut parent: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        let mut queue = VecDeque::from([self.root]);
        let mut seen = HashSet::from([self.root]);
        while let Some(idx) = queue.pop_front() {
            if idx == target {
                let mut path = vec![idx];
                let mut cursor = idx;
                while let Some(&prev) = parent.get(&cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path.into_iter().map(|i| &self.graph[i]).collect());
            }
            for (dep, _) in self.dependencies_of(idx) {
                if seen.insert(dep) {
                    parent.insert(dep, idx);
                    queue.push_back(dep);
                }
            }
        }
        None
    }

    /// Inverted tree for one package: who depends on it, transitively.
    pub fn print_inverted_tree(&self, target: &PackageName) -> String {
        let mut output = String::new();
        let Some(idx) = self.find(target) else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[idx]));

        let mut visited = HashSet::from([idx]);
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, _)) in dependents.into_iter().enumerate() {
            self.print_inverted_subtree(&mut output, dep_idx, "", i == count - 1, &mut visited);
        }
        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, _)) in dependents.into_iter().enumerate() {
            self.print_inverted_subtree(output, dep_idx, &child_prefix, i == count - 1, visited);
        }

        visited.remove(&idx);
    }

    /// Number of chosen packages (the root excluded).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn pinned_edge(target: &GraphNode) -> DepEdge {
    DepEdge {
        constraint: VersionConstraint::exact(target.version().clone()),
        marker: EnvironmentMarker::Any,
    }
}
