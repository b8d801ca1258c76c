//! Operation: display the locked dependency graph.

use std::path::Path;

use lode_core::config::GlobalConfig;
use lode_core::package::PackageName;
use lode_util::errors::{LodeError, LodeResult};

use crate::project::Project;

/// Options for `lode tree`.
#[derive(Debug, Default)]
pub struct TreeOptions {
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Show what depends on this package instead.
    pub invert: Option<String>,
    /// Show one shortest path from the project to this package.
    pub why: Option<String>,
}

/// Print the dependency tree of the project in `project_root`.
pub fn tree(project_root: &Path, config: &GlobalConfig, opts: &TreeOptions) -> miette::Result<()> {
    print!("{}", render_tree(project_root, config, opts)?);
    Ok(())
}

/// The text `lode tree` prints.
pub fn render_tree(
    project_root: &Path,
    config: &GlobalConfig,
    opts: &TreeOptions,
) -> LodeResult<String> {
    let project = Project::load(project_root, config)?;
    let lock = project.require_lock()?;
    let graph = project.locked_graph(&lock)?;

    if let Some(target) = &opts.why {
        let name = locked_name(&graph, target)?;
        let mut output = String::new();
        if let Some(path) = graph.find_path(&name) {
            for (i, node) in path.iter().enumerate() {
                output.push_str(&format!("{}{node}\n", "  ".repeat(i)));
            }
        } else {
            output.push_str(&format!("{name} is locked but nothing depends on it\n"));
        }
        return Ok(output);
    }

    if let Some(target) = &opts.invert {
        let name = locked_name(&graph, target)?;
        return Ok(graph.print_inverted_tree(&name));
    }

    Ok(graph.print_tree(opts.depth))
}

fn locked_name(
    graph: &lode_resolver::graph::DependencyGraph,
    raw: &str,
) -> LodeResult<PackageName> {
    let name = PackageName::new(raw).map_err(|e| LodeError::Generic {
        message: e.to_string(),
    })?;
    if graph.find(&name).is_none() {
        return Err(LodeError::NotFound {
            package: name.to_string(),
            version: None,
        });
    }
    Ok(name)
}
