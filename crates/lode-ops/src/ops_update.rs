//! Operation: relock, letting some or all packages move off their locked
//! versions.

use std::collections::BTreeSet;
use std::path::Path;

use lode_core::config::GlobalConfig;
use lode_core::package::PackageName;
use lode_util::errors::LodeError;

use crate::ops_lock::{lock_changes, relock, Refresh};
use crate::project::Project;

/// Options for `lode update`.
#[derive(Debug, Default)]
pub struct UpdateOptions {
    /// Packages to update; empty means all of them.
    pub packages: Vec<String>,
}

pub async fn update(project_root: &Path, config: &GlobalConfig, opts: &UpdateOptions) -> miette::Result<()> {
    let project = Project::load(project_root, config)?;
    let previous = project.read_lock().ok().flatten();

    let refresh = if opts.packages.is_empty() {
        Refresh::All
    } else {
        let mut names = BTreeSet::new();
        for raw in &opts.packages {
            let name = PackageName::new(raw).map_err(|e| LodeError::Generic {
                message: e.to_string(),
            })?;
            if previous.as_ref().is_some_and(|l| l.get(&name).is_none()) {
                lode_util::progress::status_warn("Warning", &format!("{name} is not in the lock file"));
            }
            names.insert(name);
        }
        Refresh::Only(names)
    };

    let sources = project.sources()?;
    let lock = relock(&project, &sources, &refresh).await?;
    if lock_changes(previous.as_ref(), &lock).is_empty() {
        lode_util::progress::status("Updated", "all packages already at their newest allowed version");
    }
    Ok(())
}
