//! Command dispatch and handler modules.

mod add;
mod install;
mod lock;
mod remove;
mod tree;
mod update;

use std::path::PathBuf;

use miette::Result;

use lode_core::config::GlobalConfig;
use lode_util::errors::LodeError;
use lode_util::fs::find_ancestor_with;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Lock { check } => lock::exec(check).await,
        Command::Install {
            target,
            jobs,
            no_remove,
        } => install::exec(target, jobs, no_remove).await,
        Command::Add {
            spec,
            path,
            git,
            rev,
            markers,
            extras,
        } => add::exec(spec, path, git, rev, markers, extras).await,
        Command::Remove { name } => remove::exec(&name).await,
        Command::Update { packages } => update::exec(packages).await,
        Command::Tree { depth, invert, why } => tree::exec(depth, invert, why),
    }
}

/// The nearest directory, from the current one upwards, holding a `Lode.toml`.
fn project_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().map_err(LodeError::Io)?;
    find_ancestor_with(&cwd, lode_ops::project::MANIFEST_FILE).ok_or_else(|| {
        LodeError::Manifest {
            message: "No Lode.toml found in current directory or any parent".to_string(),
        }
        .into()
    })
}

fn config() -> Result<GlobalConfig> {
    GlobalConfig::load()
}
