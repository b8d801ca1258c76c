//! Operation: make the target environment match Lode.lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lode_core::config::GlobalConfig;
use lode_installer::environment::{Environment, SiteEnvironment};
use lode_installer::executor::{InstallOptions as ExecutorOptions, Installer};
use lode_installer::plan::InstallPlan;
use lode_installer::report::InstallReport;
use lode_util::errors::LodeResult;

use crate::project::{Project, DEFAULT_TARGET, LOCK_FILE};

/// Options for `lode install`.
#[derive(Debug, Default)]
pub struct InstallOptions {
    /// Environment directory; defaults to `.lode/env` in the project.
    pub target: Option<PathBuf>,
    /// Parallel installs; defaults to `[install] jobs` from the config.
    pub jobs: Option<usize>,
    /// Keep installed packages that are no longer locked.
    pub no_remove: bool,
}

/// Install the lock file and print what happened. Fails if any package
/// failed, after everything that could be installed was.
pub async fn install(
    project_root: &Path,
    config: &GlobalConfig,
    opts: &InstallOptions,
    cancel: CancellationToken,
) -> miette::Result<()> {
    let report = run_install(project_root, config, opts, cancel).await?;

    for failed in &report.failed {
        lode_util::progress::status_error("Failed", &format!("{}: {}", failed.name, failed.error));
    }
    if !report.removals_deferred.is_empty() {
        lode_util::progress::status_warn(
            "Skipped",
            &format!("{} removal(s) until every install succeeds", report.removals_deferred.len()),
        );
    }
    if report.is_success() {
        lode_util::progress::status("Finished", &report.to_string());
    }
    Ok(report.outcome()?)
}

/// Install the lock file, returning the per-package report.
///
/// The lock is read before anything else; an unreadable lock fails the run
/// before the environment is touched.
pub async fn run_install(
    project_root: &Path,
    config: &GlobalConfig,
    opts: &InstallOptions,
    cancel: CancellationToken,
) -> LodeResult<InstallReport> {
    let project = Project::load(project_root, config)?;
    let lock = project.require_lock()?;
    if !lock.is_fresh(&project.manifest.fingerprint()) {
        lode_util::progress::status_warn(
            "Warning",
            &format!("{LOCK_FILE} is out of date with the manifest; run `lode lock`"),
        );
    }

    let graph = project.locked_graph(&lock)?;
    let target = opts
        .target
        .clone()
        .unwrap_or_else(|| project.root().join(DEFAULT_TARGET));
    let env = SiteEnvironment::open(&target)?;
    let plan = InstallPlan::new(&graph, &env.installed()?, &project.manifest.target_environment());
    tracing::info!(
        "plan for {}: {} to install, {} to remove, {} unchanged",
        target.display(),
        plan.to_install.len(),
        plan.to_remove.len(),
        plan.unchanged.len()
    );

    if plan.is_empty() {
        return Ok(InstallReport {
            unchanged: plan.unchanged,
            ..Default::default()
        });
    }

    let options = ExecutorOptions {
        jobs: opts.jobs.unwrap_or(config.install.jobs),
        remove: !opts.no_remove,
        progress: lode_util::progress::progress_bar(plan.to_install.len() as u64, "Installing"),
    };
    let sources = project.sources()?;
    let installer =
        Installer::new(Arc::new(sources), Arc::new(env), options).with_cancellation(cancel);
    installer.run(plan).await
}
