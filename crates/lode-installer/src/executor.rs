//! Executing an install plan.
//!
//! Packages are scheduled as soon as every dependency that is also being
//! installed in this run has finished, with at most `jobs` fetches in
//! flight. Each package is fetched, verified against its locked hash,
//! staged, and promoted with a rename. A failure stops only that package:
//! dependents still install and committed siblings stay committed.
//! Removals run last, and only when every install succeeded.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use lode_core::package::PackageName;
use lode_resolver::graph::ResolvedNode;
use lode_source::checksum;
use lode_source::set::SourceSet;
use lode_source::source::Artifact;
use lode_util::errors::{LodeError, LodeResult};

use crate::environment::Environment;
use crate::plan::{InstallPlan, InstallStep};
use crate::report::{FailedPackage, InstallReport, InstalledPackage};

/// Where artifact bytes come from.
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    async fn fetch(&self, package: &ResolvedNode) -> LodeResult<Artifact>;
}

#[async_trait]
impl ArtifactProvider for SourceSet {
    async fn fetch(&self, package: &ResolvedNode) -> LodeResult<Artifact> {
        self.artifact(&package.name, &package.version, &package.source, &package.hash)
            .await
    }
}

/// Knobs for one install run.
#[derive(Clone)]
pub struct InstallOptions {
    /// Maximum packages fetched and staged at once.
    pub jobs: usize,
    /// Remove packages that are no longer locked.
    pub remove: bool,
    pub progress: ProgressBar,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            remove: true,
            progress: ProgressBar::hidden(),
        }
    }
}

/// Applies install plans to an environment.
pub struct Installer<P, E> {
    provider: Arc<P>,
    env: Arc<E>,
    options: InstallOptions,
    cancel: CancellationToken,
}

type StepResult = (PackageName, LodeResult<()>);

impl<P, E> Installer<P, E>
where
    P: ArtifactProvider + 'static,
    E: Environment + 'static,
{
    pub fn new(provider: Arc<P>, env: Arc<E>, options: InstallOptions) -> Self {
        Self {
            provider,
            env,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to interrupt the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, plan: InstallPlan) -> LodeResult<InstallReport> {
        let mut report = InstallReport {
            unchanged: plan.unchanged.clone(),
            ..Default::default()
        };
        let progress = &self.options.progress;
        progress.set_length(plan.to_install.len() as u64);

        let position: HashMap<&PackageName, usize> = plan
            .to_install
            .iter()
            .enumerate()
            .map(|(i, step)| (&step.package.name, i))
            .collect();

        // Only dependencies installed earlier in this run are waited on;
        // cycle members later in the order would otherwise never start.
        let mut waiting: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        let mut ready: VecDeque<usize> = VecDeque::new();
        for (i, step) in plan.to_install.iter().enumerate() {
            let deps: BTreeSet<usize> = step
                .dependencies
                .iter()
                .filter_map(|d| position.get(d).copied())
                .filter(|&j| j < i)
                .collect();
            if deps.is_empty() {
                ready.push_back(i);
            } else {
                waiting.insert(i, deps);
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.options.jobs.max(1)));
        let mut tasks: JoinSet<StepResult> = JoinSet::new();

        loop {
            if !self.cancel.is_cancelled() {
                while let Some(i) = ready.pop_front() {
                    self.spawn_step(&mut tasks, &semaphore, plan.to_install[i].clone());
                }
            }
            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (name, result) = joined.map_err(|e| LodeError::Generic {
                message: format!("install task failed: {e}"),
            })?;
            progress.inc(1);

            let Some(&i) = position.get(&name) else {
                continue;
            };
            let step = &plan.to_install[i];
            match result {
                Ok(()) => {
                    let label = if step.replaces.is_some() { "Updated" } else { "Installed" };
                    progress.suspend(|| {
                        lode_util::progress::status(
                            label,
                            &format!("{} v{}", step.package.name, step.package.version),
                        )
                    });
                    report.installed.push(InstalledPackage {
                        name,
                        version: step.package.version.clone(),
                        replaced: step.replaces.clone(),
                    });
                }
                Err(LodeError::Cancelled) => report.skipped.push(name),
                Err(error) => {
                    tracing::warn!("{name} failed: {error}");
                    report.failed.push(FailedPackage { name, error });
                }
            }

            let mut released: Vec<usize> = Vec::new();
            waiting.retain(|&j, deps| {
                deps.remove(&i);
                if deps.is_empty() {
                    released.push(j);
                    false
                } else {
                    true
                }
            });
            ready.extend(released);
        }
        progress.finish_and_clear();

        if self.cancel.is_cancelled() {
            report.cancelled = true;
            report.skipped.extend(
                ready
                    .into_iter()
                    .chain(waiting.into_keys())
                    .map(|i| plan.to_install[i].package.name.clone()),
            );
        }

        self.remove_stale(&plan, &mut report);
        report.sort();
        tracing::info!("install finished: {report}");
        Ok(report)
    }

    fn spawn_step(
        &self,
        tasks: &mut JoinSet<StepResult>,
        semaphore: &Arc<Semaphore>,
        step: InstallStep,
    ) {
        let provider = self.provider.clone();
        let env = self.env.clone();
        let semaphore = semaphore.clone();
        let cancel = self.cancel.clone();
        let progress = self.options.progress.clone();
        tasks.spawn(async move {
            let name = step.package.name.clone();
            let result = install_one(provider, env, semaphore, cancel, progress, step).await;
            (name, result)
        });
    }

    fn remove_stale(&self, plan: &InstallPlan, report: &mut InstallReport) {
        let stale = plan.to_remove.iter().map(|r| r.name.clone());
        if !self.options.remove {
            return;
        }
        if !report.is_success() {
            report.removals_deferred.extend(stale);
            return;
        }
        for name in stale {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                report.removals_deferred.push(name);
                continue;
            }
            match self.env.remove(&name) {
                Ok(()) => {
                    lode_util::progress::status("Removed", name.as_str());
                    tracing::info!("removed {name}");
                    report.removed.push(name);
                }
                Err(error) => {
                    tracing::warn!("failed to remove {name}: {error}");
                    report.failed.push(FailedPackage { name, error });
                }
            }
        }
    }
}

async fn install_one<P, E>(
    provider: Arc<P>,
    env: Arc<E>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    progress: ProgressBar,
    step: InstallStep,
) -> LodeResult<()>
where
    P: ArtifactProvider + 'static,
    E: Environment + 'static,
{
    let package = &step.package;
    let _permit = tokio::select! {
        permit = semaphore.acquire_owned() => permit.map_err(|e| LodeError::Generic {
            message: e.to_string(),
        })?,
        _ = cancel.cancelled() => return Err(LodeError::Cancelled),
    };
    progress.set_message(format!("{} v{}", package.name, package.version));
    tracing::info!("installing {} v{}", package.name, package.version);

    let artifact = tokio::select! {
        artifact = provider.fetch(package) => artifact?,
        _ = cancel.cancelled() => return Err(LodeError::Cancelled),
    };
    checksum::verify(&package.name, &package.hash, &artifact.bytes)?;

    let record = step.record();
    tokio::task::spawn_blocking(move || {
        let staged = env.stage(&record, &artifact.bytes)?;
        // Not yet visible: dropping the stage leaves the environment as it was.
        if cancel.is_cancelled() {
            return Err(LodeError::Cancelled);
        }
        env.commit(staged)
    })
    .await
    .map_err(|e| LodeError::Generic {
        message: format!("install task failed: {e}"),
    })?
}

