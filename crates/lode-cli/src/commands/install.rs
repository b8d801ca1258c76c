//! Handler for `lode install`.

use std::path::PathBuf;

use miette::Result;
use tokio_util::sync::CancellationToken;

use lode_ops::ops_install::{self, InstallOptions};

pub async fn exec(target: Option<PathBuf>, jobs: Option<usize>, no_remove: bool) -> Result<()> {
    let project_root = super::project_root()?;
    let config = super::config()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight packages");
            on_interrupt.cancel();
        }
    });

    let opts = InstallOptions {
        target,
        jobs,
        no_remove,
    };
    ops_install::install(&project_root, &config, &opts, cancel).await
}
