//! Handler for `lode add`.

use std::path::PathBuf;

use miette::Result;

use lode_ops::ops_add::{self, AddOptions};

pub async fn exec(
    spec: String,
    path: Option<PathBuf>,
    git: Option<String>,
    rev: Option<String>,
    markers: Option<String>,
    extras: Vec<String>,
) -> Result<()> {
    let project_root = super::project_root()?;
    let opts = AddOptions {
        spec,
        path,
        git,
        rev,
        markers,
        extras,
    };
    ops_add::add(&project_root, &super::config()?, &opts).await
}
