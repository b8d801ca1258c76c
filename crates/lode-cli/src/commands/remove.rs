//! Handler for `lode remove`.

use miette::Result;

use lode_ops::ops_remove;

pub async fn exec(name: &str) -> Result<()> {
    let project_root = super::project_root()?;
    ops_remove::remove(&project_root, &super::config()?, name).await
}
