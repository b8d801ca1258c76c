//! Handler for `lode update`.

use miette::Result;

use lode_ops::ops_update::{self, UpdateOptions};

pub async fn exec(packages: Vec<String>) -> Result<()> {
    let project_root = super::project_root()?;
    ops_update::update(&project_root, &super::config()?, &UpdateOptions { packages }).await
}
