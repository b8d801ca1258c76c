//! Handler for `lode lock`.

use miette::Result;

use lode_ops::ops_lock::{self, LockOptions};

pub async fn exec(check: bool) -> Result<()> {
    let project_root = super::project_root()?;
    ops_lock::lock(&project_root, &super::config()?, &LockOptions { check }).await
}
