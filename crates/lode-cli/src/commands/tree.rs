//! Handler for `lode tree`.

use miette::Result;

use lode_ops::ops_tree::{self, TreeOptions};

pub fn exec(depth: Option<usize>, invert: Option<String>, why: Option<String>) -> Result<()> {
    let project_root = super::project_root()?;
    let opts = TreeOptions { depth, invert, why };
    ops_tree::tree(&project_root, &super::config()?, &opts)
}
