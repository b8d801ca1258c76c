pub mod ops_add;
pub mod ops_install;
pub mod ops_lock;
pub mod ops_remove;
pub mod ops_tree;
pub mod ops_update;
pub mod project;
