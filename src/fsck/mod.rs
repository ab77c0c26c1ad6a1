#[allow(clippy::module_inception)]
pub mod fsck;
pub mod fsck_types;
mod inode;
mod reconcile;

pub use fsck::{check_image, check_path, Checker};
pub use fsck_types::*;
