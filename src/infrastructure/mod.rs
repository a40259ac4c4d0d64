//! 基础设施层（Infrastructure）
//!
//! 持有文件资源，只暴露读写能力，不包含筛选或配对逻辑

pub mod post_reader;
pub mod snapshot_store;

pub use post_reader::PostReader;
pub use snapshot_store::SnapshotStore;
