//! 基础设施层
//!
//! 活动数据集的持久化和同一活动写入者的互斥（进程内和跨进程）

pub mod dataset_store;
pub mod lock_table;
pub mod owner_file;

pub use dataset_store::{AppendResult, DatasetReport, DatasetStore, ImportResult, RestoreResult};
pub use lock_table::{LockTable, WriteGuard};
pub use owner_file::{OwnerFile, OwnerInfo};
