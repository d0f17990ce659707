//! 检测状态存储模块
//!
//! 以 (machine, check) 为键保存最近一次的非健康状态

pub mod record;
pub mod sqlite;

pub use record::CheckRecord;
pub use sqlite::{Applied, StateStore, StoreConnection, StoreOptions};
