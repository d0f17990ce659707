//! 持久化的检测状态记录

use serde::{Deserialize, Serialize};

/// 一条问题记录
///
/// 行存在表示最近一次观测状态非零，健康状态从不落盘。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    /// 主机名
    pub machine: String,
    /// 检测名称
    pub check: String,
    /// 最近一次的非零状态码
    pub status: i32,
    /// 进入该状态的时间（unix 秒）
    pub mtime: i64,
}

impl CheckRecord {
    pub fn new(machine: impl Into<String>, check: impl Into<String>, status: i32, mtime: i64) -> Self {
        Self {
            machine: machine.into(),
            check: check.into(),
            status,
            mtime,
        }
    }
}
