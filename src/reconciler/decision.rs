//! 状态转换决策
//!
//! 纯函数：只比较持久化的状态码，不看消息文本。

use crate::store::CheckRecord;
use serde::Serialize;

/// 一次检测相对于历史状态的转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// 之前健康，现在仍健康
    Healthy,
    /// 之前健康，现在出现问题
    NewProblem { status: i32 },
    /// 问题持续，状态码不变
    StillProblem { status: i32 },
    /// 问题持续，状态码改变
    StatusChanged { from: i32, to: i32 },
    /// 问题恢复
    Recovered { from: i32 },
}

/// 转换对应的存储修改
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Keep,
    Insert,
    Update,
    Delete,
}

impl Transition {
    /// 是否需要发送通知
    pub fn should_notify(&self) -> bool {
        matches!(
            self,
            Transition::NewProblem { .. }
                | Transition::StatusChanged { .. }
                | Transition::Recovered { .. }
        )
    }

    /// 转换要求的存储修改
    pub fn mutation(&self) -> Mutation {
        match self {
            Transition::Healthy | Transition::StillProblem { .. } => Mutation::Keep,
            Transition::NewProblem { .. } => Mutation::Insert,
            Transition::StatusChanged { .. } => Mutation::Update,
            Transition::Recovered { .. } => Mutation::Delete,
        }
    }

    /// 日志中使用的短名称
    pub fn label(&self) -> &'static str {
        match self {
            Transition::Healthy => "healthy",
            Transition::NewProblem { .. } => "new_problem",
            Transition::StillProblem { .. } => "still_problem",
            Transition::StatusChanged { .. } => "status_changed",
            Transition::Recovered { .. } => "recovered",
        }
    }
}

/// 根据历史记录和新状态码决定转换
pub fn decide(prior: Option<&CheckRecord>, status: i32) -> Transition {
    match (prior, status) {
        (None, 0) => Transition::Healthy,
        (None, status) => Transition::NewProblem { status },
        (Some(record), 0) => Transition::Recovered {
            from: record.status,
        },
        (Some(record), status) if record.status == status => Transition::StillProblem { status },
        (Some(record), status) => Transition::StatusChanged {
            from: record.status,
            to: status,
        },
    }
}
