//! 通知发送器模块
//!
//! 定义通知事件和通知渠道的trait

use crate::check::CheckResult;
use crate::error::NotificationError;
use crate::reconciler::decision::Transition;
use async_trait::async_trait;
use chrono::{DateTime, Local};

/// 告警中使用的时间格式
pub const TIME_CHECK_FORMAT: &str = "%Y/%m/%d %H:%M";

/// 一次状态转换产生的通知事件
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// 主机名
    pub machine: String,
    /// 检测名称
    pub check: String,
    /// 插件输出
    pub message: String,
    /// 检测时间
    pub timestamp: DateTime<Local>,
    /// 触发通知的转换
    pub transition: Transition,
}

impl NotificationEvent {
    /// 由检测结果和转换构建事件
    pub fn from_result(result: &CheckResult, transition: Transition) -> Self {
        Self {
            machine: result.machine.clone(),
            check: result.check.clone(),
            message: result.message.clone(),
            timestamp: result.timestamp,
            transition,
        }
    }

    /// 格式化后的检测时间，如 `2018/02/22 12:00`
    pub fn time_check(&self) -> String {
        self.timestamp.format(TIME_CHECK_FORMAT).to_string()
    }
}

/// 通知渠道trait
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 渠道名称，与配置中的名称一致
    fn name(&self) -> &str;

    /// 发送一次通知
    ///
    /// # 参数
    /// * `event` - 通知事件
    ///
    /// # 返回
    /// * `Result<(), NotificationError>` - 发送结果，失败不重试
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}
