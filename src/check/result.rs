//! 检测结果数据结构
//!
//! 定义插件返回值、状态码约定和单次检测结果

use crate::error::CheckError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 插件状态码：正常
pub const STATUS_OK: i32 = 0;
/// 插件状态码：警告
pub const STATUS_WARNING: i32 = 1;
/// 插件状态码：严重
pub const STATUS_CRITICAL: i32 = 2;
/// 插件状态码：未知
pub const STATUS_UNKNOWN: i32 = 3;
/// check_nrpe 无法连接到远端守护进程时的退出码
pub const STATUS_NRPE_UNREACHABLE: i32 = 255;

/// 超时时使用的固定消息
pub const TIMEOUT_MESSAGE: &str = "Check timed out";
/// 连接被拒绝时使用的固定消息
pub const CONNECTION_REFUSED_MESSAGE: &str = "Connection refused";

/// 返回状态码的可读名称
pub fn status_label(status: i32) -> &'static str {
    match status {
        STATUS_OK => "OK",
        STATUS_WARNING => "WARNING",
        STATUS_CRITICAL => "CRITICAL",
        STATUS_UNKNOWN => "UNKNOWN",
        STATUS_NRPE_UNREACHABLE => "UNREACHABLE",
        _ => "OTHER",
    }
}

/// 插件执行的原始结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// 插件退出码
    pub status: i32,
    /// 插件标准输出
    pub message: String,
}

impl CheckOutcome {
    /// 创建新的插件结果
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 将可折叠的检测错误转换为普通结果
    ///
    /// 超时和连接拒绝本身就是被监控的状况，作为数据处理；
    /// 插件无法执行则返回 `None`，由调用方跳过本次检测。
    pub fn from_error(error: &CheckError) -> Option<Self> {
        match error {
            CheckError::Timeout { .. } => Some(Self::new(STATUS_CRITICAL, TIMEOUT_MESSAGE)),
            CheckError::ConnectionRefused { .. } => Some(Self::new(
                STATUS_NRPE_UNREACHABLE,
                CONNECTION_REFUSED_MESSAGE,
            )),
            CheckError::RunnerError(_) => None,
        }
    }

    /// 是否健康
    pub fn is_healthy(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// 单次检测结果，由检测执行器产生，被状态协调器消费一次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// 主机名（状态键）
    pub machine: String,
    /// 检测名称（状态键）
    pub check: String,
    /// 实际连接地址
    pub host: String,
    /// 实际连接端口
    pub port: String,
    /// 状态码
    pub status: i32,
    /// 插件输出
    pub message: String,
    /// 检测开始时间
    pub timestamp: DateTime<Local>,
}

impl CheckResult {
    /// 创建新的检测结果
    pub fn new(
        machine: impl Into<String>,
        check: impl Into<String>,
        status: i32,
        message: impl Into<String>,
    ) -> Self {
        let machine = machine.into();
        Self {
            host: machine.clone(),
            machine,
            check: check.into(),
            port: crate::config::DEFAULT_NRPE_PORT.to_string(),
            status,
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    /// 设置连接地址
    pub fn with_endpoint(mut self, host: impl Into<String>, port: impl Into<String>) -> Self {
        self.host = host.into();
        self.port = port.into();
        self
    }

    /// 设置检测时间
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 是否健康
    pub fn is_healthy(&self) -> bool {
        self.status == STATUS_OK
    }

    /// 状态表使用的 unix 秒时间戳
    pub fn mtime(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(0), "OK");
        assert_eq!(status_label(2), "CRITICAL");
        assert_eq!(status_label(255), "UNREACHABLE");
        assert_eq!(status_label(42), "OTHER");
    }

    #[test]
    fn test_fold_timeout() {
        let error = CheckError::Timeout {
            check: "disk1".to_string(),
            host: "db.example.com".to_string(),
        };
        let outcome = CheckOutcome::from_error(&error).unwrap();
        assert_eq!(outcome.status, STATUS_CRITICAL);
        assert_eq!(outcome.message, TIMEOUT_MESSAGE);
        assert!(!outcome.is_healthy());
    }

    #[test]
    fn test_fold_connection_refused() {
        let error = CheckError::ConnectionRefused {
            check: "disk1".to_string(),
            host: "db.example.com".to_string(),
        };
        let outcome = CheckOutcome::from_error(&error).unwrap();
        assert_eq!(outcome.status, STATUS_NRPE_UNREACHABLE);
        assert_eq!(outcome.message, "Connection refused");
    }

    #[test]
    fn test_runner_error_is_not_folded() {
        let error = CheckError::RunnerError("check_nrpe: No such file".to_string());
        assert!(CheckOutcome::from_error(&error).is_none());
    }

    #[test]
    fn test_check_result_builder() {
        let ts = Local.with_ymd_and_hms(2018, 2, 22, 12, 0, 0).unwrap();
        let result = CheckResult::new("db.example.com", "disk1", 2, "disk nok")
            .with_endpoint("192.0.2.2", "5667")
            .with_timestamp(ts);

        assert_eq!(result.machine, "db.example.com");
        assert_eq!(result.host, "192.0.2.2");
        assert_eq!(result.port, "5667");
        assert_eq!(result.mtime(), ts.timestamp());
        assert!(!result.is_healthy());
    }
}
