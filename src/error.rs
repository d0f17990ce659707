//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// NRPE Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum VitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 检测执行相关错误
    #[error("检测错误: {0}")]
    Check(#[from] CheckError),

    /// 状态存储相关错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 检测错误类型
///
/// `Timeout` 与 `ConnectionRefused` 会被折叠为普通的非零检测结果，
/// 只有 `RunnerError` 会从检测执行器向上传播。
#[derive(Error, Debug)]
pub enum CheckError {
    /// 检测超时
    #[error("检测超时: {check}@{host}")]
    Timeout { check: String, host: String },

    /// 连接被拒绝
    #[error("连接被拒绝: {check}@{host}")]
    ConnectionRefused { check: String, host: String },

    /// 检测插件无法执行
    #[error("检测插件执行失败: {0}")]
    RunnerError(String),
}

/// 状态存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 存储不可用（锁竞争、IO失败、数据库损坏）
    #[error("状态存储不可用: {reason}")]
    Unavailable { reason: String },

    /// 无法打开数据库文件
    #[error("无法打开状态数据库 {path}: {reason}")]
    Open { path: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable {
            reason: err.to_string(),
        }
    }
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 未知的通知渠道名称
    #[error("未知的通知渠道: {0}")]
    UnknownNotifier(String),

    /// 通知渠道已知但缺少凭据配置
    #[error("通知渠道未配置: {0}")]
    NotConfigured(String),

    /// 发送失败
    #[error("通知发送失败 [{channel}]: {reason}")]
    DeliveryFailed { channel: String, reason: String },
}

impl NotificationError {
    /// 构造发送失败错误
    pub fn delivery(channel: &str, reason: impl std::fmt::Display) -> Self {
        NotificationError::DeliveryFailed {
            channel: channel.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, VitalsError>;
