//! NRPE Vitals - 基于状态转换告警的 NRPE 主机监控工具
//!
//! 通过 check_nrpe / check_ping 轮询主机，把每个 (主机, 检测) 的最近
//! 非健康状态保存在 SQLite 中，仅在状态转换时通知：
//! - 主机内先 ping，可达后顺序执行检测
//! - 主机间有界并发
//! - syslog、Pushover、邮件和 Twilio 短信通知

pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod reconciler;
pub mod scheduler;
pub mod store;

// 重新导出主要类型
pub use check::{CheckResult, CheckRunner};
pub use config::{Config, GlobalConfig, MachineConfig};
pub use error::VitalsError;
pub use reconciler::{Reconciler, Transition};
pub use scheduler::{PassSummary, PollScheduler};
pub use store::{CheckRecord, StateStore};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
