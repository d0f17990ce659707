//! 检测执行模块
//!
//! 提供 NRPE/ping 插件调用和检测结果类型

pub mod result;
pub mod runner;

// 重新导出主要类型
pub use result::{status_label, CheckOutcome, CheckResult, STATUS_OK};
pub use runner::{execute_check, CheckRunner, NagiosCheckRunner};
