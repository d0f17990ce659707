//! 通知模块
//!
//! 提供 syslog、Pushover、邮件和 Twilio 短信通知及分发功能

pub mod dispatch;
pub mod mail;
pub mod pushover;
pub mod sender;
pub mod syslog;
pub mod template;
pub mod twilio;

// 重新导出主要类型
pub use dispatch::{DispatchReport, NotifierKind, NotifierRegistry, ResolvedChannels};
pub use sender::{NotificationEvent, Notifier};
pub use template::craft_sms;
