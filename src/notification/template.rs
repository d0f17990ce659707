//! 消息模板模块
//!
//! 各通知渠道的告警文本格式

use crate::notification::sender::NotificationEvent;

/// 短信正文的字节上限
pub const SMS_MAX_BYTES: usize = 156;

/// syslog/pushover 使用的单行告警
pub fn format_alert(event: &NotificationEvent) -> String {
    format!(
        "{}: {}!{} {}",
        event.time_check(),
        event.machine,
        event.check,
        event.message
    )
}

/// 推送和邮件标题
pub fn format_title(machine: &str, check: &str) -> String {
    format!("Alert from {}: {machine}!{check}", crate::APP_NAME)
}

/// 邮件正文
pub fn format_mail_body(event: &NotificationEvent) -> String {
    format!(
        "Hi,\nOn {}, we detected a change on {} for the check {}:\n\n{}\n\nYours truly,\n-- \n{}",
        event.time_check(),
        event.machine,
        event.check,
        event.message,
        crate::APP_NAME
    )
}

/// 生成精简的短信正文
///
/// 只保留时间中的 `HH:MM`，去掉主机名的域名后缀，
/// 并在字符边界处截断到 [`SMS_MAX_BYTES`]。
pub fn craft_sms(machine: &str, check: &str, message: &str, time_check: &str) -> String {
    let time = time_check
        .char_indices()
        .rev()
        .nth(4)
        .map(|(idx, _)| &time_check[idx..])
        .unwrap_or(time_check);
    let host = machine.split('.').next().unwrap_or(machine);

    let mut alert = format!("{time} {host}!{check} {message}");
    if alert.len() > SMS_MAX_BYTES {
        let mut end = SMS_MAX_BYTES;
        while !alert.is_char_boundary(end) {
            end -= 1;
        }
        alert.truncate(end);
    }
    alert
}
