//! syslog 通知渠道

use crate::error::NotificationError;
use crate::notification::sender::{NotificationEvent, Notifier};
use crate::notification::template::format_alert;
use async_trait::async_trait;

/// 写入本机 syslog（LOG_WARNING）
#[derive(Debug, Default, Clone)]
pub struct SyslogNotifier;

impl SyslogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for SyslogNotifier {
    fn name(&self) -> &str {
        "syslog"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        let alert = format_alert(event);
        write_warning(&alert).map_err(|e| NotificationError::delivery(self.name(), e))
    }
}

#[cfg(unix)]
fn write_warning(alert: &str) -> Result<(), String> {
    use std::ffi::{CStr, CString};
    use std::sync::Once;

    static IDENT: &CStr = c"nrpe-vitals";
    static OPEN: Once = Once::new();

    let message = CString::new(alert.replace('\0', " ")).map_err(|e| e.to_string())?;

    OPEN.call_once(|| {
        // SAFETY: IDENT 为 'static，openlog 持有的指针始终有效
        unsafe { libc::openlog(IDENT.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON) };
    });

    // SAFETY: 格式串固定为 "%s"，参数为合法的 C 字符串
    unsafe {
        libc::syslog(libc::LOG_WARNING, c"%s".as_ptr(), message.as_ptr());
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_warning(alert: &str) -> Result<(), String> {
    tracing::warn!(target: "syslog", "{}", alert);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckResult;
    use crate::reconciler::decision::Transition;

    #[tokio::test]
    async fn test_syslog_notify() {
        let result = CheckResult::new("db.example.com", "disk1", 2, "disk nok");
        let event = NotificationEvent::from_result(&result, Transition::NewProblem { status: 2 });

        let notifier = SyslogNotifier::new();
        assert_eq!(notifier.name(), "syslog");
        assert!(notifier.notify(&event).await.is_ok());
    }
}
