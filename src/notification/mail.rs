//! 邮件通知渠道
//!
//! 通过配置的 SMTP 中继发送纯文本邮件

use crate::config::MailConfig;
use crate::error::NotificationError;
use crate::notification::sender::{NotificationEvent, Notifier};
use crate::notification::template::{format_mail_body, format_title};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

/// SMTP 默认端口
const DEFAULT_SMTP_PORT: u16 = 25;

/// 邮件发送器
pub struct MailNotifier {
    from: Mailbox,
    to: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailNotifier {
    /// 创建邮件发送器
    ///
    /// `server` 可写作 `host` 或 `host:port`。
    pub fn new(config: &MailConfig) -> Result<Self, NotificationError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::NotConfigured(format!("mail.from: {e}")))?;
        let to = config
            .to
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::NotConfigured(format!("mail.to: {e}")))?;

        let (host, port) = split_server(&config.server)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();

        Ok(Self {
            from,
            to,
            transport,
        })
    }

    fn build_message(&self, event: &NotificationEvent) -> Result<Message, NotificationError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format_title(&event.machine, &event.check))
            .header(ContentType::TEXT_PLAIN)
            .body(format_mail_body(event))
            .map_err(|e| NotificationError::delivery("mail", e))
    }
}

fn split_server(server: &str) -> Result<(&str, u16), NotificationError> {
    match server.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|e| NotificationError::NotConfigured(format!("mail.server: {e}")))?;
            Ok((host, port))
        }
        None => Ok((server, DEFAULT_SMTP_PORT)),
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    fn name(&self) -> &str {
        "mail"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        let message = self.build_message(event)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::delivery(self.name(), e))?;

        info!("Alert sent through email");
        Ok(())
    }
}
