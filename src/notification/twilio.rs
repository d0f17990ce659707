//! Twilio 短信通知渠道

use crate::config::TwilioConfig;
use crate::error::NotificationError;
use crate::notification::sender::{NotificationEvent, Notifier};
use crate::notification::template::craft_sms;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::info;

/// Twilio 短信发送器
pub struct TwilioNotifier {
    client: Client,
    config: TwilioConfig,
}

impl TwilioNotifier {
    pub fn new(config: TwilioConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotificationError::delivery("twilio", e))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        let body = craft_sms(&event.machine, &event.check, &event.message, &event.time_check());
        let to = format!("+{}", self.config.dest);
        let form = [
            ("From", self.config.sender.as_str()),
            ("To", to.as_str()),
            ("Body", body.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.api_url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| NotificationError::delivery(self.name(), e))?;

        if response.status() != StatusCode::CREATED {
            return Err(NotificationError::delivery(
                self.name(),
                format!("HTTP {}", response.status()),
            ));
        }

        info!("SMS sent with twilio to {}", self.config.dest);
        Ok(())
    }
}
