//! Pushover 通知渠道
//!
//! 以查询参数 POST 到 Pushover API，期望 200

use crate::config::PushoverConfig;
use crate::error::NotificationError;
use crate::notification::sender::{NotificationEvent, Notifier};
use crate::notification::template::{format_alert, format_title};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Pushover 推送发送器
pub struct PushoverNotifier {
    /// HTTP客户端
    client: Client,
    config: PushoverConfig,
}

impl PushoverNotifier {
    /// 创建新的 Pushover 发送器
    ///
    /// # 参数
    /// * `config` - token、user 和 API 地址
    pub fn new(config: PushoverConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotificationError::delivery("pushover", e))?;

        Ok(Self { client, config })
    }

    /// 构建请求参数
    fn build_params(&self, event: &NotificationEvent) -> Vec<(&'static str, String)> {
        vec![
            ("token", self.config.token.clone()),
            ("user", self.config.user.clone()),
            ("message", format_alert(event)),
            ("priority", "1".to_string()),
            ("expire", "3600".to_string()),
            ("retry", "90".to_string()),
            ("title", format_title(&event.machine, &event.check)),
        ]
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn name(&self) -> &str {
        "pushover"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        debug!("发送 Pushover 通知: {}", self.config.api_url);

        let response = self
            .client
            .post(&self.config.api_url)
            .query(&self.build_params(event))
            .send()
            .await
            .map_err(|e| NotificationError::delivery(self.name(), e))?;

        if response.status() == StatusCode::OK {
            info!("Alert sent through pushover");
            Ok(())
        } else {
            Err(NotificationError::delivery(
                self.name(),
                format!("HTTP {}", response.status()),
            ))
        }
    }
}
