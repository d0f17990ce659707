//! 通知分发
//!
//! 启动时把渠道名称解析为具体发送器，转换发生时向全部渠道并发投递

use crate::config::AlertingConfig;
use crate::error::NotificationError;
use crate::notification::mail::MailNotifier;
use crate::notification::pushover::PushoverNotifier;
use crate::notification::sender::{NotificationEvent, Notifier};
use crate::notification::syslog::SyslogNotifier;
use crate::notification::twilio::TwilioNotifier;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 已知的通知渠道种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifierKind {
    Syslog,
    Pushover,
    Mail,
    Twilio,
}

impl NotifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifierKind::Syslog => "syslog",
            NotifierKind::Pushover => "pushover",
            NotifierKind::Mail => "mail",
            NotifierKind::Twilio => "twilio",
        }
    }
}

impl FromStr for NotifierKind {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syslog" => Ok(NotifierKind::Syslog),
            "pushover" => Ok(NotifierKind::Pushover),
            "mail" => Ok(NotifierKind::Mail),
            "twilio" => Ok(NotifierKind::Twilio),
            other => Err(NotificationError::UnknownNotifier(other.to_string())),
        }
    }
}

/// 渠道名称到发送器的映射，配置加载后构建一次
#[derive(Clone, Default)]
pub struct NotifierRegistry {
    notifiers: HashMap<String, Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    /// 空注册表
    pub fn empty() -> Self {
        Self::default()
    }

    /// 根据告警配置构建注册表
    ///
    /// syslog 总是可用；其余渠道缺少配置或配置无效时不注册。
    pub fn from_config(alerting: &AlertingConfig) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SyslogNotifier::new()));

        match &alerting.pushover {
            Some(config) => match PushoverNotifier::new(config.clone()) {
                Ok(notifier) => registry.register(Arc::new(notifier)),
                Err(e) => warn!("Pushover 渠道不可用: {}", e),
            },
            None => info!("未配置 Pushover，渠道不可用"),
        }

        match &alerting.mail {
            Some(config) => match MailNotifier::new(config) {
                Ok(notifier) => registry.register(Arc::new(notifier)),
                Err(e) => warn!("邮件渠道不可用: {}", e),
            },
            None => info!("未配置邮件，渠道不可用"),
        }

        match &alerting.twilio {
            Some(config) => match TwilioNotifier::new(config.clone()) {
                Ok(notifier) => registry.register(Arc::new(notifier)),
                Err(e) => warn!("Twilio 渠道不可用: {}", e),
            },
            None => info!("未配置 Twilio，渠道不可用"),
        }

        registry
    }

    /// 注册发送器，同名覆盖
    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(notifier.name().to_string(), notifier);
    }

    /// 已注册的渠道名称（排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.notifiers.keys().cloned().collect();
        names.sort();
        names
    }

    /// 将配置的渠道名称解析为发送器列表
    ///
    /// 无法解析的名称记录警告后丢弃，从不报错。
    pub fn resolve(&self, names: &[String]) -> ResolvedChannels {
        let mut resolved = ResolvedChannels::default();

        for name in names {
            match self.notifiers.get(name) {
                Some(notifier) => resolved.notifiers.push(Arc::clone(notifier)),
                None => {
                    match name.parse::<NotifierKind>() {
                        Ok(kind) => warn!("通知渠道 {} 未配置，已忽略", kind.as_str()),
                        Err(e) => warn!("Unknown notifier {} configured ({})", name, e),
                    }
                    resolved.unknown.push(name.clone());
                }
            }
        }

        resolved
    }
}

/// 一台主机解析后的通知渠道
#[derive(Clone, Default)]
pub struct ResolvedChannels {
    notifiers: Vec<Arc<dyn Notifier>>,
    unknown: Vec<String>,
}

/// 一次分发的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// 投递成功的渠道
    pub delivered: Vec<String>,
    /// 投递失败的渠道
    pub failed: Vec<String>,
    /// 被丢弃的未知渠道名称
    pub unknown: Vec<String>,
    /// 没有任何可用渠道
    pub no_valid_notifier: bool,
}

impl ResolvedChannels {
    /// 可用渠道名称
    pub fn names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// 被丢弃的渠道名称
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// 向全部渠道投递通知
    ///
    /// 各渠道互不影响，失败只记录日志，不重试。
    pub async fn dispatch(&self, event: &NotificationEvent) -> DispatchReport {
        let mut report = DispatchReport {
            unknown: self.unknown.clone(),
            ..Default::default()
        };

        if self.notifiers.is_empty() {
            error!(
                machine = %event.machine,
                check = %event.check,
                "No valid notify system"
            );
            report.no_valid_notifier = true;
            return report;
        }

        let results = join_all(self.notifiers.iter().map(|n| n.notify(event))).await;

        for (notifier, result) in self.notifiers.iter().zip(results) {
            match result {
                Ok(()) => report.delivered.push(notifier.name().to_string()),
                Err(e) => {
                    error!(
                        machine = %event.machine,
                        check = %event.check,
                        channel = notifier.name(),
                        "{}",
                        e
                    );
                    report.failed.push(notifier.name().to_string());
                }
            }
        }

        report
    }
}
