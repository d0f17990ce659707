//! 配置数据结构定义
//!
//! 定义全局参数、告警凭据和被监控主机的配置结构体以及验证逻辑

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 主配置结构，包含全局配置、告警凭据和主机列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    pub global: GlobalConfig,
    /// 告警渠道凭据
    #[serde(default)]
    pub alerting: AlertingConfig,
    /// 被监控主机列表（保持配置文件中的顺序）
    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 存放 check_nrpe / check_ping 插件的目录
    #[serde(default = "default_nagios_check_path")]
    pub nagios_check_path: PathBuf,
    /// 单次检测的硬超时（秒）
    #[serde(default = "default_check_timeout")]
    pub check_timeout_seconds: u64,
    /// ping 告警延迟阈值（毫秒）
    #[serde(default = "default_ping_latency_warn")]
    pub ping_latency_warn_ms: u32,
    /// ping 告警丢包阈值（百分比）
    #[serde(default = "default_ping_loss_warn")]
    pub ping_loss_warn_percent: u32,
    /// ping 严重延迟阈值（毫秒）
    #[serde(default = "default_ping_latency_crit")]
    pub ping_latency_crit_ms: u32,
    /// ping 严重丢包阈值（百分比）
    #[serde(default = "default_ping_loss_crit")]
    pub ping_loss_crit_percent: u32,
    /// 每次 ping 发送的包数
    #[serde(default = "default_ping_packets")]
    pub ping_packets: u32,
    /// 并行检测的主机数
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 状态数据库文件路径
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// 守护模式下的轮询间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// SQLite 锁等待时间（毫秒）
    #[serde(default = "default_store_busy_timeout")]
    pub store_busy_timeout_ms: u64,
    /// 锁竞争时的重试次数
    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: u32,
    /// 重试的初始退避间隔（毫秒）
    #[serde(default = "default_store_retry_delay")]
    pub store_retry_delay_ms: u64,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            nagios_check_path: default_nagios_check_path(),
            check_timeout_seconds: default_check_timeout(),
            ping_latency_warn_ms: default_ping_latency_warn(),
            ping_loss_warn_percent: default_ping_loss_warn(),
            ping_latency_crit_ms: default_ping_latency_crit(),
            ping_loss_crit_percent: default_ping_loss_crit(),
            ping_packets: default_ping_packets(),
            workers: default_workers(),
            state_file: default_state_file(),
            check_interval_seconds: default_check_interval(),
            store_busy_timeout_ms: default_store_busy_timeout(),
            store_retry_attempts: default_store_retry_attempts(),
            store_retry_delay_ms: default_store_retry_delay(),
            log_level: default_log_level(),
        }
    }
}

impl GlobalConfig {
    /// 单次检测的超时时间，即传给插件的 `-t`
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_seconds)
    }

    /// 进程级硬超时，比插件自身超时多出 `TIMEOUT_GRACE`
    pub fn hard_timeout(&self) -> Duration {
        self.check_timeout() + TIMEOUT_GRACE
    }
}

/// 告警渠道凭据，每个渠道都是可选的
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertingConfig {
    /// Pushover 推送
    pub pushover: Option<PushoverConfig>,
    /// 邮件
    pub mail: Option<MailConfig>,
    /// Twilio 短信
    pub twilio: Option<TwilioConfig>,
}

/// Pushover 凭据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushoverConfig {
    pub token: String,
    pub user: String,
    #[serde(default = "default_pushover_api_url")]
    pub api_url: String,
}

/// 邮件配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailConfig {
    pub from: String,
    pub to: String,
    /// SMTP 中继地址（不加密，通常为 localhost）
    #[serde(default = "default_mail_server")]
    pub server: String,
}

/// Twilio 凭据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub sender: String,
    /// 目标号码，不带前导 "+"
    pub dest: String,
    pub api_url: String,
}

/// 单台被监控主机
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineConfig {
    /// 主机名（同时作为状态表中的 machine 键）
    pub name: String,
    /// 按顺序执行的检测列表
    #[serde(default)]
    pub checks: Vec<String>,
    /// 通知渠道名称
    #[serde(default)]
    pub notifiers: Vec<String>,
    /// 可选的连接地址覆盖
    pub connection: Option<ConnectionConfig>,
}

/// 连接地址覆盖
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    pub ip: String,
    #[serde(default = "default_nrpe_port")]
    pub port: String,
}

impl MachineConfig {
    /// 实际连接的主机地址
    pub fn host(&self) -> &str {
        self.connection
            .as_ref()
            .map(|c| c.ip.as_str())
            .unwrap_or(&self.name)
    }

    /// 实际连接的 NRPE 端口
    pub fn port(&self) -> &str {
        self.connection
            .as_ref()
            .map(|c| c.port.as_str())
            .unwrap_or(DEFAULT_NRPE_PORT)
    }
}

/// NRPE 默认端口
pub const DEFAULT_NRPE_PORT: &str = "5666";

/// 可达性检测的保留名称
pub const PING_CHECK: &str = "ping";

/// 插件超时之外的宽限时间
pub const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

// 默认值函数
fn default_nagios_check_path() -> PathBuf {
    PathBuf::from("/usr/local/libexec/nagios")
}
fn default_check_timeout() -> u64 {
    30
}
fn default_ping_latency_warn() -> u32 {
    100
}
fn default_ping_loss_warn() -> u32 {
    20
}
fn default_ping_latency_crit() -> u32 {
    500
}
fn default_ping_loss_crit() -> u32 {
    60
}
fn default_ping_packets() -> u32 {
    5
}
fn default_workers() -> usize {
    4
}
fn default_state_file() -> PathBuf {
    PathBuf::from("/var/db/nrpe-vitals.sqlite")
}
fn default_check_interval() -> u64 {
    300
}
fn default_store_busy_timeout() -> u64 {
    5000
}
fn default_store_retry_attempts() -> u32 {
    5
}
fn default_store_retry_delay() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_pushover_api_url() -> String {
    "https://api.pushover.net/1/messages.json".to_string()
}
fn default_mail_server() -> String {
    "localhost".to_string()
}
fn default_nrpe_port() -> String {
    DEFAULT_NRPE_PORT.to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.global.workers == 0 {
        return Err("并行检测数不能为0".to_string());
    }

    if config.global.check_timeout_seconds == 0 {
        return Err("检测超时时间不能为0".to_string());
    }

    if config.global.check_interval_seconds == 0 {
        return Err("轮询间隔不能为0".to_string());
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    if config.machines.is_empty() {
        return Err("至少需要配置一台主机".to_string());
    }

    let mut seen = HashSet::new();
    for machine in &config.machines {
        if machine.name.trim().is_empty() {
            return Err("主机名称不能为空".to_string());
        }

        if !seen.insert(machine.name.as_str()) {
            return Err(format!("主机 {} 重复配置", machine.name));
        }

        if machine.checks.iter().any(|c| c.trim().is_empty()) {
            return Err(format!("主机 {} 的检测名称不能为空", machine.name));
        }

        // ping 总是先于其他检测执行
        if machine.checks.iter().any(|c| c == PING_CHECK) {
            return Err(format!(
                "主机 {} 的检测列表不能包含保留名称 {}",
                machine.name, PING_CHECK
            ));
        }

        if let Some(ref connection) = machine.connection {
            if connection.ip.trim().is_empty() {
                return Err(format!("主机 {} 的连接地址不能为空", machine.name));
            }
            if connection.port.parse::<u16>().is_err() {
                return Err(format!(
                    "主机 {} 的端口 {} 无效",
                    machine.name, connection.port
                ));
            }
        }
    }

    Ok(())
}

/// 检查检测插件是否存在
///
/// 只在构建真实检测执行器时调用，测试中使用注入的执行器。
pub fn validate_plugins(global: &GlobalConfig) -> Result<(), String> {
    for plugin in ["check_nrpe", "check_ping"] {
        let path = global.nagios_check_path.join(plugin);
        if !Path::new(&path).is_file() {
            return Err(format!("检测插件不存在: {}", path.display()));
        }
    }
    Ok(())
}
