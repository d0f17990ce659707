//! Nagios 插件检测执行器
//!
//! 通过 check_nrpe / check_ping 子进程执行检测，带硬超时

use crate::check::result::{CheckOutcome, CheckResult, STATUS_NRPE_UNREACHABLE, STATUS_UNKNOWN};
use crate::config::{GlobalConfig, MachineConfig, PING_CHECK};
use crate::error::CheckError;
use async_trait::async_trait;
use chrono::Local;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// 检测执行器trait，定义检测接口
#[async_trait]
pub trait CheckRunner: Send + Sync {
    /// 通过 NRPE 执行远端检测
    ///
    /// # 参数
    /// * `check` - 检测名称（远端命令为 `check_<check>`）
    /// * `host` - 连接地址
    /// * `port` - NRPE 端口
    /// * `timeout_duration` - 硬超时
    async fn run_check(
        &self,
        check: &str,
        host: &str,
        port: &str,
        timeout_duration: Duration,
    ) -> Result<CheckOutcome, CheckError>;

    /// 执行可达性检测
    async fn run_ping(
        &self,
        host: &str,
        timeout_duration: Duration,
    ) -> Result<CheckOutcome, CheckError>;
}

/// 基于本地 Nagios 插件的检测执行器
#[derive(Debug, Clone)]
pub struct NagiosCheckRunner {
    /// 插件目录
    check_path: PathBuf,
    /// 插件自身的超时参数（秒）
    plugin_timeout_seconds: u64,
    ping_latency_warn_ms: u32,
    ping_loss_warn_percent: u32,
    ping_latency_crit_ms: u32,
    ping_loss_crit_percent: u32,
    ping_packets: u32,
}

impl NagiosCheckRunner {
    /// 从全局配置创建执行器
    pub fn from_config(global: &GlobalConfig) -> Self {
        Self {
            check_path: global.nagios_check_path.clone(),
            plugin_timeout_seconds: global.check_timeout_seconds,
            ping_latency_warn_ms: global.ping_latency_warn_ms,
            ping_loss_warn_percent: global.ping_loss_warn_percent,
            ping_latency_crit_ms: global.ping_latency_crit_ms,
            ping_loss_crit_percent: global.ping_loss_crit_percent,
            ping_packets: global.ping_packets,
        }
    }

    /// 构建 check_nrpe 命令行
    pub fn nrpe_command(&self, check: &str, host: &str, port: &str) -> (PathBuf, Vec<String>) {
        let program = self.check_path.join("check_nrpe");
        let args = vec![
            "-t".to_string(),
            self.plugin_timeout_seconds.to_string(),
            "-H".to_string(),
            host.to_string(),
            "-c".to_string(),
            format!("check_{check}"),
            "-p".to_string(),
            port.to_string(),
        ];
        (program, args)
    }

    /// 构建 check_ping 命令行
    pub fn ping_command(&self, host: &str) -> (PathBuf, Vec<String>) {
        let program = self.check_path.join("check_ping");
        let args = vec![
            "-t".to_string(),
            self.plugin_timeout_seconds.to_string(),
            "-H".to_string(),
            host.to_string(),
            "-w".to_string(),
            format!(
                "{},{}%",
                self.ping_latency_warn_ms, self.ping_loss_warn_percent
            ),
            "-c".to_string(),
            format!(
                "{},{}%",
                self.ping_latency_crit_ms, self.ping_loss_crit_percent
            ),
            "-p".to_string(),
            self.ping_packets.to_string(),
        ];
        (program, args)
    }

    /// 运行插件子进程并等待结果
    async fn execute(
        &self,
        program: PathBuf,
        args: Vec<String>,
        check: &str,
        host: &str,
        timeout_duration: Duration,
    ) -> Result<CheckOutcome, CheckError> {
        debug!("执行检测插件: {} {}", program.display(), args.join(" "));

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CheckError::RunnerError(format!("{}: {e}", program.display())))?;

        // 超时后 future 被丢弃，kill_on_drop 负责结束子进程
        let output = match timeout(timeout_duration, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CheckError::RunnerError(format!(
                    "{}: {e}",
                    program.display()
                )))
            }
            Err(_) => {
                return Err(CheckError::Timeout {
                    check: check.to_string(),
                    host: host.to_string(),
                })
            }
        };

        let status = output.status.code().unwrap_or(STATUS_UNKNOWN);
        let message = String::from_utf8_lossy(&output.stdout).trim_end().to_string();

        Ok(CheckOutcome::new(status, message))
    }
}

#[async_trait]
impl CheckRunner for NagiosCheckRunner {
    async fn run_check(
        &self,
        check: &str,
        host: &str,
        port: &str,
        timeout_duration: Duration,
    ) -> Result<CheckOutcome, CheckError> {
        let (program, args) = self.nrpe_command(check, host, port);
        let outcome = self
            .execute(program, args, check, host, timeout_duration)
            .await?;

        // check_nrpe 在连接失败时只给出退出码
        if outcome.status == STATUS_NRPE_UNREACHABLE {
            return Err(CheckError::ConnectionRefused {
                check: check.to_string(),
                host: host.to_string(),
            });
        }

        Ok(outcome)
    }

    async fn run_ping(
        &self,
        host: &str,
        timeout_duration: Duration,
    ) -> Result<CheckOutcome, CheckError> {
        let (program, args) = self.ping_command(host);
        self.execute(program, args, PING_CHECK, host, timeout_duration)
            .await
    }
}

/// 对一台主机执行一次检测并生成检测结果
///
/// 超时和连接拒绝被折叠为非零结果，只有插件无法执行时返回错误。
pub async fn execute_check(
    runner: &dyn CheckRunner,
    machine: &MachineConfig,
    check: &str,
    timeout_duration: Duration,
) -> Result<CheckResult, CheckError> {
    let timestamp = Local::now();
    let host = machine.host();
    let port = machine.port();

    let raw = if check == PING_CHECK {
        runner.run_ping(host, timeout_duration).await
    } else {
        runner.run_check(check, host, port, timeout_duration).await
    };

    let outcome = match raw {
        Ok(outcome) => outcome,
        Err(error) => match CheckOutcome::from_error(&error) {
            Some(folded) => {
                debug!("检测错误折叠为结果: {}", error);
                folded
            }
            None => return Err(error),
        },
    };

    Ok(
        CheckResult::new(machine.name.clone(), check, outcome.status, outcome.message)
            .with_endpoint(host, port)
            .with_timestamp(timestamp),
    )
}
