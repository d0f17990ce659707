//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::check::result::STATUS_WARNING;
use crate::check::{CheckResult, NagiosCheckRunner};
use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{validate_plugins, Config, ConfigLoader, TomlConfigLoader};
use crate::error::{ConfigError, NotificationError, Result};
use crate::notification::{NotificationEvent, NotifierRegistry};
use crate::reconciler::Transition;
use crate::scheduler::PollScheduler;
use crate::store::StateStore;
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载并验证配置文件
pub async fn load_config(args: &Args) -> Result<Config> {
    let config_path = args.get_config_path();
    let loader = TomlConfigLoader::new(true);
    let config = loader.load_from_file(&config_path).await?;
    info!("配置加载完成，主机数量: {}", config.machines.len());
    Ok(config)
}

/// 初始化状态库并构建调度器
async fn build_scheduler(config: &Config) -> Result<PollScheduler> {
    if let Err(e) = validate_plugins(&config.global) {
        warn!("{}", e);
    }

    let store = StateStore::from_config(&config.global);
    store.init().await?;

    let registry = NotifierRegistry::from_config(&config.alerting);
    let runner = Arc::new(NagiosCheckRunner::from_config(&config.global));

    Ok(PollScheduler::new(config, runner, store, &registry))
}

/// 单轮轮询命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config = load_config(args).await?;
        let scheduler = build_scheduler(&config).await?;

        info!("{} starts", crate::APP_NAME);
        let summary = scheduler.run_pass().await;
        info!("{} ends", crate::APP_NAME);

        if summary.store_errors > 0 {
            warn!("{} 次检测因状态存储不可用被跳过", summary.store_errors);
        }
        Ok(())
    }
}

/// 持续轮询命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let mut config = load_config(args).await?;

        // 应用命令行参数覆盖
        if let Commands::Start { interval, workers } = &args.command {
            if let Some(interval_secs) = interval {
                config.global.check_interval_seconds = *interval_secs;
            }
            if let Some(workers) = workers {
                config.global.workers = *workers;
            }
        }

        let scheduler = build_scheduler(&config).await?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("收到中断信号，正在停止轮询...");
            let _ = shutdown_tx.send(());
        });

        info!(
            "轮询已启动，间隔 {} 秒，并发 {}",
            config.global.check_interval_seconds, config.global.workers
        );
        scheduler.run_forever(shutdown_rx).await;
        info!("轮询已停止");
        Ok(())
    }
}

/// 等待 Ctrl-C 或 SIGTERM
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(err) = result {
                            error!("监听中断信号失败: {}", err);
                        }
                    }
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(err) => error!("监听 SIGTERM 失败: {}", err),
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("监听中断信号失败: {}", err);
    }
}

/// 初始化状态库命令
pub struct InitDbCommand;

#[async_trait]
impl Command for InitDbCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config = load_config(args).await?;
        let store = StateStore::from_config(&config.global);
        store.init().await?;
        println!("状态数据库已就绪: {}", store.path().display());
        Ok(())
    }
}

/// 问题记录查询命令
pub struct StatusCommand;

#[async_trait]
impl Command for StatusCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let format = match &args.command {
            Commands::Status { format } => *format,
            _ => OutputFormat::Text,
        };

        let config = load_config(args).await?;
        let store = StateStore::from_config(&config.global);
        store.init().await?;
        let problems = store.connect().await?.list_problems().await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&problems)?);
            }
            OutputFormat::Text => {
                if problems.is_empty() {
                    println!("✓ 所有检测正常");
                    return Ok(());
                }
                println!("当前问题 ({}):", problems.len());
                for record in &problems {
                    let since = Local
                        .timestamp_opt(record.mtime, 0)
                        .single()
                        .map(|t| t.format("%Y/%m/%d %H:%M").to_string())
                        .unwrap_or_else(|| record.mtime.to_string());
                    println!(
                        "  {}!{}  {} ({})  自 {}",
                        record.machine,
                        record.check,
                        crate::check::status_label(record.status),
                        record.status,
                        since
                    );
                }
            }
        }
        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let verbose = matches!(args.command, Commands::Validate { verbose: true });
        let config_path = args.get_config_path();
        self.validate_config_file(args, &config_path, verbose).await
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, args: &Args, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let config = load_config(args).await?;
        println!("✓ 配置文件验证通过");
        println!("✓ 找到 {} 台主机", config.machines.len());

        let plugins = validate_plugins(&config.global);
        match &plugins {
            Ok(()) => println!("✓ 检测插件可用: {}", config.global.nagios_check_path.display()),
            Err(e) => println!("✗ {e}"),
        }

        let registry = NotifierRegistry::from_config(&config.alerting);
        for machine in &config.machines {
            let channels = registry.resolve(&machine.notifiers);
            if channels.is_empty() {
                println!("✗ {} 没有可用的通知渠道", machine.name);
            } else if !channels.unknown().is_empty() {
                println!(
                    "! {} 的通知渠道不可用: {}",
                    machine.name,
                    channels.unknown().join(", ")
                );
            }

            if verbose {
                println!("  {} ({}:{})", machine.name, machine.host(), machine.port());
                println!("     检测: {}", machine.checks.join(", "));
                println!("     通知: {}", channels.names().join(", "));
            }
        }

        if verbose {
            println!("全局配置:");
            println!("  检测超时: {}秒", config.global.check_timeout_seconds);
            println!("  并发主机数: {}", config.global.workers);
            println!("  轮询间隔: {}秒", config.global.check_interval_seconds);
            println!("  状态文件: {}", config.global.state_file.display());
        }

        plugins.map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 配置模板命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, Self::template()).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加您的主机");
        Ok(())
    }

    /// 配置模板内容
    pub fn template() -> &'static str {
        include_str!("../../demos/nrpe-vitals.toml")
    }
}

/// 测试通知命令
pub struct TestNotificationCommand;

#[async_trait]
impl Command for TestNotificationCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::TestNotification {
            machine,
            check,
            message,
            notifier,
        } = &args.command
        else {
            return Ok(());
        };

        let config = load_config(args).await?;
        let registry = NotifierRegistry::from_config(&config.alerting);
        let names = if notifier.is_empty() {
            registry.names()
        } else {
            notifier.clone()
        };

        let result = CheckResult::new(machine.clone(), check.clone(), STATUS_WARNING, message.clone());
        let event =
            NotificationEvent::from_result(&result, Transition::NewProblem { status: STATUS_WARNING });

        let report = registry.resolve(&names).dispatch(&event).await;
        for name in &report.delivered {
            println!("✓ {name}");
        }
        for name in report.failed.iter().chain(report.unknown.iter()) {
            println!("✗ {name}");
        }

        if report.delivered.is_empty() {
            return Err(NotificationError::NotConfigured(names.join(", ")).into());
        }
        Ok(())
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let format = match &args.command {
            Commands::Version { format } => *format,
            _ => OutputFormat::Text,
        };

        match format {
            OutputFormat::Json => {
                let version_info = serde_json::json!({
                    "name": crate::APP_NAME,
                    "version": crate::VERSION,
                    "description": crate::APP_DESCRIPTION
                });
                println!("{}", serde_json::to_string_pretty(&version_info)?);
            }
            OutputFormat::Text => {
                println!("{} v{}", crate::APP_NAME, crate::VERSION);
                println!("{}", crate::APP_DESCRIPTION);
            }
        }
        Ok(())
    }
}

/// 根据子命令选择处理器
pub fn command_for(args: &Args) -> Box<dyn Command> {
    match &args.command {
        Commands::Run => Box::new(RunCommand),
        Commands::Start { .. } => Box::new(StartCommand),
        Commands::InitDb => Box::new(InitDbCommand),
        Commands::Status { .. } => Box::new(StatusCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::TestNotification { .. } => Box::new(TestNotificationCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    }
}

/// 子命令是否需要读取配置文件
pub fn needs_config(command: &Commands) -> bool {
    !matches!(command, Commands::Init { .. } | Commands::Version { .. })
}
