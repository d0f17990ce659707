//! NRPE Vitals 主程序入口
//!
//! 基于状态转换告警的 NRPE 主机监控工具

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use nrpe_vitals::cli::args::Args;
use nrpe_vitals::cli::{command_for, needs_config};
use nrpe_vitals::config::{ConfigLoader, TomlConfigLoader};
use nrpe_vitals::logging::{parse_level, LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: resolve_log_level(&args).await,
        console: args.log_file.is_none(),
        file_path: args.log_file.clone(),
        json_format: args.json_logs,
        ..Default::default()
    };
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("NRPE Vitals v{} 启动", nrpe_vitals::VERSION);

    // 执行命令
    if let Err(e) = command_for(&args).execute(&args).await {
        error!("命令执行失败: {}", e);
        eprintln!("错误: {e}");
        std::process::exit(1);
    }

    Ok(())
}

/// 命令行优先，其次是配置文件中的 log_level
async fn resolve_log_level(args: &Args) -> LevelFilter {
    if let Some(level) = args.log_level {
        return level.into();
    }
    if !needs_config(&args.command) {
        return LevelFilter::Info;
    }

    // 配置错误在命令执行时报告
    TomlConfigLoader::new(true)
        .load_from_file(args.get_config_path())
        .await
        .ok()
        .and_then(|config| parse_level(&config.global.log_level))
        .unwrap_or(LevelFilter::Info)
}
