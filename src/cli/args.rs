//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// NRPE Vitals - 基于状态转换的 NRPE 主机监控工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "nrpe-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "NRPE_VITALS_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的 log_level
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "NRPE_VITALS_LOG_LEVEL",
        global = true
    )]
    pub log_level: Option<LogLevel>,

    /// 输出JSON格式日志
    #[arg(long, help = "输出JSON格式日志", global = true)]
    pub json_logs: bool,

    /// 日志文件路径，指定后不再输出到控制台
    #[arg(long, value_name = "FILE", help = "日志文件路径", global = true)]
    pub log_file: Option<PathBuf>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 执行一轮轮询后退出（适合 cron）
    Run,

    /// 按固定间隔持续轮询，直到收到中断信号
    Start {
        /// 轮询间隔（秒），覆盖配置文件
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            help = "轮询间隔（秒）",
            env = "NRPE_VITALS_INTERVAL"
        )]
        interval: Option<u64>,

        /// 并发主机数，覆盖配置文件
        #[arg(short, long, value_name = "COUNT", help = "并发主机数")]
        workers: Option<usize>,
    },

    /// 创建状态数据库表结构
    InitDb,

    /// 列出当前的问题记录
    Status {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate {
        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 生成配置文件模板
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = "nrpe-vitals.toml"
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 发送一条测试通知
    TestNotification {
        /// 主机名
        #[arg(short, long, default_value = "nrpe-vitals.example.com", help = "主机名")]
        machine: String,

        /// 检测名称
        #[arg(long, default_value = "test", help = "检测名称")]
        check: String,

        /// 测试消息内容
        #[arg(long, default_value = "This is a test alert", help = "测试消息内容")]
        message: String,

        /// 通知渠道，未指定时使用全部已配置渠道
        #[arg(short, long, value_delimiter = ',', help = "通知渠道")]
        notifier: Vec<String>,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }
}
