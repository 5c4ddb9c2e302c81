//! 日志初始化.
//!
//! 控制台输出加可选的按天滚动日志文件. 库 crate 通过 `log` 门面输出,
//! 订阅器初始化时会把 `log` 记录桥接到 tracing.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 过滤表达式, 与 `RUST_LOG` 语法相同, 例如 `info,zhen_codec=debug`
    pub level: String,
    /// 日志文件目录, 为空时只输出到控制台
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// 控制台输出是否带颜色
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_file_prefix() -> String {
    "zhen".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: default_file_prefix(),
            ansi: true,
        }
    }
}

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// 安装全局订阅器, 进程内只能成功调用一次
pub fn init(config: &LoggingConfig) -> Result<()> {
    let console_filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("日志级别无效, level={}", config.level))?;
    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(true)
        .with_filter(console_filter);

    let file_layer = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("创建日志目录失败, path={}", directory.display()))?;
            let appender = tracing_appender::rolling::daily(directory, log_file_stem(&config.file_prefix));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            LOG_GUARD.set(guard).ok();
            let file_filter = EnvFilter::try_new(&config.level)
                .with_context(|| format!("日志级别无效, level={}", config.level))?;
            Some(
                fmt::Layer::default()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("日志系统已初始化")?;
    tracing::debug!(level = %config.level, directory = ?config.directory, "日志系统初始化完成");
    Ok(())
}

/// 滚动文件名前缀: `<prefix>.log`, 滚动后追加 `.YYYY-MM-DD`
pub(crate) fn log_file_stem(prefix: &str) -> String {
    format!("{}.log", prefix)
}

/// 目录下属于指定前缀的日志文件
pub fn log_files(directory: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let stem = log_file_stem(prefix);
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)
        .with_context(|| format!("读取日志目录失败, path={}", directory.display()))?
    {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&stem));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
