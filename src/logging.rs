// 日志初始化
//
// 控制台输出受 RUST_LOG 控制；WARN 及以上追加写入持久日志文件（认证、连接、传输失败）

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// 默认错误日志文件
pub const DEFAULT_LOG_FILE: &str = "./ssh_error_log.txt";

/// 默认控制台日志级别
pub const DEFAULT_CONSOLE_LEVEL: &str = "info";

/// 日志时间格式
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 错误日志文件路径（追加写入），None 表示不写文件
    pub file: Option<PathBuf>,
    /// 控制台日志级别（RUST_LOG 优先）
    pub console_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            console_level: DEFAULT_CONSOLE_LEVEL.to_string(),
        }
    }
}

/// 以追加方式打开日志文件，必要时创建父目录
pub fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// 初始化日志系统
/// 已有全局 subscriber 时静默跳过
pub fn init(config: &LogConfig) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.console_level));

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(filter);

    let file_layer = match &config.file {
        Some(path) => {
            let log_file = open_log_file(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(log_file))
                    .with_ansi(false)
                    .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
                    .with_target(true)
                    .with_filter(LevelFilter::WARN),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(())
}
