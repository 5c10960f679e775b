use slog::o;
use slog::Drain;
use slog::Level;
use slog::LevelFilter;
#[cfg(all(target_os = "linux", feature = "journald"))]
use slog_journald::JournaldDrain;
#[cfg(feature = "syslog")]
use slog_syslog::Facility;

use std::fs::OpenOptions;
use std::path::PathBuf;

use super::error::Result;
use crate::app_config::{AppConfig, LogConfig};

const LOG_FILE_NAME: &str = "datasync.log";

pub fn setup_logging() -> Result<slog_scope::GlobalLoggerGuard> {
    let log_config = AppConfig::get::<LogConfig>("log").ok();
    let level = log_config
        .as_ref()
        .map(|c| parse_level(&c.level))
        .unwrap_or(Level::Info);

    // Setup Logging
    let guard = slog_scope::set_global_logger(root_logger(level, log_config.as_ref())?);
    slog_stdlog::init_with_level(to_log_level(level))?;

    Ok(guard)
}

pub fn default_root_logger() -> Result<slog::Logger> {
    root_logger(Level::Info, None)
}

fn root_logger(level: Level, log_config: Option<&LogConfig>) -> Result<slog::Logger> {
    // Create terminal drain for stdout output
    let term_drain = default_term_drain().unwrap_or(default_discard()?);

    // Create file drain for file output
    let log_dir = log_config.and_then(|c| c.dir.clone()).map(PathBuf::from);
    let file_drain = default_file_drain(log_dir).unwrap_or(default_discard()?);

    // Combine terminal and file drains
    let drain = slog::Duplicate(term_drain, file_drain).fuse();

    // Merge additional drains based on features
    #[cfg(feature = "syslog")]
    let drain = slog::Duplicate(default_syslog_drain().unwrap_or(default_discard()?), drain).fuse();
    #[cfg(feature = "journald")]
    #[cfg(target_os = "linux")]
    let drain = slog::Duplicate(
        default_journald_drain().unwrap_or(default_discard()?),
        drain,
    )
    .fuse();

    let drain = LevelFilter::new(drain, level).fuse();

    Ok(slog::Logger::root(drain, o!("app" => "datasync")))
}

/// 将配置中的日志级别字符串转换为slog级别，未知值按info处理
pub fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" | "warning" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

fn to_log_level(level: Level) -> log::Level {
    match level {
        Level::Trace => log::Level::Trace,
        Level::Debug => log::Level::Debug,
        Level::Info => log::Level::Info,
        Level::Warning => log::Level::Warn,
        Level::Error | Level::Critical => log::Level::Error,
    }
}

fn default_discard() -> Result<slog_async::Async> {
    let drain = slog_async::Async::new(slog::Discard).chan_size(1024).build();

    Ok(drain)
}

// term drain: Log to Terminal
#[cfg(not(feature = "termlog"))]
fn default_term_drain() -> Result<slog_async::Async> {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let term = slog_term::FullFormat::new(plain)
        .use_file_location()
        .use_custom_timestamp(slog_term::timestamp_local);

    let drain = slog_async::Async::new(term.build().fuse())
        .chan_size(1024)
        .build();

    Ok(drain)
}

// term drain: Log to Terminal (colored)
#[cfg(feature = "termlog")]
fn default_term_drain() -> Result<slog_async::Async> {
    let decorator = slog_term::TermDecorator::new().stdout().build();
    let term = slog_term::FullFormat::new(decorator)
        .use_file_location()
        .use_custom_timestamp(slog_term::timestamp_local);

    let drain = slog_async::Async::new(term.build().fuse())
        .chan_size(1024)
        .build();

    Ok(drain)
}

/// 日志文件的完整路径
pub fn log_file_path(log_dir: Option<PathBuf>) -> Result<PathBuf> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };
    Ok(log_dir.join(LOG_FILE_NAME))
}

// file drain: Log to file
fn default_file_drain(log_dir: Option<PathBuf>) -> Result<slog_async::Async> {
    let path = log_file_path(log_dir)?;

    // Create log directory if it doesn't exist
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let decorator = slog_term::PlainSyncDecorator::new(file);
    let formatter = slog_term::FullFormat::new(decorator)
        .use_file_location()
        .use_custom_timestamp(slog_term::timestamp_local)
        .build()
        .fuse();

    let drain = slog_async::Async::new(formatter).chan_size(1024).build();

    Ok(drain)
}

/// 可执行文件所在目录下的logs子目录，失败时退回当前工作目录
fn default_log_dir() -> Result<PathBuf> {
    let mut exe_dir = std::env::current_exe()?;
    exe_dir.pop();

    if !exe_dir.exists() {
        exe_dir = std::env::current_dir()?;
    }

    Ok(exe_dir.join("logs"))
}

// syslog drain: Log to syslog
#[cfg(feature = "syslog")]
fn default_syslog_drain() -> Result<slog_async::Async> {
    let syslog = slog_syslog::unix_3164(Facility::LOG_USER)?;

    let drain = slog_async::Async::new(syslog.fuse()).chan_size(1024).build();

    Ok(drain)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn default_journald_drain() -> Result<slog_async::Async> {
    let journald = JournaldDrain.ignore_res();
    let drain = slog_async::Async::new(journald).chan_size(1024).build();

    Ok(drain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_level("debug"), Level::Debug);
        assert_eq!(parse_level("WARN"), Level::Warning);
        assert_eq!(parse_level("error"), Level::Error);
    }

    #[test]
    fn log_file_lives_in_configured_dir() {
        let path = log_file_path(Some(PathBuf::from("/var/log/datasync"))).unwrap();
        assert_eq!(path, PathBuf::from("/var/log/datasync/datasync.log"));
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("chatty"), Level::Info);
    }
}
