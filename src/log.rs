//! Run log.
//!
//! Every line goes to `~/.trioctl/trioctl.log`. WARN and ERROR are echoed to
//! stderr; with `--debug` (or `TRIOCTL_DEBUG=1`) DEBUG lines are kept and
//! INFO is echoed too.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static ECHO_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn load(cell: &AtomicU8) -> Self {
        match cell.load(Ordering::Relaxed) {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

fn debug_from_env() -> bool {
    std::env::var("TRIOCTL_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Log to the default file under the home directory.
pub fn init_with_debug(debug: bool) {
    let path = dirs::home_dir().map(|h| h.join(".trioctl").join("trioctl.log"));
    init_at(path.as_deref(), debug);
}

/// Log to `path`, or only to stderr when `None`.
pub fn init_at(path: Option<&Path>, debug: bool) {
    let (level, echo) = if debug || debug_from_env() {
        (LogLevel::Debug, LogLevel::Info)
    } else {
        (LogLevel::Info, LogLevel::Warn)
    };
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    ECHO_LEVEL.store(echo as u8, Ordering::SeqCst);

    if let Some(path) = path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        LOG_PATH.set(path.to_path_buf()).ok();
    }
}

pub fn log_at(level: LogLevel, msg: &str) {
    if level > LogLevel::load(&LOG_LEVEL) {
        return;
    }

    if let Some(path) = LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] [{}] {}", timestamp, level.as_str(), msg);
        }
    }

    if level <= LogLevel::load(&ECHO_LEVEL) {
        eprintln!("[{}] {}", level.as_str(), msg);
    }
}

#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! tlog_error {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

/// Recoverable problems; always echoed to stderr.
#[macro_export]
macro_rules! tlog_warn {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

/// Per-task decisions; dropped unless debug mode is on.
#[macro_export]
macro_rules! tlog_debug {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Debug, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! tlog_trace {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Trace, &format!($($arg)*))
    };
}
