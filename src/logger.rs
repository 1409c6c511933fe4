//! Session logger — one log file per run, truncated at launch so it only
//! ever holds the most recent session.
//!
//! Location: `<data dir>/batchpix/batchpix.log`, where the data dir is
//! `%APPDATA%` on Windows, `~/Library/Application Support` on macOS and
//! `$XDG_DATA_HOME` (or `~/.local/share`) elsewhere.
//!
//! Use the `log_info!` / `log_warn!` / `log_err!` macros anywhere in the
//! crate.  `BATCHPIX_LOG=warn|error` raises the threshold; logging failures
//! are always swallowed — the log must never take the application down.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

struct Sink {
    file: Mutex<File>,
    threshold: Level,
    path: PathBuf,
}

static SINK: OnceLock<Sink> = OnceLock::new();

/// Path of the active session log, once `init` has run.
pub fn log_path() -> Option<&'static PathBuf> {
    SINK.get().map(|s| &s.path)
}

/// Append one level-tagged, timestamped line.  No-op below the threshold or
/// before `init`; I/O errors are ignored.
pub fn emit(level: Level, msg: &str) {
    let Some(sink) = SINK.get() else { return };
    if level < sink.threshold {
        return;
    }
    if let Ok(mut file) = sink.file.lock() {
        let _ = writeln!(file, "[{}] [{}] {}", clock(), level.tag(), msg);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Open (truncating) the session log and install a panic hook that mirrors
/// panic messages into it.  Call once at startup; safe to skip in tests.
pub fn init() {
    let path = match base_dir() {
        Some(dir) => dir.join("batchpix").join("batchpix.log"),
        None => return,
    };
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            // Not fatal — run without a log file.
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };

    let threshold = match std::env::var("BATCHPIX_LOG").as_deref() {
        Ok("warn") => Level::Warn,
        Ok("error") => Level::Error,
        _ => Level::Info,
    };

    let _ = SINK.set(Sink { file: Mutex::new(file), threshold, path });

    log_info!("batchpix session started ({})", clock());

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        emit(Level::Error, &format!("PANIC: {info}"));
        prev(info);
    }));
}

fn base_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        return std::env::var("APPDATA").ok().map(PathBuf::from);
    }
    #[cfg(target_os = "macos")]
    {
        return std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library").join("Application Support"));
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var("XDG_DATA_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".local").join("share")))
    }
}

/// Wall-clock HH:MM:SS (UTC) — enough precision for a session log.
fn clock() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
}
