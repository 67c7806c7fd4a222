//! Quill - leveled console logging
//!
//! Small stderr logger shared by the hemograph crates. Every message gets a
//! colored, fixed-width level tag so interleaved pipeline output stays
//! readable. Verbose output is opt-in through `QUILL_VERBOSE`.
//!
//! Standard levels: `info()`, `warn()`, `error()`, `debug()`, `success()`,
//! `verbose()`. Timestamped variants: `event()`.

use chrono::Local;
use colored::*;

/// Severity levels understood by quill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Verbose,
  Info,
  Warn,
  Error,
  Debug,
  Success,
}

impl Level {
  fn tag(self) -> &'static str {
    match self {
      Level::Verbose => "verb",
      Level::Info => "info",
      Level::Warn => "warn",
      Level::Error => "err!",
      Level::Debug => "dbug",
      Level::Success => "done",
    }
  }

  fn color(self) -> Color {
    match self {
      Level::Verbose => Color::Cyan,
      Level::Info => Color::Blue,
      Level::Warn => Color::Yellow,
      Level::Error => Color::Red,
      Level::Debug => Color::Magenta,
      Level::Success => Color::Green,
    }
  }
}

/// Write a raw line (or lines) to stderr
pub fn log(message: &str) {
  for line in message.lines() {
    eprintln!("{line}");
  }
}

fn prefix(level: Level) -> String {
  format!("[{}]", level.tag().color(level.color()).bold())
}

/// Log a message at the given level, one tagged line per input line
pub fn emit(level: Level, message: &str) {
  if level == Level::Verbose && !verbose_enabled() {
    return;
  }
  let prefix = prefix(level);
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

/// Log a message with a timestamp, for long-running batch operations
pub fn event(level: Level, message: &str) {
  let stamp = Local::now().format("%H:%M:%S").to_string();
  let prefix = format!("{} [{}]", prefix(level), stamp.cyan());
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

fn verbose_enabled() -> bool {
  std::env::var("QUILL_VERBOSE").map(|v| v != "0" && !v.is_empty()).unwrap_or(false)
}

/// Info level - general pipeline progress
pub fn info(message: &str) {
  emit(Level::Info, message);
}

/// Warn level - something was absorbed or degraded
pub fn warn(message: &str) {
  emit(Level::Warn, message);
}

/// Error level - something failed
pub fn error(message: &str) {
  emit(Level::Error, message);
}

/// Debug level - diagnostic detail
pub fn debug(message: &str) {
  emit(Level::Debug, message);
}

/// Success level - a stage completed
pub fn success(message: &str) {
  emit(Level::Success, message);
}

/// Verbose level - per-item detail, gated by QUILL_VERBOSE
pub fn verbose(message: &str) {
  emit(Level::Verbose, message);
}

#[macro_export]
macro_rules! info {
  ($msg:expr) => {
    $crate::info($msg);
  };
}

#[macro_export]
macro_rules! warn {
  ($msg:expr) => {
    $crate::warn($msg);
  };
}

#[macro_export]
macro_rules! error {
  ($msg:expr) => {
    $crate::error($msg);
  };
}

#[macro_export]
macro_rules! debug {
  ($msg:expr) => {
    $crate::debug($msg);
  };
}

#[macro_export]
macro_rules! success {
  ($msg:expr) => {
    $crate::success($msg);
  };
}

#[macro_export]
macro_rules! verbose {
  ($msg:expr) => {
    $crate::verbose($msg);
  };
}
