//! ログ境界
//!
//! 出力先・整形・履歴保持はコアの関心外です。コアは `Logger` トレイトを
//! 呼ぶだけで、その内部状態を参照しません。

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

/// ログレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// 文字列表現を取得する
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            _ => Err(()),
        }
    }
}

/// ログの送り先
pub trait Logger {
    /// 1件のログエントリを記録する
    fn log(&self, level: LogLevel, target: Option<&str>, message: &str);
}

/// tracing マクロへ転送するロガー
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, target: Option<&str>, message: &str) {
        let rendered = match target {
            Some(t) => format!("[{}] {}", t, message),
            None => message.to_string(),
        };
        match level {
            LogLevel::Trace => tracing::trace!("{}", rendered),
            LogLevel::Debug => tracing::debug!("{}", rendered),
            LogLevel::Info => tracing::info!("{}", rendered),
            LogLevel::Warn => tracing::warn!("{}", rendered),
            // tracing に fatal はないため error に畳む
            LogLevel::Error | LogLevel::Fatal => tracing::error!("{}", rendered),
        }
    }
}

/// 記録されたログエントリ
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub target: Option<String>,
    pub message: String,
}

/// エントリをメモリに保持するロガー
///
/// テストや組み込み先での検査用です。
pub struct MemoryLogger {
    entries: RefCell<Vec<LogEntry>>,
}

impl MemoryLogger {
    /// 新しいメモリロガーを作成する
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// 記録済みエントリを取得する
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    /// 指定ターゲットのエントリだけを取得する
    pub fn entries_for(&self, target: &str) -> Vec<LogEntry> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.target.as_deref() == Some(target))
            .cloned()
            .collect()
    }

    /// 記録をすべて破棄する
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, target: Option<&str>, message: &str) {
        self.entries.borrow_mut().push(LogEntry {
            level,
            target: target.map(str::to_string),
            message: message.to_string(),
        });
    }
}
