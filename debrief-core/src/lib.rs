//! Debrief 計装コア
//!
//! このクレートは、実行中プログラムの生きたエンティティ（関数・変数・
//! イベント）をデバッグターゲットとして宣言的に管理し、プロセスを
//! 再起動せずに計装を取り付け・取り外しする中核ロジックを提供します。
//! ターゲットレジストリ、アクティベーション判定、インターセプタ生成、
//! 照合エンジンを統合します。

pub mod activation;
pub mod command;
pub mod config;
pub mod engine;
pub mod errors;
pub mod interceptor;
pub mod logger;
pub mod registry;
pub mod sanitize;
pub mod snapshot;

pub use command::Command;
pub use config::{
    AdviceKind, EnabledSpec, FilterFn, GroupId, PredicateFn, RawTargetConfig, TargetConfig,
    TargetId, TargetKind, ValueSpec, DEFAULT_GROUP,
};
pub use errors::DebriefError;
pub use logger::{LogEntry, LogLevel, Logger, MemoryLogger, TracingLogger};
pub use registry::{ErrorHandlerFn, Registry};
pub use sanitize::sanitize;
pub use snapshot::{PersistedConfig, Snapshot, SnapshotStore};

// 他のクレートから使用するために再エクスポート
pub use debrief_host::{HostEnv, HostError, HostFn, Value};

/// コア操作の結果型
pub type Result<T> = std::result::Result<T, DebriefError>;
