//! Debrief ホスト環境プリミティブ
//!
//! このクレートは、計装対象となるホスト環境の低レベル機能を提供します。
//! 呼び出し可能スロット（間接参照テーブル）、変数セルと変更オブザーバ、
//! 名前付きイベントのディスパッチなどを行います。
//! ターゲット設定やアクティベーション判定はこのクレートの関心外です。

pub mod callable;
pub mod env;
pub mod errors;
pub mod event;
pub mod value;
pub mod variable;

pub use callable::{CallWrapper, HostFn, InterceptorHandle};
pub use env::{EntityKind, HostEnv};
pub use errors::HostError;
pub use event::DispatchFn;
pub use value::Value;
pub use variable::{ObserverFn, ObserverHandle};

/// ホスト呼び出しの結果型
///
/// 計装対象の呼び出しが返すエラーは、この型のまま素通しされます。
pub type CallResult = anyhow::Result<Value>;
