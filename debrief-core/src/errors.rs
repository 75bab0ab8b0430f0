//! レジストリ操作のエラー型

use debrief_host::HostError;
use thiserror::Error;

/// ターゲット登録・操作で発生するエラー
///
/// このコアで発生するエラーはどれもプロセス致命ではありません。
/// フィールド単位の検証失敗はエラーにならず、警告ログ＋既定値で
/// 処理が続行されます（`sanitize` 参照）。
#[derive(Debug, Error)]
pub enum DebriefError {
    /// ターゲット識別子が不正（登録全体が中断される唯一の検証失敗）
    #[error("invalid target identifier: {0:?}")]
    Validation(String),

    /// 正規化後のターゲットが登録IDと一致しない
    #[error("sanitized target `{actual}` does not match registration id `{expected}`")]
    TargetMismatch { expected: String, actual: String },

    /// 未登録のターゲット
    #[error("unknown target `{0}`")]
    UnknownTarget(String),

    /// 未知または空のグループ
    #[error("unknown or empty group `{0}`")]
    UnknownGroup(String),

    /// ホスト環境のエラー
    #[error(transparent)]
    Host(#[from] HostError),

    /// 永続化の失敗
    #[error("persistence failed: {0}")]
    Persistence(String),
}
