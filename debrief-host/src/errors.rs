//! ホスト環境のエラー型

use thiserror::Error;

/// ホスト環境の操作で発生するエラー
#[derive(Debug, Error)]
pub enum HostError {
    /// 識別子がホスト環境に束縛されていない
    #[error("entity `{0}` is not bound in the host environment")]
    EntityMissing(String),

    /// 識別子は存在するが呼び出し可能ではない
    #[error("entity `{0}` is not callable")]
    NotCallable(String),

    /// 識別子は存在するが変数ではない
    #[error("entity `{0}` is not a variable")]
    NotAVariable(String),

    /// スロットに既にインターセプタが取り付けられている
    #[error("an interceptor is already installed on `{0}`")]
    InterceptorBusy(String),

    /// 取り外すべきインターセプタが存在しない（ハンドルが古い）
    #[error("no matching interceptor installed on `{0}`")]
    NoInterceptor(String),

    /// 未定義のイベント名
    #[error("event `{0}` is not defined")]
    UnknownEvent(String),

    /// 対象のオブザーバが見つからない
    #[error("no matching observer on `{0}`")]
    NoObserver(String),
}
