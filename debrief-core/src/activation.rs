//! アクティベーション判定と再入ガード
//!
//! ターゲットの計装が「いま有効として振る舞うべきか」を計算します。
//! 判定はインストール時（粗い最適化）と呼び出し時（常にこちらが正）の
//! 2回行われ、両者が食い違うことは設計上許容されます。
//!
//! 述語・フィルタ・ロガー呼び出しなど Debrief 内部の評価は、すべて
//! 再入ガード下で実行します。ガード下で別の計装エンティティに触れても、
//! 入れ子の判定が即座に非アクティブへ短絡するため、再帰は1段で
//! 打ち止めになります。ガードは呼び出しスタックに紐づく値として
//! スレッドローカルに保持します。

use crate::config::{EnabledSpec, TargetConfig};
use std::cell::Cell;

thread_local! {
    static GUARD: Cell<bool> = const { Cell::new(false) };
}

/// 現在ガード下で実行中かどうか
pub fn is_guarded() -> bool {
    GUARD.with(Cell::get)
}

/// ガードを立てたままクロージャを実行する
///
/// 入れ子にしても安全で、パニック時も元の状態へ戻ります。
pub fn with_guard<R>(f: impl FnOnce() -> R) -> R {
    struct Reset(bool);
    impl Drop for Reset {
        fn drop(&mut self) {
            GUARD.with(|g| g.set(self.0));
        }
    }

    let prev = GUARD.with(|g| g.replace(true));
    let _reset = Reset(prev);
    f()
}

/// ターゲットの計装がいま有効かどうかを判定する
///
/// ガード下からの問い合わせは即 `false` を返します。そうでなければ
/// ガード下で 3 条件（グローバルスイッチ・`enabled`・`condition`）の
/// 連言を評価します。
pub fn is_active(global_enabled: bool, config: &TargetConfig) -> bool {
    if is_guarded() {
        return false;
    }

    with_guard(|| {
        if !global_enabled {
            return false;
        }
        let enabled = match &config.enabled {
            EnabledSpec::Literal(b) => *b,
            EnabledSpec::Predicate(p) => p(),
        };
        if !enabled {
            return false;
        }
        match &config.condition {
            Some(condition) => condition(),
            None => true,
        }
    })
}
