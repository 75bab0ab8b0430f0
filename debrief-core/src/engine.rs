//! 計装エンジン（照合アルゴリズム）
//!
//! 望まれる論理状態と物理的に取り付け済みの計装を一致させます。
//! 照合は種別ごとに分岐し、失敗はすべてログに落として決して送出
//! しません。計装の劣化は許容し、ホストプログラム本来の動作は
//! 決して妨げない、が原則です。

use crate::activation::{is_active, with_guard};
use crate::config::{EnabledSpec, TargetConfig, TargetKind};
use crate::interceptor;
use crate::logger::LogLevel;
use crate::registry::RegistryState;
use debrief_host::{HostError, Value};
use std::rc::Rc;

/// 計装エンジン
pub struct Engine {
    state: Rc<RegistryState>,
}

impl Engine {
    pub(crate) fn new(state: Rc<RegistryState>) -> Self {
        Self { state }
    }

    /// 1ターゲットを照合する
    ///
    /// 未登録IDは何もしません。照合中のホスト失敗（未束縛エンティティ、
    /// 取り付け・取り外しの失敗）はログに記録され、設定は保持されます。
    /// 自動再試行はなく、後から手動の `refresh_all` で回復できます。
    pub(crate) fn reconcile(&self, id: &str) {
        let config = match self.state.config(id) {
            Some(config) => config,
            None => return,
        };
        match config.kind {
            TargetKind::Call => self.reconcile_call(&config),
            TargetKind::Variable => self.reconcile_variable(&config),
            TargetKind::Event => self.reconcile_event(&config),
        }
    }

    /// 呼び出しターゲットの照合
    ///
    /// 物理的な取り付けの判定は粗いゲート
    /// 「グローバルスイッチ ∧（enabled が述語 ∨ enabled が真）」で行います。
    /// 細かい判定は取り付けたラッパが呼び出しごとにやり直します。
    fn reconcile_call(&self, config: &TargetConfig) {
        let state = &self.state;
        let id = &config.target;

        let desired = state.global_enabled()
            && match &config.enabled {
                // 述語は評価コストを呼び出し時に回し、ここでは常に取り付ける
                EnabledSpec::Predicate(_) => true,
                EnabledSpec::Literal(b) => *b,
            };
        let installed = state.call_handle(id).is_some();

        if desired && !installed {
            let wrapper = interceptor::build_call_wrapper(state, id);
            match state.host().install_interceptor(id, wrapper) {
                Ok(handle) => state.set_call_handle(id, handle),
                Err(HostError::EntityMissing(_)) => state.log_plain(
                    LogLevel::Warn,
                    Some(id),
                    "target is not bound in the host; reconcile skipped",
                ),
                Err(err) => state.log_plain(
                    LogLevel::Warn,
                    Some(id),
                    &format!("interceptor install failed: {}", err),
                ),
            }
        } else if !desired && installed {
            if let Some(handle) = state.take_call_handle(id) {
                if let Err(err) = state.host().remove_interceptor(&handle) {
                    // 論理状態と物理状態の不整合は許容し、ログで可視化する
                    state.log_plain(
                        LogLevel::Warn,
                        Some(id),
                        &format!("interceptor detach failed: {}", err),
                    );
                }
            }
        }
    }

    /// 変数ターゲットの照合
    ///
    /// アクティブ遷移：元値を冪等に捕獲してからアクティブ値を設定し、
    /// 必要ならオブザーバを取り付けます。非アクティブ遷移：捕獲済みの
    /// 元値が常に優先して正確に復元され、無ければ `values` の非アクティブ側、
    /// それも無ければ真偽値変数のみ `false` に落とします。真偽値でもなく
    /// `values` も無い場合は値に触れません（文書化済みの挙動）。
    fn reconcile_variable(&self, config: &TargetConfig) {
        let state = &self.state;
        let id = &config.target;

        if is_active(state.global_enabled(), config) {
            let current = match state.host().read_var(id) {
                Ok(value) => value,
                Err(err) => {
                    state.log_plain(
                        LogLevel::Warn,
                        Some(id),
                        &format!("variable reconcile skipped: {}", err),
                    );
                    return;
                }
            };

            // 捕獲は冪等：既に捕獲済みの間は決して上書きしない
            state.capture_original(id, &current);

            // 既に目標値なら書き込まない。アクティブなまま再照合しても
            // オブザーバへ無変更の通知が流れないようにするため。
            if let Some((active_value, _)) = &config.values {
                let value = with_guard(|| active_value.resolve());
                if value != current {
                    self.write_logged(id, value);
                }
            } else if current.is_bool() && current != Value::Bool(true) {
                self.write_logged(id, Value::Bool(true));
            }
            // values が無く真偽値でもない変数は値をそのまま残す

            self.reconcile_observer(config, true);
        } else {
            // 復元書き込みを自分自身へ通知しないよう、先にオブザーバを外す
            self.reconcile_observer(config, false);

            if let Some(original) = state.take_original(id) {
                // 本物の捕獲値は values の非アクティブ側より優先される
                self.write_logged(id, original);
            } else if let Some((_, inactive_value)) = &config.values {
                let value = with_guard(|| inactive_value.resolve());
                self.write_logged(id, value);
            } else {
                match state.host().read_var(id) {
                    Ok(value) if value.is_bool() => self.write_logged(id, Value::Bool(false)),
                    // 真偽値でなく values も無ければ触れない
                    Ok(_) => {}
                    Err(err) => state.log_plain(
                        LogLevel::Warn,
                        Some(id),
                        &format!("variable reconcile skipped: {}", err),
                    ),
                }
            }
        }
    }

    /// 変数への書き込み（失敗はログのみ）
    fn write_logged(&self, id: &str, value: Value) {
        if let Err(err) = self.state.host().write_var(id, value) {
            self.state.log_plain(
                LogLevel::Warn,
                Some(id),
                &format!("variable write failed: {}", err),
            );
        }
    }

    /// 変更オブザーバの取り付け状態を望まれる状態に合わせる
    ///
    /// `watch` と `break_on_change` のどちらかが立っていれば、アクティブな
    /// 間だけオブザーバを取り付けます。
    fn reconcile_observer(&self, config: &TargetConfig, active: bool) {
        let state = &self.state;
        let id = &config.target;

        let desired = active && (config.watch || config.break_on_change);
        let attached = state.watch_handle(id).is_some();

        if desired && !attached {
            let observer = interceptor::build_variable_observer(state, id);
            match state.host().add_observer(id, observer) {
                Ok(handle) => state.set_watch_handle(id, handle),
                Err(err) => state.log_plain(
                    LogLevel::Warn,
                    Some(id),
                    &format!("observer attach failed: {}", err),
                ),
            }
        } else if !desired && attached {
            if let Some(handle) = state.take_watch_handle(id) {
                if let Err(err) = state.host().remove_observer(&handle) {
                    state.log_plain(
                        LogLevel::Warn,
                        Some(id),
                        &format!("observer detach failed: {}", err),
                    );
                }
            }
        }
    }

    /// イベントターゲットの照合
    ///
    /// 監視集合への出し入れを行い、共有ディスパッチインターセプタの
    /// 取り付け状態を同期します。
    fn reconcile_event(&self, config: &TargetConfig) {
        let id = &config.target;
        if is_active(self.state.global_enabled(), config) {
            self.state.monitored_insert(id);
        } else {
            self.state.monitored_remove(id);
        }
        self.sync_dispatch();
    }

    /// 共有ディスパッチインターセプタの取り付け状態を再評価する
    ///
    /// 「フック監視の全体有効 ∧ 監視集合が空でない」ときに限り
    /// 取り付けられます。
    pub(crate) fn sync_dispatch(&self) {
        let state = &self.state;
        let desired = state.hook_monitoring() && !state.monitored_is_empty();
        let installed = state.host().has_dispatch_interceptor();

        if desired && !installed {
            state
                .host()
                .install_dispatch_interceptor(interceptor::build_dispatch_interceptor(state));
        } else if !desired && installed {
            state.host().remove_dispatch_interceptor();
        }
    }
}
