//! ターゲットレジストリ
//!
//! 正規のマップ群（ターゲット→設定、グループ→ターゲット集合、
//! 捕獲済み元値、取り付け済みハンドル、監視中フック集合）を唯一の
//! 所有者として保持し、register / unregister / toggle などの公開 API を
//! 提供します。各公開操作は完了まで走り切る協調的シングルスレッド
//! 実行を前提とするためロックは持ちません。
//!
//! 状態は `Rc<RegistryState>` として取り付け済みインターセプタと
//! 共有されます。ユーザ提供のクロージャを評価する前には必ず内部借用を
//! 解放します。

use crate::activation::{self, is_active};
use crate::config::{
    EnabledSpec, GroupId, RawTargetConfig, TargetConfig, TargetId,
};
use crate::engine::Engine;
use crate::errors::DebriefError;
use crate::logger::{LogLevel, Logger};
use crate::sanitize::sanitize;
use crate::snapshot::{PersistedConfig, Snapshot, SnapshotStore};
use debrief_host::{HostEnv, InterceptorHandle, ObserverHandle, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

/// 計装された呼び出しが送出したエラーのハンドラ
///
/// 引数は (ターゲットID, エラー) です。ハンドラ呼び出し後、エラーは
/// 同一のまま呼び出し元へ再送出されます。
pub type ErrorHandlerFn = Rc<dyn Fn(&str, &anyhow::Error)>;

/// ホストへ取り付けたハンドル
#[derive(Debug, Clone)]
pub(crate) enum InstrumentHandle {
    /// 呼び出しスロットのインターセプタ
    Call(InterceptorHandle),
    /// 変数の変更オブザーバ
    Watch(ObserverHandle),
}

/// レジストリの共有状態
///
/// フィールドの変更はレジストリとエンジンだけが行います。
pub struct RegistryState {
    host: Rc<HostEnv>,
    logger: Rc<dyn Logger>,
    configs: RefCell<HashMap<TargetId, TargetConfig>>,
    groups: RefCell<HashMap<GroupId, BTreeSet<TargetId>>>,
    originals: RefCell<HashMap<TargetId, Value>>,
    installed: RefCell<HashMap<TargetId, InstrumentHandle>>,
    monitored: RefCell<BTreeSet<TargetId>>,
    global_enabled: Cell<bool>,
    hook_monitoring: Cell<bool>,
    error_handler: RefCell<ErrorHandlerFn>,
}

impl RegistryState {
    pub(crate) fn host(&self) -> &HostEnv {
        &self.host
    }

    pub(crate) fn global_enabled(&self) -> bool {
        self.global_enabled.get()
    }

    pub(crate) fn hook_monitoring(&self) -> bool {
        self.hook_monitoring.get()
    }

    /// 設定のスナップショットを取得する
    ///
    /// 述語・フィルタの評価中にマップの借用を持ち越さないよう、
    /// クローンを返します。
    pub(crate) fn config(&self, id: &str) -> Option<TargetConfig> {
        self.configs.borrow().get(id).cloned()
    }

    /// ターゲット向けエントリを記録する
    ///
    /// ターゲットの `min_log_level` が基準レベルより高ければ引き上げます。
    pub(crate) fn log(&self, config: &TargetConfig, base: LogLevel, message: &str) {
        let level = match config.min_log_level {
            Some(min) => base.max(min),
            None => base,
        };
        self.logger.log(level, Some(&config.target), message);
    }

    pub(crate) fn log_plain(&self, level: LogLevel, target: Option<&str>, message: &str) {
        self.logger.log(level, target, message);
    }

    /// 計装された呼び出しのエラーを設定済みハンドラへ渡す
    pub(crate) fn handle_call_error(&self, id: &str, err: &anyhow::Error) {
        let handler = Rc::clone(&self.error_handler.borrow());
        activation::with_guard(|| handler(id, err));
    }

    pub(crate) fn trigger_break(&self, name: &str) {
        self.host.trigger_break(name);
    }

    /// 元値を捕獲する（既に捕獲済みなら上書きしない）
    pub(crate) fn capture_original(&self, id: &str, value: &Value) {
        self.originals
            .borrow_mut()
            .entry(id.to_string())
            .or_insert_with(|| value.clone());
    }

    pub(crate) fn take_original(&self, id: &str) -> Option<Value> {
        self.originals.borrow_mut().remove(id)
    }

    pub(crate) fn call_handle(&self, id: &str) -> Option<InterceptorHandle> {
        match self.installed.borrow().get(id) {
            Some(InstrumentHandle::Call(h)) => Some(h.clone()),
            _ => None,
        }
    }

    pub(crate) fn set_call_handle(&self, id: &str, handle: InterceptorHandle) {
        self.installed
            .borrow_mut()
            .insert(id.to_string(), InstrumentHandle::Call(handle));
    }

    pub(crate) fn take_call_handle(&self, id: &str) -> Option<InterceptorHandle> {
        let mut installed = self.installed.borrow_mut();
        match installed.get(id) {
            Some(InstrumentHandle::Call(_)) => match installed.remove(id) {
                Some(InstrumentHandle::Call(h)) => Some(h),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn watch_handle(&self, id: &str) -> Option<ObserverHandle> {
        match self.installed.borrow().get(id) {
            Some(InstrumentHandle::Watch(h)) => Some(h.clone()),
            _ => None,
        }
    }

    pub(crate) fn set_watch_handle(&self, id: &str, handle: ObserverHandle) {
        self.installed
            .borrow_mut()
            .insert(id.to_string(), InstrumentHandle::Watch(handle));
    }

    pub(crate) fn take_watch_handle(&self, id: &str) -> Option<ObserverHandle> {
        let mut installed = self.installed.borrow_mut();
        match installed.get(id) {
            Some(InstrumentHandle::Watch(_)) => match installed.remove(id) {
                Some(InstrumentHandle::Watch(h)) => Some(h),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn is_monitored(&self, id: &str) -> bool {
        self.monitored.borrow().contains(id)
    }

    pub(crate) fn monitored_insert(&self, id: &str) {
        self.monitored.borrow_mut().insert(id.to_string());
    }

    pub(crate) fn monitored_remove(&self, id: &str) {
        self.monitored.borrow_mut().remove(id);
    }

    pub(crate) fn monitored_is_empty(&self) -> bool {
        self.monitored.borrow().is_empty()
    }
}

/// ターゲットレジストリ
///
/// 明示的な init / teardown ライフサイクルを持つ唯一の所有オブジェクト
/// です。アンビエントなシングルトンは使いません。
pub struct Registry {
    state: Rc<RegistryState>,
    engine: Engine,
    store: RefCell<Option<Rc<dyn SnapshotStore>>>,
    /// 一括登録・ロード中は保存トリガを抑止する
    save_suppressed: Cell<bool>,
}

impl Registry {
    /// 新しいレジストリを作成する
    ///
    /// グローバルスイッチとフック監視は初期状態で無効です。
    pub fn new(host: Rc<HostEnv>, logger: Rc<dyn Logger>) -> Self {
        let default_logger = Rc::clone(&logger);
        let default_handler: ErrorHandlerFn = Rc::new(move |id, err| {
            default_logger.log(
                LogLevel::Error,
                Some(id),
                &format!("instrumented call raised: {}", err),
            );
        });

        let state = Rc::new(RegistryState {
            host,
            logger,
            configs: RefCell::new(HashMap::new()),
            groups: RefCell::new(HashMap::new()),
            originals: RefCell::new(HashMap::new()),
            installed: RefCell::new(HashMap::new()),
            monitored: RefCell::new(BTreeSet::new()),
            global_enabled: Cell::new(false),
            hook_monitoring: Cell::new(false),
            error_handler: RefCell::new(default_handler),
        });
        let engine = Engine::new(Rc::clone(&state));

        Self {
            state,
            engine,
            store: RefCell::new(None),
            save_suppressed: Cell::new(false),
        }
    }

    /// ターゲットを登録する
    ///
    /// 生レコードを正規化して格納し、グループマップを更新してから
    /// 照合（reconcile）します。正規化後のターゲットが `id` と一致しない
    /// 場合は呼び出し側のバグとみなして失敗します。
    pub fn register(&self, id: &str, raw: &RawTargetConfig) -> Result<TargetId, DebriefError> {
        let config = sanitize(&self.state.host, self.state.logger.as_ref(), raw)?;
        if config.target != id {
            return Err(DebriefError::TargetMismatch {
                expected: id.to_string(),
                actual: config.target,
            });
        }

        // 再登録は置き換え前に強制停止して物理状態を畳む
        if self.state.configs.borrow().contains_key(id) {
            self.force_deactivate(id);
            self.remove_group_membership(id);
        }

        self.state
            .groups
            .borrow_mut()
            .entry(config.group.clone())
            .or_default()
            .insert(id.to_string());
        self.state
            .configs
            .borrow_mut()
            .insert(id.to_string(), config);

        self.engine.reconcile(id);
        self.maybe_save();
        Ok(id.to_string())
    }

    /// 生レコード列を順に登録する（宣言的な一括設定）
    ///
    /// 個々のエントリは通常の `register` と同じ経路を通ります。失敗した
    /// エントリは警告ログの上で飛ばされます。保存は最後に1回だけ
    /// 行われます。登録できた件数を返します。
    pub fn register_all(&self, raws: &[RawTargetConfig]) -> usize {
        self.save_suppressed.set(true);
        let mut count = 0;
        for raw in raws {
            let id = raw.target.clone();
            match self.register(&id, raw) {
                Ok(_) => count += 1,
                Err(err) => self.state.log_plain(
                    LogLevel::Warn,
                    None,
                    &format!("bulk registration of `{}` failed: {}", id, err),
                ),
            }
        }
        self.save_suppressed.set(false);
        self.maybe_save();
        count
    }

    /// ターゲットの登録を解除する
    ///
    /// 強制的に非アクティブ化の照合を行ってインターセプタの除去と
    /// 元値の復元を済ませてから、設定・グループ・捕獲値を取り除きます。
    pub fn unregister(&self, id: &str) -> Result<(), DebriefError> {
        if !self.state.configs.borrow().contains_key(id) {
            return Err(DebriefError::UnknownTarget(id.to_string()));
        }

        self.force_deactivate(id);
        self.remove_group_membership(id);
        self.state.configs.borrow_mut().remove(id);
        self.state.originals.borrow_mut().remove(id);
        self.state.installed.borrow_mut().remove(id);
        self.state.monitored.borrow_mut().remove(id);
        self.engine.sync_dispatch();

        self.maybe_save();
        Ok(())
    }

    /// ターゲットの有効状態を反転する
    ///
    /// 現在の実効 `enabled`（述語ならガード下で評価）を否定し、
    /// リテラルとして格納し直します。新しい状態を返します。
    pub fn toggle_target(&self, id: &str) -> Result<bool, DebriefError> {
        let config = self
            .state
            .config(id)
            .ok_or_else(|| DebriefError::UnknownTarget(id.to_string()))?;

        let effective = match &config.enabled {
            EnabledSpec::Literal(b) => *b,
            EnabledSpec::Predicate(p) => {
                let p = Rc::clone(p);
                activation::with_guard(|| p())
            }
        };
        let next = !effective;

        self.store_with_enabled(&config, next);
        self.engine.reconcile(id);
        self.maybe_save();
        Ok(next)
    }

    /// グループ内の全ターゲットをまとめて反転する
    ///
    /// 新しい状態は「全メンバーがアクティブ」の否定です。つまり混在・
    /// 全非アクティブのグループは全アクティブになり、全アクティブの
    /// グループだけが全非アクティブになります。メンバー個別の反転とは
    /// 意図的に異なる2状態トグルです。
    pub fn toggle_group(&self, group: &str) -> Result<bool, DebriefError> {
        let members: Vec<TargetId> = self
            .state
            .groups
            .borrow()
            .get(group)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        if members.is_empty() {
            return Err(DebriefError::UnknownGroup(group.to_string()));
        }

        // 静的フラグではなく完全なアクティベーション判定を使う
        let all_active = members.iter().all(|id| {
            self.state
                .config(id)
                .map(|c| is_active(self.state.global_enabled(), &c))
                .unwrap_or(false)
        });
        let next = !all_active;

        for id in &members {
            if let Some(config) = self.state.config(id) {
                self.store_with_enabled(&config, next);
                self.engine.reconcile(id);
            }
        }
        self.maybe_save();
        Ok(next)
    }

    /// 登録済みの全ターゲットを照合し直す
    ///
    /// 最後に共有フックインターセプタの取り付け状態を1回だけ
    /// 再評価します。照合は物理状態を合わせるだけで、スナップショットに
    /// 載る設定は変わらないため、保存は行いません。
    pub fn refresh_all(&self) {
        let ids: Vec<TargetId> = self.state.configs.borrow().keys().cloned().collect();
        for id in &ids {
            self.engine.reconcile(id);
        }
        self.engine.sync_dispatch();
    }

    /// 指定ターゲットだけを照合し直す
    pub fn reconcile(&self, id: &str) -> Result<(), DebriefError> {
        if !self.state.configs.borrow().contains_key(id) {
            return Err(DebriefError::UnknownTarget(id.to_string()));
        }
        self.engine.reconcile(id);
        Ok(())
    }

    /// グローバルスイッチを設定し、全ターゲットを照合し直す
    pub fn set_global_enabled(&self, on: bool) {
        self.state.global_enabled.set(on);
        self.state.log_plain(
            LogLevel::Info,
            None,
            if on { "global switch enabled" } else { "global switch disabled" },
        );
        self.refresh_all();
    }

    /// グローバルスイッチの現在値
    pub fn global_enabled(&self) -> bool {
        self.state.global_enabled()
    }

    /// フック監視の全体有効フラグを設定し、照合し直す
    pub fn set_hook_monitoring(&self, on: bool) {
        self.state.hook_monitoring.set(on);
        self.refresh_all();
    }

    /// フック監視の全体有効フラグの現在値
    pub fn hook_monitoring(&self) -> bool {
        self.state.hook_monitoring()
    }

    /// 計装された呼び出しのエラーハンドラを差し替える
    pub fn set_error_handler(&self, handler: ErrorHandlerFn) {
        *self.state.error_handler.borrow_mut() = handler;
    }

    /// 永続化ストアを設定する
    pub fn set_store(&self, store: Rc<dyn SnapshotStore>) {
        *self.store.borrow_mut() = Some(store);
    }

    /// ターゲットがいまアクティブかどうか
    ///
    /// ガード下（計装内部の評価中）からの問い合わせは常に `false` に
    /// なります。
    pub fn is_target_active(&self, id: &str) -> bool {
        self.state
            .config(id)
            .map(|c| is_active(self.state.global_enabled(), &c))
            .unwrap_or(false)
    }

    /// 呼び出しインターセプタが物理的に取り付けられているかどうか
    pub fn is_installed(&self, id: &str) -> bool {
        self.state.call_handle(id).is_some()
    }

    /// 捕獲済みの元値を参照する
    pub fn captured_original(&self, id: &str) -> Option<Value> {
        self.state.originals.borrow().get(id).cloned()
    }

    /// 登録済みターゲットの設定を参照する
    pub fn config(&self, id: &str) -> Option<TargetConfig> {
        self.state.config(id)
    }

    /// 登録済みターゲットID一覧（ソート済み）
    pub fn target_ids(&self) -> Vec<TargetId> {
        let mut ids: Vec<TargetId> = self.state.configs.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 既存グループID一覧（ソート済み）
    pub fn group_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.state.groups.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 現在の非呼び出し可能設定のスナップショットを作る
    pub fn snapshot(&self) -> Snapshot {
        let mut targets: Vec<(TargetId, PersistedConfig)> = self
            .state
            .configs
            .borrow()
            .iter()
            .map(|(id, config)| (id.clone(), PersistedConfig::from_config(config)))
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        let groups: BTreeMap<GroupId, Vec<TargetId>> = self
            .state
            .groups
            .borrow()
            .iter()
            .map(|(g, members)| (g.clone(), members.iter().cloned().collect()))
            .collect();

        Snapshot { targets, groups }
    }

    /// スナップショットをストアへ保存する
    pub fn save(&self) -> Result<(), DebriefError> {
        let store = match self.store.borrow().clone() {
            Some(store) => store,
            None => return Ok(()),
        };
        store
            .save(&self.snapshot())
            .map_err(|e| DebriefError::Persistence(e.to_string()))
    }

    /// ストアからスナップショットを読み込み、通常の登録経路で再登録する
    ///
    /// 呼び出し可能フィールドはスナップショットに含まれないため、
    /// 読み込んだターゲットは保存前に持っていた述語・フィルタを
    /// 失います（既知の制限）。登録できた件数を返します。
    pub fn load_snapshot(&self) -> Result<usize, DebriefError> {
        let store = match self.store.borrow().clone() {
            Some(store) => store,
            None => return Ok(0),
        };
        let snapshot = store
            .load()
            .map_err(|e| DebriefError::Persistence(e.to_string()))?;

        self.save_suppressed.set(true);
        let mut count = 0;
        for (id, persisted) in &snapshot.targets {
            match self.register(id, &persisted.to_raw(id)) {
                Ok(_) => count += 1,
                Err(err) => self.state.log_plain(
                    LogLevel::Warn,
                    Some(id),
                    &format!("snapshot entry skipped: {}", err),
                ),
            }
        }
        self.save_suppressed.set(false);
        self.maybe_save();
        Ok(count)
    }

    /// レジストリを畳む
    ///
    /// グローバルスイッチを落とし、全ターゲットの物理計装を取り除きます。
    /// 設定マップは保持されるため、スイッチを入れ直して `refresh_all`
    /// すれば復帰できます。
    pub fn teardown(&self) {
        self.state.global_enabled.set(false);
        let ids: Vec<TargetId> = self.state.configs.borrow().keys().cloned().collect();
        for id in &ids {
            self.engine.reconcile(id);
        }
        self.engine.sync_dispatch();
    }

    /// 実効 enabled を強制的に false にして照合する
    fn force_deactivate(&self, id: &str) {
        {
            let mut configs = self.state.configs.borrow_mut();
            if let Some(config) = configs.get_mut(id) {
                config.enabled = EnabledSpec::Literal(false);
            }
        }
        self.engine.reconcile(id);
    }

    /// グループマップから取り除き、空になったグループを刈り取る
    fn remove_group_membership(&self, id: &str) {
        let group = match self.state.config(id) {
            Some(config) => config.group,
            None => return,
        };
        let mut groups = self.state.groups.borrow_mut();
        if let Some(members) = groups.get_mut(&group) {
            members.remove(id);
            if members.is_empty() {
                groups.remove(&group);
            }
        }
    }

    /// enabled をリテラルに差し替えた正規レコードを再検証して格納する
    fn store_with_enabled(&self, config: &TargetConfig, value: bool) {
        let mut raw = RawTargetConfig::from(config);
        raw.enabled = Some(EnabledSpec::Literal(value));
        // 正規レコード由来の再正規化は失敗しない
        if let Ok(new_config) = sanitize(&self.state.host, self.state.logger.as_ref(), &raw) {
            self.state
                .configs
                .borrow_mut()
                .insert(new_config.target.clone(), new_config);
        }
    }

    fn maybe_save(&self) {
        if self.save_suppressed.get() || self.store.borrow().is_none() {
            return;
        }
        if let Err(err) = self.save() {
            self.state
                .log_plain(LogLevel::Warn, None, &format!("snapshot save failed: {}", err));
        }
    }
}
