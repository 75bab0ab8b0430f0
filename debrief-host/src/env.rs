//! ホスト環境
//!
//! 計装対象となるエンティティ（呼び出し可能スロット・変数・イベント）を
//! 1つのテーブルにまとめて保持します。協調的なシングルスレッド実行を
//! 前提とするため、内部状態は `RefCell` で管理します。通知やディスパッチの
//! 実行前には必ず借用を解放します。

use crate::callable::{CallWrapper, CallableSlot, HostFn, InterceptorHandle};
use crate::errors::HostError;
use crate::event::{run_listeners, DispatchFn, EventSlot};
use crate::value::Value;
use crate::variable::{ObserverFn, ObserverHandle, VarCell};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// デバッグブレークのハンドラ
pub type BreakFn = Rc<dyn Fn(&str)>;

/// 識別子が指すエンティティの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// 呼び出し可能スロット
    Callable,
    /// 変数
    Variable,
    /// イベント
    Event,
}

/// ホスト環境
pub struct HostEnv {
    callables: RefCell<HashMap<String, CallableSlot>>,
    variables: RefCell<HashMap<String, VarCell>>,
    events: RefCell<HashMap<String, EventSlot>>,
    /// 共有ディスパッチインターセプタ（全イベント共通で高々1つ）
    dispatch_wrap: RefCell<Option<DispatchFn>>,
    break_handler: RefCell<Option<BreakFn>>,
    /// インターセプタ・オブザーバのハンドル採番カウンタ
    next_id: Cell<u64>,
}

impl HostEnv {
    /// 新しいホスト環境を作成する
    pub fn new() -> Self {
        Self {
            callables: RefCell::new(HashMap::new()),
            variables: RefCell::new(HashMap::new()),
            events: RefCell::new(HashMap::new()),
            dispatch_wrap: RefCell::new(None),
            break_handler: RefCell::new(None),
            next_id: Cell::new(1),
        }
    }

    fn fresh_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// 識別子が指すエンティティの種別を調べる
    pub fn resolve(&self, name: &str) -> Option<EntityKind> {
        if self.callables.borrow().contains_key(name) {
            Some(EntityKind::Callable)
        } else if self.variables.borrow().contains_key(name) {
            Some(EntityKind::Variable)
        } else if self.events.borrow().contains_key(name) {
            Some(EntityKind::Event)
        } else {
            None
        }
    }

    // --- 呼び出し可能スロット ---

    /// 呼び出し可能スロットを定義する
    pub fn define_fn(&self, name: &str, fun: HostFn) {
        self.callables
            .borrow_mut()
            .insert(name.to_string(), CallableSlot::new(fun));
    }

    /// スロット経由で関数を呼び出す
    ///
    /// 呼び出し前に借用を解放するため、再入（入れ子の計装呼び出し）も
    /// 安全です。呼び出し先のエラーはそのまま素通しされます。
    pub fn call(&self, name: &str, args: &[Value]) -> anyhow::Result<Value> {
        let fun = {
            let callables = self.callables.borrow();
            let slot = callables
                .get(name)
                .ok_or_else(|| HostError::EntityMissing(name.to_string()))?;
            slot.current()
        };
        fun(args)
    }

    /// スロットにインターセプタを取り付ける
    pub fn install_interceptor(
        &self,
        name: &str,
        wrapper: CallWrapper,
    ) -> Result<InterceptorHandle, HostError> {
        let generation = self.fresh_id();
        let mut callables = self.callables.borrow_mut();
        let slot = callables
            .get_mut(name)
            .ok_or_else(|| HostError::EntityMissing(name.to_string()))?;
        slot.install(name, wrapper, generation)
    }

    /// スロットからインターセプタを取り外す
    pub fn remove_interceptor(&self, handle: &InterceptorHandle) -> Result<(), HostError> {
        let mut callables = self.callables.borrow_mut();
        let slot = callables
            .get_mut(handle.target())
            .ok_or_else(|| HostError::EntityMissing(handle.target().to_string()))?;
        slot.remove(handle)
    }

    /// スロットにインターセプタが取り付けられているかどうか
    pub fn is_intercepted(&self, name: &str) -> bool {
        self.callables
            .borrow()
            .get(name)
            .map(CallableSlot::is_intercepted)
            .unwrap_or(false)
    }

    // --- 変数 ---

    /// 変数を定義する
    pub fn define_var(&self, name: &str, value: Value) {
        self.variables
            .borrow_mut()
            .insert(name.to_string(), VarCell::new(value));
    }

    /// 変数の現在値を読む
    pub fn read_var(&self, name: &str) -> Result<Value, HostError> {
        self.variables
            .borrow()
            .get(name)
            .map(VarCell::value)
            .ok_or_else(|| HostError::NotAVariable(name.to_string()))
    }

    /// 変数に書き込み、オブザーバへ (旧値, 新値) を通知する
    pub fn write_var(&self, name: &str, value: Value) -> Result<(), HostError> {
        let (old, new, observers) = {
            let mut variables = self.variables.borrow_mut();
            let cell = variables
                .get_mut(name)
                .ok_or_else(|| HostError::NotAVariable(name.to_string()))?;
            let old = cell.replace(value.clone());
            (old, value, cell.observers())
        };

        // 借用解放後に通知する
        for observer in observers {
            observer(name, &old, &new);
        }
        Ok(())
    }

    /// 変数に変更オブザーバを取り付ける
    pub fn add_observer(
        &self,
        name: &str,
        observer: ObserverFn,
    ) -> Result<ObserverHandle, HostError> {
        let id = self.fresh_id();
        let mut variables = self.variables.borrow_mut();
        let cell = variables
            .get_mut(name)
            .ok_or_else(|| HostError::NotAVariable(name.to_string()))?;
        cell.add_observer(id, observer);
        Ok(ObserverHandle::new(name.to_string(), id))
    }

    /// 変更オブザーバを取り外す
    pub fn remove_observer(&self, handle: &ObserverHandle) -> Result<(), HostError> {
        let mut variables = self.variables.borrow_mut();
        let cell = variables
            .get_mut(handle.name())
            .ok_or_else(|| HostError::NotAVariable(handle.name().to_string()))?;
        if cell.remove_observer(handle.id()) {
            Ok(())
        } else {
            Err(HostError::NoObserver(handle.name().to_string()))
        }
    }

    /// デバッグブレークのハンドラを設定する
    pub fn set_break_handler(&self, handler: BreakFn) {
        *self.break_handler.borrow_mut() = Some(handler);
    }

    /// 同期的なデバッグブレークを発火する
    ///
    /// ハンドラが設定されていなければ何もしません。ブレークからの復帰は
    /// ホストの能力であり、ここでは関知しません。
    pub fn trigger_break(&self, name: &str) {
        let handler = self.break_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(name);
        }
    }

    // --- イベント ---

    /// イベントを定義する
    pub fn define_event(&self, name: &str) {
        self.events
            .borrow_mut()
            .entry(name.to_string())
            .or_default();
    }

    /// イベントにリスナを追加する
    pub fn add_listener(&self, name: &str, listener: HostFn) -> Result<(), HostError> {
        let mut events = self.events.borrow_mut();
        let slot = events
            .get_mut(name)
            .ok_or_else(|| HostError::UnknownEvent(name.to_string()))?;
        slot.add_listener(listener);
        Ok(())
    }

    /// イベントをディスパッチする
    ///
    /// ディスパッチインターセプタが取り付けられていれば、リスナ実行全体を
    /// 継続として渡します。未監視イベントでもインターセプタ自体は実行される
    /// 点に注意してください（素通しするかどうかはインターセプタが決めます）。
    pub fn dispatch(&self, name: &str, payload: &[Value]) -> anyhow::Result<()> {
        let listeners = {
            let events = self.events.borrow();
            let slot = events
                .get(name)
                .ok_or_else(|| HostError::UnknownEvent(name.to_string()))?;
            slot.listeners()
        };
        let wrap = self.dispatch_wrap.borrow().clone();

        let mut run = || run_listeners(&listeners, payload);
        match wrap {
            Some(wrap) => wrap(name, &mut run),
            None => run(),
        }
    }

    /// 共有ディスパッチインターセプタを取り付ける
    pub fn install_dispatch_interceptor(&self, wrap: DispatchFn) {
        *self.dispatch_wrap.borrow_mut() = Some(wrap);
    }

    /// 共有ディスパッチインターセプタを取り外す
    pub fn remove_dispatch_interceptor(&self) {
        *self.dispatch_wrap.borrow_mut() = None;
    }

    /// 共有ディスパッチインターセプタが取り付けられているかどうか
    pub fn has_dispatch_interceptor(&self) -> bool {
        self.dispatch_wrap.borrow().is_some()
    }
}

impl Default for HostEnv {
    fn default() -> Self {
        Self::new()
    }
}
