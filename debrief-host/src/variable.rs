//! 変数セルと変更オブザーバ

use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// 変数の変更オブザーバ
///
/// 引数は (変数名, 旧値, 新値) です。
pub type ObserverFn = Rc<dyn Fn(&str, &Value, &Value)>;

/// 取り付けたオブザーバを正確に取り外すためのハンドル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverHandle {
    name: String,
    id: u64,
}

impl ObserverHandle {
    pub(crate) fn new(name: String, id: u64) -> Self {
        Self { name, id }
    }

    /// 取り付け先の変数名を取得する
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

/// 変数セル
pub struct VarCell {
    value: Value,
    observers: HashMap<u64, ObserverFn>,
}

impl VarCell {
    /// 新しい変数セルを作成する
    pub fn new(value: Value) -> Self {
        Self {
            value,
            observers: HashMap::new(),
        }
    }

    /// 現在の値を取得する
    pub fn value(&self) -> Value {
        self.value.clone()
    }

    /// 値を書き換え、旧値を返す
    pub fn replace(&mut self, value: Value) -> Value {
        std::mem::replace(&mut self.value, value)
    }

    /// オブザーバを追加する
    pub fn add_observer(&mut self, id: u64, observer: ObserverFn) {
        self.observers.insert(id, observer);
    }

    /// オブザーバを削除する
    pub fn remove_observer(&mut self, id: u64) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// 通知対象のオブザーバ一覧を取得する
    ///
    /// 通知中のセル借用を避けるため、クローンして返します。
    pub fn observers(&self) -> Vec<ObserverFn> {
        self.observers.values().map(Rc::clone).collect()
    }
}
