//! 名前付きイベントのディスパッチ

use crate::callable::HostFn;
use crate::value::Value;
use std::rc::Rc;

/// ディスパッチインターセプタ
///
/// 第1引数はイベント名、第2引数は実際のディスパッチを行う継続です。
/// インターセプタは継続を必ず1回呼ぶ必要があります。
pub type DispatchFn =
    Rc<dyn Fn(&str, &mut dyn FnMut() -> anyhow::Result<()>) -> anyhow::Result<()>>;

/// イベントスロット
pub struct EventSlot {
    listeners: Vec<HostFn>,
}

impl EventSlot {
    /// 新しいイベントスロットを作成する
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// リスナを追加する
    pub fn add_listener(&mut self, listener: HostFn) {
        self.listeners.push(listener);
    }

    /// リスナ一覧を取得する
    ///
    /// ディスパッチ中のスロット借用を避けるため、クローンして返します。
    pub fn listeners(&self) -> Vec<HostFn> {
        self.listeners.iter().map(Rc::clone).collect()
    }
}

impl Default for EventSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// リスナ列を順に実行する
pub(crate) fn run_listeners(listeners: &[HostFn], payload: &[Value]) -> anyhow::Result<()> {
    for listener in listeners {
        listener(payload)?;
    }
    Ok(())
}
