//! 呼び出し可能スロット（間接参照テーブルのエントリ）
//!
//! 計装対象の関数は、直接の関数ポインタではなくスロット経由で
//! 呼び出されます。インターセプタの取り付けは、スロットの現在の
//! 関数を退避してからラッパに差し替えることで行い、取り外しは
//! 退避した元の関数を書き戻すことで行います。

use crate::errors::HostError;
use crate::value::Value;
use std::rc::Rc;

/// スロットに登録される呼び出し可能オブジェクト
pub type HostFn = Rc<dyn Fn(&[Value]) -> anyhow::Result<Value>>;

/// インターセプタ本体
///
/// 第1引数は元の呼び出し可能オブジェクト、第2引数は実引数です。
pub type CallWrapper = Rc<dyn Fn(&HostFn, &[Value]) -> anyhow::Result<Value>>;

/// 取り付けたインターセプタを正確に取り外すためのハンドル
///
/// 世代番号により、別のインターセプタを誤って外すことを防ぎます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorHandle {
    target: String,
    generation: u64,
}

impl InterceptorHandle {
    pub(crate) fn new(target: String, generation: u64) -> Self {
        Self { target, generation }
    }

    /// 取り付け先の識別子を取得する
    pub fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

/// 呼び出し可能スロット
pub struct CallableSlot {
    /// 現在の呼び出し先（インターセプタ取り付け中はラッパ）
    current: HostFn,
    /// 取り付け時に退避した元の関数
    saved: Option<HostFn>,
    /// 取り付け中のインターセプタの世代番号
    generation: Option<u64>,
}

impl CallableSlot {
    /// 新しいスロットを作成する
    pub fn new(fun: HostFn) -> Self {
        Self {
            current: fun,
            saved: None,
            generation: None,
        }
    }

    /// 現在の呼び出し先を取得する
    pub fn current(&self) -> HostFn {
        Rc::clone(&self.current)
    }

    /// インターセプタが取り付けられているかどうか
    pub fn is_intercepted(&self) -> bool {
        self.saved.is_some()
    }

    /// インターセプタを取り付ける
    ///
    /// 元の関数を退避し、現在の呼び出し先をラッパに差し替えます。
    /// 1スロットに取り付けられるインターセプタは1つだけです。
    pub fn install(
        &mut self,
        name: &str,
        wrapper: CallWrapper,
        generation: u64,
    ) -> Result<InterceptorHandle, HostError> {
        if self.saved.is_some() {
            return Err(HostError::InterceptorBusy(name.to_string()));
        }

        let original = Rc::clone(&self.current);
        self.saved = Some(Rc::clone(&self.current));
        self.generation = Some(generation);
        self.current = Rc::new(move |args| wrapper(&original, args));

        Ok(InterceptorHandle::new(name.to_string(), generation))
    }

    /// インターセプタを取り外す
    ///
    /// ハンドルの世代が一致する場合のみ、退避した元の関数を書き戻します。
    pub fn remove(&mut self, handle: &InterceptorHandle) -> Result<(), HostError> {
        if self.generation != Some(handle.generation()) {
            return Err(HostError::NoInterceptor(handle.target().to_string()));
        }

        // saved は generation と同時にしか設定されない
        if let Some(original) = self.saved.take() {
            self.current = original;
        }
        self.generation = None;
        Ok(())
    }
}
