//! ターゲット設定のデータモデル
//!
//! 正規化済みの `TargetConfig` と、正規化前の `RawTargetConfig` を
//! 定義します。正規化は `sanitize` モジュールが行い、`TargetConfig` は
//! そこからのみ生成されます。述語・フィルタなどの呼び出し可能フィールドは
//! シングルスレッド前提のため `Rc` クロージャで保持します。

use crate::logger::LogLevel;
use debrief_host::{HostFn, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// ターゲット識別子
pub type TargetId = String;

/// グループ識別子
pub type GroupId = String;

/// グループ未指定時の既定グループ
pub const DEFAULT_GROUP: &str = "default";

/// 引数なし述語
pub type PredicateFn = Rc<dyn Fn() -> bool>;

/// ログ整形・呼び出し変換に使う単項フィルタ
///
/// 引数リストは `Value::List` として渡されます。
pub type FilterFn = Rc<dyn Fn(&Value) -> Value>;

/// ターゲットの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// 呼び出し可能ターゲット
    Call,
    /// 変数ターゲット
    Variable,
    /// イベント（フック）ターゲット
    Event,
}

impl TargetKind {
    /// 文字列表現を取得する
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Call => "call",
            TargetKind::Variable => "variable",
            TargetKind::Event => "event",
        }
    }
}

impl FromStr for TargetKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" => Ok(TargetKind::Call),
            "variable" => Ok(TargetKind::Variable),
            "event" => Ok(TargetKind::Event),
            _ => Err(()),
        }
    }
}

/// アドバイス種別（呼び出しターゲットの介入戦略）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdviceKind {
    Around,
    Before,
    After,
    Override,
    FilterArgs,
    FilterReturn,
    BeforeWhile,
    AfterWhile,
    AroundWhile,
}

impl AdviceKind {
    /// 文字列表現を取得する
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceKind::Around => "around",
            AdviceKind::Before => "before",
            AdviceKind::After => "after",
            AdviceKind::Override => "override",
            AdviceKind::FilterArgs => "filter-args",
            AdviceKind::FilterReturn => "filter-return",
            AdviceKind::BeforeWhile => "before-while",
            AdviceKind::AfterWhile => "after-while",
            AdviceKind::AroundWhile => "around-while",
        }
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdviceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "around" => Ok(AdviceKind::Around),
            "before" => Ok(AdviceKind::Before),
            "after" => Ok(AdviceKind::After),
            "override" => Ok(AdviceKind::Override),
            "filter-args" => Ok(AdviceKind::FilterArgs),
            "filter-return" => Ok(AdviceKind::FilterReturn),
            "before-while" => Ok(AdviceKind::BeforeWhile),
            "after-while" => Ok(AdviceKind::AfterWhile),
            "around-while" => Ok(AdviceKind::AroundWhile),
            _ => Err(()),
        }
    }
}

/// `enabled` フィールド：真偽値リテラルまたは評価時に呼ばれる述語
#[derive(Clone)]
pub enum EnabledSpec {
    Literal(bool),
    Predicate(PredicateFn),
}

impl EnabledSpec {
    /// 述語かどうか
    pub fn is_predicate(&self) -> bool {
        matches!(self, EnabledSpec::Predicate(_))
    }
}

impl fmt::Debug for EnabledSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnabledSpec::Literal(b) => write!(f, "Literal({})", b),
            EnabledSpec::Predicate(_) => write!(f, "Predicate(<fn>)"),
        }
    }
}

impl PartialEq for EnabledSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EnabledSpec::Literal(a), EnabledSpec::Literal(b)) => a == b,
            (EnabledSpec::Predicate(a), EnabledSpec::Predicate(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// 変数ターゲットの `values` ペアの片側：値リテラルまたは遅延評価
#[derive(Clone)]
pub enum ValueSpec {
    Literal(Value),
    Thunk(Rc<dyn Fn() -> Value>),
}

impl ValueSpec {
    /// 実際の値に解決する
    pub fn resolve(&self) -> Value {
        match self {
            ValueSpec::Literal(v) => v.clone(),
            ValueSpec::Thunk(f) => f(),
        }
    }

    /// リテラルかどうか
    pub fn is_literal(&self) -> bool {
        matches!(self, ValueSpec::Literal(_))
    }

    /// リテラルなら値を取得する
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            ValueSpec::Literal(v) => Some(v),
            ValueSpec::Thunk(_) => None,
        }
    }
}

impl fmt::Debug for ValueSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSpec::Literal(v) => write!(f, "Literal({})", v),
            ValueSpec::Thunk(_) => write!(f, "Thunk(<fn>)"),
        }
    }
}

impl PartialEq for ValueSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueSpec::Literal(a), ValueSpec::Literal(b)) => a == b,
            (ValueSpec::Thunk(a), ValueSpec::Thunk(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn rc_opt_eq<T: ?Sized>(a: &Option<Rc<T>>, b: &Option<Rc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// 正規化済みのターゲット設定
///
/// `sanitize` からのみ生成されます。種別に合わないフィールドは
/// 正規化時に既定値へ落とされているため、ここでは常に参照して
/// 構いません。
#[derive(Clone)]
pub struct TargetConfig {
    /// ターゲット識別子
    pub target: TargetId,
    /// ターゲット種別
    pub kind: TargetKind,
    /// 有効フラグ（リテラルまたは述語、既定はリテラル false）
    pub enabled: EnabledSpec,
    /// 追加のアクティベーション条件
    pub condition: Option<PredicateFn>,
    /// 所属グループ（既定は `default`）
    pub group: GroupId,
    /// 説明（情報提供のみ）
    pub description: Option<String>,
    /// このターゲットのログに適用する最低レベル
    pub min_log_level: Option<LogLevel>,
    /// 呼び出しターゲット専用：アドバイス種別（既定 around）
    pub advice: AdviceKind,
    /// 呼び出しターゲット専用：経過時間を計測するか
    pub timing: bool,
    /// 呼び出しターゲット専用：引数のログ整形フィルタ
    /// （filter-args では実際の呼び出しを変換する）
    pub arg_filter: Option<FilterFn>,
    /// 呼び出しターゲット専用：戻り値のログ整形フィルタ
    /// （filter-return では実際の戻り値を変換する）
    pub return_filter: Option<FilterFn>,
    /// 呼び出しターゲット専用：override アドバイスの置換関数
    pub advice_fn: Option<HostFn>,
    /// 変数ターゲット専用：(アクティブ値, 非アクティブ値) のペア
    pub values: Option<(ValueSpec, ValueSpec)>,
    /// 変数ターゲット専用：変更を監視してログするか
    pub watch: bool,
    /// 変数ターゲット専用：変更時にデバッグブレークを発火するか
    pub break_on_change: bool,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .field("condition", &self.condition.as_ref().map(|_| "<fn>"))
            .field("group", &self.group)
            .field("advice", &self.advice)
            .field("timing", &self.timing)
            .field("values", &self.values)
            .field("watch", &self.watch)
            .field("break_on_change", &self.break_on_change)
            .finish()
    }
}

impl PartialEq for TargetConfig {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.kind == other.kind
            && self.enabled == other.enabled
            && rc_opt_eq(&self.condition, &other.condition)
            && self.group == other.group
            && self.description == other.description
            && self.min_log_level == other.min_log_level
            && self.advice == other.advice
            && self.timing == other.timing
            && rc_opt_eq(&self.arg_filter, &other.arg_filter)
            && rc_opt_eq(&self.return_filter, &other.return_filter)
            && rc_opt_eq(&self.advice_fn, &other.advice_fn)
            && self.values == other.values
            && self.watch == other.watch
            && self.break_on_change == other.break_on_change
    }
}

/// 正規化前の生設定レコード
///
/// `target` 以外のフィールドはすべて任意です。`kind`・`advice`・
/// `min_log_level` は自由書式の文字列で届き、正規化時に検証されます。
/// `values` は任意長で届き、長さ2以外は警告付きで破棄されます。
#[derive(Clone, Default)]
pub struct RawTargetConfig {
    pub target: String,
    pub kind: Option<String>,
    pub enabled: Option<EnabledSpec>,
    pub condition: Option<PredicateFn>,
    pub group: Option<String>,
    pub description: Option<String>,
    pub min_log_level: Option<String>,
    pub advice: Option<String>,
    pub timing: Option<bool>,
    pub arg_filter: Option<FilterFn>,
    pub return_filter: Option<FilterFn>,
    pub advice_fn: Option<HostFn>,
    pub values: Option<Vec<ValueSpec>>,
    pub watch: Option<bool>,
    pub break_on_change: Option<bool>,
}

impl RawTargetConfig {
    /// 指定ターゲットの空レコードを作成する
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Default::default()
        }
    }
}

impl From<&TargetConfig> for RawTargetConfig {
    /// 正規化済みレコードを生レコードに戻す
    ///
    /// `sanitize` の冪等性（再正規化しても同じレコードになる）を
    /// 保つため、種別に合わないフィールドは含めません。
    fn from(config: &TargetConfig) -> Self {
        let is_call = config.kind == TargetKind::Call;
        let is_var = config.kind == TargetKind::Variable;
        Self {
            target: config.target.clone(),
            kind: Some(config.kind.as_str().to_string()),
            enabled: Some(config.enabled.clone()),
            condition: config.condition.clone(),
            group: Some(config.group.clone()),
            description: config.description.clone(),
            min_log_level: config.min_log_level.map(|l| l.as_str().to_string()),
            advice: is_call.then(|| config.advice.as_str().to_string()),
            timing: is_call.then_some(config.timing),
            arg_filter: if is_call { config.arg_filter.clone() } else { None },
            return_filter: if is_call { config.return_filter.clone() } else { None },
            advice_fn: if is_call { config.advice_fn.clone() } else { None },
            values: if is_var {
                config
                    .values
                    .as_ref()
                    .map(|(a, b)| vec![a.clone(), b.clone()])
            } else {
                None
            },
            watch: is_var.then_some(config.watch),
            break_on_change: is_var.then_some(config.break_on_change),
        }
    }
}
