//! 設定レコードの検証と正規化
//!
//! 生レコードの各フィールドを個別に検証し、正規の `TargetConfig` に
//! 整えます。登録全体を中断するのは不正なターゲット識別子のみで、
//! それ以外の不正フィールドは警告ログ付きで破棄または既定値に
//! 置き換えられます。正規化は冪等です。

use crate::config::{
    AdviceKind, EnabledSpec, RawTargetConfig, TargetConfig, TargetKind, DEFAULT_GROUP,
};
use crate::errors::DebriefError;
use crate::logger::{LogLevel, Logger};
use debrief_host::{EntityKind, HostEnv};

/// 識別子として妥当かどうか
///
/// 空でなく、空白文字を含まないことを要求します。
fn valid_identifier(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

/// 生レコードを正規の設定に変換する
///
/// `kind` が無い場合はホスト環境の内省で推測します（呼び出し可能 →
/// 呼び出しターゲット、束縛済み変数 → 変数ターゲット、既知イベント →
/// イベントターゲット）。どれにも解決できない場合は警告の上で
/// 呼び出しターゲットとして扱います。
pub fn sanitize(
    host: &HostEnv,
    logger: &dyn Logger,
    raw: &RawTargetConfig,
) -> Result<TargetConfig, DebriefError> {
    if !valid_identifier(&raw.target) {
        return Err(DebriefError::Validation(raw.target.clone()));
    }
    let target = raw.target.clone();
    let warn = |message: &str| logger.log(LogLevel::Warn, Some(&target), message);

    // 種別：明示指定を優先し、無効・欠落なら内省で推測する
    let kind = match raw.kind.as_deref() {
        Some(s) => match s.parse::<TargetKind>() {
            Ok(kind) => kind,
            Err(()) => {
                warn(&format!("unknown kind `{}`; inferring from host", s));
                infer_kind(host, &target, &warn)
            }
        },
        None => infer_kind(host, &target, &warn),
    };

    let enabled = raw.enabled.clone().unwrap_or(EnabledSpec::Literal(false));

    let group = match raw.group.as_deref() {
        Some(g) if valid_identifier(g) => g.to_string(),
        Some(g) => {
            warn(&format!(
                "invalid group `{}`; using group `{}`",
                g, DEFAULT_GROUP
            ));
            DEFAULT_GROUP.to_string()
        }
        None => DEFAULT_GROUP.to_string(),
    };

    let min_log_level = match raw.min_log_level.as_deref() {
        Some(s) => match s.parse::<LogLevel>() {
            Ok(level) => Some(level),
            Err(()) => {
                warn(&format!("unknown log level `{}`; dropped", s));
                None
            }
        },
        None => None,
    };

    // 呼び出しターゲット専用フィールド
    let mut advice = AdviceKind::Around;
    let mut timing = false;
    let mut arg_filter = None;
    let mut return_filter = None;
    let mut advice_fn = None;
    if kind == TargetKind::Call {
        advice = match raw.advice.as_deref() {
            Some(s) => match s.parse::<AdviceKind>() {
                Ok(advice) => advice,
                Err(()) => {
                    warn(&format!("unknown advice kind `{}`; using around", s));
                    AdviceKind::Around
                }
            },
            None => AdviceKind::Around,
        };
        timing = raw.timing.unwrap_or(false);
        arg_filter = raw.arg_filter.clone();
        return_filter = raw.return_filter.clone();
        advice_fn = raw.advice_fn.clone();
    } else {
        if raw.advice.is_some() {
            warn("advice kind is only valid for call targets; dropped");
        }
        if raw.timing.is_some() {
            warn("timing is only valid for call targets; dropped");
        }
        if raw.arg_filter.is_some() || raw.return_filter.is_some() {
            warn("filters are only valid for call targets; dropped");
        }
        if raw.advice_fn.is_some() {
            warn("advice function is only valid for call targets; dropped");
        }
    }

    // 変数ターゲット専用フィールド
    let mut values = None;
    let mut watch = false;
    let mut break_on_change = false;
    if kind == TargetKind::Variable {
        values = match raw.values.clone() {
            Some(pair) if pair.len() == 2 => {
                let mut it = pair.into_iter();
                // 長さ2を確認済み
                Some((it.next().unwrap(), it.next().unwrap()))
            }
            Some(pair) => {
                warn(&format!(
                    "values must be a pair, got {} element(s); dropped",
                    pair.len()
                ));
                None
            }
            None => None,
        };
        watch = raw.watch.unwrap_or(false);
        break_on_change = raw.break_on_change.unwrap_or(false);
    } else {
        if raw.values.is_some() {
            warn("values is only valid for variable targets; dropped");
        }
        if raw.watch.is_some() {
            warn("watch is only valid for variable targets; dropped");
        }
        if raw.break_on_change.is_some() {
            warn("break-on-change is only valid for variable targets; dropped");
        }
    }

    Ok(TargetConfig {
        target,
        kind,
        enabled,
        condition: raw.condition.clone(),
        group,
        description: raw.description.clone(),
        min_log_level,
        advice,
        timing,
        arg_filter,
        return_filter,
        advice_fn,
        values,
        watch,
        break_on_change,
    })
}

/// ホスト環境の内省でターゲット種別を推測する
fn infer_kind(host: &HostEnv, target: &str, warn: &dyn Fn(&str)) -> TargetKind {
    match host.resolve(target) {
        Some(EntityKind::Callable) => TargetKind::Call,
        Some(EntityKind::Variable) => TargetKind::Variable,
        Some(EntityKind::Event) => TargetKind::Event,
        None => {
            warn("target is not bound in the host; assuming call target");
            TargetKind::Call
        }
    }
}
