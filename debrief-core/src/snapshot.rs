//! 永続化境界
//!
//! スナップショットは (ターゲットID, 呼び出し可能フィールドを除いた設定)
//! の順序付き列とグループマップです。述語・フィルタ・カスタムアドバイス
//! 関数は意図的に除外されるため、読み込んだターゲットは保存前に持って
//! いたそれらを失います（持ち越された既知の制限）。ファイル形式と
//! 保存・読み込みの契機はストア実装側の関心です。

use crate::config::{
    AdviceKind, EnabledSpec, GroupId, RawTargetConfig, TargetConfig, TargetId, TargetKind,
    ValueSpec,
};
use crate::logger::LogLevel;
use debrief_host::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 呼び出し可能フィールドを除いたターゲット設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    pub kind: TargetKind,
    /// 述語だった `enabled` は `None` で保存され、読み込み後は無効になる
    pub enabled: Option<bool>,
    pub group: GroupId,
    pub description: Option<String>,
    pub min_log_level: Option<LogLevel>,
    pub advice: AdviceKind,
    pub timing: bool,
    /// どちらかが遅延評価だったペアは保存されない
    pub values: Option<(Value, Value)>,
    pub watch: bool,
    pub break_on_change: bool,
}

impl PersistedConfig {
    /// 正規化済み設定から永続化形を作る
    pub fn from_config(config: &TargetConfig) -> Self {
        Self {
            kind: config.kind,
            enabled: match &config.enabled {
                EnabledSpec::Literal(b) => Some(*b),
                EnabledSpec::Predicate(_) => None,
            },
            group: config.group.clone(),
            description: config.description.clone(),
            min_log_level: config.min_log_level,
            advice: config.advice,
            timing: config.timing,
            values: config.values.as_ref().and_then(|(a, b)| {
                match (a.as_literal(), b.as_literal()) {
                    (Some(a), Some(b)) => Some((a.clone(), b.clone())),
                    _ => None,
                }
            }),
            watch: config.watch,
            break_on_change: config.break_on_change,
        }
    }

    /// 通常の登録経路へ流せる生レコードに変換する
    pub fn to_raw(&self, id: &str) -> RawTargetConfig {
        let is_call = self.kind == TargetKind::Call;
        let is_var = self.kind == TargetKind::Variable;
        RawTargetConfig {
            target: id.to_string(),
            kind: Some(self.kind.as_str().to_string()),
            enabled: self.enabled.map(EnabledSpec::Literal),
            group: Some(self.group.clone()),
            description: self.description.clone(),
            min_log_level: self.min_log_level.map(|l| l.as_str().to_string()),
            advice: is_call.then(|| self.advice.as_str().to_string()),
            timing: is_call.then_some(self.timing),
            values: if is_var {
                self.values
                    .clone()
                    .map(|(a, b)| vec![ValueSpec::Literal(a), ValueSpec::Literal(b)])
            } else {
                None
            },
            watch: is_var.then_some(self.watch),
            break_on_change: is_var.then_some(self.break_on_change),
            // 呼び出し可能フィールドは永続化されない
            ..Default::default()
        }
    }
}

/// 非呼び出し可能設定のスナップショット
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// (ターゲットID, 設定) の順序付き列
    pub targets: Vec<(TargetId, PersistedConfig)>,
    /// グループ→メンバーのマップ
    pub groups: BTreeMap<GroupId, Vec<TargetId>>,
}

/// スナップショットの保存先
pub trait SnapshotStore {
    /// スナップショットを保存する
    fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()>;

    /// スナップショットを読み込む
    fn load(&self) -> anyhow::Result<Snapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_callable_fields_are_excluded() {
        let config = TargetConfig {
            target: "f".to_string(),
            kind: TargetKind::Call,
            enabled: EnabledSpec::Predicate(Rc::new(|| true)),
            condition: Some(Rc::new(|| true)),
            group: "default".to_string(),
            description: None,
            min_log_level: None,
            advice: AdviceKind::Around,
            timing: true,
            arg_filter: Some(Rc::new(|v| v.clone())),
            return_filter: None,
            advice_fn: None,
            values: None,
            watch: false,
            break_on_change: false,
        };

        let persisted = PersistedConfig::from_config(&config);
        assert_eq!(persisted.enabled, None);

        let raw = persisted.to_raw("f");
        assert!(raw.enabled.is_none());
        assert!(raw.condition.is_none());
        assert!(raw.arg_filter.is_none());
        assert_eq!(raw.timing, Some(true));
    }

    #[test]
    fn test_thunk_values_are_dropped() {
        let config = TargetConfig {
            target: "v".to_string(),
            kind: TargetKind::Variable,
            enabled: EnabledSpec::Literal(true),
            condition: None,
            group: "default".to_string(),
            description: None,
            min_log_level: None,
            advice: AdviceKind::Around,
            timing: false,
            arg_filter: None,
            return_filter: None,
            advice_fn: None,
            values: Some((
                ValueSpec::Thunk(Rc::new(|| Value::Int(1))),
                ValueSpec::Literal(Value::Int(0)),
            )),
            watch: true,
            break_on_change: false,
        };

        let persisted = PersistedConfig::from_config(&config);
        assert_eq!(persisted.values, None);
        assert!(persisted.watch);
    }
}
