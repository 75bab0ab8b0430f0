//! レジストリの公開APIのテスト

use debrief_core::{
    DebriefError, EnabledSpec, Logger, MemoryLogger, RawTargetConfig, Registry, TargetKind, Value,
};
use debrief_host::HostEnv;
use std::rc::Rc;

fn setup() -> (Rc<HostEnv>, Rc<MemoryLogger>, Registry) {
    let host = Rc::new(HostEnv::new());
    host.define_fn(
        "add",
        Rc::new(|args| {
            let mut sum = 0;
            for arg in args {
                if let Value::Int(n) = arg {
                    sum += n;
                }
            }
            Ok(Value::Int(sum))
        }),
    );
    host.define_fn("noop", Rc::new(|_| Ok(Value::Nil)));
    host.define_var("verbose", Value::Bool(false));

    let logger = Rc::new(MemoryLogger::new());
    let registry = Registry::new(Rc::clone(&host), Rc::clone(&logger) as Rc<dyn Logger>);
    (host, logger, registry)
}

fn enabled(on: bool) -> Option<EnabledSpec> {
    Some(EnabledSpec::Literal(on))
}

#[test]
fn test_register_and_unregister_restore_state() {
    let (host, _logger, registry) = setup();

    assert!(registry.target_ids().is_empty());
    assert!(registry.group_ids().is_empty());

    let raw = RawTargetConfig {
        enabled: enabled(true),
        group: Some("math".to_string()),
        ..RawTargetConfig::new("add")
    };
    registry.register("add", &raw).expect("register failed");

    assert_eq!(registry.target_ids(), vec!["add".to_string()]);
    assert_eq!(registry.group_ids(), vec!["math".to_string()]);
    assert_eq!(registry.config("add").unwrap().kind, TargetKind::Call);

    registry.unregister("add").expect("unregister failed");

    // 設定マップ・グループマップ・捕獲値がすべて登録前の状態に戻る
    assert!(registry.target_ids().is_empty());
    assert!(registry.group_ids().is_empty());
    assert!(registry.captured_original("add").is_none());
    assert!(!host.is_intercepted("add"));
}

#[test]
fn test_register_id_mismatch_fails() {
    let (_host, _logger, registry) = setup();

    let raw = RawTargetConfig::new("noop");
    let err = registry.register("add", &raw).unwrap_err();
    assert!(matches!(err, DebriefError::TargetMismatch { .. }));
    assert!(registry.target_ids().is_empty());
}

#[test]
fn test_invalid_identifier_aborts_registration() {
    let (_host, _logger, registry) = setup();

    let err = registry.register("", &RawTargetConfig::new("")).unwrap_err();
    assert!(matches!(err, DebriefError::Validation(_)));
    // 部分的な状態は一切書き込まれない
    assert!(registry.target_ids().is_empty());
    assert!(registry.group_ids().is_empty());
}

#[test]
fn test_unknown_target_operations_fail() {
    let (_host, _logger, registry) = setup();

    assert!(matches!(
        registry.unregister("ghost"),
        Err(DebriefError::UnknownTarget(_))
    ));
    assert!(matches!(
        registry.toggle_target("ghost"),
        Err(DebriefError::UnknownTarget(_))
    ));
    assert!(matches!(
        registry.toggle_group("ghosts"),
        Err(DebriefError::UnknownGroup(_))
    ));
}

#[test]
fn test_toggle_twice_restores_effective_enabled() {
    let (_host, _logger, registry) = setup();
    registry.set_global_enabled(true);

    let raw = RawTargetConfig {
        enabled: enabled(true),
        ..RawTargetConfig::new("add")
    };
    registry.register("add", &raw).unwrap();
    assert!(registry.is_target_active("add"));

    assert!(!registry.toggle_target("add").unwrap());
    assert!(!registry.is_target_active("add"));

    assert!(registry.toggle_target("add").unwrap());
    assert!(registry.is_target_active("add"));
}

#[test]
fn test_toggle_predicate_enabled_becomes_literal() {
    let (_host, _logger, registry) = setup();
    registry.set_global_enabled(true);

    let raw = RawTargetConfig {
        enabled: Some(EnabledSpec::Predicate(Rc::new(|| true))),
        ..RawTargetConfig::new("add")
    };
    registry.register("add", &raw).unwrap();

    // 述語の実効値 true を否定したリテラル false が格納される
    assert!(!registry.toggle_target("add").unwrap());
    let config = registry.config("add").unwrap();
    assert_eq!(config.enabled, EnabledSpec::Literal(false));
}

#[test]
fn test_group_toggle_is_two_state() {
    let (_host, _logger, registry) = setup();
    registry.set_global_enabled(true);

    // A: アクティブ, B: 非アクティブ の混在グループ
    let a = RawTargetConfig {
        enabled: enabled(true),
        group: Some("pair".to_string()),
        ..RawTargetConfig::new("add")
    };
    let b = RawTargetConfig {
        enabled: enabled(false),
        group: Some("pair".to_string()),
        ..RawTargetConfig::new("noop")
    };
    registry.register("add", &a).unwrap();
    registry.register("noop", &b).unwrap();

    // 混在グループは全アクティブになる
    assert!(registry.toggle_group("pair").unwrap());
    assert!(registry.is_target_active("add"));
    assert!(registry.is_target_active("noop"));

    // もう一度で全非アクティブになる
    assert!(!registry.toggle_group("pair").unwrap());
    assert!(!registry.is_target_active("add"));
    assert!(!registry.is_target_active("noop"));
}

#[test]
fn test_empty_group_is_pruned() {
    let (_host, _logger, registry) = setup();

    let raw = RawTargetConfig {
        group: Some("solo".to_string()),
        ..RawTargetConfig::new("add")
    };
    registry.register("add", &raw).unwrap();
    assert_eq!(registry.group_ids(), vec!["solo".to_string()]);

    registry.unregister("add").unwrap();
    assert!(registry.group_ids().is_empty());
    assert!(matches!(
        registry.toggle_group("solo"),
        Err(DebriefError::UnknownGroup(_))
    ));
}

#[test]
fn test_missing_host_entity_is_retained_until_refresh() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    // ホストに未束縛のターゲット：照合は警告の上でスキップされ、設定は残る
    let raw = RawTargetConfig {
        kind: Some("call".to_string()),
        enabled: enabled(true),
        ..RawTargetConfig::new("late")
    };
    registry.register("late", &raw).unwrap();
    assert!(registry.target_ids().contains(&"late".to_string()));
    assert!(!registry.is_installed("late"));
    assert!(!logger.entries_for("late").is_empty());

    // エンティティが現れた後の手動 refresh で取り付けに成功する
    host.define_fn("late", Rc::new(|_| Ok(Value::Nil)));
    registry.refresh_all();
    assert!(registry.is_installed("late"));
    assert!(host.is_intercepted("late"));
}

#[test]
fn test_bulk_registration_uses_register_path() {
    let (_host, _logger, registry) = setup();

    let raws = vec![
        RawTargetConfig {
            enabled: enabled(true),
            ..RawTargetConfig::new("add")
        },
        // 不正な識別子は飛ばされる
        RawTargetConfig::new("has space"),
        RawTargetConfig {
            enabled: enabled(false),
            ..RawTargetConfig::new("noop")
        },
    ];

    assert_eq!(registry.register_all(&raws), 2);
    assert_eq!(
        registry.target_ids(),
        vec!["add".to_string(), "noop".to_string()]
    );
}

#[test]
fn test_reentrant_condition_sees_inactive() {
    let (_host, _logger, registry) = setup();
    let registry = Rc::new(registry);
    registry.set_global_enabled(true);

    // condition が自分自身のアクティベーションを問い合わせる
    let observed = Rc::new(std::cell::Cell::new(None));
    let registry_in_condition = Rc::clone(&registry);
    let observed_in_condition = Rc::clone(&observed);
    let raw = RawTargetConfig {
        enabled: Some(EnabledSpec::Literal(true)),
        condition: Some(Rc::new(move || {
            observed_in_condition.set(Some(registry_in_condition.is_target_active("add")));
            true
        })),
        ..RawTargetConfig::new("add")
    };
    registry.register("add", &raw).unwrap();

    // 外側の判定は成立するが、入れ子の問い合わせは false を観測する
    assert!(registry.is_target_active("add"));
    assert_eq!(observed.get(), Some(false));
}
