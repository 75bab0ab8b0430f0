//! アドバイス種別ごとのインターセプタ動作のテスト

use debrief_core::{
    EnabledSpec, LogLevel, Logger, MemoryLogger, RawTargetConfig, Registry, Value,
};
use debrief_host::HostEnv;
use std::cell::RefCell;
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
    host.define_fn("boom", Rc::new(|_| anyhow::bail!("boom")));

    let logger = Rc::new(MemoryLogger::new());
    let registry = Registry::new(Rc::clone(&host), Rc::clone(&logger) as Rc<dyn Logger>);
    (host, logger, registry)
}

fn call_target(id: &str, advice: &str) -> RawTargetConfig {
    RawTargetConfig {
        kind: Some("call".to_string()),
        enabled: Some(EnabledSpec::Literal(true)),
        advice: Some(advice.to_string()),
        ..RawTargetConfig::new(id)
    }
}

#[test]
fn test_global_switch_off_means_no_instrumentation() {
    let (host, logger, registry) = setup();

    let raw = RawTargetConfig {
        timing: Some(true),
        ..call_target("add", "around")
    };
    registry.register("add", &raw).unwrap();

    // グローバルスイッチが落ちている間は物理的にも取り付けられない
    assert!(!registry.is_installed("add"));
    assert!(!host.is_intercepted("add"));

    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(3));
    assert!(logger.entries_for("add").is_empty());
}

#[test]
fn test_around_logs_args_duration_and_result() {
    let (host, logger, registry) = setup();

    let raw = RawTargetConfig {
        timing: Some(true),
        ..call_target("add", "around")
    };
    registry.register("add", &raw).unwrap();

    // スイッチを入れて照合すると取り付けられる
    registry.set_global_enabled(true);
    assert!(registry.is_installed("add"));
    logger.clear();

    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(3));

    let entries = logger.entries_for("add");
    assert_eq!(entries.len(), 1, "expected exactly one log entry");
    assert_eq!(entries[0].level, LogLevel::Debug);
    assert!(entries[0].message.contains("args=[1, 2]"));
    assert!(entries[0].message.contains("-> 3"));
    // 経過時間（非負の Duration）が末尾に付く
    assert!(entries[0].message.ends_with("s)"), "no duration in: {}", entries[0].message);
}

#[test]
fn test_around_filters_shape_log_only() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    let raw = RawTargetConfig {
        arg_filter: Some(Rc::new(|_| Value::Str("<args>".to_string()))),
        return_filter: Some(Rc::new(|_| Value::Str("<ret>".to_string()))),
        ..call_target("add", "around")
    };
    registry.register("add", &raw).unwrap();
    logger.clear();

    // フィルタはログ整形のみで、実引数と戻り値には触れない
    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(3));

    let entries = logger.entries_for("add");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].message.contains("\"<args>\""));
    assert!(entries[0].message.contains("\"<ret>\""));
}

#[test]
fn test_around_inactive_call_is_transparent() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    // enabled が述語なので取り付けは行われるが、呼び出し時判定は false
    let raw = RawTargetConfig {
        kind: Some("call".to_string()),
        enabled: Some(EnabledSpec::Predicate(Rc::new(|| false))),
        advice: Some("around".to_string()),
        ..RawTargetConfig::new("add")
    };
    registry.register("add", &raw).unwrap();
    assert!(registry.is_installed("add"));
    logger.clear();

    let result = host.call("add", &[Value::Int(2), Value::Int(3)]).unwrap();
    assert_eq!(result, Value::Int(5));
    assert!(logger.entries_for("add").is_empty());
}

#[test]
fn test_around_error_handler_and_reraise() {
    let (host, _logger, registry) = setup();
    registry.set_global_enabled(true);

    let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    registry.set_error_handler(Rc::new(move |id, err| {
        sink.borrow_mut().push(format!("{}: {}", id, err));
    }));

    registry.register("boom", &call_target("boom", "around")).unwrap();

    let err = host.call("boom", &[]).unwrap_err();
    // ハンドラは (ターゲットID, エラー) でちょうど1回呼ばれる
    assert_eq!(*seen.borrow(), vec!["boom: boom".to_string()]);
    // 呼び出し元は同一のエラーをそのまま観測する
    assert_eq!(err.to_string(), "boom");
}

#[test]
fn test_before_logs_then_calls_through() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    registry.register("add", &call_target("add", "before")).unwrap();
    logger.clear();

    let result = host.call("add", &[Value::Int(4), Value::Int(5)]).unwrap();
    assert_eq!(result, Value::Int(9));

    let entries = logger.entries_for("add");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].message.starts_with("before add"));
    assert!(entries[0].message.contains("args=[4, 5]"));
    // before は戻り値を見ない
    assert!(!entries[0].message.contains("->"));
}

#[test]
fn test_after_logs_args_and_result() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    registry.register("add", &call_target("add", "after")).unwrap();
    logger.clear();

    let result = host.call("add", &[Value::Int(4), Value::Int(5)]).unwrap();
    assert_eq!(result, Value::Int(9));

    let entries = logger.entries_for("add");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].message.starts_with("after add"));
    assert!(entries[0].message.contains("-> 9"));
}

#[test]
fn test_override_delegates_to_replacement() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    let raw = RawTargetConfig {
        advice_fn: Some(Rc::new(|_| Ok(Value::Int(99)))),
        ..call_target("add", "override")
    };
    registry.register("add", &raw).unwrap();
    logger.clear();

    // アクティブ：記録してから置換関数へ委譲
    let result = host.call("add", &[Value::Int(1)]).unwrap();
    assert_eq!(result, Value::Int(99));
    assert_eq!(logger.entries_for("add").len(), 1);
}

#[test]
fn test_override_inactive_delegates_without_logging() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    // 述語 false：取り付けは残るが、委譲のみでログしない
    let raw = RawTargetConfig {
        kind: Some("call".to_string()),
        enabled: Some(EnabledSpec::Predicate(Rc::new(|| false))),
        advice: Some("override".to_string()),
        advice_fn: Some(Rc::new(|_| Ok(Value::Int(99)))),
        ..RawTargetConfig::new("add")
    };
    registry.register("add", &raw).unwrap();
    logger.clear();

    let result = host.call("add", &[Value::Int(1)]).unwrap();
    assert_eq!(result, Value::Int(99));
    assert!(logger.entries_for("add").is_empty());
}

#[test]
fn test_filter_args_transforms_live_call() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    // 各引数を10倍にするフィルタ：この種別だけは実呼び出しを変換する
    let raw = RawTargetConfig {
        arg_filter: Some(Rc::new(|v| match v {
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Int(n) => Value::Int(n * 10),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        })),
        ..call_target("add", "filter-args")
    };
    registry.register("add", &raw).unwrap();

    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(30));

    // 非アクティブなら無変更で通す
    registry.toggle_target("add").unwrap();
    logger.clear();
    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(3));
    assert!(logger.entries_for("add").is_empty());
}

#[test]
fn test_filter_return_transforms_result() {
    let (host, _logger, registry) = setup();
    registry.set_global_enabled(true);

    let raw = RawTargetConfig {
        return_filter: Some(Rc::new(|v| match v {
            Value::Int(n) => Value::Int(n + 100),
            other => other.clone(),
        })),
        ..call_target("add", "filter-return")
    };
    registry.register("add", &raw).unwrap();

    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(103));
}

#[test]
fn test_while_kinds_always_call_through() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    registry
        .register("add", &call_target("add", "around-while"))
        .unwrap();
    logger.clear();

    // アクティブ：trace で記録しつつ素通し
    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(3));
    let entries = logger.entries_for("add");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Trace);

    // 非アクティブでも呼び出しは決して遮られない
    registry.toggle_target("add").unwrap();
    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(3));
}

#[test]
fn test_min_log_level_raises_entry_level() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    let raw = RawTargetConfig {
        min_log_level: Some("warn".to_string()),
        ..call_target("add", "around")
    };
    registry.register("add", &raw).unwrap();
    logger.clear();

    host.call("add", &[Value::Int(1)]).unwrap();
    let entries = logger.entries_for("add");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Warn);
}

#[test]
fn test_detach_restores_plain_call() {
    let (host, logger, registry) = setup();
    registry.set_global_enabled(true);

    registry.register("add", &call_target("add", "around")).unwrap();
    assert!(host.is_intercepted("add"));

    // リテラル false へトグルすると物理的にも取り外される
    registry.toggle_target("add").unwrap();
    assert!(!host.is_intercepted("add"));
    assert!(!registry.is_installed("add"));

    logger.clear();
    let result = host.call("add", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result, Value::Int(3));
    assert!(logger.entries_for("add").is_empty());
}
