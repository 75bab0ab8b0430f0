//! スナップショットの保存・復元の統合テスト

use debrief_core::{
    EnabledSpec, Logger, MemoryLogger, RawTargetConfig, Registry, Snapshot, SnapshotStore,
    TargetKind, Value, ValueSpec,
};
use debrief_host::HostEnv;
use std::cell::RefCell;
use std::rc::Rc;

/// テスト用のインメモリストア
#[derive(Default)]
struct MemoryStore {
    saved: RefCell<Option<Snapshot>>,
}

impl SnapshotStore for MemoryStore {
    fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        *self.saved.borrow_mut() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Snapshot> {
        self.saved
            .borrow()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no snapshot saved"))
    }
}

fn make_host() -> Rc<HostEnv> {
    let host = Rc::new(HostEnv::new());
    host.define_fn("add", Rc::new(|_| Ok(Value::Int(0))));
    host.define_var("threshold", Value::Int(10));
    host
}

fn make_registry(host: &Rc<HostEnv>) -> Registry {
    let logger: Rc<dyn Logger> = Rc::new(MemoryLogger::new());
    Registry::new(Rc::clone(host), logger)
}

#[test]
fn test_snapshot_round_trip_through_fresh_registry() {
    let store = Rc::new(MemoryStore::default());
    let host = make_host();

    let registry = make_registry(&host);
    registry.set_store(Rc::clone(&store) as Rc<dyn SnapshotStore>);
    registry
        .register(
            "add",
            &RawTargetConfig {
                enabled: Some(EnabledSpec::Literal(true)),
                group: Some("math".to_string()),
                advice: Some("after".to_string()),
                timing: Some(true),
                description: Some("adder".to_string()),
                ..RawTargetConfig::new("add")
            },
        )
        .unwrap();
    registry
        .register(
            "threshold",
            &RawTargetConfig {
                kind: Some("variable".to_string()),
                enabled: Some(EnabledSpec::Literal(false)),
                values: Some(vec![
                    ValueSpec::Literal(Value::Int(99)),
                    ValueSpec::Literal(Value::Int(10)),
                ]),
                watch: Some(true),
                ..RawTargetConfig::new("threshold")
            },
        )
        .unwrap();

    // register が都度保存しているので明示 save は不要
    assert!(store.saved.borrow().is_some());

    // 別のレジストリで読み込む
    let fresh_host = make_host();
    let fresh = make_registry(&fresh_host);
    fresh.set_store(Rc::clone(&store) as Rc<dyn SnapshotStore>);
    assert_eq!(fresh.load_snapshot().unwrap(), 2);

    let add = fresh.config("add").unwrap();
    assert_eq!(add.kind, TargetKind::Call);
    assert_eq!(add.enabled, EnabledSpec::Literal(true));
    assert_eq!(add.group, "math");
    assert_eq!(add.description.as_deref(), Some("adder"));
    assert!(add.timing);

    let threshold = fresh.config("threshold").unwrap();
    assert_eq!(threshold.kind, TargetKind::Variable);
    assert_eq!(threshold.enabled, EnabledSpec::Literal(false));
    assert!(threshold.watch);
    let (active, inactive) = threshold.values.expect("values pair survives");
    assert_eq!(active, ValueSpec::Literal(Value::Int(99)));
    assert_eq!(inactive, ValueSpec::Literal(Value::Int(10)));

    assert_eq!(fresh.group_ids(), vec!["default".to_string(), "math".to_string()]);
}

#[test]
fn test_predicate_enabled_loads_as_disabled() {
    let store = Rc::new(MemoryStore::default());
    let host = make_host();

    let registry = make_registry(&host);
    registry.set_store(Rc::clone(&store) as Rc<dyn SnapshotStore>);
    registry.set_global_enabled(true);
    registry
        .register(
            "add",
            &RawTargetConfig {
                enabled: Some(EnabledSpec::Predicate(Rc::new(|| true))),
                ..RawTargetConfig::new("add")
            },
        )
        .unwrap();
    assert!(registry.is_target_active("add"));

    let fresh_host = make_host();
    let fresh = make_registry(&fresh_host);
    fresh.set_store(Rc::clone(&store) as Rc<dyn SnapshotStore>);
    fresh.set_global_enabled(true);
    assert_eq!(fresh.load_snapshot().unwrap(), 1);

    // 述語は永続化できないため、読み込み後は無効に落ちる
    assert!(!fresh.is_target_active("add"));
    assert_eq!(
        fresh.config("add").unwrap().enabled,
        EnabledSpec::Literal(false)
    );
}

#[test]
fn test_load_reinstates_instrumentation() {
    let store = Rc::new(MemoryStore::default());
    let host = make_host();

    let registry = make_registry(&host);
    registry.set_store(Rc::clone(&store) as Rc<dyn SnapshotStore>);
    registry
        .register(
            "add",
            &RawTargetConfig {
                enabled: Some(EnabledSpec::Literal(true)),
                ..RawTargetConfig::new("add")
            },
        )
        .unwrap();

    let fresh_host = make_host();
    let fresh = make_registry(&fresh_host);
    fresh.set_store(Rc::clone(&store) as Rc<dyn SnapshotStore>);
    fresh.set_global_enabled(true);
    fresh.load_snapshot().unwrap();

    // 読み込みは通常の登録経路を通るので、そのまま照合・取り付けされる
    assert!(fresh.is_installed("add"));
    assert!(fresh_host.is_intercepted("add"));
}

#[test]
fn test_switch_flips_before_load_do_not_clobber_snapshot() {
    let store = Rc::new(MemoryStore::default());
    let host = make_host();

    let registry = make_registry(&host);
    registry.set_store(Rc::clone(&store) as Rc<dyn SnapshotStore>);
    registry
        .register(
            "add",
            &RawTargetConfig {
                enabled: Some(EnabledSpec::Literal(true)),
                ..RawTargetConfig::new("add")
            },
        )
        .unwrap();

    // 新しいプロセスがロードの前にスイッチ類を操作しても、照合だけでは
    // 保存が走らず、ストアの中身は壊れない
    let fresh_host = make_host();
    let fresh = make_registry(&fresh_host);
    fresh.set_store(Rc::clone(&store) as Rc<dyn SnapshotStore>);
    fresh.set_global_enabled(true);
    fresh.set_hook_monitoring(true);
    fresh.refresh_all();

    assert_eq!(store.saved.borrow().as_ref().unwrap().targets.len(), 1);
    assert_eq!(fresh.load_snapshot().unwrap(), 1);
    assert!(fresh.is_installed("add"));
}

#[test]
fn test_save_without_store_is_a_no_op() {
    let host = make_host();
    let registry = make_registry(&host);

    registry
        .register("add", &RawTargetConfig::new("add"))
        .unwrap();
    assert!(registry.save().is_ok());
    assert_eq!(registry.load_snapshot().unwrap(), 0);
}
