//! インターセプタ生成
//!
//! アドバイス種別ごとの呼び出しラッパ、変数の変更オブザーバ、共有の
//! フックディスパッチインターセプタを組み立てます。種別のディスパッチは
//! 固定の `match`（タグ付きバリアント）で行い、種別の追加は分岐1つと
//! 戦略関数1つの追加で済みます。
//!
//! 生成されたラッパは呼び出しのたびに設定を読み直し、アクティベーションを
//! 再判定します。インストール時の粗い判定とは食い違うことがあり、
//! 呼び出し時の判定が常に正となります。

use crate::activation::{is_active, with_guard};
use crate::config::{AdviceKind, FilterFn, TargetConfig};
use crate::logger::LogLevel;
use crate::registry::RegistryState;
use debrief_host::{CallWrapper, DispatchFn, HostFn, ObserverFn, Value};
use std::rc::Rc;
use std::time::Instant;

/// フィルタを適用したビューを計算する（未設定なら恒等）
///
/// 呼び出し側がガード下で実行します。
fn apply_filter(filter: &Option<FilterFn>, value: &Value) -> Value {
    match filter {
        Some(f) => f(value),
        None => value.clone(),
    }
}

/// 呼び出しターゲット用のラッパを生成する
pub(crate) fn build_call_wrapper(state: &Rc<RegistryState>, id: &str) -> CallWrapper {
    let state = Rc::clone(state);
    let id = id.to_string();

    Rc::new(move |original, args| {
        // 設定は呼び出しのたびに読み直す
        let config = match state.config(&id) {
            Some(config) => config,
            // 設定が消えたラッパは透過する
            None => return (**original)(args),
        };
        let active = is_active(state.global_enabled(), &config);

        match config.advice {
            AdviceKind::Around => run_around(&state, &config, active, original, args),
            AdviceKind::Before => run_before(&state, &config, active, original, args),
            AdviceKind::After => run_after(&state, &config, active, original, args),
            AdviceKind::Override => run_override(&state, &config, active, original, args),
            AdviceKind::FilterArgs => run_filter_args(&state, &config, active, original, args),
            AdviceKind::FilterReturn => {
                run_filter_return(&state, &config, active, original, args)
            }
            AdviceKind::BeforeWhile | AdviceKind::AfterWhile | AdviceKind::AroundWhile => {
                run_while(&state, &config, active, original, args)
            }
        }
    })
}

/// around：非アクティブなら完全素通し。アクティブなら引数・戻り値の
/// フィルタ済みビューと経過時間を1エントリに記録する。実引数と戻り値は
/// 変更しない。元関数の例外はハンドラへ渡した後、同一のまま再送出する。
fn run_around(
    state: &RegistryState,
    config: &TargetConfig,
    active: bool,
    original: &HostFn,
    args: &[Value],
) -> anyhow::Result<Value> {
    if !active {
        return (**original)(args);
    }

    let start = config.timing.then(Instant::now);
    let shown_args = with_guard(|| apply_filter(&config.arg_filter, &Value::list(args)));

    match (**original)(args) {
        Ok(result) => {
            let elapsed = start.map(|s| s.elapsed());
            with_guard(|| {
                let shown_ret = apply_filter(&config.return_filter, &result);
                let message = match elapsed {
                    Some(d) => format!(
                        "call {} args={} -> {} ({:?})",
                        config.target, shown_args, shown_ret, d
                    ),
                    None => format!(
                        "call {} args={} -> {}",
                        config.target, shown_args, shown_ret
                    ),
                };
                state.log(config, LogLevel::Debug, &message);
            });
            Ok(result)
        }
        Err(err) => {
            state.handle_call_error(&config.target, &err);
            // 制御フローとエラーの同一性を変えない
            Err(err)
        }
    }
}

/// before：アクティブならフィルタ済み引数を記録し、常に無変更の引数で
/// 呼び出す。戻り値は見えない。
fn run_before(
    state: &RegistryState,
    config: &TargetConfig,
    active: bool,
    original: &HostFn,
    args: &[Value],
) -> anyhow::Result<Value> {
    if active {
        with_guard(|| {
            let shown = apply_filter(&config.arg_filter, &Value::list(args));
            state.log(
                config,
                LogLevel::Debug,
                &format!("before {} args={}", config.target, shown),
            );
        });
    }
    (**original)(args)
}

/// after：先に呼び出し、アクティブならフィルタ済み引数と戻り値を記録
/// する。戻り値は無変更で返す。
fn run_after(
    state: &RegistryState,
    config: &TargetConfig,
    active: bool,
    original: &HostFn,
    args: &[Value],
) -> anyhow::Result<Value> {
    let result = (**original)(args)?;
    if active {
        with_guard(|| {
            let shown_args = apply_filter(&config.arg_filter, &Value::list(args));
            let shown_ret = apply_filter(&config.return_filter, &result);
            state.log(
                config,
                LogLevel::Debug,
                &format!("after {} args={} -> {}", config.target, shown_args, shown_ret),
            );
        });
    }
    Ok(result)
}

/// override：アドバイス自体が置換。アクティブなら呼び出しを記録してから
/// 置換関数へ委譲し、非アクティブなら記録せず委譲する。置換関数の無い
/// override は警告の上で元関数へ素通しする。
fn run_override(
    state: &RegistryState,
    config: &TargetConfig,
    active: bool,
    original: &HostFn,
    args: &[Value],
) -> anyhow::Result<Value> {
    let replacement = match &config.advice_fn {
        Some(replacement) => Rc::clone(replacement),
        None => {
            with_guard(|| {
                state.log_plain(
                    LogLevel::Warn,
                    Some(&config.target),
                    "override advice without a replacement function; calling original",
                );
            });
            return (**original)(args);
        }
    };

    if active {
        with_guard(|| {
            let shown = apply_filter(&config.arg_filter, &Value::list(args));
            state.log(
                config,
                LogLevel::Debug,
                &format!("override {} args={}", config.target, shown),
            );
        });
    }
    replacement(args)
}

/// filter-args：アクティブならフィルタが実際の呼び出し引数を変換する
/// 唯一の種別。非アクティブなら引数は無変更で通す。
fn run_filter_args(
    state: &RegistryState,
    config: &TargetConfig,
    active: bool,
    original: &HostFn,
    args: &[Value],
) -> anyhow::Result<Value> {
    if !active {
        return (**original)(args);
    }

    let filtered = with_guard(|| apply_filter(&config.arg_filter, &Value::list(args)));
    let new_args = match filtered {
        Value::List(items) => items,
        // リスト以外を返すフィルタは単一引数として扱う
        other => vec![other],
    };
    with_guard(|| {
        state.log(
            config,
            LogLevel::Trace,
            &format!("filter-args {} args={}", config.target, Value::list(&new_args)),
        );
    });
    (**original)(&new_args)
}

/// filter-return：filter-args と対称。アクティブなら呼び出し後に
/// 戻り値をフィルタで変換して返す。
fn run_filter_return(
    state: &RegistryState,
    config: &TargetConfig,
    active: bool,
    original: &HostFn,
    args: &[Value],
) -> anyhow::Result<Value> {
    let result = (**original)(args)?;
    if !active {
        return Ok(result);
    }

    let filtered = with_guard(|| apply_filter(&config.return_filter, &result));
    with_guard(|| {
        state.log(
            config,
            LogLevel::Trace,
            &format!("filter-return {} -> {}", config.target, filtered),
        );
    });
    Ok(filtered)
}

/// *-while 系の汎用フォールバック：アクティブなら trace レベルで
/// フィルタ済み引数を記録する。判定に関わらず常に素通しする。
fn run_while(
    state: &RegistryState,
    config: &TargetConfig,
    active: bool,
    original: &HostFn,
    args: &[Value],
) -> anyhow::Result<Value> {
    if active {
        with_guard(|| {
            let shown = apply_filter(&config.arg_filter, &Value::list(args));
            state.log(
                config,
                LogLevel::Trace,
                &format!("{} {} args={}", config.advice, config.target, shown),
            );
        });
    }
    (**original)(args)
}

/// 変数ターゲット用の変更オブザーバを生成する
///
/// 変更のたびに完全なアクティベーション判定をやり直し、アクティブなら
/// (旧値, 新値) を記録します。`break_on_change` が設定されていれば
/// ホストへ同期的なデバッグブレークを通知します（復帰はホストの能力）。
pub(crate) fn build_variable_observer(state: &Rc<RegistryState>, id: &str) -> ObserverFn {
    let state = Rc::clone(state);
    let id = id.to_string();

    Rc::new(move |name, old, new| {
        let config = match state.config(&id) {
            Some(config) => config,
            None => return,
        };
        if !is_active(state.global_enabled(), &config) {
            return;
        }

        if config.watch {
            with_guard(|| {
                state.log(
                    &config,
                    LogLevel::Debug,
                    &format!("watch {}: {} -> {}", name, old, new),
                );
            });
        }
        if config.break_on_change {
            state.trigger_break(name);
        }
    })
}

/// 共有フックディスパッチインターセプタを生成する
///
/// イベント名はそのままターゲットIDに解決されます。監視集合に含まれ、
/// かつ完全なアクティベーションが成り立つイベントだけ下流ディスパッチ
/// 全体を計時して記録します。それ以外（未監視イベントを含む）は
/// 透過的な素通しです。
pub(crate) fn build_dispatch_interceptor(state: &Rc<RegistryState>) -> DispatchFn {
    let state = Rc::clone(state);

    Rc::new(move |name, run| {
        if !state.is_monitored(name) {
            return run();
        }
        let config = match state.config(name) {
            Some(config) => config,
            None => return run(),
        };
        if !is_active(state.global_enabled(), &config) {
            return run();
        }

        let start = Instant::now();
        let result = run();
        let elapsed = start.elapsed();
        with_guard(|| {
            state.log(
                &config,
                LogLevel::Debug,
                &format!("hook {} dispatched in {:?}", name, elapsed),
            );
        });
        result
    })
}
