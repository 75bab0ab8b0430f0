//! Debrief CLI - コマンドラインインターフェース
//!
//! デバッグターゲットの登録・トグル・照合を対話的に行うREPLです。
//! デモ用のホスト環境（関数・変数・イベント）を組み立て、レジストリ
//! APIの純粋な呼び出し側として振る舞います。

mod store;

use anyhow::Result;
use clap::Parser;
use debrief_core::{
    Command, EnabledSpec, RawTargetConfig, Registry, TracingLogger, Value, ValueSpec,
};
use debrief_host::HostEnv;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::rc::Rc;
use store::JsonFileStore;
use tracing_subscriber::EnvFilter;

/// Debrief - Live Instrumentation REPL
#[derive(Parser)]
#[command(name = "debrief")]
#[command(version = "0.1.0")]
#[command(about = "Declarative debug-target registry and live instrumentation", long_about = None)]
struct Cli {
    /// Path to the JSON snapshot file for persisted target state
    #[arg(long)]
    state: Option<PathBuf>,

    /// Pre-register a set of sample targets against the demo host
    #[arg(long)]
    demo: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    println!("Debrief - Live Instrumentation REPL");
    println!("Version 0.1.0");
    println!();

    let cli = Cli::parse();
    let host = Rc::new(demo_host());
    let registry = Registry::new(Rc::clone(&host), Rc::new(TracingLogger));

    if let Some(path) = cli.state {
        println!("Using snapshot file: {}", path.display());
        registry.set_store(Rc::new(JsonFileStore::new(path)));
        match registry.load_snapshot() {
            Ok(count) => println!("Loaded {} target(s) from snapshot", count),
            Err(err) => println!("Snapshot not loaded: {}", err),
        }
        println!();
    }

    if cli.demo {
        register_demo_targets(&registry);
        println!("Registered demo targets; global switch is on");
        println!();
    }

    run_repl(&host, &registry)?;
    registry.teardown();
    Ok(())
}

/// デモ用のホスト環境を組み立てる
///
/// 実運用ではホスト側が間接参照テーブル経由で計装対象を公開します。
fn demo_host() -> HostEnv {
    let host = HostEnv::new();

    host.define_fn(
        "add",
        Rc::new(|args| {
            let mut sum = 0;
            for arg in args {
                match arg {
                    Value::Int(n) => sum += n,
                    other => anyhow::bail!("add expects integers, got {}", other),
                }
            }
            Ok(Value::Int(sum))
        }),
    );
    host.define_fn(
        "greet",
        Rc::new(|args| match args {
            [Value::Str(name)] => Ok(Value::Str(format!("Hello, {}!", name))),
            _ => Ok(Value::Str("Hello!".to_string())),
        }),
    );
    host.define_fn("fail", Rc::new(|_| anyhow::bail!("fail always raises")));

    host.define_var("verbose", Value::Bool(false));
    host.define_var("threshold", Value::Int(10));

    host.define_event("startup");
    host.define_event("tick");
    host.add_listener("tick", Rc::new(|_| Ok(Value::Nil)))
        .expect("tick event was just defined");

    host.set_break_handler(Rc::new(|name| {
        println!("*** debug break: variable `{}` changed ***", name);
    }));

    host
}

/// デモターゲットを登録してグローバルスイッチを入れる
fn register_demo_targets(registry: &Registry) {
    let demo = vec![
        RawTargetConfig {
            enabled: Some(EnabledSpec::Literal(true)),
            advice: Some("around".to_string()),
            timing: Some(true),
            description: Some("integer adder".to_string()),
            ..RawTargetConfig::new("add")
        },
        RawTargetConfig {
            enabled: Some(EnabledSpec::Literal(true)),
            watch: Some(true),
            values: Some(vec![
                ValueSpec::Literal(Value::Bool(true)),
                ValueSpec::Literal(Value::Bool(false)),
            ]),
            ..RawTargetConfig::new("verbose")
        },
        RawTargetConfig {
            enabled: Some(EnabledSpec::Literal(true)),
            ..RawTargetConfig::new("startup")
        },
    ];
    registry.register_all(&demo);
    registry.set_global_enabled(true);
    registry.set_hook_monitoring(true);
}

/// REPLループを実行する
fn run_repl(host: &Rc<HostEnv>, registry: &Registry) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(debrief) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match Command::parse(line) {
                    Some(Command::Quit) => {
                        println!("Goodbye!");
                        break;
                    }
                    Some(command) => {
                        if let Err(e) = handle_command(host, registry, command) {
                            eprintln!("Error: {}", e);
                        }
                    }
                    None => println!("Unknown command: {} (try 'help')", line),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(host: &Rc<HostEnv>, registry: &Registry, command: Command) -> Result<()> {
    match command {
        Command::Register { id, opts } => {
            let raw = raw_config_from_opts(&id, &opts);
            let id = registry.register(&id, &raw)?;
            println!("Registered target `{}`", id);
        }
        Command::Unregister(id) => {
            registry.unregister(&id)?;
            println!("Unregistered target `{}`", id);
        }
        Command::Toggle(id) => {
            let state = registry.toggle_target(&id)?;
            println!("Target `{}` is now {}", id, if state { "enabled" } else { "disabled" });
        }
        Command::ToggleGroup(group) => {
            let state = registry.toggle_group(&group)?;
            println!(
                "Group `{}` is now {}",
                group,
                if state { "enabled" } else { "disabled" }
            );
        }
        Command::List => print_targets(registry),
        Command::Refresh => {
            registry.refresh_all();
            println!("Reconciled {} target(s)", registry.target_ids().len());
        }
        Command::Global(on) => {
            registry.set_global_enabled(on);
            println!("Global switch: {}", if on { "on" } else { "off" });
        }
        Command::Hooks(on) => {
            registry.set_hook_monitoring(on);
            println!("Hook monitoring: {}", if on { "on" } else { "off" });
        }
        Command::Call { id, args } => {
            let args: Vec<Value> = args.iter().map(|s| Value::parse_literal(s)).collect();
            let result = host.call(&id, &args)?;
            println!("=> {}", result);
        }
        Command::SetVar { id, value } => {
            host.write_var(&id, Value::parse_literal(&value))?;
            println!("{} = {}", id, host.read_var(&id)?);
        }
        Command::GetVar(id) => {
            println!("{} = {}", id, host.read_var(&id)?);
        }
        Command::Fire { id, args } => {
            let args: Vec<Value> = args.iter().map(|s| Value::parse_literal(s)).collect();
            host.dispatch(&id, &args)?;
            println!("Dispatched event `{}`", id);
        }
        Command::Save => {
            registry.save()?;
            println!("Snapshot saved");
        }
        Command::Load => {
            let count = registry.load_snapshot()?;
            println!("Loaded {} target(s) from snapshot", count);
        }
        Command::Help => print_help(),
        Command::Quit => unreachable!("handled by the REPL loop"),
    }
    Ok(())
}

/// `key=value` オプション列から生レコードを組み立てる
fn raw_config_from_opts(id: &str, opts: &[(String, String)]) -> RawTargetConfig {
    let mut raw = RawTargetConfig::new(id);
    for (key, value) in opts {
        match key.as_str() {
            "kind" => raw.kind = Some(value.clone()),
            "enabled" => raw.enabled = Some(EnabledSpec::Literal(value == "true")),
            "group" => raw.group = Some(value.clone()),
            "desc" | "description" => raw.description = Some(value.clone()),
            "level" => raw.min_log_level = Some(value.clone()),
            "advice" => raw.advice = Some(value.clone()),
            "timing" => raw.timing = Some(value == "true"),
            "watch" => raw.watch = Some(value == "true"),
            "break" => raw.break_on_change = Some(value == "true"),
            "values" => {
                raw.values = Some(
                    value
                        .split(',')
                        .map(|v| ValueSpec::Literal(Value::parse_literal(v)))
                        .collect(),
                );
            }
            other => println!("Unknown option `{}` ignored", other),
        }
    }
    raw
}

/// 登録済みターゲットを一覧表示する
fn print_targets(registry: &Registry) {
    let ids = registry.target_ids();
    if ids.is_empty() {
        println!("No targets registered");
        return;
    }

    println!("Targets ({}):", ids.len());
    for id in &ids {
        if let Some(config) = registry.config(id) {
            let active = registry.is_target_active(id);
            let installed = registry.is_installed(id);
            println!(
                "  {} [{}] group={} active={} installed={}{}",
                id,
                config.kind.as_str(),
                config.group,
                active,
                installed,
                config
                    .description
                    .as_deref()
                    .map(|d| format!("  # {}", d))
                    .unwrap_or_default()
            );
        }
    }
    println!("Groups: {}", registry.group_ids().join(", "));
}

fn print_help() {
    println!("Commands:");
    println!("  register <id> [key=value ...]  Register a target (reg)");
    println!("      keys: kind enabled group desc level advice timing watch break values");
    println!("  unregister <id>                Unregister a target (unreg)");
    println!("  toggle <id>                    Toggle a target (t)");
    println!("  group <id>                     Toggle a whole group (g)");
    println!("  list                           List registered targets (ls)");
    println!("  refresh                        Reconcile all targets (r)");
    println!("  global on|off                  Set the global switch");
    println!("  hooks on|off                   Set hook monitoring");
    println!("  call <fn> [args ...]           Call a host function");
    println!("  set <var> <value>              Write a host variable");
    println!("  get <var>                      Read a host variable");
    println!("  fire <event> [args ...]        Dispatch a host event");
    println!("  save / load                    Persist or restore the snapshot");
    println!("  help                           Show this help (h, ?)");
    println!("  quit                           Exit (q)");
}
