//! Integration tests for scriptforge-host.
//!
//! These tests drive the host runtime the way the console loop does:
//! configuration → start → console commands → ticks → shutdown,
//! with plugin stores backed by SQLite in a temporary directory.

use scriptforge_host::config::Config;
use scriptforge_host::console::ConsoleCommand;
use scriptforge_host::runtime::{ConsoleReply, HostRuntime};
use scriptforge_host::storage::{SqliteStorage, SqliteStore};
use scriptforge_plugin_api::host::KeyValueStore;
use scriptforge_plugin_api::PluginState;
use scriptforge_runtime::MANIFEST_FILE;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

fn create_plugin(dir: &Path, name: &str, main: &str) {
    let plugin_dir = dir.join(name);
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(
        plugin_dir.join(MANIFEST_FILE),
        format!("[plugin]\nname = \"{name}\"\nversion = \"0.2.0\"\nmain = \"main.rhai\"\n"),
    )
    .unwrap();
    std::fs::write(plugin_dir.join("main.rhai"), main).unwrap();
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.plugins.search_dirs = vec![dir.path().join("plugins")];
    config.plugins.storage_dir = Some(dir.path().join("databases"));
    config.plugins.leak_check_delay_ticks = 5;
    config
}

fn run(runtime: &mut HostRuntime, line: &str) -> Vec<String> {
    let command = ConsoleCommand::parse(line).unwrap();
    match runtime.execute(command).unwrap() {
        ConsoleReply::Output(lines) => lines,
        ConsoleReply::Quit => panic!("unexpected quit for {:?}", line),
    }
}

const GREETER: &str = r#"
host::register_command("greet", ["hello"], |sender, label, args| {
    if args.len() == 0 { return false; }
    host::open_storage("greetings").set(args[0], sender);
    true
}, "Greet someone");

host::register_event("player_join", |event| {
    host::open_storage("greetings").set(event.payload.name, "joined");
});

host::schedule_repeating(|| {
    let s = host::open_storage("ticks");
    let n = s.get("n");
    s.set("n", if n == () { 1 } else { parse_int(n) + 1 });
}, 1, 1);
"#;

#[test]
fn test_console_session_persists_to_sqlite() {
    let dir = TempDir::new().unwrap();
    create_plugin(&dir.path().join("plugins"), "greeter", GREETER);

    let mut runtime = HostRuntime::new(&test_config(&dir), Rc::new(SqliteStorage::new())).unwrap();
    assert_eq!(runtime.start(), 1);

    let listing = run(&mut runtime, "plugins");
    assert_eq!(listing.len(), 1);
    assert!(listing[0].starts_with("greeter v0.2.0 [enabled]"));

    assert!(run(&mut runtime, "commands").contains(&"greeter:greet".to_string()));
    assert!(run(&mut runtime, "hello alex").is_empty());
    assert_eq!(run(&mut runtime, "greet"), vec!["Usage error".to_string()]);
    assert_eq!(
        run(&mut runtime, "frobnicate"),
        vec!["Unknown command: frobnicate".to_string()]
    );

    let emitted = run(&mut runtime, r#"emit player_join {"name": "sam"}"#);
    assert_eq!(emitted, vec!["'player_join' delivered to 1 handler(s)".to_string()]);

    for _ in 0..3 {
        runtime.tick();
    }
    runtime.shutdown();

    let greetings = SqliteStore::open_at(
        &dir.path().join("databases").join("greeter").join("greetings.db"),
    )
    .unwrap();
    assert_eq!(greetings.get("alex").unwrap().as_deref(), Some("console"));
    assert_eq!(greetings.get("sam").unwrap().as_deref(), Some("joined"));

    let ticks = SqliteStore::open_at(&dir.path().join("databases").join("greeter").join("ticks.db"))
        .unwrap();
    assert_eq!(ticks.get("n").unwrap().as_deref(), Some("3"));
}

#[test]
fn test_configured_disabled_plugin_is_loaded_but_not_enabled() {
    let dir = TempDir::new().unwrap();
    let plugins = dir.path().join("plugins");
    create_plugin(&plugins, "greeter", GREETER);
    create_plugin(&plugins, "quiet", r#"host::log_info("quiet started");"#);

    let mut config = test_config(&dir);
    config.plugins.disabled = vec!["quiet".to_string()];

    let mut runtime = HostRuntime::new(&config, Rc::new(SqliteStorage::new())).unwrap();
    assert_eq!(runtime.start(), 1);

    let quiet = runtime.registry().find("quiet").unwrap();
    assert_eq!(runtime.registry().get(quiet).unwrap().state(), PluginState::Loaded);

    assert_eq!(run(&mut runtime, "enable quiet"), vec!["quiet is enabled".to_string()]);
    assert_eq!(run(&mut runtime, "disable greeter"), vec!["greeter is disabled".to_string()]);
    assert_eq!(
        run(&mut runtime, "greet alex"),
        vec!["Unknown command: greet alex".to_string()]
    );
}

#[test]
fn test_unknown_plugin_name_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut runtime = HostRuntime::new(&test_config(&dir), Rc::new(SqliteStorage::new())).unwrap();
    assert_eq!(runtime.start(), 0);

    let command = ConsoleCommand::parse("enable ghost").unwrap();
    assert!(runtime.execute(command).is_err());
}

#[test]
fn test_failing_plugin_ends_disabled() {
    let dir = TempDir::new().unwrap();
    create_plugin(&dir.path().join("plugins"), "broken", "false");

    let mut runtime = HostRuntime::new(&test_config(&dir), Rc::new(SqliteStorage::new())).unwrap();
    assert_eq!(runtime.start(), 0);

    let id = runtime.registry().find("broken").unwrap();
    assert_eq!(runtime.registry().get(id).unwrap().state(), PluginState::Disabled);
}

#[test]
fn test_shutdown_completes_leak_checks() {
    let dir = TempDir::new().unwrap();
    create_plugin(&dir.path().join("plugins"), "greeter", GREETER);

    let mut runtime = HostRuntime::new(&test_config(&dir), Rc::new(SqliteStorage::new())).unwrap();
    runtime.start();
    runtime.shutdown();

    let leaks = runtime.host().leaks();
    assert_eq!(leaks.pending(), 0);
    assert_eq!(leaks.completed(), 1);
    assert!(leaks.warnings().is_empty());
}

#[test]
fn test_quit() {
    let dir = TempDir::new().unwrap();
    let mut runtime = HostRuntime::new(&test_config(&dir), Rc::new(SqliteStorage::new())).unwrap();
    let reply = runtime.execute(ConsoleCommand::Quit).unwrap();
    assert_eq!(reply, ConsoleReply::Quit);
}

#[test]
fn test_demo_greeter_plugin() {
    let dir = TempDir::new().unwrap();
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos");
    let mut config = test_config(&dir);
    config.plugins.search_dirs = vec![demos];

    let mut runtime = HostRuntime::new(&config, Rc::new(SqliteStorage::new())).unwrap();
    assert_eq!(runtime.start(), 1);

    let labels = run(&mut runtime, "commands");
    for label in ["greeter:greet", "greeter:hi", "greeter:hello", "greeter:help"] {
        assert!(labels.contains(&label.to_string()), "missing {}", label);
    }

    assert!(run(&mut runtime, "hi alex").is_empty());
    assert!(run(&mut runtime, "help").is_empty());
    assert_eq!(run(&mut runtime, "greeter:greet"), vec!["Usage error".to_string()]);
    run(&mut runtime, r#"emit player_join {"name": "sam"}"#);
    run(&mut runtime, "emit player_join");

    let completions = runtime.host().commands.complete("console", "greet a");
    assert_eq!(completions, vec!["alex".to_string(), "sam".to_string()]);

    runtime.shutdown();
    assert!(runtime.host().leaks().warnings().is_empty());
}
