//! The `host` module installed into every plugin interpreter.
//!
//! Scripts reach the host only through `host::...` calls. Every function
//! here closes over the context's shared state, never over the interpreter
//! itself; callbacks handed to host services hold a `Weak` to it.

use crate::context::ContextShared;
use crate::host::{
    Command, CommandCompleter, CommandHandler, CommandInvocation, CommandOutcome, Event,
    EventHandler, EventPriority, Liveness, StorageHandle, TaskAction,
};
use crate::interpreter::Interpreter;
use crate::resources::TaskSchedule;
use rhai::{
    Array, Blob, Dynamic, Engine, EvalAltResult, FnPtr, Module, NativeCallContext, FLOAT, INT,
};
use scriptforge_runtime::{bytes_to_string, to_double, Capability, GuestError};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, warn};

type HostResult<T> = Result<T, Box<EvalAltResult>>;

fn host_error(err: impl fmt::Display) -> Box<EvalAltResult> {
    err.to_string().into()
}

impl ContextShared {
    fn require(&self, capability: Capability) -> HostResult<()> {
        if self.capabilities.has(&capability) {
            Ok(())
        } else {
            Err(host_error(format!(
                "plugin '{}' is not granted the '{}' capability",
                self.plugin,
                capability.as_str()
            )))
        }
    }

    fn current_interpreter(&self) -> Weak<Interpreter> {
        self.interpreter.borrow().clone()
    }
}

pub(crate) fn install(engine: &mut Engine, shared: &Rc<ContextShared>) {
    register_store_type(engine);

    let mut module = Module::new();
    register_identity(&mut module, shared);
    register_logging(&mut module, shared);
    register_scheduling(&mut module, shared);
    register_events(&mut module, shared);
    register_commands(&mut module, shared);
    register_storage(&mut module, shared);
    register_interop(&mut module, shared);
    register_internal(&mut module, shared);

    engine.register_static_module("host", module.into());
}

fn register_store_type(engine: &mut Engine) {
    engine
        .register_type_with_name::<StorageHandle>("Store")
        .register_get("name", |store: &mut StorageHandle| store.name().to_string())
        .register_get("path", |store: &mut StorageHandle| {
            store.path().display().to_string()
        })
        .register_fn(
            "get",
            |store: &mut StorageHandle, key: &str| -> HostResult<Dynamic> {
                let value = store.store().get(key).map_err(host_error)?;
                Ok(value.map_or(Dynamic::UNIT, Dynamic::from))
            },
        )
        .register_fn(
            "set",
            |store: &mut StorageHandle, key: &str, value: Dynamic| -> HostResult<()> {
                store
                    .store()
                    .set(key, &value.to_string())
                    .map_err(host_error)
            },
        )
        .register_fn(
            "remove",
            |store: &mut StorageHandle, key: &str| -> HostResult<bool> {
                store.store().remove(key).map_err(host_error)
            },
        )
        .register_fn("keys", |store: &mut StorageHandle| -> HostResult<Array> {
            let keys = store.store().keys().map_err(host_error)?;
            Ok(keys.into_iter().map(Dynamic::from).collect())
        });
}

fn register_identity(module: &mut Module, shared: &Rc<ContextShared>) {
    let ctx = Rc::clone(shared);
    module.set_native_fn("name", move || -> HostResult<String> { Ok(ctx.plugin.clone()) });

    let ctx = Rc::clone(shared);
    module.set_native_fn("version", move || -> HostResult<String> {
        Ok(ctx.version.clone())
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("host_version", move || -> HostResult<String> {
        Ok(ctx.services.settings.host_version.clone())
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("root", move || -> HostResult<String> {
        Ok(ctx.root.display().to_string())
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("data_dir", move || -> HostResult<String> {
        Ok(ctx.data_dir.display().to_string())
    });
}

fn register_logging(module: &mut Module, shared: &Rc<ContextShared>) {
    let ctx = Rc::clone(shared);
    module.set_native_fn("log_debug", move |message: &str| -> HostResult<()> {
        ctx.require(Capability::Logging)?;
        debug!(plugin = %ctx.plugin, "{}", message);
        Ok(())
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("log_info", move |message: &str| -> HostResult<()> {
        ctx.require(Capability::Logging)?;
        info!(plugin = %ctx.plugin, "{}", message);
        Ok(())
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("log_warn", move |message: &str| -> HostResult<()> {
        ctx.require(Capability::Logging)?;
        warn!(plugin = %ctx.plugin, "{}", message);
        Ok(())
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("log_error", move |message: &str| -> HostResult<()> {
        ctx.require(Capability::Logging)?;
        error!(plugin = %ctx.plugin, "{}", message);
        Ok(())
    });
}

fn ticks(value: INT, what: &str) -> HostResult<u64> {
    u64::try_from(value).map_err(|_| host_error(format!("{} must not be negative", what)))
}

fn register_scheduling(module: &mut Module, shared: &Rc<ContextShared>) {
    let ctx = Rc::clone(shared);
    module.set_native_fn(
        "schedule_once",
        move |function: FnPtr, delay: INT| -> HostResult<INT> {
            ctx.require(Capability::Scheduling)?;
            let schedule = TaskSchedule::Once {
                delay: ticks(delay, "delay")?,
            };
            let action = task_action(&ctx, function);
            let token = ctx.resources.borrow_mut().register_task(schedule, action);
            Ok(token.0 as INT)
        },
    );

    let ctx = Rc::clone(shared);
    module.set_native_fn(
        "schedule_repeating",
        move |function: FnPtr, delay: INT, period: INT| -> HostResult<INT> {
            ctx.require(Capability::Scheduling)?;
            let schedule = TaskSchedule::Repeating {
                delay: ticks(delay, "delay")?,
                period: ticks(period, "period")?,
            };
            let action = task_action(&ctx, function);
            let token = ctx.resources.borrow_mut().register_task(schedule, action);
            Ok(token.0 as INT)
        },
    );
}

fn register_events(module: &mut Module, shared: &Rc<ContextShared>) {
    let ctx = Rc::clone(shared);
    module.set_native_fn(
        "register_event",
        move |kind: &str, function: FnPtr| -> HostResult<INT> {
            ctx.require(Capability::Events)?;
            let handler = event_handler(&ctx, function);
            let token = ctx.resources.borrow_mut().register_event_subscription(
                kind,
                EventPriority::Normal,
                handler,
                false,
            );
            Ok(token.0 as INT)
        },
    );

    let ctx = Rc::clone(shared);
    module.set_native_fn(
        "register_event",
        move |kind: &str,
              priority: &str,
              function: FnPtr,
              ignore_cancelled: bool|
              -> HostResult<INT> {
            ctx.require(Capability::Events)?;
            let priority = EventPriority::parse(priority)
                .ok_or_else(|| host_error(format!("unknown event priority '{}'", priority)))?;
            let handler = event_handler(&ctx, function);
            let token = ctx.resources.borrow_mut().register_event_subscription(
                kind,
                priority,
                handler,
                ignore_cancelled,
            );
            Ok(token.0 as INT)
        },
    );
}

fn string_list(items: Array, what: &str) -> HostResult<Vec<String>> {
    items
        .into_iter()
        .map(|item| {
            item.into_string()
                .map_err(|found| host_error(format!("{} must be strings, found {}", what, found)))
        })
        .collect()
}

fn register_commands(module: &mut Module, shared: &Rc<ContextShared>) {
    let ctx = Rc::clone(shared);
    module.set_native_fn(
        "register_command",
        move |name: &str, aliases: Array, handler: FnPtr, description: &str| -> HostResult<INT> {
            ctx.require(Capability::Commands)?;
            let command = Command::new(name, command_handler(&ctx, handler))
                .with_aliases(string_list(aliases, "aliases")?)
                .with_description(description);
            let token = ctx
                .resources
                .borrow_mut()
                .register_command(command)
                .map_err(host_error)?;
            Ok(token.0 as INT)
        },
    );

    let ctx = Rc::clone(shared);
    module.set_native_fn(
        "register_command",
        move |name: &str,
              aliases: Array,
              handler: FnPtr,
              completer: FnPtr,
              description: &str|
              -> HostResult<INT> {
            ctx.require(Capability::Commands)?;
            let command = Command::new(name, command_handler(&ctx, handler))
                .with_aliases(string_list(aliases, "aliases")?)
                .with_description(description)
                .with_completer(command_completer(&ctx, completer));
            let token = ctx
                .resources
                .borrow_mut()
                .register_command(command)
                .map_err(host_error)?;
            Ok(token.0 as INT)
        },
    );
}

fn register_storage(module: &mut Module, shared: &Rc<ContextShared>) {
    let ctx = Rc::clone(shared);
    module.set_native_fn("open_storage", move |name: &str| -> HostResult<StorageHandle> {
        ctx.require(Capability::Storage)?;
        ctx.resources
            .borrow_mut()
            .open_storage(name)
            .map_err(host_error)
    });
}

fn register_interop(module: &mut Module, shared: &Rc<ContextShared>) {
    let ctx = Rc::clone(shared);
    module.set_native_fn("to_double", move |value: INT| -> HostResult<FLOAT> {
        ctx.require(Capability::Interop)?;
        to_double(&Dynamic::from(value)).ok_or_else(|| host_error("not a number"))
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("to_double", move |value: FLOAT| -> HostResult<FLOAT> {
        ctx.require(Capability::Interop)?;
        Ok(value)
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("bytes_to_string", move |bytes: Blob| -> HostResult<String> {
        ctx.require(Capability::Interop)?;
        Ok(bytes_to_string(&bytes))
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn(
        "catch_error",
        move |context: NativeCallContext, function: FnPtr| -> HostResult<Dynamic> {
            ctx.require(Capability::Interop)?;
            match function.call_within_context::<Dynamic>(&context, ()) {
                Ok(_) => Ok(Dynamic::UNIT),
                // Resource limits and termination are not script errors.
                Err(err) if err.is_system_exception() => Err(err),
                Err(err) => {
                    let source = context
                        .source()
                        .map(str::to_string)
                        .unwrap_or_else(|| ctx.plugin.clone());
                    Ok(GuestError::from_eval(&err, &source)
                        .to_script_value()
                        .into_dynamic())
                }
            }
        },
    );
}

fn register_internal(module: &mut Module, shared: &Rc<ContextShared>) {
    let ctx = Rc::clone(shared);
    module.set_native_fn("plugin_root", move |name: &str| -> HostResult<Dynamic> {
        ctx.require(Capability::Internal)?;
        Ok(ctx
            .services
            .directory
            .root_of(name)
            .map_or(Dynamic::UNIT, |root| {
                Dynamic::from(root.display().to_string())
            }))
    });

    let ctx = Rc::clone(shared);
    module.set_native_fn("env", move |name: &str| -> HostResult<Dynamic> {
        ctx.require(Capability::Internal)?;
        Ok(std::env::var(name).map_or(Dynamic::UNIT, Dynamic::from))
    });
}

fn task_action(ctx: &ContextShared, function: FnPtr) -> TaskAction {
    let interpreter = ctx.current_interpreter();
    let plugin = ctx.plugin.clone();
    Rc::new(move || {
        let Some(interpreter) = interpreter.upgrade() else {
            return Liveness::Inert;
        };
        if let Err(err) = interpreter.call(&function, ()) {
            warn!(plugin = %plugin, "Scheduled task failed: {}", err);
        }
        Liveness::Live
    })
}

fn event_map(event: &Event) -> Dynamic {
    let mut map = rhai::Map::new();
    map.insert("kind".into(), Dynamic::from(event.kind.clone()));
    map.insert("payload".into(), event.payload.clone().into_dynamic());
    map.insert("cancelled".into(), Dynamic::from(event.cancelled));
    Dynamic::from_map(map)
}

fn event_handler(ctx: &ContextShared, function: FnPtr) -> EventHandler {
    let interpreter = ctx.current_interpreter();
    let plugin = ctx.plugin.clone();
    Rc::new(move |event: &mut Event| {
        let Some(interpreter) = interpreter.upgrade() else {
            return Liveness::Inert;
        };
        match interpreter.call(&function, (event_map(event),)) {
            Ok(result) => {
                if result.as_bool().unwrap_or(false) {
                    event.cancelled = true;
                }
            }
            Err(err) => {
                warn!(plugin = %plugin, "Handler for event '{}' failed: {}", event.kind, err)
            }
        }
        Liveness::Live
    })
}

fn invocation_args(invocation: &CommandInvocation) -> (Dynamic, Dynamic, Dynamic) {
    let args: Array = invocation
        .args
        .iter()
        .cloned()
        .map(Dynamic::from)
        .collect();
    (
        Dynamic::from(invocation.sender.clone()),
        Dynamic::from(invocation.label.clone()),
        Dynamic::from_array(args),
    )
}

fn command_handler(ctx: &ContextShared, function: FnPtr) -> CommandHandler {
    let interpreter = ctx.current_interpreter();
    let plugin = ctx.plugin.clone();
    Rc::new(move |invocation: &CommandInvocation| {
        let Some(interpreter) = interpreter.upgrade() else {
            return CommandOutcome::Inert;
        };
        match interpreter.call(&function, invocation_args(invocation)) {
            Ok(result) if result.as_bool() == Ok(false) => CommandOutcome::Rejected,
            Ok(_) => CommandOutcome::Handled,
            Err(err) => {
                warn!(plugin = %plugin, "Command '{}' failed: {}", invocation.label, err);
                CommandOutcome::Failed(err.to_string())
            }
        }
    })
}

fn command_completer(ctx: &ContextShared, function: FnPtr) -> CommandCompleter {
    let interpreter = ctx.current_interpreter();
    let plugin = ctx.plugin.clone();
    Rc::new(move |invocation: &CommandInvocation| {
        let Some(interpreter) = interpreter.upgrade() else {
            return Vec::new();
        };
        match interpreter.call(&function, invocation_args(invocation)) {
            Ok(result) => result
                .into_array()
                .map(|items| items.into_iter().map(|item| item.to_string()).collect())
                .unwrap_or_default(),
            Err(err) => {
                warn!(plugin = %plugin, "Completer for '{}' failed: {}", invocation.label, err);
                Vec::new()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::context::ScriptContext;
    use crate::host::{Event, HostSettings, LocalHost};
    use scriptforge_runtime::{PluginManifest, RuntimeError, ScriptValue};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        host: LocalHost,
        context: ScriptContext,
    }

    fn fixture(internal: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let host = LocalHost::new(HostSettings {
            storage_dir: dir.path().join("databases"),
            ..HostSettings::default()
        });
        let manifest = PluginManifest::from_str(&format!(
            "[plugin]\nname = \"scout\"\nversion = \"0.3.0\"\nmain = \"main.rhai\"\ninternal_apis = {}\n",
            internal
        ))
        .unwrap();
        let root = dir.path().join("scout");
        std::fs::create_dir_all(&root).unwrap();
        host.services().directory.insert("scout", &root);

        let mut context = ScriptContext::new(&manifest, &root, &root.join("data"), host.services());
        context.construct().unwrap();
        Fixture {
            _dir: dir,
            host,
            context,
        }
    }

    fn eval(fixture: &Fixture, source: &str) -> ScriptValue {
        fixture.context.evaluate(source, "main.rhai").unwrap()
    }

    #[test]
    fn test_named_function_as_task() {
        let f = fixture(false);
        eval(
            &f,
            r#"
            fn bump() { let s = host::open_storage("state"); s.set("n", 1); }
            host::schedule_once(Fn("bump"), 2);
            "#,
        );

        f.host.scheduler.advance(2);
        let value = eval(&f, r#"host::open_storage("state").get("n")"#);
        assert_eq!(value, ScriptValue::Text("1".into()));
    }

    #[test]
    fn test_negative_delay_is_rejected() {
        let f = fixture(false);
        let err = f
            .context
            .evaluate("host::schedule_once(|| 1, -1)", "main.rhai")
            .unwrap_err();
        assert!(err.to_string().contains("delay"));
    }

    #[test]
    fn test_event_handler_cancels() {
        let f = fixture(false);
        eval(
            &f,
            r#"
            host::register_event("chat", |e| e.payload == "spam");
            host::register_event("chat", "monitor", |e| host::log_info("saw chat"), true);
            "#,
        );

        let mut spam = Event::new("chat", ScriptValue::Text("spam".into()));
        assert_eq!(f.host.events.emit(&mut spam), 1);
        assert!(spam.cancelled);

        let mut hello = Event::new("chat", ScriptValue::Text("hello".into()));
        assert_eq!(f.host.events.emit(&mut hello), 2);
        assert!(!hello.cancelled);
    }

    #[test]
    fn test_unknown_priority_is_rejected() {
        let f = fixture(false);
        let result = f
            .context
            .evaluate(r#"host::register_event("x", "urgent", |e| 0, false)"#, "main.rhai");
        assert!(result.is_err());
    }

    #[test]
    fn test_command_outcomes() {
        use crate::host::CommandOutcome;

        let f = fixture(false);
        eval(
            &f,
            r#"
            fn greet(sender, label, args) { args.len() > 0 }
            host::register_command("greet", ["hi"], Fn("greet"), "Say hello");
            host::register_command("fail", [], |s, l, a| { throw "nope"; }, |s, l, a| ["x", "y"], "");
            "#,
        );

        assert_eq!(
            f.host.commands.dispatch("console", "scout:greet bob"),
            Some(CommandOutcome::Handled)
        );
        assert_eq!(
            f.host.commands.dispatch("console", "hi"),
            Some(CommandOutcome::Rejected)
        );
        assert!(matches!(
            f.host.commands.dispatch("console", "fail"),
            Some(CommandOutcome::Failed(_))
        ));
        assert_eq!(
            f.host.commands.complete("console", "fail "),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn test_interop_helpers() {
        let f = fixture(false);
        assert_eq!(eval(&f, "host::to_double(3)"), ScriptValue::Float(3.0));
        assert_eq!(
            eval(&f, "let b = blob(); b.push(104); b.push(105); host::bytes_to_string(b)"),
            ScriptValue::Text("hi".into())
        );
        assert_eq!(eval(&f, "host::catch_error(|| 1 + 1)"), ScriptValue::Unit);

        match eval(&f, r#"host::catch_error(|| { throw "broken"; })"#) {
            ScriptValue::Map(map) => {
                assert_eq!(map.get("message"), Some(&ScriptValue::Text("broken".into())));
                assert!(map.contains_key("stack"));
            }
            other => panic!("expected an error map, got {:?}", other),
        }
    }

    #[test]
    fn test_internal_calls_are_gated() {
        let f = fixture(false);
        let err = f
            .context
            .evaluate(r#"host::plugin_root("scout")"#, "main.rhai")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::GuestEvaluation(_)));
        assert!(err.to_string().contains("internal"));

        let f = fixture(true);
        let root = eval(&f, r#"host::plugin_root("scout")"#);
        assert!(matches!(root, ScriptValue::Text(ref path) if path.ends_with("scout")));
        assert_eq!(eval(&f, r#"host::plugin_root("absent")"#), ScriptValue::Unit);
    }

    #[test]
    fn test_store_accessors() {
        let f = fixture(false);
        let value = eval(
            &f,
            r#"
            let s = host::open_storage("config");
            s.set("b", "2");
            s.set("a", "1");
            s.remove("b");
            [s.name, s.keys(), s.get("missing")]
            "#,
        );
        assert_eq!(
            value,
            ScriptValue::List(vec![
                ScriptValue::Text("config".into()),
                ScriptValue::List(vec![ScriptValue::Text("a".into())]),
                ScriptValue::Unit,
            ])
        );
    }
}
