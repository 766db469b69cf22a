//! The global command table.
//!
//! Every command is reachable as `namespace:name` and `namespace:alias`. A
//! bare label resolves to the earliest still-registered command that claims
//! it as a name, falling back to aliases.

use super::CommandToken;
use scriptforge_runtime::{RuntimeError, RuntimeResult};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Handler for a dispatched command.
pub type CommandHandler = Rc<dyn Fn(&CommandInvocation) -> CommandOutcome>;

/// Tab completion provider. `args` holds the words typed so far.
pub type CommandCompleter = Rc<dyn Fn(&CommandInvocation) -> Vec<String>>;

/// A command invocation as seen by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    /// Who issued the command.
    pub sender: String,

    /// The label the command was invoked with.
    pub label: String,

    pub args: Vec<String>,
}

/// What a command handler made of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Handled,
    /// The handler declined; the caller should show usage.
    Rejected,
    /// The handler raised an error.
    Failed(String),
    /// The handler's interpreter no longer exists.
    Inert,
}

/// A command to register.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub handler: CommandHandler,
    pub completer: Option<CommandCompleter>,
}

impl Command {
    pub fn new(name: impl Into<String>, handler: CommandHandler) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            handler,
            completer: None,
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_completer(mut self, completer: CommandCompleter) -> Self {
        self.completer = Some(completer);
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("description", &self.description)
            .field("completer", &self.completer.is_some())
            .finish()
    }
}

/// Host-side command registry.
pub trait CommandTable {
    /// Register a command under `namespace`.
    fn register(&self, namespace: &str, command: Command) -> RuntimeResult<CommandToken>;

    /// Remove exactly the command registered under `token`.
    fn unregister(&self, token: CommandToken) -> RuntimeResult<()>;
}

struct RegisteredCommand {
    namespace: String,
    name: String,
    aliases: Vec<String>,
    command: Command,
}

impl RegisteredCommand {
    fn qualified(&self, label: &str) -> bool {
        label
            .split_once(':')
            .map(|(ns, rest)| {
                ns == self.namespace && (rest == self.name || self.aliases.iter().any(|a| a == rest))
            })
            .unwrap_or(false)
    }
}

#[derive(Default)]
struct CommandState {
    next_token: u64,
    commands: BTreeMap<u64, RegisteredCommand>,
}

/// Single-threaded command table.
#[derive(Default)]
pub struct CommandMap {
    state: RefCell<CommandState>,
}

impl CommandMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a label to the command that currently answers to it.
    pub fn resolve(&self, label: &str) -> Option<CommandToken> {
        let label = label.to_lowercase();
        let state = self.state.borrow();

        if label.contains(':') {
            return state
                .commands
                .iter()
                .find(|(_, cmd)| cmd.qualified(&label))
                .map(|(token, _)| CommandToken(*token));
        }

        state
            .commands
            .iter()
            .find(|(_, cmd)| cmd.name == label)
            .or_else(|| {
                state
                    .commands
                    .iter()
                    .find(|(_, cmd)| cmd.aliases.iter().any(|a| *a == label))
            })
            .map(|(token, _)| CommandToken(*token))
    }

    /// True if `label` resolves to a command.
    pub fn is_registered(&self, label: &str) -> bool {
        self.resolve(label).is_some()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.state.borrow().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Qualified `namespace:name` labels, in registration order.
    pub fn labels(&self) -> Vec<String> {
        self.state
            .borrow()
            .commands
            .values()
            .map(|cmd| format!("{}:{}", cmd.namespace, cmd.name))
            .collect()
    }

    /// Commands registered under one namespace.
    pub fn commands_in(&self, namespace: &str) -> Vec<String> {
        let namespace = namespace.to_lowercase();
        self.state
            .borrow()
            .commands
            .values()
            .filter(|cmd| cmd.namespace == namespace)
            .map(|cmd| cmd.name.clone())
            .collect()
    }

    /// Parse and dispatch a command line.
    ///
    /// Returns `None` when no command answers to the label.
    pub fn dispatch(&self, sender: &str, line: &str) -> Option<CommandOutcome> {
        let invocation = parse_line(sender, line)?;
        let token = self.resolve(&invocation.label)?;
        let handler = {
            let state = self.state.borrow();
            Rc::clone(&state.commands.get(&token.0)?.command.handler)
        };
        Some(handler(&invocation))
    }

    /// Completions for a partial command line.
    pub fn complete(&self, sender: &str, line: &str) -> Vec<String> {
        let Some(invocation) = parse_line(sender, line) else {
            return Vec::new();
        };
        let Some(token) = self.resolve(&invocation.label) else {
            return Vec::new();
        };
        let completer = {
            let state = self.state.borrow();
            match state.commands.get(&token.0) {
                Some(cmd) => cmd.command.completer.clone(),
                None => None,
            }
        };
        completer.map(|c| c(&invocation)).unwrap_or_default()
    }
}

fn parse_line(sender: &str, line: &str) -> Option<CommandInvocation> {
    let mut words = line.split_whitespace();
    let label = words.next()?.trim_start_matches('/').to_string();
    Some(CommandInvocation {
        sender: sender.to_string(),
        label,
        args: words.map(str::to_string).collect(),
    })
}

fn validate_label(label: &str) -> RuntimeResult<String> {
    if label.is_empty() || label.contains(':') || label.chars().any(char::is_whitespace) {
        return Err(RuntimeError::Host(format!(
            "invalid command label '{}'",
            label
        )));
    }
    Ok(label.to_lowercase())
}

impl CommandTable for CommandMap {
    fn register(&self, namespace: &str, command: Command) -> RuntimeResult<CommandToken> {
        let namespace = validate_label(namespace)?;
        let name = validate_label(&command.name)?;
        let aliases = command
            .aliases
            .iter()
            .map(|a| validate_label(a.as_str()))
            .collect::<RuntimeResult<Vec<_>>>()?;

        let mut state = self.state.borrow_mut();
        let taken = state.commands.values().any(|cmd| {
            cmd.namespace == namespace
                && std::iter::once(&name)
                    .chain(aliases.iter())
                    .any(|label| cmd.name == *label || cmd.aliases.contains(label))
        });
        if taken {
            return Err(RuntimeError::Host(format!(
                "command '{}:{}' is already registered",
                namespace, name
            )));
        }

        state.next_token += 1;
        let token = state.next_token;
        state.commands.insert(
            token,
            RegisteredCommand {
                namespace,
                name,
                aliases,
                command,
            },
        );
        Ok(CommandToken(token))
    }

    fn unregister(&self, token: CommandToken) -> RuntimeResult<()> {
        self.state
            .borrow_mut()
            .commands
            .remove(&token.0)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::Host(format!("unknown command token {}", token)))
    }
}
