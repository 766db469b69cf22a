//! Console command parsing
//!
//! Each stdin line is one command. Built-in host commands are handled by the
//! host; anything else is dispatched to the plugin command table.

use anyhow::{Context, Result};
use scriptforge_runtime::ScriptValue;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Blank line.
    Empty,
    /// `plugins` - list loaded plugins
    Plugins,
    /// `enable <name>`
    Enable(String),
    /// `disable <name>`
    Disable(String),
    /// `emit <event> [json]` - deliver an event to plugin handlers
    Emit { kind: String, payload: ScriptValue },
    /// `commands` - list registered plugin commands
    Commands,
    /// `quit`
    Quit,
    /// Anything else, handed to the plugin command table.
    Dispatch(String),
}

impl ConsoleCommand {
    /// Parse one console line.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "" => ConsoleCommand::Empty,
            "plugins" => ConsoleCommand::Plugins,
            "commands" => ConsoleCommand::Commands,
            "quit" | "exit" => ConsoleCommand::Quit,
            "enable" => ConsoleCommand::Enable(required(rest, "enable <name>")?),
            "disable" => ConsoleCommand::Disable(required(rest, "disable <name>")?),
            "emit" => {
                let (kind, json) = match rest.split_once(char::is_whitespace) {
                    Some((kind, json)) => (kind, json.trim()),
                    None => (rest, ""),
                };
                let kind = required(kind, "emit <event> [json]")?;
                let payload = if json.is_empty() {
                    ScriptValue::Unit
                } else {
                    let value: serde_json::Value = serde_json::from_str(json)
                        .with_context(|| format!("Invalid event payload: {}", json))?;
                    ScriptValue::from_json(value)
                };
                ConsoleCommand::Emit { kind, payload }
            }
            _ => ConsoleCommand::Dispatch(line.to_string()),
        };
        Ok(command)
    }
}

fn required(arg: &str, usage: &str) -> Result<String> {
    if arg.is_empty() {
        anyhow::bail!("Usage: {}", usage);
    }
    Ok(arg.to_string())
}
