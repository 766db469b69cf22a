//! Values and errors crossing the host/script boundary.
//!
//! [`ScriptValue`] is the tagged representation the host works with. The
//! conversions to and from `rhai::Dynamic` and `serde_json::Value` are
//! total: anything the host cannot represent structurally becomes
//! [`ScriptValue::Opaque`] carrying the script-side type name. Total is not
//! lossless: `Opaque` and [`ScriptValue::Callable`] keep only a name.
//!
//! [`GuestError`] wraps failures raised while script code runs. Errors that
//! never pass through the interpreter stay as host errors.

use rhai::{Dynamic, EvalAltResult, FnPtr, ParseError, Position};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// A value exchanged with script code.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<ScriptValue>),
    Map(BTreeMap<String, ScriptValue>),
    /// Reference to a script function, by name.
    ///
    /// Curried arguments and captured closure state are not kept, so a
    /// closure converted back into a script value refers to the bare
    /// function without its captures. Hold the original `FnPtr` to call it.
    Callable(String),
    /// A script value with no host representation.
    Opaque(String),
}

impl ScriptValue {
    /// Convert a script value into its host representation.
    pub fn from_dynamic(value: Dynamic) -> Self {
        if value.is_unit() {
            return ScriptValue::Unit;
        }
        if let Ok(b) = value.as_bool() {
            return ScriptValue::Bool(b);
        }
        if let Ok(i) = value.as_int() {
            return ScriptValue::Int(i);
        }
        if let Ok(f) = value.as_float() {
            return ScriptValue::Float(f);
        }
        if value.is_string() || value.is_char() {
            return ScriptValue::Text(value.to_string());
        }
        if value.is_blob() {
            return match value.into_blob() {
                Ok(bytes) => ScriptValue::Bytes(bytes),
                Err(type_name) => ScriptValue::Opaque(type_name.to_string()),
            };
        }
        if value.is_array() {
            return match value.into_array() {
                Ok(items) => {
                    ScriptValue::List(items.into_iter().map(ScriptValue::from_dynamic).collect())
                }
                Err(type_name) => ScriptValue::Opaque(type_name.to_string()),
            };
        }
        if value.is_map() {
            let type_name = value.type_name().to_string();
            return match value.try_cast::<rhai::Map>() {
                Some(map) => ScriptValue::Map(
                    map.into_iter()
                        .map(|(k, v)| (k.to_string(), ScriptValue::from_dynamic(v)))
                        .collect(),
                ),
                None => ScriptValue::Opaque(type_name),
            };
        }
        if value.is::<FnPtr>() {
            let type_name = value.type_name().to_string();
            return match value.try_cast::<FnPtr>() {
                Some(f) => ScriptValue::Callable(f.fn_name().to_string()),
                None => ScriptValue::Opaque(type_name),
            };
        }
        ScriptValue::Opaque(value.type_name().to_string())
    }

    /// Convert into a script value.
    ///
    /// `Opaque` values cannot be reconstructed and become their type name.
    /// `Callable` becomes an uncurried `FnPtr` to the named function.
    pub fn into_dynamic(self) -> Dynamic {
        match self {
            ScriptValue::Unit => Dynamic::UNIT,
            ScriptValue::Bool(b) => Dynamic::from_bool(b),
            ScriptValue::Int(i) => Dynamic::from_int(i),
            ScriptValue::Float(f) => Dynamic::from_float(f),
            ScriptValue::Text(s) => Dynamic::from(s),
            ScriptValue::Bytes(b) => Dynamic::from_blob(b),
            ScriptValue::List(items) => {
                Dynamic::from_array(items.into_iter().map(ScriptValue::into_dynamic).collect())
            }
            ScriptValue::Map(entries) => {
                let mut map = rhai::Map::new();
                for (k, v) in entries {
                    map.insert(k.into(), v.into_dynamic());
                }
                Dynamic::from_map(map)
            }
            ScriptValue::Callable(name) => match FnPtr::new(name.as_str()) {
                Ok(f) => Dynamic::from(f),
                Err(_) => Dynamic::from(name),
            },
            ScriptValue::Opaque(type_name) => Dynamic::from(type_name),
        }
    }

    /// Convert a JSON document into a script value.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => ScriptValue::Unit,
            JsonValue::Bool(b) => ScriptValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => ScriptValue::Int(i),
                None => ScriptValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => ScriptValue::Text(s),
            JsonValue::Array(items) => {
                ScriptValue::List(items.into_iter().map(ScriptValue::from_json).collect())
            }
            JsonValue::Object(entries) => ScriptValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, ScriptValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a JSON document.
    pub fn into_json(self) -> JsonValue {
        match self {
            ScriptValue::Unit => JsonValue::Null,
            ScriptValue::Bool(b) => JsonValue::Bool(b),
            ScriptValue::Int(i) => JsonValue::from(i),
            ScriptValue::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ScriptValue::Text(s) => JsonValue::String(s),
            ScriptValue::Bytes(b) => JsonValue::Array(b.into_iter().map(JsonValue::from).collect()),
            ScriptValue::List(items) => {
                JsonValue::Array(items.into_iter().map(ScriptValue::into_json).collect())
            }
            ScriptValue::Map(entries) => JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect(),
            ),
            ScriptValue::Callable(name) => JsonValue::String(name),
            ScriptValue::Opaque(type_name) => JsonValue::String(type_name),
        }
    }

    /// `Some(b)` if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `Some(s)` if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Dynamic> for ScriptValue {
    fn from(value: Dynamic) -> Self {
        ScriptValue::from_dynamic(value)
    }
}

impl From<ScriptValue> for Dynamic {
    fn from(value: ScriptValue) -> Self {
        value.into_dynamic()
    }
}

/// Coerce a script number to `f64`.
///
/// Host APIs with generic value slots would otherwise receive an integer
/// and store it as one; this pins the representation to a float.
pub fn to_double(value: &Dynamic) -> Option<f64> {
    if let Ok(f) = value.as_float() {
        return Some(f);
    }
    value.as_int().ok().map(|i| i as f64)
}

/// Decode bytes as UTF-8, replacing invalid sequences with U+FFFD.
pub fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// An error raised by script code.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestError {
    /// Human readable message.
    pub message: String,

    /// Source name the error was raised in, `plugin:file`.
    pub source: Option<String>,

    pub line: Option<usize>,
    pub column: Option<usize>,

    /// Innermost call last.
    pub stack: Vec<String>,
}

impl GuestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            line: None,
            column: None,
            stack: Vec::new(),
        }
    }

    /// Build from an interpreter error, unwinding nested function calls.
    pub fn from_eval(err: &EvalAltResult, fallback_source: &str) -> Self {
        let mut source = fallback_source.to_string();
        let mut stack = Vec::new();
        let mut current = err;

        loop {
            match current {
                EvalAltResult::ErrorInFunctionCall(name, fn_source, inner, pos) => {
                    stack.push(format!("at {} ({})", name, location(&source, *pos)));
                    if !fn_source.is_empty() {
                        source = fn_source.clone();
                    }
                    current = &**inner;
                }
                EvalAltResult::ErrorInModule(path, inner, pos) => {
                    stack.push(format!("in module {} ({})", path, location(&source, *pos)));
                    current = &**inner;
                }
                _ => break,
            }
        }

        let message = match current {
            EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
            other => other.to_string(),
        };
        let pos = current.position();

        Self {
            message,
            source: Some(source),
            line: pos.line(),
            column: pos.position(),
            stack,
        }
    }

    /// Build from a compile failure.
    pub fn from_parse(err: &ParseError, source: &str) -> Self {
        let pos = err.position();
        Self {
            message: err.err_type().to_string(),
            source: Some(source.to_string()),
            line: pos.line(),
            column: pos.position(),
            stack: Vec::new(),
        }
    }

    /// Stack frames joined one per line, if any.
    pub fn stack_description(&self) -> Option<String> {
        if self.stack.is_empty() {
            None
        } else {
            Some(self.stack.join("\n"))
        }
    }

    /// The error as a script map, as handed to `catch_error` callers.
    pub fn to_script_value(&self) -> ScriptValue {
        let mut map = BTreeMap::new();
        map.insert("message".to_string(), ScriptValue::Text(self.message.clone()));
        map.insert(
            "source".to_string(),
            self.source.clone().map_or(ScriptValue::Unit, ScriptValue::Text),
        );
        map.insert(
            "line".to_string(),
            self.line.map_or(ScriptValue::Unit, |l| ScriptValue::Int(l as i64)),
        );
        map.insert(
            "column".to_string(),
            self.column
                .map_or(ScriptValue::Unit, |c| ScriptValue::Int(c as i64)),
        );
        map.insert(
            "stack".to_string(),
            ScriptValue::List(self.stack.iter().cloned().map(ScriptValue::Text).collect()),
        );
        ScriptValue::Map(map)
    }
}

fn location(source: &str, pos: Position) -> String {
    match (pos.line(), pos.position()) {
        (Some(line), Some(col)) => format!("{}:{}:{}", source, line, col),
        (Some(line), None) => format!("{}:{}", source, line),
        _ => source.to_string(),
    }
}

impl fmt::Display for GuestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(source) = &self.source {
            match self.line {
                Some(line) => write!(f, " ({}:{})", source, line)?,
                None => write!(f, " ({})", source)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for GuestError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Engine;

    #[test]
    fn test_dynamic_conversion() {
        let engine = Engine::new();
        let value: Dynamic = engine
            .eval(r#"#{ a: 1, b: 2.5, c: "x", d: [true, ()], e: blob(2, 0x41) }"#)
            .unwrap();

        let ScriptValue::Map(map) = ScriptValue::from_dynamic(value) else {
            panic!("expected map");
        };
        assert_eq!(map["a"], ScriptValue::Int(1));
        assert_eq!(map["b"], ScriptValue::Float(2.5));
        assert_eq!(map["c"], ScriptValue::Text("x".into()));
        assert_eq!(
            map["d"],
            ScriptValue::List(vec![ScriptValue::Bool(true), ScriptValue::Unit])
        );
        assert_eq!(map["e"], ScriptValue::Bytes(vec![0x41, 0x41]));
    }

    #[test]
    fn test_fn_ptr_becomes_callable() {
        let engine = Engine::new();
        let value: Dynamic = engine.eval(r#"Fn("greet")"#).unwrap();
        assert_eq!(
            ScriptValue::from_dynamic(value),
            ScriptValue::Callable("greet".into())
        );
    }

    #[test]
    fn test_closure_captures_are_dropped() {
        let engine = Engine::new();
        let value: Dynamic = engine.eval("let base = 40; |n| base + n").unwrap();
        let original = value.clone().cast::<FnPtr>();
        assert!(!original.curry().is_empty());

        let ScriptValue::Callable(name) = ScriptValue::from_dynamic(value) else {
            panic!("expected callable");
        };
        assert_eq!(name, original.fn_name());

        let rebuilt = ScriptValue::Callable(name).into_dynamic();
        if let Some(f) = rebuilt.try_cast::<FnPtr>() {
            assert!(f.curry().is_empty());
        }
    }

    #[test]
    fn test_into_dynamic_is_visible_to_scripts() {
        let engine = Engine::new();
        let mut scope = rhai::Scope::new();
        let value = ScriptValue::from_json(serde_json::json!({"player": "ann", "level": 3}));
        scope.push("event", value.into_dynamic());

        let level: i64 = engine
            .eval_with_scope(&mut scope, "event.level + 1")
            .unwrap();
        assert_eq!(level, 4);
        let player: String = engine.eval_with_scope(&mut scope, "event.player").unwrap();
        assert_eq!(player, "ann");
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"n": 1, "f": 0.5, "s": "t", "l": [null]});
        let value = ScriptValue::from_json(json.clone());
        assert_eq!(value.clone().into_json(), json);
    }

    #[test]
    fn test_to_double() {
        assert_eq!(to_double(&Dynamic::from_int(3)), Some(3.0));
        assert_eq!(to_double(&Dynamic::from_float(1.5)), Some(1.5));
        assert_eq!(to_double(&Dynamic::from("x".to_string())), None);
    }

    #[test]
    fn test_bytes_to_string() {
        assert_eq!(bytes_to_string("héllo".as_bytes()), "héllo");
        assert_eq!(bytes_to_string(&[0x66, 0xff, 0x6f]), "f\u{fffd}o");
    }

    #[test]
    fn test_guest_error_from_throw() {
        let engine = Engine::new();
        let mut ast = engine
            .compile("fn inner() { throw \"bad thing\"; }\nfn outer() { inner() }\nouter()")
            .unwrap();
        ast.set_source("demo:main.rhai");

        let err = engine.eval_ast::<Dynamic>(&ast).unwrap_err();
        let guest = GuestError::from_eval(&err, "demo:main.rhai");

        assert_eq!(guest.message, "bad thing");
        assert_eq!(guest.source.as_deref(), Some("demo:main.rhai"));
        assert_eq!(guest.stack.len(), 2);
        assert!(guest.stack[0].starts_with("at outer"));
        assert!(guest.stack[1].starts_with("at inner"));
        assert_eq!(guest.line, Some(1));
    }

    #[test]
    fn test_guest_error_from_parse() {
        let engine = Engine::new();
        let err = engine.compile("let x = ;").unwrap_err();
        let guest = GuestError::from_parse(&err, "demo:broken.rhai");
        assert_eq!(guest.source.as_deref(), Some("demo:broken.rhai"));
        assert_eq!(guest.line, Some(1));
        assert!(guest.to_string().contains("demo:broken.rhai:1"));
    }
}
