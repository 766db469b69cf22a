//! One plugin's embedded interpreter.

use rhai::{Dynamic, Engine, FnPtr, FuncArgs, Scope, AST};
use scriptforge_runtime::GuestError;
use std::cell::RefCell;

/// Engine plus the global state a plugin accumulates across evaluations.
///
/// Owned strongly only by the plugin's script context. Host callbacks hold a
/// `Weak` to it and go inert once the context drops it.
pub struct Interpreter {
    plugin: String,
    engine: Engine,
    scope: RefCell<Scope<'static>>,
    functions: RefCell<AST>,
}

impl Interpreter {
    pub(crate) fn new(plugin: &str, engine: Engine) -> Self {
        Self {
            plugin: plugin.to_string(),
            engine,
            scope: RefCell::new(Scope::new()),
            functions: RefCell::new(AST::empty()),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Compile and run `source` in the plugin's global scope.
    ///
    /// Functions it defines stay callable from later callbacks.
    pub(crate) fn evaluate(&self, source: &str, source_name: &str) -> Result<Dynamic, GuestError> {
        let mut ast = self
            .engine
            .compile(source)
            .map_err(|err| GuestError::from_parse(&err, source_name))?;
        ast.set_source(source_name);

        // Callbacks registered while this chunk runs must already resolve.
        self.functions
            .borrow_mut()
            .combine(ast.clone_functions_only());

        let mut scope = self.scope.borrow_mut();
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|err| GuestError::from_eval(&err, source_name))
    }

    /// Invoke a script function value.
    pub(crate) fn call(&self, function: &FnPtr, args: impl FuncArgs) -> Result<Dynamic, GuestError> {
        let functions = self.functions.borrow();
        function
            .call::<Dynamic>(&self.engine, &functions, args)
            .map_err(|err| GuestError::from_eval(&err, &self.plugin))
    }

    /// Names of script functions defined so far.
    pub fn function_names(&self) -> Vec<String> {
        self.functions
            .borrow()
            .iter_functions()
            .map(|f| f.name.to_string())
            .collect()
    }
}
