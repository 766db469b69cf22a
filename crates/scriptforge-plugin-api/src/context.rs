//! Script contexts: the per-enable-cycle interpreter of a plugin.
//!
//! A context is created once per plugin and cycles between *absent* and
//! *active*. [`ScriptContext::construct`] builds a fresh interpreter with the
//! `host` module installed; [`ScriptContext::destroy`] releases every host
//! registration, drops the interpreter and schedules a leak check.

use crate::host::HostServices;
use crate::interpreter::Interpreter;
use crate::resources::{ResourceRegistry, TeardownReport};
use crate::surface;
use scriptforge_runtime::{
    build_engine, CapabilitySet, PluginManifest, RuntimeError, RuntimeResult, ScriptValue,
};
use std::cell::{Ref, RefCell};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use tracing::{debug, info};

/// State shared between a context and the host module installed in its
/// interpreter. Holds only a weak link back to the interpreter.
pub(crate) struct ContextShared {
    pub(crate) plugin: String,
    pub(crate) version: String,
    pub(crate) root: PathBuf,
    pub(crate) data_dir: PathBuf,
    pub(crate) capabilities: CapabilitySet,
    pub(crate) services: HostServices,
    pub(crate) resources: RefCell<ResourceRegistry>,
    pub(crate) interpreter: RefCell<Weak<Interpreter>>,
}

impl ContextShared {
    /// Source name for a file of this plugin, `plugin:file`.
    pub(crate) fn source_name(&self, logical_name: &str) -> String {
        format!("{}:{}", self.plugin, logical_name)
    }
}

/// A plugin's script context.
pub struct ScriptContext {
    shared: Rc<ContextShared>,
    interpreter: Option<Rc<Interpreter>>,
}

impl ScriptContext {
    pub fn new(
        manifest: &PluginManifest,
        root: &Path,
        data_dir: &Path,
        services: HostServices,
    ) -> Self {
        let plugin = manifest.name().to_string();
        let shared = ContextShared {
            resources: RefCell::new(ResourceRegistry::new(plugin.clone(), services.clone())),
            plugin,
            version: manifest.version().to_string(),
            root: root.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            capabilities: manifest.capability_set(),
            services,
            interpreter: RefCell::new(Weak::new()),
        };
        Self {
            shared: Rc::new(shared),
            interpreter: None,
        }
    }

    /// Create the interpreter. Fails if one already exists.
    pub fn construct(&mut self) -> RuntimeResult<()> {
        if self.interpreter.is_some() {
            return Err(RuntimeError::ContextState(format!(
                "context for '{}' already exists",
                self.shared.plugin
            )));
        }

        let mut engine = build_engine(
            &self.shared.plugin,
            &self.shared.root,
            &self.shared.services.settings.engine_limits,
        );
        surface::install(&mut engine, &self.shared);

        let interpreter = Rc::new(Interpreter::new(&self.shared.plugin, engine));
        *self.shared.interpreter.borrow_mut() = Rc::downgrade(&interpreter);
        self.interpreter = Some(interpreter);

        debug!("Constructed script context for '{}'", self.shared.plugin);
        Ok(())
    }

    /// Evaluate source in the live interpreter.
    ///
    /// `logical_name` is the file name shown in errors, prefixed with the
    /// plugin name.
    pub fn evaluate(&self, source: &str, logical_name: &str) -> RuntimeResult<ScriptValue> {
        let interpreter = self.interpreter.as_ref().ok_or_else(|| {
            RuntimeError::ContextState(format!(
                "context for '{}' does not exist",
                self.shared.plugin
            ))
        })?;

        let source_name = self.shared.source_name(logical_name);
        let value = interpreter.evaluate(source, &source_name)?;
        Ok(ScriptValue::from_dynamic(value))
    }

    /// Tear down host registrations and drop the interpreter.
    ///
    /// A leak check is scheduled to confirm nothing else kept the
    /// interpreter alive.
    pub fn destroy(&mut self) -> RuntimeResult<TeardownReport> {
        let interpreter = self.interpreter.take().ok_or_else(|| {
            RuntimeError::ContextState(format!(
                "context for '{}' does not exist",
                self.shared.plugin
            ))
        })?;

        let report = self.shared.resources.borrow_mut().teardown();
        *self.shared.interpreter.borrow_mut() = Weak::new();

        let released = Rc::downgrade(&interpreter);
        drop(interpreter);

        let services = &self.shared.services;
        services.leaks.watch(
            &self.shared.plugin,
            released,
            services.scheduler.as_ref(),
            services.settings.leak_check_delay,
        );

        info!(
            "Destroyed script context for '{}' ({} commands, {} tasks, {} subscriptions released)",
            self.shared.plugin,
            report.commands_unregistered,
            report.tasks_released,
            report.subscriptions_released
        );
        Ok(report)
    }

    /// True between `construct` and `destroy`.
    pub fn is_active(&self) -> bool {
        self.interpreter.is_some()
    }

    pub fn plugin(&self) -> &str {
        &self.shared.plugin
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.shared.capabilities
    }

    /// Host registrations made by the current interpreter.
    pub fn resources(&self) -> Ref<'_, ResourceRegistry> {
        self.shared.resources.borrow()
    }

    /// A strong handle to the live interpreter.
    ///
    /// Holding it past `destroy` keeps the interpreter alive and is
    /// reported by the leak check.
    pub fn interpreter(&self) -> Option<Rc<Interpreter>> {
        self.interpreter.clone()
    }
}
