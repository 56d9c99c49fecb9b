use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use jail_core::JailError;
use rhai::{Dynamic, Engine, FnPtr, FuncArgs, ImmutableString, Module, Scope, AST};
use serde_json::Value;

use crate::event_loop::{EventLoop, Timer};
use crate::helpers::rhai_bridge::{
    dynamic_to_json, json_to_dynamic, parse_to_dynamic, runtime_error, script_error,
    stringify_dynamic,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug, Clone, Default)]
pub struct CellOptions {
    pub max_operations: Option<u64>,
    pub max_call_levels: Option<usize>,
}

struct CellState {
    engine: Engine,
    scope: Scope<'static>,
    lib: AST,
    status: CellStatus,
}

/// One isolated script context: a rhai engine, its persistent scope and
/// function library, and the timer loop that belongs to it.
pub struct Cell {
    id: String,
    state: Mutex<CellState>,
    event_loop: Arc<EventLoop>,
}

impl Cell {
    pub fn new(id: impl Into<String>, options: &CellOptions) -> Arc<Self> {
        let id = id.into();
        let event_loop = Arc::new(EventLoop::new());
        let mut engine = Engine::new();
        if let Some(max_operations) = options.max_operations {
            engine.set_max_operations(max_operations);
        }
        if let Some(max_call_levels) = options.max_call_levels {
            engine.set_max_call_levels(max_call_levels);
        }

        let print_id = id.clone();
        engine.on_print(move |text| tracing::info!(cell = %print_id, "{}", text));
        let debug_id = id.clone();
        engine.on_debug(move |text, _source, position| {
            tracing::debug!(cell = %debug_id, %position, "{}", text)
        });

        EventLoop::register(&event_loop, &mut engine);
        engine.register_static_module("JSON", json_module().into());

        Arc::new(Self {
            id,
            state: Mutex::new(CellState {
                engine,
                scope: Scope::new(),
                lib: AST::empty(),
                status: CellStatus::Uninitialized,
            }),
            event_loop,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.event_loop
    }

    /// Exclusive access to the engine. All script entry goes through here.
    pub fn session(&self) -> Result<CellSession<'_>, JailError> {
        let state = self.state.lock().map_err(|_| {
            JailError::InvalidEnvironment(format!(
                "cell[{}] was poisoned by an earlier panic",
                self.id
            ))
        })?;
        Ok(CellSession {
            cell: self,
            state,
        })
    }

    pub fn status(&self) -> Result<CellStatus, JailError> {
        Ok(self.session()?.status())
    }

    pub fn set(&self, name: &str, value: &Value) -> Result<(), JailError> {
        self.session()?.set(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Value, JailError> {
        self.session()?.get(name)
    }

    pub fn run(&self, source: &str) -> Result<Value, JailError> {
        self.session()?.run(source)
    }

    /// Starts the timer runner on a background thread unless one is already
    /// active for this cell. Returns whether a new runner was spawned.
    pub fn run_in_background(self: &Arc<Self>) -> bool {
        if !self.event_loop.try_activate() {
            return false;
        }
        let cell = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("cell-loop-{}", self.id))
            .spawn(move || cell.drive_loop());
        match spawned {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(cell = %self.id, %error, "failed to spawn event loop runner");
                self.event_loop.deactivate();
                false
            }
        }
    }

    /// Runs the loop in the background and waits up to `timeout` for it to
    /// drain. Returns `false` when timers were still pending at the deadline.
    pub fn run_event_loop_for(self: &Arc<Self>, timeout: Duration) -> bool {
        self.run_in_background();
        self.event_loop.wait_idle(timeout)
    }

    fn drive_loop(&self) {
        tracing::debug!(cell = %self.id, "event loop started");
        while let Some(timer) = self.event_loop.next_due() {
            self.fire(&timer);
            self.event_loop.finish(timer);
        }
        tracing::debug!(cell = %self.id, "event loop drained");
    }

    fn fire(&self, timer: &Timer) {
        let session = match self.session() {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(cell = %self.id, %error, "dropping timer callback");
                return;
            }
        };
        if timer.generation != self.event_loop.generation() {
            return;
        }
        if let Err(error) = session.call_fn_ptr(&timer.callback, ()) {
            tracing::warn!(cell = %self.id, timer = timer.id, %error, "timer callback failed");
        }
    }
}

pub struct CellSession<'a> {
    cell: &'a Cell,
    state: MutexGuard<'a, CellState>,
}

impl CellSession<'_> {
    pub fn id(&self) -> &str {
        &self.cell.id
    }

    pub fn status(&self) -> CellStatus {
        self.state.status
    }

    pub fn set_status(&mut self, status: CellStatus) {
        self.state.status = status;
    }

    pub fn register_static_module(&mut self, name: &str, module: Module) {
        self.state
            .engine
            .register_static_module(name, module.into());
    }

    /// Drops every binding, script function and pending timer. The engine
    /// and its registered modules are kept.
    pub fn reset(&mut self) {
        self.state.scope.clear();
        self.state.lib = AST::empty();
        self.state.status = CellStatus::Uninitialized;
        self.cell.event_loop.clear();
    }

    pub fn set(&mut self, name: &str, value: &Value) {
        self.set_dynamic(name, json_to_dynamic(value));
    }

    pub fn set_dynamic(&mut self, name: &str, value: Dynamic) {
        self.state.scope.set_or_push(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Result<Value, JailError> {
        dynamic_to_json(self.get_dynamic(name)?)
    }

    pub fn get_dynamic(&self, name: &str) -> Result<Dynamic, JailError> {
        self.state
            .scope
            .get_value::<Dynamic>(name)
            .ok_or_else(|| JailError::script(format!("ReferenceError: {} is not defined", name)))
    }

    pub fn run(&mut self, source: &str) -> Result<Value, JailError> {
        dynamic_to_json(self.run_dynamic(source)?)
    }

    /// Compiles and runs `source` against the persistent scope. Script
    /// functions defined by earlier runs stay callable.
    pub fn run_dynamic(&mut self, source: &str) -> Result<Dynamic, JailError> {
        let state = &mut *self.state;
        let ast = state
            .engine
            .compile(source)
            .map_err(|error| JailError::script(error.to_string()))?;
        let combined = state.lib.merge(&ast);
        let value = state
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut state.scope, &combined)
            .map_err(script_error)?;
        state.lib = combined.clone_functions_only();
        Ok(value)
    }

    /// Calls an exported function: a function pointer bound in scope under
    /// `name` if there is one, otherwise a script `fn`.
    pub fn call(&mut self, name: &str, args: impl FuncArgs) -> Result<Dynamic, JailError> {
        if let Some(callback) = self.state.scope.get_value::<FnPtr>(name) {
            return self.call_fn_ptr(&callback, args);
        }
        let state = &mut *self.state;
        state
            .engine
            .call_fn::<Dynamic>(&mut state.scope, &state.lib, name, args)
            .map_err(script_error)
    }

    pub fn call_fn_ptr(
        &self,
        callback: &FnPtr,
        args: impl FuncArgs,
    ) -> Result<Dynamic, JailError> {
        callback
            .call::<Dynamic>(&self.state.engine, &self.state.lib, args)
            .map_err(script_error)
    }
}

fn json_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("stringify", |value: Dynamic| {
        stringify_dynamic(value)
            .map(ImmutableString::from)
            .map_err(|error| runtime_error(error.to_string()))
    });
    module.set_native_fn("parse", |text: ImmutableString| {
        parse_to_dynamic(text.as_str()).map_err(|error| runtime_error(error.to_string()))
    });
    module
}
