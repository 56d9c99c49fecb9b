use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jail_core::{
    make_error, make_result_text, JailError, NoTransactionProcessor, RpcClientProvider,
    SignalSink, TransactionProcessor,
};
use jail_runtime::helpers::rhai_bridge::dynamic_to_text;
use jail_runtime::{Cell, CellSession, CellStatus};

use crate::bootstrap::{with_catalog_trailer, CATALOG_BINDING, DISPATCH_EXPORT, PRELUDE};
use crate::bridge::{bridge_module, RpcBridge, BRIDGE_MODULE};
use crate::config::JailConfig;
use crate::request_manager::RequestManager;
use crate::signals::{signals_module, TracingSignalSink, SIGNALS_MODULE};

#[derive(Clone)]
pub struct JailOptions {
    pub config: JailConfig,
    pub provider: Arc<dyn RpcClientProvider>,
    pub transactions: Option<Arc<dyn TransactionProcessor>>,
    pub signals: Option<Arc<dyn SignalSink>>,
}

impl JailOptions {
    pub fn new(provider: Arc<dyn RpcClientProvider>) -> Self {
        Self {
            config: JailConfig::default(),
            provider,
            transactions: None,
            signals: None,
        }
    }
}

/// Registry of isolated cells sharing one request manager.
pub struct Jail {
    cells: RwLock<HashMap<String, Arc<Cell>>>,
    bridge: Arc<RpcBridge>,
    signals: Arc<dyn SignalSink>,
    config: JailConfig,
}

impl Jail {
    pub fn new(options: JailOptions) -> Self {
        let transactions = options
            .transactions
            .unwrap_or_else(|| Arc::new(NoTransactionProcessor));
        let signals = options
            .signals
            .unwrap_or_else(|| Arc::new(TracingSignalSink));
        let manager = Arc::new(RequestManager::new(
            options.provider,
            transactions,
            options.config.rpc_timeout(),
        ));

        Self {
            cells: RwLock::new(HashMap::new()),
            bridge: Arc::new(RpcBridge::new(manager)),
            signals,
            config: options.config,
        }
    }

    pub fn config(&self) -> &JailConfig {
        &self.config
    }

    pub fn request_manager(&self) -> &Arc<RequestManager> {
        self.bridge.manager()
    }

    pub fn bridge(&self) -> &Arc<RpcBridge> {
        &self.bridge
    }

    /// Returns the cell for `id`, creating it if absent. Creating an id that
    /// already exists hands back the existing cell.
    pub fn create_cell(&self, id: &str) -> Result<Arc<Cell>, JailError> {
        let mut cells = self.cells.write().map_err(|_| poisoned())?;
        if let Some(cell) = cells.get(id) {
            return Ok(Arc::clone(cell));
        }
        let cell = Cell::new(id, &self.config.cell_options());
        cells.insert(id.to_string(), Arc::clone(&cell));
        tracing::debug!(cell = id, "cell created");
        Ok(cell)
    }

    pub fn get_cell(&self, id: &str) -> Result<Arc<Cell>, JailError> {
        let cells = self.cells.read().map_err(|_| poisoned())?;
        cells
            .get(id)
            .cloned()
            .ok_or_else(|| JailError::NotFound(id.to_string()))
    }

    pub fn cell_ids(&self) -> Vec<String> {
        let mut ids = self
            .cells
            .read()
            .map(|cells| cells.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Loads `source` into the cell `id` and returns its serialized catalog
    /// as `{"result": ...}`, or `{"error": ...}` on any failure.
    pub fn initialize(&self, id: &str, source: &str) -> String {
        match self.try_initialize(id, source) {
            Ok(catalog) => make_result_text(&catalog),
            Err(error) => {
                tracing::warn!(cell = id, %error, "initialize failed");
                make_error(&error.to_string())
            }
        }
    }

    /// Calls the cell's exported `dispatch(path, args)` function. Timers the call
    /// registers keep firing on the cell's loop after this returns.
    pub fn invoke(&self, id: &str, function_path: &str, args: &str) -> String {
        match self.try_invoke(id, function_path, args) {
            Ok(text) => make_result_text(&text),
            Err(error) => {
                tracing::warn!(cell = id, path = function_path, %error, "invoke failed");
                make_error(&error.to_string())
            }
        }
    }

    fn try_initialize(&self, id: &str, source: &str) -> Result<String, JailError> {
        let cell = self.create_cell(id)?;
        let mut session = cell.session()?;
        session.reset();
        session.set_status(CellStatus::Initializing);

        match self.load(&mut session, source) {
            Ok(catalog) => {
                session.set_status(CellStatus::Ready);
                Ok(catalog)
            }
            Err(error) => {
                session.set_status(CellStatus::Uninitialized);
                Err(error)
            }
        }
    }

    fn load(&self, session: &mut CellSession<'_>, source: &str) -> Result<String, JailError> {
        let id = session.id().to_string();
        session.register_static_module(BRIDGE_MODULE, bridge_module(Arc::clone(&self.bridge), &id));
        session.register_static_module(
            SIGNALS_MODULE,
            signals_module(Arc::clone(&self.signals), &id),
        );

        if !self.config.base_script.trim().is_empty() {
            let _ = session.run_dynamic(&format!("{}\n;", self.config.base_script))?;
        }
        let _ = session.run_dynamic(PRELUDE)?;
        let _ = session.run_dynamic(&with_catalog_trailer(source))?;

        dynamic_to_text(session.get_dynamic(CATALOG_BINDING)?)
    }

    fn try_invoke(&self, id: &str, function_path: &str, args: &str) -> Result<String, JailError> {
        let cell = self.get_cell(id)?;
        let text = {
            let mut session = cell.session()?;
            if session.status() != CellStatus::Ready {
                return Err(JailError::InvalidEnvironment(format!(
                    "cell[{}] is not initialized",
                    id
                )));
            }
            let value = session.call(
                DISPATCH_EXPORT,
                (function_path.to_string(), args.to_string()),
            )?;
            dynamic_to_text(value)?
        };

        if cell.run_in_background() {
            tracing::debug!(cell = id, "event loop scheduled");
        }
        Ok(text)
    }
}

fn poisoned() -> JailError {
    JailError::InvalidEnvironment("cell registry lock is poisoned".to_string())
}

#[cfg(test)]
mod jail_tests {
    use super::*;
    use jail_fixtures::{FixtureClient, FixtureProvider};
    use serde_json::{json, Value};

    fn jail() -> Jail {
        Jail::new(JailOptions::new(Arc::new(FixtureProvider::new(
            FixtureClient::new(),
        ))))
    }

    fn parse(envelope: &str) -> Value {
        serde_json::from_str(envelope).expect("envelope should be JSON")
    }

    #[test]
    fn create_cell_is_get_or_create() {
        let jail = jail();
        let first = jail.create_cell("chat").expect("create");
        let second = jail.create_cell("chat").expect("create again");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(jail.cell_ids(), vec!["chat".to_string()]);
    }

    #[test]
    fn get_cell_reports_unknown_ids() {
        let jail = jail();
        let error = jail.get_cell("ghost").err().expect("unknown cell");
        assert_eq!(error, JailError::NotFound("ghost".to_string()));
    }

    #[test]
    fn invoke_before_initialize_is_rejected() {
        let jail = jail();
        jail.create_cell("chat").expect("create");
        let envelope = parse(&jail.invoke("chat", "commands", "{}"));
        assert!(envelope["error"]
            .as_str()
            .is_some_and(|message| message.contains("not initialized")));
    }

    #[test]
    fn dispatch_export_can_be_a_fn_or_a_closure() {
        let jail = jail();
        let catalog = parse(&jail.initialize(
            "named",
            "let _status_catalog = #{}; fn dispatch(path, args) { path + \":\" + args }",
        ));
        assert_eq!(catalog, json!({"result": {}}));
        assert_eq!(
            parse(&jail.invoke("named", "commands.ping", "{}")),
            json!({"result": "commands.ping:{}"})
        );

        let catalog = parse(&jail.initialize(
            "bound",
            "let _status_catalog = #{}; let dispatch = |path, args| path.len();",
        ));
        assert_eq!(catalog, json!({"result": {}}));
        assert_eq!(
            parse(&jail.invoke("bound", "abc", "{}")),
            json!({"result": 3})
        );
    }

    #[test]
    fn failed_initialize_leaves_cell_uninitialized() {
        let jail = jail();
        let envelope = parse(&jail.initialize("chat", "let x = ;"));
        assert!(envelope["error"].is_string());
        let cell = jail.get_cell("chat").expect("cell exists after failed load");
        assert_eq!(cell.status().expect("status"), CellStatus::Uninitialized);
    }

    #[test]
    fn base_script_runs_before_user_script() {
        let jail = Jail::new(JailOptions {
            config: JailConfig::with_base_script("let greeting = \"hello\";"),
            ..JailOptions::new(Arc::new(FixtureProvider::new(FixtureClient::new())))
        });
        let envelope = parse(&jail.initialize(
            "chat",
            "let _status_catalog = #{ greeting: greeting };",
        ));
        assert_eq!(envelope, json!({"result": {"greeting": "hello"}}));
    }

    #[test]
    fn missing_catalog_export_is_an_error_envelope() {
        let jail = jail();
        let envelope = parse(&jail.initialize("chat", "let unrelated = 1;"));
        assert!(envelope["error"]
            .as_str()
            .is_some_and(|message| message.contains("_status_catalog")));
    }
}
