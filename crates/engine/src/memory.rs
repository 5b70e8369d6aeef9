//! In-memory host runtime
//!
//! Backs [`HostRuntime`] with a [`MemoryServer`]. Databases carry two
//! tables: `res_users` (`id, login, lang, tz`) and `ir_module_module`
//! (`name, state`). A template database named [`DEFAULT_TEMPLATE`] is created
//! up front. Every runtime operation is recorded as a [`RuntimeEvent`], and
//! individual operations can be made to fail, which is how coordinator
//! failure paths are exercised.

use crate::runtime::{DatabaseSource, HostRuntime, ModuleState};
use parking_lot::Mutex;
use proctor_concurrency::{
    ConnectionFactory, ContextResolver, Connector, Cursor, MemoryServer, Transaction,
};
use proctor_core::{
    ExecutionContext, ModuleName, ProctorError, ProctorResult, UserId, Value,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the template database created with the runtime
pub const DEFAULT_TEMPLATE: &str = "base";

const USERS: &str = "res_users";
const MODULES: &str = "ir_module_module";
const PARTNERS: &str = "res_partner";

/// Something the runtime was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Database created
    CreateDatabase {
        /// Database name
        name: String,
        /// How it was populated
        source: DatabaseSource,
    },
    /// Sessions terminated
    TerminateSessions(String),
    /// Database dropped
    DropDatabase(String),
    /// Modules installed
    Install {
        /// Target database
        database: String,
        /// Installed modules, in order
        modules: Vec<ModuleName>,
    },
    /// Registry rebuilt
    ReloadRegistry(String),
    /// Scheduler disabled
    DisableScheduler(String),
}

#[derive(Debug, Default)]
struct Failures {
    create: bool,
    drop: bool,
    reload: bool,
    install: HashSet<ModuleName>,
}

/// Reads contexts from the `res_users` table
#[derive(Debug, Clone, Copy, Default)]
pub struct UserTableResolver;

impl ContextResolver for UserTableResolver {
    fn resolve(&self, cursor: &mut dyn Cursor, user: UserId) -> ProctorResult<ExecutionContext> {
        cursor.execute(&format!("SELECT * FROM {}", USERS), &[])?;
        for row in cursor.fetch_all()? {
            if row.first().and_then(Value::as_int) != Some(i64::from(user.0)) {
                continue;
            }
            let mut context = ExecutionContext::new();
            if let Some(lang) = row.get(2).and_then(Value::as_str) {
                context.insert("lang", lang);
            }
            if let Some(tz) = row.get(3).and_then(Value::as_str) {
                context.insert("tz", tz);
            }
            return Ok(context);
        }
        Err(ProctorError::database(format!("user {} does not exist", user)))
    }
}

/// Host runtime over an in-memory server
pub struct MemoryRuntime {
    server: MemoryServer,
    connector: Arc<Connector>,
    resolver: Arc<dyn ContextResolver>,
    events: Mutex<Vec<RuntimeEvent>>,
    failures: Mutex<Failures>,
}

impl MemoryRuntime {
    /// Create a runtime with a fresh server and the template database
    pub fn new() -> ProctorResult<Self> {
        Self::with_server(MemoryServer::new())
    }

    /// Create a runtime over `server`, creating the template if missing
    pub fn with_server(server: MemoryServer) -> ProctorResult<Self> {
        let base: Arc<dyn ConnectionFactory> = Arc::new(server.clone());
        let runtime = Self {
            connector: Arc::new(Connector::new(base)),
            resolver: Arc::new(UserTableResolver),
            server,
            events: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
        };
        if !runtime.server.database_exists(DEFAULT_TEMPLATE) {
            runtime.server.create_database(DEFAULT_TEMPLATE)?;
            runtime.bootstrap(DEFAULT_TEMPLATE, false)?;
        }
        Ok(runtime)
    }

    /// The underlying server
    pub fn server(&self) -> &MemoryServer {
        &self.server
    }

    /// Operations performed so far
    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().clone()
    }

    /// Forget recorded operations
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Make database creation fail
    pub fn fail_create(&self, fail: bool) {
        self.failures.lock().create = fail;
    }

    /// Make database drops fail
    pub fn fail_drop(&self, fail: bool) {
        self.failures.lock().drop = fail;
    }

    /// Make registry reloads fail
    pub fn fail_reload(&self, fail: bool) {
        self.failures.lock().reload = fail;
    }

    /// Make installing `module` fail
    pub fn fail_install(&self, module: impl Into<ModuleName>) {
        self.failures.lock().install.insert(module.into());
    }

    /// Mark `modules` installed in `database` outside any transaction
    pub fn preinstall(&self, database: &str, modules: &[&str]) -> ProctorResult<()> {
        let mut conn = self.connector.connect_direct(database)?;
        let mut cursor = conn.cursor()?;
        for module in modules {
            cursor.execute(
                &format!("INSERT INTO {}", MODULES),
                &[Value::from(*module), Value::from(ModuleState::Installed.as_str())],
            )?;
        }
        cursor.commit()?;
        cursor.close()?;
        conn.close()
    }

    fn record(&self, event: RuntimeEvent) {
        self.events.lock().push(event);
    }

    /// Populate a fresh database: admin user, base module, optional demo data
    fn bootstrap(&self, database: &str, demo: bool) -> ProctorResult<()> {
        let mut conn = self.connector.connect_direct(database)?;
        let mut cursor = conn.cursor()?;
        let statements: Vec<(String, Vec<Value>)> = {
            let mut s = vec![
                (format!("CREATE TABLE {}", USERS), vec![]),
                (
                    format!("INSERT INTO {}", USERS),
                    vec![
                        Value::from(1i64),
                        "admin".into(),
                        "en_US".into(),
                        "UTC".into(),
                    ],
                ),
                (format!("CREATE TABLE {}", MODULES), vec![]),
                (
                    format!("INSERT INTO {}", MODULES),
                    vec!["base".into(), ModuleState::Installed.as_str().into()],
                ),
            ];
            if demo {
                s.push((format!("CREATE TABLE {}", PARTNERS), vec![]));
                for name in ["Agrolait", "ASUStek", "Camptocamp"] {
                    s.push((format!("INSERT INTO {}", PARTNERS), vec![name.into()]));
                }
            }
            s
        };
        for (query, params) in &statements {
            cursor.execute(query, params)?;
        }
        cursor.commit()?;
        cursor.close()?;
        conn.close()
    }
}

impl HostRuntime for MemoryRuntime {
    fn connector(&self) -> Arc<Connector> {
        Arc::clone(&self.connector)
    }

    fn context_resolver(&self) -> Arc<dyn ContextResolver> {
        Arc::clone(&self.resolver)
    }

    fn create_database(&self, name: &str, source: &DatabaseSource) -> ProctorResult<()> {
        if self.failures.lock().create {
            return Err(ProctorError::provisioning(name, "creation refused by server"));
        }
        match source {
            DatabaseSource::Template(template) => {
                self.server.create_from_template(name, template)?;
            }
            DatabaseSource::Scratch { demo } => {
                self.server.create_database(name)?;
                self.bootstrap(name, *demo)?;
            }
        }
        info!(database = %name, source = %source, "database created");
        self.record(RuntimeEvent::CreateDatabase {
            name: name.to_string(),
            source: source.clone(),
        });
        Ok(())
    }

    fn drop_database(&self, name: &str) -> ProctorResult<()> {
        if self.failures.lock().drop {
            return Err(ProctorError::database(format!(
                "could not drop database \"{}\"",
                name
            )));
        }
        self.server.drop_database(name)?;
        info!(database = %name, "database dropped");
        self.record(RuntimeEvent::DropDatabase(name.to_string()));
        Ok(())
    }

    fn terminate_sessions(&self, name: &str) -> ProctorResult<usize> {
        let terminated = self.server.terminate_sessions(name)?;
        self.record(RuntimeEvent::TerminateSessions(name.to_string()));
        Ok(terminated)
    }

    fn database_exists(&self, name: &str) -> bool {
        self.server.database_exists(name)
    }

    fn module_state(&self, database: &str, module: &str) -> ProctorResult<ModuleState> {
        let rows = self.server.rows(database, MODULES)?;
        let state = rows
            .iter()
            .rev()
            .find(|row| row.first().and_then(Value::as_str) == Some(module))
            .and_then(|row| row.get(1).and_then(Value::as_str))
            .map(ModuleState::parse)
            .unwrap_or(ModuleState::Uninstalled);
        Ok(state)
    }

    fn install_modules(&self, txn: &Transaction, modules: &[ModuleName]) -> ProctorResult<()> {
        let database = txn.database().ok_or(ProctorError::NotStarted)?.to_string();
        let failing = self.failures.lock().install.clone();
        let cursor = txn.cursor()?;
        let mut cursor = cursor.lock();
        for module in modules {
            if failing.contains(module) {
                return Err(ProctorError::installation(
                    module.as_str(),
                    "data file could not be loaded",
                ));
            }
            cursor.execute(
                &format!("INSERT INTO {}", MODULES),
                &[
                    Value::from(module.as_str()),
                    Value::from(ModuleState::Installed.as_str()),
                ],
            )?;
            debug!(database = %database, module = %module, "module installed");
        }
        self.record(RuntimeEvent::Install {
            database,
            modules: modules.to_vec(),
        });
        Ok(())
    }

    fn reload_registry(&self, database: &str) -> ProctorResult<()> {
        if self.failures.lock().reload {
            return Err(ProctorError::database(format!(
                "registry for \"{}\" could not be loaded",
                database
            )));
        }
        self.record(RuntimeEvent::ReloadRegistry(database.to_string()));
        Ok(())
    }

    fn disable_scheduler(&self, database: &str) -> ProctorResult<()> {
        debug!(database = %database, "scheduler disabled");
        self.record(RuntimeEvent::DisableScheduler(database.to_string()));
        Ok(())
    }
}
