//! Write-once index from tool name to handler.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use super::dispatch::panic_message;
use super::module::{ToolHandler, ToolModule};
use super::outcome::ActionOutcome;
use super::types::ToolSchema;
use crate::error::WorkdeskError;

/// Configuration errors detected while building a [`ToolRegistry`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool \"{name}\" is claimed by both `{first}` and `{second}`")]
    DuplicateTool {
        name: String,
        first: String,
        second: String,
    },
    #[error("module `{module}` handles \"{name}\" but does not advertise it")]
    UnadvertisedTool { module: String, name: String },
    #[error("module `{module}` advertises \"{name}\" but does not handle it")]
    UnhandledTool { module: String, name: String },
}

struct Route {
    module: String,
    handler: ToolHandler,
}

/// Accumulates modules during bootstrap. Consumed by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    tools: Vec<ToolSchema>,
    routes: HashMap<String, Route>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module's schemas and routes.
    ///
    /// The module is validated as a whole first; on error nothing is added.
    pub fn register_module(&mut self, module: ToolModule) -> Result<(), RegistryError> {
        let advertised: HashSet<&str> = module.schemas().iter().map(|s| s.name.as_str()).collect();
        let mut claimed = HashSet::new();

        for name in module.handles() {
            if !claimed.insert(name.as_str()) {
                return Err(RegistryError::DuplicateTool {
                    name: name.clone(),
                    first: module.name().to_string(),
                    second: module.name().to_string(),
                });
            }
            if let Some(existing) = self.routes.get(name) {
                return Err(RegistryError::DuplicateTool {
                    name: name.clone(),
                    first: existing.module.clone(),
                    second: module.name().to_string(),
                });
            }
            if !advertised.contains(name.as_str()) {
                return Err(RegistryError::UnadvertisedTool {
                    module: module.name().to_string(),
                    name: name.clone(),
                });
            }
        }
        if advertised.len() != module.schemas().len() {
            let mut seen = HashSet::new();
            let repeated = module
                .schemas()
                .iter()
                .find(|schema| !seen.insert(schema.name.as_str()))
                .map(|schema| schema.name.clone())
                .unwrap_or_default();
            return Err(RegistryError::DuplicateTool {
                name: repeated,
                first: module.name().to_string(),
                second: module.name().to_string(),
            });
        }
        if let Some(schema) = module
            .schemas()
            .iter()
            .find(|schema| !claimed.contains(schema.name.as_str()))
        {
            return Err(RegistryError::UnhandledTool {
                module: module.name().to_string(),
                name: schema.name.clone(),
            });
        }

        debug!(module = module.name(), tools = module.schemas().len(), "registering tool module");
        for name in module.handles() {
            self.routes.insert(
                name.clone(),
                Route {
                    module: module.name().to_string(),
                    handler: module.handler().clone(),
                },
            );
        }
        self.tools.extend(module.schemas().iter().cloned());
        Ok(())
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools,
            routes: self.routes,
        }
    }
}

/// Read-only registry of every tool the process serves.
///
/// Built once during bootstrap by [`ToolRegistry::init`]; there is no way to
/// add or replace a tool afterwards, so it can be shared freely by reference.
///
/// # Example
/// ```no_run
/// use workdesk::tools::{ActionOutcome, DispatchTable, ParameterBuilder, ToolModule, ToolRegistry, ToolSchema};
///
/// # async fn example() -> Result<(), workdesk::tools::RegistryError> {
/// let ping = ToolModule::with_tables(
///     "ping",
///     vec![(
///         ToolSchema::new("ping", "Liveness check", ParameterBuilder::object().build()),
///         DispatchTable::new("action").on("now", |_args| async { Ok(ActionOutcome::text("pong")) }),
///     )],
/// );
/// let registry = ToolRegistry::init([ping])?;
/// let outcome = registry
///     .route_tool_call("ping", serde_json::json!({ "action": "now" }))
///     .await;
/// assert!(!outcome.is_error());
/// # Ok(())
/// # }
/// ```
pub struct ToolRegistry {
    tools: Vec<ToolSchema>,
    routes: HashMap<String, Route>,
}

impl ToolRegistry {
    /// Register every module, failing on the first configuration conflict.
    pub fn init<I>(modules: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = ToolModule>,
    {
        let mut builder = RegistryBuilder::new();
        for module in modules {
            builder.register_module(module)?;
        }
        let registry = builder.build();
        info!(tools = registry.len(), "tool registry initialized");
        Ok(registry)
    }

    /// Every registered tool schema, in registration order.
    pub fn all_tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Name of the module that serves `name`.
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(|route| route.module.as_str())
    }

    /// Run the handler registered for `name`.
    ///
    /// Unknown names and panicking handlers produce error outcomes.
    pub async fn route_tool_call(&self, name: &str, args: Value) -> ActionOutcome {
        let Some(route) = self.routes.get(name) else {
            debug!(tool = name, "unknown tool requested");
            return ActionOutcome::from_error(&WorkdeskError::UnknownTool(name.to_string()));
        };
        let handler = &route.handler;
        let call = AssertUnwindSafe(async move { handler(name.to_string(), args).await });
        let outcome = match call.catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(tool = name, module = %route.module, message = %message, "tool handler panicked");
                ActionOutcome::error(format!("Internal error while running {name}: {message}"))
            }
        };
        debug!(tool = name, module = %route.module, is_error = outcome.is_error(), "tool call finished");
        outcome
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
