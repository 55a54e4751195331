//! Static descriptor bundling tool schemas with the handler that serves them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::dispatch::DispatchTable;
use super::outcome::ActionOutcome;
use super::types::ToolSchema;
use crate::error::WorkdeskError;

/// Future returned by a module handler. Always resolves to an outcome.
pub type ToolFuture = BoxFuture<'static, ActionOutcome>;

/// Module handler, called with the tool name and the raw argument object.
pub type ToolHandler = Arc<dyn Fn(String, Value) -> ToolFuture + Send + Sync>;

/// A self-contained group of tools registered once at startup.
pub struct ToolModule {
    name: String,
    schemas: Vec<ToolSchema>,
    handles: Vec<String>,
    handler: ToolHandler,
}

impl ToolModule {
    /// Create a module that handles exactly the tools it advertises.
    pub fn new<F, Fut>(name: impl Into<String>, schemas: Vec<ToolSchema>, handler: F) -> Self
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionOutcome> + Send + 'static,
    {
        let handles = schemas.iter().map(|schema| schema.name.clone()).collect();
        Self {
            name: name.into(),
            schemas,
            handles,
            handler: Arc::new(move |tool, args| -> ToolFuture { Box::pin(handler(tool, args)) }),
        }
    }

    /// Build a module where each tool is backed by its own dispatch table.
    ///
    /// # Example
    /// ```no_run
    /// use workdesk::tools::{ActionOutcome, DispatchTable, ParameterBuilder, ToolModule, ToolSchema};
    ///
    /// let sprint = DispatchTable::new("action")
    ///     .on("list", |_args| async { Ok(ActionOutcome::text("[]")) });
    /// let module = ToolModule::with_tables(
    ///     "sprint",
    ///     vec![(ToolSchema::new("sprint", "Sprints", ParameterBuilder::object().build()), sprint)],
    /// );
    /// assert_eq!(module.handles(), ["sprint"]);
    /// ```
    pub fn with_tables(name: impl Into<String>, tools: Vec<(ToolSchema, DispatchTable)>) -> Self {
        let mut schemas = Vec::with_capacity(tools.len());
        let mut tables = HashMap::with_capacity(tools.len());
        for (schema, table) in tools {
            tables.insert(schema.name.clone(), table);
            schemas.push(schema);
        }
        let tables = Arc::new(tables);
        Self::new(name, schemas, move |tool: String, args: Value| {
            let tables = Arc::clone(&tables);
            async move {
                match tables.get(&tool) {
                    Some(table) => table.dispatch(args).await,
                    None => ActionOutcome::from_error(&WorkdeskError::UnknownTool(tool)),
                }
            }
        })
    }

    /// Override the set of tool names this module answers for.
    pub fn handling<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handles = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schemas(&self) -> &[ToolSchema] {
        &self.schemas
    }

    pub fn handles(&self) -> &[String] {
        &self.handles
    }

    pub fn handler(&self) -> &ToolHandler {
        &self.handler
    }
}

impl std::fmt::Debug for ToolModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolModule")
            .field("name", &self.name)
            .field("handles", &self.handles)
            .finish()
    }
}
