//! Discriminator-keyed dispatch for a single tool.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error};

use super::arguments::ToolArguments;
use super::outcome::ActionOutcome;
use crate::error::WorkdeskError;

/// Future returned by an action handler.
pub type ActionFuture = BoxFuture<'static, Result<ActionOutcome, WorkdeskError>>;

/// Type-erased action handler.
pub type ActionHandler = Arc<dyn Fn(ToolArguments) -> ActionFuture + Send + Sync>;

/// Mapping from discriminator value (`action`, `report`, ...) to handler.
///
/// # Example
/// ```no_run
/// use workdesk::tools::{ActionOutcome, DispatchTable};
///
/// # async fn example() {
/// let table = DispatchTable::new("action")
///     .on("ping", |_args| async { Ok(ActionOutcome::text("pong")) });
/// let outcome = table.dispatch(serde_json::json!({ "action": "ping" })).await;
/// assert_eq!(outcome.text_content(), "pong");
/// # }
/// ```
#[derive(Clone)]
pub struct DispatchTable {
    discriminator: &'static str,
    handlers: BTreeMap<String, ActionHandler>,
}

impl DispatchTable {
    pub fn new(discriminator: &'static str) -> Self {
        Self {
            discriminator,
            handlers: BTreeMap::new(),
        }
    }

    /// Register `handler` for `key`.
    ///
    /// # Panics
    /// If `key` is already registered in this table.
    pub fn on<F, Fut>(mut self, key: &str, handler: F) -> Self
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionOutcome, WorkdeskError>> + Send + 'static,
    {
        let handler: ActionHandler =
            Arc::new(move |args| -> ActionFuture { Box::pin(handler(args)) });
        let previous = self.handlers.insert(key.to_string(), handler);
        assert!(
            previous.is_none(),
            "duplicate {} handler registered: {key}",
            self.discriminator
        );
        self
    }

    pub fn discriminator(&self) -> &'static str {
        self.discriminator
    }

    /// Registered discriminator values, sorted.
    pub fn keys(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn get(&self, key: &str) -> Option<&ActionHandler> {
        self.handlers.get(key)
    }

    /// Read the discriminator field from `args` and run the matching handler.
    pub async fn dispatch(&self, args: Value) -> ActionOutcome {
        let args = ToolArguments::new(args);
        let Some(key) = args.str_opt(self.discriminator).map(str::to_string) else {
            return ActionOutcome::error(format!(
                "Missing required field: {}. Valid values: {}",
                self.discriminator,
                self.keys().join(", ")
            ));
        };
        execute_action(self, &key, args).await
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("discriminator", &self.discriminator)
            .field("keys", &self.keys())
            .finish()
    }
}

/// Run the handler for `key`, normalizing every result into an outcome.
///
/// Unknown keys, handler errors and handler panics all become error outcomes;
/// a normal return passes through unchanged.
pub async fn execute_action(table: &DispatchTable, key: &str, args: ToolArguments) -> ActionOutcome {
    let Some(handler) = table.get(key).cloned() else {
        return ActionOutcome::error(format!(
            "{}. Valid values: {}",
            WorkdeskError::UnknownAction(key.to_string()),
            table.keys().join(", ")
        ));
    };

    let result = AssertUnwindSafe(async move { handler(args).await })
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            debug!(action = key, error = %err, "action failed");
            ActionOutcome::from_error(&err)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(action = key, message = %message, "action handler panicked");
            ActionOutcome::error(format!("Internal error while running {key}: {message}"))
        }
    }
}

pub(super) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}
