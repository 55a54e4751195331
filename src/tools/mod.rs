//! Tool schemas, action dispatch and the tool registry.

pub mod arguments;
pub mod auth;
pub mod dispatch;
pub mod module;
pub mod outcome;
pub mod registry;
pub mod types;

pub use arguments::ToolArguments;
pub use auth::{auth_module, auth_schema, auth_table, AUTH_TOOL};
pub use dispatch::{execute_action, ActionFuture, ActionHandler, DispatchTable};
pub use module::{ToolFuture, ToolHandler, ToolModule};
pub use outcome::{ActionOutcome, OutcomeContent, OutcomeContext};
pub use registry::{RegistryBuilder, RegistryError, ToolRegistry};
pub use types::{ParameterBuilder, ToolAnnotations, ToolSchema};
