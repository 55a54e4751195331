//! Workdesk: project-management tools for conversational agents.
//!
//! Agents reach the tools over a line-delimited JSON-RPC stdio server. Each
//! tool routes through a write-once [`tools::ToolRegistry`] into a per-tool
//! [`tools::DispatchTable`]. Authentication uses the OAuth device grant, so
//! the user's password never passes through this process.
//!
//! # Quick Start
//!
//! ```no_run
//! use workdesk::{Workdesk, WorkdeskConfig};
//!
//! # async fn example() -> workdesk::error::Result<()> {
//! let app = Workdesk::init(WorkdeskConfig::from_env()?)?;
//! let outcome = app
//!     .registry()
//!     .route_tool_call("auth", serde_json::json!({ "action": "status" }))
//!     .await;
//! println!("{}", outcome.text_content());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod server;
pub mod tools;

#[cfg(feature = "cli")]
pub mod cli;

pub use bootstrap::Workdesk;
pub use config::WorkdeskConfig;
pub use error::{Result, WorkdeskError};
