//! Process bootstrap: wire configuration into the auth service and tool registry.

use std::sync::Arc;

use tracing::info;

use crate::auth::{AuthService, CredentialSource, DeviceFlow};
use crate::config::WorkdeskConfig;
use crate::error::Result;
use crate::tools::{auth_module, ToolModule, ToolRegistry};

/// A fully initialized process: auth service plus the frozen tool registry.
///
/// All registration happens inside [`Workdesk::init`]; afterwards the registry
/// is shared read-only with the server and its tool-call tasks.
///
/// # Example
/// ```no_run
/// use workdesk::{Workdesk, WorkdeskConfig};
///
/// # async fn example() -> workdesk::error::Result<()> {
/// let app = Workdesk::init(WorkdeskConfig::from_env()?)?;
/// app.serve_stdio().await?;
/// # Ok(())
/// # }
/// ```
pub struct Workdesk {
    auth: Arc<AuthService>,
    registry: Arc<ToolRegistry>,
}

impl Workdesk {
    /// Build the default process from `config`.
    pub fn init(config: WorkdeskConfig) -> Result<Self> {
        let flow: Arc<dyn DeviceFlow> = Arc::new(config.device_client());
        let auth = AuthService::new(
            flow,
            Arc::new(config.credential_store()),
            Arc::new(config.rate_guard()),
        )
        .with_slow_down_step(config.slow_down_step);
        Self::with_modules(Arc::new(auth), Vec::new())
    }

    /// Build from an existing auth service plus extra tool modules.
    pub fn with_modules(auth: Arc<AuthService>, extra: Vec<ToolModule>) -> Result<Self> {
        let mut modules = vec![auth_module(Arc::clone(&auth))];
        modules.extend(extra);
        let registry = Arc::new(ToolRegistry::init(modules)?);
        Ok(Self { auth, registry })
    }

    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Where the current credential comes from, if one resolves.
    pub fn session_source(&self) -> Result<Option<CredentialSource>> {
        Ok(self.auth.status()?)
    }

    /// Serve tool calls over stdin/stdout until input closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        match self.session_source()? {
            Some(source) => info!(?source, "starting authenticated"),
            None => info!("no credential found; the auth tool can log in"),
        }
        crate::server::serve_stdio(Arc::clone(&self.registry)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Workdesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workdesk")
            .field("registry", &self.registry)
            .finish()
    }
}
