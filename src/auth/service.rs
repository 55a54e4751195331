use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::device_code::{wait_for_authorization, DeviceFlow, DeviceSession, DEFAULT_SLOW_DOWN_STEP};
use super::error::AuthError;
use super::rate_guard::{RateDecision, RateGuard};
use super::store::{CredentialSource, CredentialStore};
use super::token::Credential;

/// What the user must do to approve a pending login.
///
/// Deliberately excludes the device code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginPrompt {
    pub user_code: String,
    pub verification_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    pub expires_in_secs: u64,
    pub interval_secs: u64,
}

impl From<&DeviceSession> for LoginPrompt {
    fn from(session: &DeviceSession) -> Self {
        Self {
            user_code: session.user_code.clone(),
            verification_uri: session.verification_uri.clone(),
            verification_uri_complete: session.verification_uri_complete.clone(),
            expires_in_secs: session.expires_in.as_secs(),
            interval_secs: session.interval.as_secs(),
        }
    }
}

/// Result of [`AuthService::logout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogoutReport {
    pub logged_out: bool,
    /// An override credential is still configured and keeps the session alive.
    pub override_active: bool,
}

/// Authentication facade combining the device flow, credential store and
/// rate guard.
///
/// All I/O decisions (printing, exit codes) belong to the caller.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use workdesk::auth::{
///     AuthService, CredentialStoreConfig, DeviceAuthClient, FileCredentialStore, RateGuard,
/// };
///
/// let store = Arc::new(FileCredentialStore::new(CredentialStoreConfig::in_dir("/tmp/workdesk")));
/// let flow = Arc::new(DeviceAuthClient::new("workdesk-agent"));
/// let service = AuthService::new(flow, store, Arc::new(RateGuard::default()));
/// ```
pub struct AuthService {
    flow: Arc<dyn DeviceFlow>,
    store: Arc<dyn CredentialStore>,
    guard: Arc<RateGuard>,
    slow_down_step: Duration,
    pending: Mutex<HashMap<String, DeviceSession>>,
}

impl AuthService {
    pub fn new(
        flow: Arc<dyn DeviceFlow>,
        store: Arc<dyn CredentialStore>,
        guard: Arc<RateGuard>,
    ) -> Self {
        Self {
            flow,
            store,
            guard,
            slow_down_step: DEFAULT_SLOW_DOWN_STEP,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_slow_down_step(mut self, step: Duration) -> Self {
        self.slow_down_step = step;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Begin a device login for `identifier`.
    ///
    /// A locked identifier is rejected before the authorization endpoint is
    /// contacted. Any earlier pending login for the identifier is replaced.
    pub async fn start_login(&self, identifier: &str) -> Result<LoginPrompt, AuthError> {
        self.ensure_allowed(identifier)?;
        let session = self.flow.request_code().await?;
        let prompt = LoginPrompt::from(&session);
        info!(user_code = %session.user_code, "device login started");
        self.pending_map().insert(pending_key(identifier), session);
        Ok(prompt)
    }

    /// Wait for the user to approve the pending login for `identifier`.
    ///
    /// Denial and expiry count as failures for the rate guard; success resets
    /// it and persists the credential. After a network or protocol error the
    /// login stays pending until its code expires, so the call can be retried.
    pub async fn complete_login(&self, identifier: &str) -> Result<Credential, AuthError> {
        self.ensure_allowed(identifier)?;
        let key = pending_key(identifier);
        let session = self.pending_map().remove(&key).ok_or_else(|| {
            AuthError::Unsupported("no pending login for this identifier; run login first".to_string())
        })?;

        let result = self.authorize(identifier, &session).await;
        if matches!(result, Err(AuthError::Network(_) | AuthError::Protocol(_))) && !session.is_expired() {
            debug!(user_code = %session.user_code, "device login kept pending for retry");
            // A login started meanwhile takes precedence.
            self.pending_map().entry(key).or_insert(session);
        }
        result
    }

    /// Run a full device login in one call: request a code, hand the prompt to
    /// `on_prompt`, then wait for approval.
    pub async fn login_interactive<P>(
        &self,
        identifier: &str,
        on_prompt: P,
    ) -> Result<Credential, AuthError>
    where
        P: FnOnce(&LoginPrompt),
    {
        self.ensure_allowed(identifier)?;
        let session = self.flow.request_code().await?;
        on_prompt(&LoginPrompt::from(&session));
        self.authorize(identifier, &session).await
    }

    /// Where the active credential comes from, if any.
    pub fn status(&self) -> Result<Option<CredentialSource>, AuthError> {
        Ok(self.store.resolve()?.map(|resolved| resolved.source))
    }

    /// Resolve the credential for an authenticated operation.
    pub fn credential(&self) -> Result<Credential, AuthError> {
        self.store.load()?.ok_or(AuthError::CredentialMissing)
    }

    /// Delete the persisted credential and forget pending logins.
    pub fn logout(&self) -> Result<LogoutReport, AuthError> {
        self.store.clear()?;
        self.pending_map().clear();
        let override_active = matches!(self.status()?, Some(CredentialSource::Override));
        Ok(LogoutReport {
            logged_out: true,
            override_active,
        })
    }

    async fn authorize(
        &self,
        identifier: &str,
        session: &DeviceSession,
    ) -> Result<Credential, AuthError> {
        match wait_for_authorization(self.flow.as_ref(), session, self.slow_down_step).await {
            Ok(credential) => {
                self.store.save(&credential)?;
                self.guard.record_success(identifier);
                Ok(credential)
            }
            Err(err @ (AuthError::AuthorizationDenied | AuthError::AuthorizationExpired)) => {
                warn!(error = %err, "device login failed");
                self.guard.record_failure(identifier);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn ensure_allowed(&self, identifier: &str) -> Result<(), AuthError> {
        match self.guard.check_allowed(identifier) {
            RateDecision::Allowed => Ok(()),
            RateDecision::Locked { retry_after } => Err(AuthError::RateLimited {
                retry_after_secs: whole_secs_rounded_up(retry_after),
            }),
        }
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, DeviceSession>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn pending_key(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Whole seconds, rounded up, at least one.
fn whole_secs_rounded_up(duration: Duration) -> u64 {
    (duration.as_secs_f64().ceil() as u64).max(1)
}
