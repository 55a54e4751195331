#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use workdesk::auth::{
    AuthError, Credential, CredentialSource, CredentialStore, DeviceFlow, DevicePoll,
    DeviceSession, ResolvedCredential,
};

/// Credential store kept entirely in memory, with an optional override.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    saved: Mutex<Option<Credential>>,
    override_token: Option<String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(token: &str) -> Self {
        Self {
            saved: Mutex::new(None),
            override_token: Some(token.to_string()),
        }
    }

    pub fn saved(&self) -> Option<Credential> {
        self.saved.lock().expect("store lock poisoned").clone()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn resolve(&self) -> Result<Option<ResolvedCredential>, AuthError> {
        if let Some(token) = &self.override_token {
            return Ok(Some(ResolvedCredential {
                credential: Credential::new(token.clone()),
                source: CredentialSource::Override,
            }));
        }
        Ok(self.saved().map(|credential| ResolvedCredential {
            credential,
            source: CredentialSource::File,
        }))
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        *self.saved.lock().expect("store lock poisoned") = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        self.saved.lock().expect("store lock poisoned").take();
        Ok(())
    }
}

/// One scripted token-endpoint answer.
#[derive(Debug, Clone)]
pub enum Step {
    Pending,
    SlowDown,
    Approve(&'static str),
    Deny,
    Expire,
    Fail(&'static str),
}

impl Step {
    fn into_result(self) -> Result<DevicePoll, AuthError> {
        match self {
            Step::Pending => Ok(DevicePoll::Pending),
            Step::SlowDown => Ok(DevicePoll::SlowDown),
            Step::Approve(token) => Ok(DevicePoll::Authorized(Credential::new(token))),
            Step::Deny => Err(AuthError::AuthorizationDenied),
            Step::Expire => Err(AuthError::AuthorizationExpired),
            Step::Fail(msg) => Err(AuthError::Network(msg.to_string())),
        }
    }
}

/// Device flow that replays a fixed script of poll answers and records when
/// each poll happened. Once the script runs out every poll is pending.
pub struct ScriptedFlow {
    steps: Mutex<VecDeque<Step>>,
    polls: Mutex<Vec<Instant>>,
    code_requests: AtomicUsize,
    interval: Duration,
    expires_in: Duration,
}

impl ScriptedFlow {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            polls: Mutex::new(Vec::new()),
            code_requests: AtomicUsize::new(0),
            interval: Duration::from_secs(5),
            expires_in: Duration::from_secs(900),
        }
    }

    pub fn with_timing(mut self, interval_secs: u64, expires_in_secs: u64) -> Self {
        self.interval = Duration::from_secs(interval_secs);
        self.expires_in = Duration::from_secs(expires_in_secs);
        self
    }

    /// Append answers to the end of the script.
    pub fn push_steps(&self, steps: impl IntoIterator<Item = Step>) {
        self.steps.lock().expect("script lock poisoned").extend(steps);
    }

    pub fn poll_count(&self) -> usize {
        self.polls.lock().expect("poll lock poisoned").len()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.polls.lock().expect("poll lock poisoned").clone()
    }

    pub fn code_requests(&self) -> usize {
        self.code_requests.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> DeviceSession {
        DeviceSession {
            device_code: "device-code-secret".to_string(),
            user_code: "WDSK-0042".to_string(),
            verification_uri: "https://auth.test/device".to_string(),
            verification_uri_complete: Some("https://auth.test/device?code=WDSK-0042".to_string()),
            expires_in: self.expires_in,
            interval: self.interval,
            issued_at: Instant::now(),
        }
    }
}

#[async_trait]
impl DeviceFlow for ScriptedFlow {
    async fn request_code(&self) -> Result<DeviceSession, AuthError> {
        self.code_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.session())
    }

    async fn poll_token(&self, _session: &DeviceSession) -> Result<DevicePoll, AuthError> {
        self.polls
            .lock()
            .expect("poll lock poisoned")
            .push(Instant::now());
        let step = self
            .steps
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(Step::Pending);
        step.into_result()
    }
}

/// Whole seconds between consecutive instants.
pub fn gaps_in_secs(start: Instant, times: &[Instant]) -> Vec<u64> {
    let mut previous = start;
    times
        .iter()
        .map(|&at| {
            let gap = at.duration_since(previous).as_secs_f64().round() as u64;
            previous = at;
            gap
        })
        .collect()
}
