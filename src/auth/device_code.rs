use std::time::Duration;

use async_trait::async_trait;
use strum::{Display, EnumString};
use tokio::time::Instant;
use tracing::{debug, info};

use super::error::AuthError;
use super::token::Credential;

/// Default increment applied to the poll interval on each `slow_down`.
pub const DEFAULT_SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// One device-grant authorization attempt.
///
/// `device_code` is used only for polling and is never shown to the user.
/// The session is valid until `issued_at + expires_in`.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: Duration,
    pub interval: Duration,
    pub issued_at: Instant,
}

impl DeviceSession {
    pub fn expires_at(&self) -> Instant {
        self.issued_at + self.expires_in
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at()
    }

    /// URI to show the user, preferring the one with the code pre-filled.
    pub fn display_uri(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

/// Non-terminal and successful results of a single token poll.
///
/// Denial and expiry are terminal and surface as [`AuthError`] instead.
#[derive(Debug, Clone)]
pub enum DevicePoll {
    Pending,
    SlowDown,
    Authorized(Credential),
}

/// Error vocabulary of the device token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceErrorCode {
    AuthorizationPending,
    SlowDown,
    AccessDenied,
    ExpiredToken,
}

impl DeviceErrorCode {
    pub fn into_poll(self) -> Result<DevicePoll, AuthError> {
        match self {
            Self::AuthorizationPending => Ok(DevicePoll::Pending),
            Self::SlowDown => Ok(DevicePoll::SlowDown),
            Self::AccessDenied => Err(AuthError::AuthorizationDenied),
            Self::ExpiredToken => Err(AuthError::AuthorizationExpired),
        }
    }
}

/// The two remote calls of the device-grant flow.
#[async_trait]
pub trait DeviceFlow: Send + Sync {
    /// Ask the authorization server for a device/user code pair.
    async fn request_code(&self) -> Result<DeviceSession, AuthError>;

    /// Poll the token endpoint once.
    async fn poll_token(&self, session: &DeviceSession) -> Result<DevicePoll, AuthError>;
}

/// Timing state of the poll loop, free of any clock or runtime.
///
/// The interval only ever grows. A poll is scheduled only if it lands strictly
/// before the session deadline.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: Duration,
    lifetime: Duration,
    slow_down_step: Duration,
    polls: u32,
}

impl PollSchedule {
    pub fn new(interval: Duration, lifetime: Duration, slow_down_step: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_secs(1)),
            lifetime,
            slow_down_step,
            polls: 0,
        }
    }

    pub fn for_session(session: &DeviceSession, slow_down_step: Duration) -> Self {
        Self::new(session.interval, session.expires_in, slow_down_step)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// How long to wait before the next poll, given time elapsed since issue.
    ///
    /// `None` means the next poll would reach the deadline: the session is
    /// over and must not be polled again.
    pub fn next_wait(&self, elapsed: Duration) -> Option<Duration> {
        if elapsed + self.interval >= self.lifetime {
            return None;
        }
        Some(self.interval)
    }

    pub fn record_poll(&mut self) {
        self.polls += 1;
    }

    pub fn slow_down(&mut self) {
        self.interval += self.slow_down_step;
    }
}

/// Drive the device flow until the user approves, denies, or the session expires.
///
/// Each iteration suspends for the current interval and makes exactly one
/// remote call. Network and protocol errors are surfaced immediately, without
/// retry.
pub async fn wait_for_authorization<F>(
    flow: &F,
    session: &DeviceSession,
    slow_down_step: Duration,
) -> Result<Credential, AuthError>
where
    F: DeviceFlow + ?Sized,
{
    let mut schedule = PollSchedule::for_session(session, slow_down_step);
    loop {
        let Some(wait) = schedule.next_wait(session.issued_at.elapsed()) else {
            info!(polls = schedule.polls(), "device authorization expired");
            return Err(AuthError::AuthorizationExpired);
        };
        tokio::time::sleep(wait).await;

        schedule.record_poll();
        match flow.poll_token(session).await? {
            DevicePoll::Authorized(credential) => {
                info!(polls = schedule.polls(), "device authorization approved");
                return Ok(credential);
            }
            DevicePoll::Pending => {
                debug!(polls = schedule.polls(), "authorization pending");
            }
            DevicePoll::SlowDown => {
                schedule.slow_down();
                debug!(
                    interval_secs = schedule.interval().as_secs(),
                    "authorization server asked to slow down"
                );
            }
        }
    }
}
