use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use super::device_code::{DeviceErrorCode, DeviceFlow, DevicePoll, DeviceSession};
use super::error::AuthError;
use super::token::Credential;

pub const DEFAULT_AUTH_URL: &str = "https://auth.workdesk.app";
pub const DEFAULT_CLIENT_ID: &str = "workdesk-agent";
const DEVICE_CODE_PATH: &str = "/oauth/device/code";
const TOKEN_PATH: &str = "/oauth/token";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// HTTP client for the device-authorization grant.
///
/// The user's password never passes through this client: it only exchanges a
/// client identifier for a code pair, then the device code for a bearer token.
///
/// # Example
/// ```no_run
/// use workdesk::auth::{DeviceAuthClient, DeviceFlow};
///
/// # async fn example() -> Result<(), workdesk::auth::AuthError> {
/// let client = DeviceAuthClient::new("workdesk-agent")
///     .with_base_url("https://auth.example.com");
/// let session = client.request_code().await?;
/// println!("Visit {} and enter {}", session.verification_uri, session.user_code);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeviceAuthClient {
    client: reqwest::Client,
    client_id: String,
    scope: Option<String>,
    device_code_url: String,
    token_url: String,
}

impl DeviceAuthClient {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            scope: None,
            device_code_url: format!("{DEFAULT_AUTH_URL}{DEVICE_CODE_PATH}"),
            token_url: format!("{DEFAULT_AUTH_URL}{TOKEN_PATH}"),
        }
    }

    /// Point both endpoints at `base_url`.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        let base = base_url.as_ref().trim_end_matches('/');
        self.device_code_url = format!("{base}{DEVICE_CODE_PATH}");
        self.token_url = format!("{base}{TOKEN_PATH}");
        self
    }

    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }
}

#[async_trait]
impl DeviceFlow for DeviceAuthClient {
    async fn request_code(&self) -> Result<DeviceSession, AuthError> {
        let mut form = vec![("client_id", self.client_id.as_str())];
        if let Some(scope) = self.scope.as_deref() {
            form.push(("scope", scope));
        }
        let resp = self
            .client
            .post(&self.device_code_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;
        let issued_at = Instant::now();
        if !resp.status().is_success() {
            return Err(AuthError::Network(format!(
                "device code request failed with status {}",
                resp.status()
            )));
        }
        let body = resp.text().await?;
        let payload: DeviceCodeResponse = serde_json::from_str(&body).map_err(|_| {
            AuthError::Protocol("device code response is not a JSON object".to_string())
        })?;
        let session = payload.into_session(issued_at)?;
        debug!(
            user_code = %session.user_code,
            interval_secs = session.interval.as_secs(),
            expires_in_secs = session.expires_in.as_secs(),
            "device code issued"
        );
        Ok(session)
    }

    async fn poll_token(&self, session: &DeviceSession) -> Result<DevicePoll, AuthError> {
        if session.is_expired() {
            return Err(AuthError::AuthorizationExpired);
        }
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("device_code", session.device_code.as_str()),
                ("grant_type", DEVICE_GRANT_TYPE),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        classify_token_response(status, &body)
    }
}

/// Map a token endpoint response onto the poll vocabulary.
///
/// OAuth servers report `authorization_pending` and friends with a 400, so the
/// body is inspected before the status. A 5xx with an error code outside the
/// device vocabulary is still a transport failure.
fn classify_token_response(status: StatusCode, body: &str) -> Result<DevicePoll, AuthError> {
    let payload = match serde_json::from_str::<DeviceTokenResponse>(body) {
        Ok(payload) => payload,
        Err(_) if status.is_success() => {
            return Err(AuthError::Protocol(
                "token response is not a JSON object".to_string(),
            ));
        }
        Err(_) => {
            return Err(AuthError::Network(format!(
                "token request failed with status {status}"
            )));
        }
    };

    if let Some(access_token) = payload.access_token.filter(|t| !t.is_empty()) {
        let mut credential = Credential::new(access_token);
        credential.token_type = payload.token_type;
        credential.scope = payload.scope;
        credential.obtained_at = Some(Utc::now());
        return Ok(DevicePoll::Authorized(credential));
    }

    match payload.error.as_deref() {
        Some(code) => match DeviceErrorCode::from_str(code) {
            Ok(known) => known.into_poll(),
            Err(_) if status.is_server_error() => Err(AuthError::Network(format!(
                "token request failed with status {status}"
            ))),
            Err(_) => Err(AuthError::Protocol(format!(
                "unexpected device error code: {code}"
            ))),
        },
        None if !status.is_success() => Err(AuthError::Network(format!(
            "token request failed with status {status}"
        ))),
        None => Err(AuthError::Protocol(
            "token response missing access_token and error".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: Option<String>,
    user_code: Option<String>,
    verification_uri: Option<String>,
    verification_uri_complete: Option<String>,
    expires_in: Option<u64>,
    interval: Option<u64>,
}

impl DeviceCodeResponse {
    fn into_session(self, issued_at: Instant) -> Result<DeviceSession, AuthError> {
        fn required<T>(value: Option<T>, field: &str) -> Result<T, AuthError> {
            value.ok_or_else(|| {
                AuthError::Protocol(format!("device code response missing `{field}`"))
            })
        }

        let device_code = required(self.device_code, "device_code")?;
        let user_code = required(self.user_code, "user_code")?;
        let verification_uri = required(self.verification_uri, "verification_uri")?;
        let expires_in = required(self.expires_in, "expires_in")?;
        let interval = self.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS).max(1);

        Ok(DeviceSession {
            device_code,
            user_code,
            verification_uri,
            verification_uri_complete: self.verification_uri_complete,
            expires_in: Duration::from_secs(expires_in),
            interval: Duration::from_secs(interval),
            issued_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DeviceTokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
}
