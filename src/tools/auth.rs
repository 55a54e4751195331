//! The `auth` tool: device login, status and logout for agents.

use std::sync::Arc;

use serde_json::json;

use super::arguments::ToolArguments;
use super::dispatch::DispatchTable;
use super::module::ToolModule;
use super::outcome::{ActionOutcome, OutcomeContext};
use super::types::{ParameterBuilder, ToolAnnotations, ToolSchema};
use crate::auth::AuthService;

pub const AUTH_TOOL: &str = "auth";

const ACTIONS: &[&str] = &["login", "complete", "status", "logout"];

pub fn auth_schema() -> ToolSchema {
    ToolSchema::new(
        AUTH_TOOL,
        "Authenticate this agent with a device code. `login` returns a URL and \
         short code for the user to approve in a browser; `complete` waits for \
         that approval and stores the credential. `status` and `logout` manage \
         the stored session.",
        ParameterBuilder::object()
            .string_enum("action", "Authentication step to run", ACTIONS, true)
            .string(
                "email",
                "Email of the account being authorized (login, complete)",
                false,
            )
            .build(),
    )
    .with_annotations(ToolAnnotations::mutating(false).with_title("Authentication"))
}

/// Dispatch table for the `auth` tool, bound to `service`.
pub fn auth_table(service: Arc<AuthService>) -> DispatchTable {
    let login = Arc::clone(&service);
    let complete = Arc::clone(&service);
    let status = Arc::clone(&service);
    let logout = service;

    DispatchTable::new("action")
        .on("login", move |args: ToolArguments| {
            let service = Arc::clone(&login);
            async move {
                let Some(email) = args.str_opt("email").map(str::to_string) else {
                    return Ok(ActionOutcome::missing_field("email"));
                };
                let prompt = service.start_login(&email).await?;
                let context = OutcomeContext::new().with("email", email);
                Ok(ActionOutcome::success_with_context(&prompt, &context))
            }
        })
        .on("complete", move |args: ToolArguments| {
            let service = Arc::clone(&complete);
            async move {
                let Some(email) = args.str_opt("email").map(str::to_string) else {
                    return Ok(ActionOutcome::missing_field("email"));
                };
                service.complete_login(&email).await?;
                let context = OutcomeContext::new().with("email", email);
                Ok(ActionOutcome::success_with_context(
                    &json!({ "authenticated": true }),
                    &context,
                ))
            }
        })
        .on("status", move |_args| {
            let service = Arc::clone(&status);
            async move {
                let source = service.status()?;
                Ok(ActionOutcome::success(&json!({
                    "authenticated": source.is_some(),
                    "source": source,
                })))
            }
        })
        .on("logout", move |_args| {
            let service = Arc::clone(&logout);
            async move {
                let report = service.logout()?;
                Ok(ActionOutcome::success(&report))
            }
        })
}

/// Tool module exposing [`auth_schema`] backed by [`auth_table`].
pub fn auth_module(service: Arc<AuthService>) -> ToolModule {
    ToolModule::with_tables(AUTH_TOOL, vec![(auth_schema(), auth_table(service))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        AuthError, Credential, CredentialStoreConfig, DeviceFlow, DevicePoll, DeviceSession,
        FileCredentialStore, RateGuard, RatePolicy,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct ApprovingFlow {
        requests: AtomicUsize,
    }

    #[async_trait]
    impl DeviceFlow for ApprovingFlow {
        async fn request_code(&self) -> Result<DeviceSession, AuthError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(DeviceSession {
                device_code: "device-secret".to_string(),
                user_code: "WDSK-1234".to_string(),
                verification_uri: "https://auth.example/device".to_string(),
                verification_uri_complete: None,
                expires_in: Duration::from_secs(600),
                interval: Duration::from_secs(1),
                issued_at: tokio::time::Instant::now(),
            })
        }

        async fn poll_token(&self, _session: &DeviceSession) -> Result<DevicePoll, AuthError> {
            Ok(DevicePoll::Authorized(Credential::new("wd_live_token")))
        }
    }

    fn service(dir: &std::path::Path, flow: Arc<ApprovingFlow>) -> Arc<AuthService> {
        let store = Arc::new(FileCredentialStore::new(CredentialStoreConfig::in_dir(dir)));
        Arc::new(AuthService::new(flow, store, Arc::new(RateGuard::default())))
    }

    #[tokio::test]
    async fn login_requires_email() {
        let dir = tempfile::tempdir().unwrap();
        let flow = Arc::new(ApprovingFlow::default());
        let table = auth_table(service(dir.path(), Arc::clone(&flow)));

        let outcome = table.dispatch(json!({ "action": "login" })).await;
        assert_eq!(outcome, ActionOutcome::missing_field("email"));
        assert_eq!(flow.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn login_then_complete_never_echoes_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let table = auth_table(service(dir.path(), Arc::new(ApprovingFlow::default())));

        let login = table
            .dispatch(json!({ "action": "login", "email": "ada@example.com" }))
            .await;
        assert!(!login.is_error());
        assert!(login.text_content().contains("WDSK-1234"));
        assert!(!login.text_content().contains("device-secret"));
        assert_eq!(
            login.context().and_then(|ctx| ctx.get("email").map(str::to_string)),
            Some("ada@example.com".to_string())
        );

        let complete = table
            .dispatch(json!({ "action": "complete", "email": "ada@example.com" }))
            .await;
        assert!(!complete.is_error());
        assert_eq!(complete.payload(), Some(json!({ "authenticated": true })));
        assert!(!complete.text_content().contains("wd_live_token"));

        let status = table.dispatch(json!({ "action": "status" })).await;
        assert_eq!(
            status.payload(),
            Some(json!({ "authenticated": true, "source": "file" }))
        );
    }

    #[tokio::test]
    async fn complete_without_login_is_an_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let table = auth_table(service(dir.path(), Arc::new(ApprovingFlow::default())));

        let outcome = table
            .dispatch(json!({ "action": "complete", "email": "ada@example.com" }))
            .await;
        assert!(outcome.is_error());
        assert!(outcome.text_content().contains("no pending login"));
    }

    #[tokio::test]
    async fn locked_identifier_is_rejected_before_contacting_server() {
        let dir = tempfile::tempdir().unwrap();
        let flow = Arc::new(ApprovingFlow::default());
        let store = Arc::new(FileCredentialStore::new(CredentialStoreConfig::in_dir(dir.path())));
        let guard = Arc::new(RateGuard::new(RatePolicy {
            max_attempts: 1,
            ..RatePolicy::default()
        }));
        guard.record_failure("ada@example.com");
        let flow_dyn: Arc<dyn DeviceFlow> = flow.clone();
        let table = auth_table(Arc::new(AuthService::new(flow_dyn, store, guard)));

        let outcome = table
            .dispatch(json!({ "action": "login", "email": "ADA@example.com " }))
            .await;
        assert!(outcome.is_error());
        assert!(outcome.text_content().starts_with("Too many failed attempts"));
        assert_eq!(flow.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logout_reports_without_override() {
        let dir = tempfile::tempdir().unwrap();
        let table = auth_table(service(dir.path(), Arc::new(ApprovingFlow::default())));

        let outcome = table.dispatch(json!({ "action": "logout" })).await;
        assert_eq!(
            outcome.payload(),
            Some(json!({ "logged_out": true, "override_active": false }))
        );
    }

    #[test]
    fn module_advertises_the_auth_tool() {
        let dir = tempfile::tempdir().unwrap();
        let module = auth_module(service(dir.path(), Arc::new(ApprovingFlow::default())));
        assert_eq!(module.handles(), [AUTH_TOOL]);
        assert_eq!(
            module.schemas()[0].input_schema["properties"]["action"]["enum"],
            json!(ACTIONS)
        );
    }
}
