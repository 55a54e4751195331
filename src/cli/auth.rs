//! CLI handlers for `--auth`, `--status` and `--logout`.
//!
//! Prompts and status lines go to stderr; stdout only ever carries the token
//! printed by `--auth`, so it can be captured by a script.

use crate::auth::{CredentialSource, LoginPrompt};
use crate::error::Result;
use crate::Workdesk;

/// Handle `workdesk --auth`.
pub async fn handle_login(app: &Workdesk, identifier: &str) -> Result<()> {
    let credential = app
        .auth()
        .login_interactive(identifier, print_prompt)
        .await?;
    eprintln!("✅ Login successful. Credential saved.");
    println!("{}", credential.access_token());
    Ok(())
}

fn print_prompt(prompt: &LoginPrompt) {
    match prompt.verification_uri_complete.as_deref() {
        Some(uri) => eprintln!("🔗 Visit: {uri}"),
        None => eprintln!("🔗 Visit: {}", prompt.verification_uri),
    }
    eprintln!("📋 Enter code: {}", prompt.user_code);
    eprintln!(
        "⏳ Waiting for authorization (expires in {}s)...",
        prompt.expires_in_secs
    );
}

/// Handle `workdesk --status`.
pub fn handle_status(app: &Workdesk) -> Result<()> {
    match app.session_source()? {
        Some(CredentialSource::Override) => {
            eprintln!("✅ Authenticated via WORKDESK_TOKEN");
        }
        Some(CredentialSource::File) => {
            eprintln!("✅ Authenticated (stored credential)");
        }
        None => {
            eprintln!("❌ Not logged in. Run `workdesk --auth`.");
        }
    }
    Ok(())
}

/// Handle `workdesk --logout`.
pub fn handle_logout(app: &Workdesk) -> Result<()> {
    let report = app.auth().logout()?;
    eprintln!("✅ Stored credential removed.");
    if report.override_active {
        eprintln!("⚠️  WORKDESK_TOKEN is still set and will keep this session authenticated.");
    }
    Ok(())
}
