//! Workdesk binary entry point.

use clap::Parser;
use workdesk::cli::{Cli, Mode};
use workdesk::{Workdesk, WorkdeskConfig};

#[tokio::main]
async fn main() {
    // stdout is reserved for JSON-RPC (or the token printed by --auth).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.mode()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(mode: Mode) -> workdesk::Result<()> {
    let app = Workdesk::init(WorkdeskConfig::from_env()?)?;
    match mode {
        Mode::Auth { identifier } => workdesk::cli::auth::handle_login(&app, &identifier).await,
        Mode::Status => workdesk::cli::auth::handle_status(&app),
        Mode::Logout => workdesk::cli::auth::handle_logout(&app),
        Mode::Serve => app.serve_stdio().await,
    }
}
