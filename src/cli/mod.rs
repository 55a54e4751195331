//! CLI entry point for Workdesk.

pub mod auth;

use clap::Parser;

/// Workdesk agent tool server
///
/// With no flags, serves tools over stdin/stdout.
#[derive(Parser, Debug, Default)]
#[command(name = "workdesk", version, about = "Workdesk agent tool server")]
pub struct Cli {
    /// Run the device login in the terminal and print the resulting token
    #[arg(long, conflicts_with_all = ["status", "logout"])]
    pub auth: bool,

    /// Identifier for login rate limiting (defaults to the local user)
    #[arg(long, requires = "auth")]
    pub email: Option<String>,

    /// Show whether a credential is configured and where it comes from
    #[arg(long, conflicts_with = "logout")]
    pub status: bool,

    /// Delete the stored credential
    #[arg(long)]
    pub logout: bool,
}

/// What the binary should do, derived from [`Cli`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Auth { identifier: String },
    Status,
    Logout,
    Serve,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.auth {
            Mode::Auth {
                identifier: self.email.clone().unwrap_or_else(default_identifier),
            }
        } else if self.status {
            Mode::Status
        } else if self.logout {
            Mode::Logout
        } else {
            Mode::Serve
        }
    }
}

fn default_identifier() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_serves() {
        let cli = Cli::try_parse_from(["workdesk"]).unwrap();
        assert_eq!(cli.mode(), Mode::Serve);
    }

    #[test]
    fn auth_with_email() {
        let cli = Cli::try_parse_from(["workdesk", "--auth", "--email", "ada@example.com"]).unwrap();
        assert_eq!(
            cli.mode(),
            Mode::Auth {
                identifier: "ada@example.com".to_string()
            }
        );
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        assert!(Cli::try_parse_from(["workdesk", "--auth", "--logout"]).is_err());
        assert!(Cli::try_parse_from(["workdesk", "--status", "--logout"]).is_err());
        assert!(Cli::try_parse_from(["workdesk", "--email", "a@b.c"]).is_err());
    }

    #[test]
    fn status_and_logout_modes() {
        assert_eq!(Cli::try_parse_from(["workdesk", "--status"]).unwrap().mode(), Mode::Status);
        assert_eq!(Cli::try_parse_from(["workdesk", "--logout"]).unwrap().mode(), Mode::Logout);
    }
}
