//! Map validated CLI matches onto an action.

use anyhow::{Context, Result};

use crate::cli::actions::{server, Action};
use crate::cli::commands::{auth, email, oauth};

/// Build the server action from parsed arguments.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(4000);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches)?;
    let oauth_opts = oauth::Options::parse(matches)?;

    Ok(Action::Server(server::Args {
        port,
        dsn,
        frontend_url: auth_opts.frontend_url,
        backend_url: auth_opts.backend_url,
        jwt_secret: auth_opts.jwt_secret,
        jwt_ttl_seconds: auth_opts.jwt_ttl_seconds,
        otp_ttl_seconds: auth_opts.otp_ttl_seconds,
        otp_resend_cooldown_seconds: auth_opts.otp_resend_cooldown_seconds,
        auth_challenge_ttl_seconds: auth_opts.auth_challenge_ttl_seconds,
        link_challenge_ttl_seconds: auth_opts.link_challenge_ttl_seconds,
        session_sweep_interval_seconds: auth_opts.session_sweep_interval_seconds,
        smtp: email_opts.smtp,
        oauth_providers: oauth_opts.providers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn server_action_from_minimal_args() {
        temp_env::with_vars(
            [
                ("CREDEXA_PORT", None::<&str>),
                ("CREDEXA_DSN", None),
                ("CREDEXA_JWT_SECRET", None),
                ("CREDEXA_SMTP_HOST", None),
                ("GOOGLE_CLIENT_ID", None),
                ("GITHUB_CLIENT_ID", None),
                ("DISCORD_CLIENT_ID", None),
                ("LINKEDIN_CLIENT_ID", None),
            ],
            || {
                let matches = commands::new()
                    .try_get_matches_from([
                        "credexa",
                        "--dsn",
                        "postgres://localhost:5432/credexa",
                        "--jwt-secret",
                        "super-secret",
                    ])
                    .expect("parse");
                let Action::Server(args) = handler(&matches).expect("handler");
                assert_eq!(args.port, 4000);
                assert_eq!(args.dsn, "postgres://localhost:5432/credexa");
                assert_eq!(args.jwt_secret.expose_secret(), "super-secret");
                assert_eq!(args.otp_resend_cooldown_seconds, 30);
                assert!(args.smtp.is_none());
                assert!(args.oauth_providers.is_empty());
            },
        );
    }

    #[test]
    fn oauth_provider_requires_both_credentials() {
        temp_env::with_vars(
            [
                ("GITHUB_CLIENT_ID", Some("id-123")),
                ("GITHUB_CLIENT_SECRET", None::<&str>),
            ],
            || {
                let matches = commands::new()
                    .try_get_matches_from([
                        "credexa",
                        "--dsn",
                        "postgres://localhost:5432/credexa",
                        "--jwt-secret",
                        "super-secret",
                    ])
                    .expect("parse");
                assert!(handler(&matches).is_err());
            },
        );
    }

    #[test]
    fn configured_provider_is_collected() {
        temp_env::with_vars(
            [
                ("GITHUB_CLIENT_ID", Some("id-123")),
                ("GITHUB_CLIENT_SECRET", Some("secret-456")),
            ],
            || {
                let matches = commands::new()
                    .try_get_matches_from([
                        "credexa",
                        "--dsn",
                        "postgres://localhost:5432/credexa",
                        "--jwt-secret",
                        "super-secret",
                    ])
                    .expect("parse");
                let Action::Server(args) = handler(&matches).expect("handler");
                assert_eq!(args.oauth_providers.len(), 1);
                assert_eq!(args.oauth_providers[0].client_id, "id-123");
            },
        );
    }
}
