use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::handlers::auth::oauth::ProviderKind;

const PROVIDERS: &[(ProviderKind, &str, &str, &str)] = &[
    (
        ProviderKind::Google,
        "google",
        "GOOGLE_CLIENT_ID",
        "GOOGLE_CLIENT_SECRET",
    ),
    (
        ProviderKind::Github,
        "github",
        "GITHUB_CLIENT_ID",
        "GITHUB_CLIENT_SECRET",
    ),
    (
        ProviderKind::Discord,
        "discord",
        "DISCORD_CLIENT_ID",
        "DISCORD_CLIENT_SECRET",
    ),
    (
        ProviderKind::Linkedin,
        "linkedin",
        "LINKEDIN_CLIENT_ID",
        "LINKEDIN_CLIENT_SECRET",
    ),
];

/// Credentials for one configured provider.
#[derive(Debug)]
pub struct ProviderCredentials {
    pub kind: ProviderKind,
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug)]
pub struct Options {
    pub providers: Vec<ProviderCredentials>,
}

impl Options {
    /// Collect the providers that have both a client id and secret;
    /// everything else stays unwired.
    ///
    /// # Errors
    /// Returns an error if a provider has an id but no secret.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let mut providers = Vec::new();
        for (kind, name, _, _) in PROVIDERS {
            let id_arg = format!("{name}-client-id");
            let secret_arg = format!("{name}-client-secret");
            let Some(client_id) = matches
                .get_one::<String>(&id_arg)
                .cloned()
                .filter(|value| !value.trim().is_empty())
            else {
                continue;
            };
            let client_secret = matches
                .get_one::<String>(&secret_arg)
                .cloned()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{secret_arg}"))?;
            providers.push(ProviderCredentials {
                kind: *kind,
                client_id,
                client_secret: SecretString::from(client_secret),
            });
        }
        Ok(Self { providers })
    }
}

#[must_use]
pub fn with_args(mut command: Command) -> Command {
    for (_, name, id_env, secret_env) in PROVIDERS {
        let id_name: &'static str = Box::leak(format!("{name}-client-id").into_boxed_str());
        let secret_name: &'static str =
            Box::leak(format!("{name}-client-secret").into_boxed_str());
        command = command
            .arg(
                Arg::new(id_name)
                    .long(id_name)
                    .help(format!("OAuth client id for {name}"))
                    .env(*id_env),
            )
            .arg(
                Arg::new(secret_name)
                    .long(secret_name)
                    .help(format!("OAuth client secret for {name}"))
                    .env(*secret_env),
            );
    }
    command
}
