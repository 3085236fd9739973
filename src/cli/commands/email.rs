use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::email::SmtpConfig;

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_FROM: &str = "smtp-from";

#[derive(Debug)]
pub struct Options {
    pub smtp: Option<SmtpConfig>,
}

impl Options {
    /// Parse SMTP arguments. Without a host, outbound email falls back to
    /// the logging sender.
    ///
    /// # Errors
    /// Returns an error if a host is set but credentials are incomplete.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let Some(host) = matches.get_one::<String>(ARG_SMTP_HOST).cloned() else {
            return Ok(Self { smtp: None });
        };

        let read_required = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            smtp: Some(SmtpConfig {
                host,
                port: matches
                    .get_one::<u16>(ARG_SMTP_PORT)
                    .copied()
                    .unwrap_or(587),
                username: read_required(ARG_SMTP_USERNAME)?,
                password: SecretString::from(read_required(ARG_SMTP_PASSWORD)?),
                from: read_required(ARG_SMTP_FROM)?,
            }),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; omit to log outbound email instead")
                .env("CREDEXA_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .env("CREDEXA_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("CREDEXA_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("CREDEXA_SMTP_PASSWORD"),
        )
        .arg(
            Arg::new(ARG_SMTP_FROM)
                .long(ARG_SMTP_FROM)
                .help("From address for outbound email")
                .env("CREDEXA_SMTP_FROM"),
        )
}
