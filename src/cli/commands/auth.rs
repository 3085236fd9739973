use anyhow::anyhow;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_FRONTEND_URL: &str = "frontend-url";
pub const ARG_BACKEND_URL: &str = "backend-url";
pub const ARG_JWT_SECRET: &str = "jwt-secret";

#[derive(Debug)]
pub struct Options {
    pub frontend_url: String,
    pub backend_url: String,
    pub jwt_secret: SecretString,
    pub jwt_ttl_seconds: i64,
    pub otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub auth_challenge_ttl_seconds: u64,
    pub link_challenge_ttl_seconds: u64,
    pub session_sweep_interval_seconds: u64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read = |id: &str| -> Option<String> { matches.get_one::<String>(id).cloned() };

        Ok(Self {
            frontend_url: read(ARG_FRONTEND_URL)
                .ok_or_else(|| anyhow!("missing required argument: --{ARG_FRONTEND_URL}"))?,
            backend_url: read(ARG_BACKEND_URL)
                .ok_or_else(|| anyhow!("missing required argument: --{ARG_BACKEND_URL}"))?,
            jwt_secret: read(ARG_JWT_SECRET)
                .map(SecretString::from)
                .ok_or_else(|| anyhow!("missing required argument: --{ARG_JWT_SECRET}"))?,
            jwt_ttl_seconds: matches
                .get_one::<i64>("jwt-ttl-seconds")
                .copied()
                .unwrap_or(604_800),
            otp_ttl_seconds: matches
                .get_one::<i64>("otp-ttl-seconds")
                .copied()
                .unwrap_or(600),
            otp_resend_cooldown_seconds: matches
                .get_one::<i64>("otp-resend-cooldown-seconds")
                .copied()
                .unwrap_or(30),
            auth_challenge_ttl_seconds: matches
                .get_one::<u64>("auth-challenge-ttl-seconds")
                .copied()
                .unwrap_or(600),
            link_challenge_ttl_seconds: matches
                .get_one::<u64>("link-challenge-ttl-seconds")
                .copied()
                .unwrap_or(300),
            session_sweep_interval_seconds: matches
                .get_one::<u64>("session-sweep-interval-seconds")
                .copied()
                .unwrap_or(3600),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_URL)
                .long(ARG_FRONTEND_URL)
                .help("Frontend base URL for OAuth redirects and CORS")
                .env("CREDEXA_FRONTEND_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_BACKEND_URL)
                .long(ARG_BACKEND_URL)
                .help("Public base URL of this service, used for OAuth callbacks")
                .env("CREDEXA_BACKEND_URL")
                .default_value("http://localhost:4000"),
        )
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret for signing bearer tokens")
                .env("CREDEXA_JWT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("jwt-ttl-seconds")
                .long("jwt-ttl-seconds")
                .help("Bearer token lifetime in seconds")
                .env("CREDEXA_JWT_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-ttl-seconds")
                .long("otp-ttl-seconds")
                .help("One-time code lifetime in seconds")
                .env("CREDEXA_OTP_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-resend-cooldown-seconds")
                .long("otp-resend-cooldown-seconds")
                .help("Cooldown before a one-time code may be resent")
                .env("CREDEXA_OTP_RESEND_COOLDOWN_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("auth-challenge-ttl-seconds")
                .long("auth-challenge-ttl-seconds")
                .help("Wallet authentication challenge lifetime in seconds")
                .env("CREDEXA_AUTH_CHALLENGE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("link-challenge-ttl-seconds")
                .long("link-challenge-ttl-seconds")
                .help("Wallet linking challenge lifetime in seconds")
                .env("CREDEXA_LINK_CHALLENGE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("session-sweep-interval-seconds")
                .long("session-sweep-interval-seconds")
                .help("Interval between expired-session sweeps")
                .env("CREDEXA_SESSION_SWEEP_INTERVAL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
}
