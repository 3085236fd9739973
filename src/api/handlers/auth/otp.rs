//! Six-digit one-time codes shared by the signup, login, password-reset,
//! and email-change flows.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Purposes a one-time code can be issued for. Each purpose keeps its own
/// state on the user (or pending signup) record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpPurpose {
    Signup,
    Login,
    Forgot,
}

impl OtpPurpose {
    pub(super) fn parse(value: &str) -> Option<Self> {
        match value {
            "signup" => Some(Self::Signup),
            "login" => Some(Self::Login),
            "forgot" => Some(Self::Forgot),
            _ => None,
        }
    }

    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::Forgot => "forgot",
        }
    }
}

/// A freshly issued code with its expiry and issue timestamp.
#[derive(Clone, Debug)]
pub struct OneTimeCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
}

impl OneTimeCode {
    /// Issue a new code valid for `ttl_seconds` from now. A new code always
    /// supersedes whatever code was stored before it.
    #[must_use]
    pub fn issue(ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            code: generate_code(),
            expires_at: now + Duration::seconds(ttl_seconds),
            last_sent_at: now,
        }
    }
}

/// Uniformly random six-digit numeric code.
#[must_use]
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Seconds the caller still has to wait before another code may be sent,
/// rounded up to whole seconds. `None` once the cool-down has elapsed.
#[must_use]
pub fn remaining_cooldown(
    last_sent_at: Option<DateTime<Utc>>,
    cooldown_seconds: i64,
    now: DateTime<Utc>,
) -> Option<i64> {
    let last_sent_at = last_sent_at?;
    let elapsed_ms = (now - last_sent_at).num_milliseconds();
    let cooldown_ms = cooldown_seconds * 1000;
    if elapsed_ms >= cooldown_ms {
        return None;
    }
    Some((cooldown_ms - elapsed_ms + 999) / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..500 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().expect("numeric code");
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn purpose_parses_known_values_only() {
        assert_eq!(OtpPurpose::parse("signup"), Some(OtpPurpose::Signup));
        assert_eq!(OtpPurpose::parse("login"), Some(OtpPurpose::Login));
        assert_eq!(OtpPurpose::parse("forgot"), Some(OtpPurpose::Forgot));
        assert_eq!(OtpPurpose::parse("email-change"), None);
        assert_eq!(OtpPurpose::parse(""), None);
    }

    #[test]
    fn issue_sets_expiry_relative_to_now() {
        let otp = OneTimeCode::issue(600);
        let ttl = otp.expires_at - otp.last_sent_at;
        assert_eq!(ttl.num_seconds(), 600);
    }

    #[test]
    fn cooldown_reports_remaining_whole_seconds() {
        let now = Utc::now();
        let sent = now - Duration::seconds(10);
        assert_eq!(remaining_cooldown(Some(sent), 30, now), Some(20));

        let sent = now - Duration::milliseconds(29_500);
        assert_eq!(remaining_cooldown(Some(sent), 30, now), Some(1));
    }

    #[test]
    fn cooldown_clears_after_interval() {
        let now = Utc::now();
        let sent = now - Duration::seconds(31);
        assert_eq!(remaining_cooldown(Some(sent), 30, now), None);
        assert_eq!(remaining_cooldown(None, 30, now), None);
    }
}
