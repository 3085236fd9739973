//! Small helpers shared by the auth handlers.

use axum::http::HeaderMap;
use regex::Regex;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Wallet addresses must be 0x-prefixed 20-byte hex strings.
pub(super) fn valid_wallet_address(address: &str) -> bool {
    Regex::new(r"^0x[0-9a-fA-F]{40}$").is_ok_and(|regex| regex.is_match(address))
}

/// Split a provider display name into first/last at the first space.
pub(super) fn split_display_name(display_name: &str) -> (String, String) {
    let trimmed = display_name.trim();
    match trimmed.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

/// Extract a client IP from common proxy headers. Callers fall back to the
/// peer address when none is present.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Jane@Example.COM "), "jane@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("jane@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn wallet_address_requires_prefixed_hex() {
        assert!(valid_wallet_address(
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        ));
        assert!(!valid_wallet_address(
            "f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        ));
        assert!(!valid_wallet_address("0x1234"));
        assert!(!valid_wallet_address(
            "0xZZZZd6e51aad88F6F4ce6aB8827279cffFb92266"
        ));
    }

    #[test]
    fn display_name_splits_at_first_space() {
        assert_eq!(
            split_display_name("Jane Doe"),
            ("Jane".to_string(), "Doe".to_string())
        );
        assert_eq!(
            split_display_name("Jane van der Berg"),
            ("Jane".to_string(), "van der Berg".to_string())
        );
        assert_eq!(
            split_display_name("Jane"),
            ("Jane".to_string(), String::new())
        );
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.2"));
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
