//! User-agent parsing and best-effort IP geolocation.

/// Parsed device descriptor with a friendly display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub kind: String,
    pub browser: String,
    pub os: String,
    pub name: String,
}

/// Pattern-match a raw user-agent against known device, browser, and OS
/// markers. Order matters: Edge ships a `chrome` token and Chrome ships
/// a `safari` token, so the specific checks come first.
#[must_use]
pub fn parse_user_agent(user_agent: &str) -> DeviceInfo {
    let ua = user_agent.to_lowercase();

    let kind = if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        "mobile"
    } else if ua.contains("tablet") || ua.contains("ipad") {
        "tablet"
    } else {
        "desktop"
    };

    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("firefox") {
        "Firefox"
    } else if ua.contains("chrome") {
        "Chrome"
    } else if ua.contains("safari") {
        "Safari"
    } else if ua.contains("opera") {
        "Opera"
    } else {
        "unknown"
    };

    let os = if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("ios") || ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else {
        "unknown"
    };

    DeviceInfo {
        kind: kind.to_string(),
        browser: browser.to_string(),
        os: os.to_string(),
        name: format!("{browser} on {os}"),
    }
}

/// Best-effort location for a client IP.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

/// Geolocation is a stub boundary, not a hard dependency: all-null fields
/// are a valid answer and sessions store them as such.
pub async fn lookup_location(_ip_address: &str) -> GeoLocation {
    GeoLocation::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    #[test]
    fn chrome_on_windows_desktop() {
        let device = parse_user_agent(CHROME_WINDOWS);
        assert_eq!(device.kind, "desktop");
        assert_eq!(device.browser, "Chrome");
        assert_eq!(device.os, "Windows");
        assert_eq!(device.name, "Chrome on Windows");
    }

    #[test]
    fn edge_wins_over_its_chrome_token() {
        let device = parse_user_agent(EDGE_WINDOWS);
        assert_eq!(device.browser, "Edge");
        assert_eq!(device.name, "Edge on Windows");
    }

    #[test]
    fn iphone_is_mobile_safari() {
        let device = parse_user_agent(SAFARI_IPHONE);
        assert_eq!(device.kind, "mobile");
        assert_eq!(device.browser, "Safari");
        assert_eq!(device.os, "iOS");
    }

    #[test]
    fn firefox_on_linux() {
        let device = parse_user_agent(FIREFOX_LINUX);
        assert_eq!(device.kind, "desktop");
        assert_eq!(device.browser, "Firefox");
        assert_eq!(device.os, "Linux");
    }

    #[test]
    fn ipad_is_a_tablet() {
        let device = parse_user_agent("Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X)");
        assert_eq!(device.kind, "tablet");
        assert_eq!(device.os, "iOS");
    }

    #[test]
    fn empty_user_agent_is_unknown() {
        let device = parse_user_agent("");
        assert_eq!(device.kind, "desktop");
        assert_eq!(device.browser, "unknown");
        assert_eq!(device.os, "unknown");
        assert_eq!(device.name, "unknown on unknown");
    }

    #[tokio::test]
    async fn location_lookup_is_a_stub() {
        assert_eq!(lookup_location("203.0.113.7").await, GeoLocation::default());
    }
}
