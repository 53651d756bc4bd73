//! User-Agent string classification.
//!
//! This is a deterministic matcher over ordered `(substring, label)` tables,
//! not a grammar. Order matters twice: `Edg/` must win over `Chrome/` (Edge
//! ships the Chrome token), and `android` must win over `linux` (Android UAs
//! carry both).

/// Result of matching a User-Agent string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUserAgent {
    /// Browser family, e.g. `Chrome`, `Firefox`, `Edge`.
    pub browser: Option<String>,
    /// Major version parsed from the token after the browser marker.
    pub browser_version: Option<String>,
    /// Operating system family, e.g. `Windows`, `macOS`, `Android`.
    pub os: Option<String>,
    /// Mobile form factor hint.
    pub is_mobile: bool,
    /// The UA self-identifies as an HTTP library, bot or crawler.
    pub is_bot_like: bool,
}

/// Browser markers in priority order. Derivative browsers embed the Chrome
/// token, so they must be listed before it; every Chrome-family UA also
/// embeds `Safari/`, so Safari comes last.
const BROWSER_MARKERS: &[(&str, &str)] = &[
    ("edg/", "Edge"),
    ("edga/", "Edge"),
    ("edgios/", "Edge"),
    ("opr/", "Opera"),
    ("samsungbrowser/", "Samsung Internet"),
    ("firefox/", "Firefox"),
    ("fxios/", "Firefox"),
    ("crios/", "Chrome"),
    ("chrome/", "Chrome"),
    ("version/", "Safari"),
    ("safari/", "Safari"),
];

/// OS markers in priority order. `iphone`/`ipad` before the macOS tokens
/// (iOS UAs say "like Mac OS X"), `android` before `linux`.
const OS_MARKERS: &[(&str, &str)] = &[
    ("windows", "Windows"),
    ("iphone", "iOS"),
    ("ipad", "iOS"),
    ("android", "Android"),
    ("cros", "ChromeOS"),
    ("macintosh", "macOS"),
    ("mac os x", "macOS"),
    ("linux", "Linux"),
];

/// Tokens that mark an HTTP library or crawler regardless of anything else
/// the UA claims.
const LIBRARY_TOKENS: &[&str] = &[
    "python",
    "curl",
    "go-http",
    "node",
    "java",
    "urllib",
    "axios",
    "requests",
    "httpx",
    "aiohttp",
    "scrapy",
    "wget",
    "okhttp",
    "libwww",
    "bot",
    "spider",
    "crawl",
];

/// Match a User-Agent string against the ordered marker tables.
pub fn parse_user_agent(ua: &str) -> ParsedUserAgent {
    let lower = ua.to_ascii_lowercase();
    let mut parsed = ParsedUserAgent::default();

    if lower.is_empty() {
        return parsed;
    }

    for (marker, name) in BROWSER_MARKERS {
        if let Some(idx) = lower.find(marker) {
            parsed.browser = Some((*name).to_string());
            let after = &ua[idx + marker.len()..];
            let version: String = after
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if !version.is_empty() {
                parsed.browser_version = Some(version);
            }
            break;
        }
    }

    for (marker, name) in OS_MARKERS {
        if lower.contains(marker) {
            parsed.os = Some((*name).to_string());
            break;
        }
    }

    parsed.is_mobile = lower.contains("mobile")
        || lower.contains("android")
        || lower.contains("iphone")
        || lower.contains("ipad");

    parsed.is_bot_like = LIBRARY_TOKENS.iter().any(|t| lower.contains(t));

    parsed
}

/// True when the UA contains one of the known HTTP library tokens. Used by
/// the analyzer for the immediate `Library` classification.
pub fn is_library_user_agent(ua: &str) -> bool {
    let lower = ua.to_ascii_lowercase();
    [
        "python", "curl", "go-http", "node", "java", "urllib", "axios", "requests", "httpx",
        "aiohttp", "scrapy",
    ]
    .iter()
    .any(|t| lower.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
    const EDGE_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";

    #[test]
    fn chrome_on_macos() {
        let parsed = parse_user_agent(CHROME_MAC);
        assert_eq!(parsed.browser.as_deref(), Some("Chrome"));
        assert_eq!(parsed.browser_version.as_deref(), Some("131.0.0.0"));
        assert_eq!(parsed.os.as_deref(), Some("macOS"));
        assert!(!parsed.is_mobile);
        assert!(!parsed.is_bot_like);
    }

    #[test]
    fn edge_wins_over_chrome_token() {
        let parsed = parse_user_agent(EDGE_WIN);
        assert_eq!(parsed.browser.as_deref(), Some("Edge"));
        assert_eq!(parsed.os.as_deref(), Some("Windows"));
    }

    #[test]
    fn android_wins_over_linux_token() {
        let parsed = parse_user_agent(
            "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) \
             Chrome/131.0.0.0 Mobile Safari/537.36",
        );
        assert_eq!(parsed.os.as_deref(), Some("Android"));
        assert!(parsed.is_mobile);
    }

    #[test]
    fn iphone_is_ios_not_macos() {
        let parsed = parse_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
        );
        assert_eq!(parsed.os.as_deref(), Some("iOS"));
        assert_eq!(parsed.browser.as_deref(), Some("Safari"));
        assert!(parsed.is_mobile);
    }

    #[test]
    fn python_requests_is_bot_like() {
        let parsed = parse_user_agent("python-requests/2.32.0");
        assert!(parsed.is_bot_like);
        assert!(parsed.browser.is_none());
        assert!(is_library_user_agent("python-requests/2.32.0"));
    }

    #[test]
    fn empty_ua_parses_to_default() {
        assert_eq!(parse_user_agent(""), ParsedUserAgent::default());
    }

    #[test]
    fn curl_is_library() {
        assert!(is_library_user_agent("curl/8.5.0"));
        assert!(!is_library_user_agent(CHROME_MAC));
    }
}
