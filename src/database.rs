//! Load-once fingerprint catalogs and detection rules.
//!
//! Three JSON documents feed the analyzer: a JA3 hash catalog, a JA4 prefix
//! catalog, and an HTTP/2 Akamai-string catalog with impersonator detection
//! rules. They are read once at startup from a `data/` directory resolved
//! relative to the executable, then the working directory, then known
//! fallbacks. A missing or unparseable file disables that class of lookups
//! with a single warning; it never fails startup.
//!
//! The database is immutable after load; all queries take the shared side of
//! the lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

// ============================================================================
// JA3 catalog
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Ja3Database {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub fingerprints: Ja3Buckets,
}

#[derive(Debug, Default, Deserialize)]
pub struct Ja3Buckets {
    #[serde(default)]
    pub browsers: HashMap<String, Ja3Entry>,
    #[serde(default)]
    pub libraries: HashMap<String, Ja3Entry>,
    #[serde(default)]
    pub bots: HashMap<String, Ja3Entry>,
    #[serde(default)]
    pub malware: HashMap<String, Ja3Entry>,
    #[serde(default)]
    pub mobile: HashMap<String, Ja3Entry>,
    #[serde(default)]
    pub apps: HashMap<String, Ja3Entry>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Ja3Entry {
    pub name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sample_count: u64,
}

// ============================================================================
// JA4 catalog
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Ja4Database {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub prefixes: HashMap<String, Ja4PrefixEntry>,
    #[serde(default)]
    pub known_fingerprints: HashMap<String, Ja4KnownEntry>,
    #[serde(default)]
    pub analysis_rules: Ja4AnalysisRules,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Ja4PrefixEntry {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub client_type: String,
    #[serde(default)]
    pub risk: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Ja4KnownEntry {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Ja4AnalysisRules {
    #[serde(default)]
    pub alpn_indicators: HashMap<String, String>,
    #[serde(default)]
    pub cipher_count_ranges: HashMap<String, CountRange>,
    #[serde(default)]
    pub extension_count_ranges: HashMap<String, CountRange>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CountRange {
    #[serde(default)]
    pub min: u32,
    #[serde(default)]
    pub max: u32,
    #[serde(default)]
    pub typical_client: String,
}

// ============================================================================
// HTTP/2 catalog
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Http2Database {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub fingerprints: Http2Buckets,
    #[serde(default)]
    pub detection_rules: Http2DetectionRules,
}

#[derive(Debug, Default, Deserialize)]
pub struct Http2Buckets {
    #[serde(default)]
    pub browsers: HashMap<String, Http2Entry>,
    #[serde(default)]
    pub impersonators: HashMap<String, Http2Entry>,
    #[serde(default)]
    pub libraries: HashMap<String, Http2Entry>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Http2Entry {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub detection: String,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Http2DetectionRules {
    #[serde(default)]
    pub impersonator_signals: Vec<ImpersonatorSignal>,
    #[serde(default)]
    pub browser_signatures: HashMap<String, BrowserSignature>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ImpersonatorSignal {
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub applies_to: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BrowserSignature {
    #[serde(default)]
    pub window_update: u32,
    #[serde(default)]
    pub pseudo_header_order: String,
    #[serde(default)]
    pub initial_window_size: u32,
    #[serde(default)]
    pub has_priority: bool,
}

// ============================================================================
// Combined database
// ============================================================================

#[derive(Default)]
struct Catalogs {
    ja3: Option<Ja3Database>,
    ja4: Option<Ja4Database>,
    http2: Option<Http2Database>,
}

/// All loaded catalogs behind a shared lock. Read-only after construction.
#[derive(Default)]
pub struct FingerprintDatabase {
    inner: RwLock<Catalogs>,
}

impl FingerprintDatabase {
    /// Load every catalog the data directory provides. Degradation is per
    /// catalog and logged once.
    pub fn load() -> Self {
        let data_dir = find_data_dir();
        debug!(dir = %data_dir.display(), "loading fingerprint databases");

        let ja3 = load_catalog::<Ja3Database>(&data_dir.join("ja3_fingerprints.json"), "JA3");
        if let Some(db) = &ja3 {
            debug!(
                browsers = db.fingerprints.browsers.len(),
                libraries = db.fingerprints.libraries.len(),
                malware = db.fingerprints.malware.len(),
                "loaded JA3 database"
            );
        }

        let ja4 = load_catalog::<Ja4Database>(&data_dir.join("ja4_fingerprints.json"), "JA4");
        if let Some(db) = &ja4 {
            debug!(
                prefixes = db.prefixes.len(),
                known = db.known_fingerprints.len(),
                "loaded JA4 database"
            );
        }

        let http2 = load_catalog::<Http2Database>(&data_dir.join("http2_fingerprints.json"), "HTTP/2");
        if let Some(db) = &http2 {
            debug!(
                browsers = db.fingerprints.browsers.len(),
                impersonators = db.fingerprints.impersonators.len(),
                "loaded HTTP/2 database"
            );
        }

        Self {
            inner: RwLock::new(Catalogs { ja3, ja4, http2 }),
        }
    }

    /// Build a database from already-parsed catalogs. Used by tests and by
    /// anything embedding the analyzer without on-disk data files.
    pub fn from_parts(
        ja3: Option<Ja3Database>,
        ja4: Option<Ja4Database>,
        http2: Option<Http2Database>,
    ) -> Self {
        Self {
            inner: RwLock::new(Catalogs { ja3, ja4, http2 }),
        }
    }

    /// Look up a JA3 hash. Categories are searched in a fixed order:
    /// browsers, libraries, bots, malware, mobile, apps. Returns the display
    /// name and the category slug.
    pub fn lookup_ja3(&self, hash: &str) -> Option<(String, String)> {
        let guard = self.inner.read();
        let db = guard.ja3.as_ref()?;
        let buckets = &db.fingerprints;

        if let Some(entry) = buckets.browsers.get(hash) {
            let mut name = entry.name.clone();
            if !entry.platform.is_empty() {
                name.push_str(&format!(" ({})", entry.platform));
            }
            if !entry.version.is_empty() {
                name.push_str(&format!(" {}", entry.version));
            }
            return Some((name, "browser".to_string()));
        }
        if let Some(entry) = buckets.libraries.get(hash) {
            return Some((entry.name.clone(), "library".to_string()));
        }
        if let Some(entry) = buckets.bots.get(hash) {
            return Some((entry.name.clone(), "bot".to_string()));
        }
        if let Some(entry) = buckets.malware.get(hash) {
            return Some((format!("{} (Malware)", entry.name), "malware".to_string()));
        }
        if let Some(entry) = buckets.mobile.get(hash) {
            return Some((entry.name.clone(), "mobile".to_string()));
        }
        if let Some(entry) = buckets.apps.get(hash) {
            return Some((entry.name.clone(), "app".to_string()));
        }
        None
    }

    /// Describe a JA4 fingerprint by its 4-character prefix.
    pub fn ja4_prefix_info(&self, ja4: &str) -> Option<Ja4PrefixEntry> {
        if ja4.len() < 4 {
            return None;
        }
        let guard = self.inner.read();
        guard.ja4.as_ref()?.prefixes.get(&ja4[..4]).cloned()
    }

    /// Exact Akamai-string lookup. Returns `(name, is_impersonator,
    /// detection_note)`.
    pub fn lookup_http2(&self, akamai: &str) -> Option<(String, bool, String)> {
        let guard = self.inner.read();
        let db = guard.http2.as_ref()?;
        let buckets = &db.fingerprints;

        if let Some(entry) = buckets.browsers.get(akamai) {
            let mut name = entry.name.clone();
            if !entry.version.is_empty() {
                name.push_str(&format!(" {}", entry.version));
            }
            return Some((name, false, String::new()));
        }
        if let Some(entry) = buckets.impersonators.get(akamai) {
            return Some((entry.name.clone(), true, entry.detection.clone()));
        }
        if let Some(entry) = buckets.libraries.get(akamai) {
            return Some((entry.name.clone(), false, String::new()));
        }
        None
    }

    /// Reference signature for a browser family (lowercase key).
    pub fn browser_signature(&self, browser: &str) -> Option<BrowserSignature> {
        let guard = self.inner.read();
        guard
            .http2
            .as_ref()?
            .detection_rules
            .browser_signatures
            .get(&browser.to_ascii_lowercase())
            .cloned()
    }

    /// HTTP/2 impersonator rule set over the Akamai fingerprint.
    ///
    /// SETTINGS, WINDOW_UPDATE and pseudo-header order must all come from
    /// the same browser; mixtures and truncations accumulate signals, and
    /// three or more signals is a verdict.
    pub fn impersonator_rules(&self, akamai: &str, pseudo_order: &str) -> (bool, Vec<String>) {
        let guard = self.inner.read();
        if guard.http2.is_none() {
            return (false, Vec::new());
        }

        let parts: Vec<&str> = akamai.split('|').collect();
        if parts.len() < 4 {
            return (false, Vec::new());
        }
        let settings = parts[0];
        let window_update = parts[1];
        let pseudo = if pseudo_order.is_empty() {
            parts[3]
        } else {
            pseudo_order
        };

        // Reference profiles:
        //   Chrome : SETTINGS 1:65536;2:0;4:6291456;6:262144  WU 15663105  pseudo m,a,s,p
        //   Firefox: SETTINGS 1:65536;4:131072;5:16384        WU 12517377  pseudo m,p,a,s
        //   Safari : SETTINGS 2:0;3:100;4:2097152;9:1         WU 10420225  pseudo m,s,a | m,s,p,a
        let chrome_settings = settings.contains("4:6291456") && settings.contains("6:262144");
        let chrome_wu = window_update == "15663105";
        let safari_settings = settings.starts_with("2:0") && settings.contains("9:1");
        let safari_wu = window_update == "10420225";
        let firefox_settings = settings.contains("4:131072") && settings.contains("5:16384");
        let firefox_wu = window_update == "12517377";

        let mut signals = 0;
        let mut reasons = Vec::new();

        // R1: Chrome SETTINGS + Chrome WU, but pseudo order is off.
        if chrome_settings && chrome_wu && !pseudo.is_empty() && pseudo != "m,a,s,p" {
            signals += 3;
            reasons.push(format!(
                "Chrome SETTINGS+WU but pseudo_header_order='{pseudo}' (expected 'm,a,s,p') - likely curl-impersonate"
            ));
        }

        // R2: Chrome SETTINGS with a foreign, non-zero WU.
        if chrome_settings && !chrome_wu && window_update != "0" {
            signals += 1;
            reasons.push(format!(
                "Chrome-like SETTINGS but WINDOW_UPDATE={window_update} (Chrome uses 15663105)"
            ));
        }

        // R3: Safari SETTINGS + Safari WU, wrong pseudo order.
        if safari_settings && safari_wu && !pseudo.is_empty() && pseudo != "m,s,a" && pseudo != "m,s,p,a"
        {
            signals += 3;
            reasons.push(format!(
                "Safari SETTINGS+WU but pseudo_header_order='{pseudo}' (expected 'm,s,a' or 'm,s,p,a')"
            ));
        }

        // R4: Firefox SETTINGS + Firefox WU, wrong pseudo order.
        if firefox_settings && firefox_wu && !pseudo.is_empty() && pseudo != "m,p,a,s" {
            signals += 3;
            reasons.push(format!(
                "Firefox SETTINGS+WU but pseudo_header_order='{pseudo}' (expected 'm,p,a,s')"
            ));
        }

        // R5: the curl-impersonate signature itself: Chrome SETTINGS with a
        // pseudo order that lost ':path'.
        if chrome_settings && pseudo == "m,a,s" {
            signals += 2;
            reasons.push(
                "curl-impersonate signature: Chrome SETTINGS with pseudo='m,a,s' (missing ':path')"
                    .to_string(),
            );
        }

        // R6/R7: SETTINGS and WU from different browsers.
        if chrome_settings && safari_wu {
            signals += 2;
            reasons.push("Mixed fingerprint: Chrome SETTINGS with Safari WINDOW_UPDATE".to_string());
        }
        if safari_settings && chrome_wu {
            signals += 2;
            reasons.push("Mixed fingerprint: Safari SETTINGS with Chrome WINDOW_UPDATE".to_string());
        }

        (signals >= 3, reasons)
    }

    pub fn has_ja3(&self) -> bool {
        self.inner.read().ja3.is_some()
    }

    pub fn has_ja4(&self) -> bool {
        self.inner.read().ja4.is_some()
    }

    pub fn has_http2(&self) -> bool {
        self.inner.read().http2.is_some()
    }
}

fn load_catalog<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Option<T> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "{what} fingerprint database not found; lookups disabled"
            );
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to parse {what} fingerprint database; lookups disabled"
            );
            None
        }
    }
}

/// Resolve the data directory: next to the executable, then the working
/// directory, then relative fallbacks.
fn find_data_dir() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("data");
            if candidate.is_dir() {
                return candidate;
            }
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join("data");
        if candidate.is_dir() {
            return candidate;
        }
    }
    for fallback in ["./data", "../data"] {
        let candidate = PathBuf::from(fallback);
        if candidate.is_dir() {
            return candidate;
        }
    }
    PathBuf::from("./data")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> FingerprintDatabase {
        let ja3: Ja3Database = serde_json::from_value(serde_json::json!({
            "fingerprints": {
                "browsers": {
                    "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa": {
                        "name": "Chrome", "platform": "Windows", "version": "131"
                    }
                },
                "libraries": {
                    "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb": { "name": "python-requests" }
                },
                "malware": {
                    "cccccccccccccccccccccccccccccccc": { "name": "TrickBot" }
                }
            }
        }))
        .unwrap();

        let ja4: Ja4Database = serde_json::from_value(serde_json::json!({
            "prefixes": {
                "t13d": {
                    "description": "TLS 1.3 with domain SNI (Browser)",
                    "client_type": "browser",
                    "risk": "low"
                }
            }
        }))
        .unwrap();

        let http2: Http2Database = serde_json::from_value(serde_json::json!({
            "fingerprints": {
                "browsers": {
                    "1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s,p": {
                        "name": "Chrome", "version": "120+"
                    }
                },
                "impersonators": {},
                "libraries": {}
            },
            "detection_rules": {
                "browser_signatures": {
                    "chrome": { "window_update": 15663105, "pseudo_header_order": "m,a,s,p" }
                }
            }
        }))
        .unwrap();

        FingerprintDatabase::from_parts(Some(ja3), Some(ja4), Some(http2))
    }

    #[test]
    fn ja3_search_order_and_decoration() {
        let db = test_db();
        let (name, category) = db.lookup_ja3("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(name, "Chrome (Windows) 131");
        assert_eq!(category, "browser");

        let (name, category) = db.lookup_ja3("cccccccccccccccccccccccccccccccc").unwrap();
        assert_eq!(name, "TrickBot (Malware)");
        assert_eq!(category, "malware");

        assert!(db.lookup_ja3("0000000000000000000000000000dead").is_none());
    }

    #[test]
    fn ja4_prefix_lookup() {
        let db = test_db();
        let entry = db.ja4_prefix_info("t13d1516h2_aaaa_bbbb").unwrap();
        assert_eq!(entry.client_type, "browser");
        assert!(db.ja4_prefix_info("t12").is_none()); // too short
        assert!(db.ja4_prefix_info("q13d1516h2").is_none());
    }

    #[test]
    fn http2_exact_match() {
        let db = test_db();
        let (name, imp, _) = db
            .lookup_http2("1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s,p")
            .unwrap();
        assert_eq!(name, "Chrome 120+");
        assert!(!imp);
    }

    #[test]
    fn browser_signature_lookup_is_case_insensitive() {
        let db = test_db();
        let sig = db.browser_signature("Chrome").unwrap();
        assert_eq!(sig.window_update, 15_663_105);
        assert_eq!(sig.pseudo_header_order, "m,a,s,p");
    }

    #[test]
    fn rule_r1_chrome_settings_wrong_pseudo() {
        let db = test_db();
        let (imp, reasons) = db.impersonator_rules(
            "1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s",
            "m,a,s",
        );
        assert!(imp); // R1 (+3) and R5 (+2)
        assert!(reasons.iter().any(|r| r.contains("expected 'm,a,s,p'")));
        assert!(reasons.iter().any(|r| r.contains("missing ':path'")));
    }

    #[test]
    fn rule_r2_alone_is_not_a_verdict() {
        let db = test_db();
        let (imp, reasons) = db.impersonator_rules(
            "1:65536;2:0;4:6291456;6:262144|12345|0|m,a,s,p",
            "m,a,s,p",
        );
        assert!(!imp);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("WINDOW_UPDATE=12345"));
    }

    #[test]
    fn rule_r4_firefox_mismatch() {
        let db = test_db();
        let (imp, reasons) =
            db.impersonator_rules("1:65536;4:131072;5:16384|12517377|0|m,a,s,p", "m,a,s,p");
        assert!(imp);
        assert!(reasons[0].contains("expected 'm,p,a,s'"));
    }

    #[test]
    fn rule_r6_mixed_chrome_safari() {
        let db = test_db();
        let (imp, reasons) = db.impersonator_rules(
            "1:65536;2:0;4:6291456;6:262144|10420225|0|m,a,s,p",
            "m,a,s,p",
        );
        // R2 (+1, foreign WU) + R6 (+2, Safari WU) = 3 signals.
        assert!(imp);
        assert!(reasons.iter().any(|r| r.contains("Safari WINDOW_UPDATE")));
    }

    #[test]
    fn genuine_chrome_triggers_nothing() {
        let db = test_db();
        let (imp, reasons) = db.impersonator_rules(
            "1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s,p",
            "m,a,s,p",
        );
        assert!(!imp);
        assert!(reasons.is_empty());
    }

    #[test]
    fn missing_http2_catalog_disables_rules() {
        let db = FingerprintDatabase::from_parts(None, None, None);
        let (imp, reasons) = db.impersonator_rules(
            "1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s",
            "m,a,s",
        );
        assert!(!imp);
        assert!(reasons.is_empty());
        assert!(db.lookup_ja3("aaaa").is_none());
        assert!(!db.has_http2());
    }

    #[test]
    fn malformed_akamai_string_is_ignored() {
        let db = test_db();
        let (imp, reasons) = db.impersonator_rules("not-an-akamai-string", "");
        assert!(!imp);
        assert!(reasons.is_empty());
    }
}
