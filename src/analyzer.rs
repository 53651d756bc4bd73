//! Cross-layer fingerprint analysis.
//!
//! [`analyze`] is a pure function: the same combined fingerprint, client IP,
//! User-Agent and loaded database always produce the same result. It infers
//! the client type from TLS-layer patterns, runs the HTTP/2 impersonator
//! rules, checks every layer against every other layer (and against what the
//! User-Agent claims), and folds the outcome into a risk verdict with advice
//! for both sides of the detection game.

use serde::Serialize;

use crate::capture::TcpFingerprint;
use crate::database::FingerprintDatabase;
use crate::http2::Http2Fingerprint;
use crate::store::CombinedFingerprint;
use crate::tls_parser::TlsFingerprint;
use crate::useragent::{is_library_user_agent, parse_user_agent, ParsedUserAgent};

// ============================================================================
// Result types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub summary: AnalysisSummary,
    pub tls_analysis: TlsAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http2_analysis: Option<Http2Analysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_analysis: Option<TcpAnalysis>,
    pub consistency_check: ConsistencyAnalysis,
    pub security_advice: SecurityAdvice,
    pub raw_fingerprint: CombinedFingerprint,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisSummary {
    pub risk_level: String,
    pub uniqueness: String,
    pub detected_client: String,
    pub detected_os: String,
    pub is_bot: bool,
    pub is_spoofed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TlsAnalysis {
    pub protocol: String,
    pub client_type: String,
    pub client_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_version: String,
    pub ja3_popularity: String,
    pub ja4_popularity: String,
    pub cipher_strength: String,
    pub observations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Http2Analysis {
    pub detected: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_match: String,
    pub is_impersonator: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub impersonator_type: String,
    pub observations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TcpAnalysis {
    pub detected: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub inferred_os: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub os_confidence: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ttl_analysis: String,
    pub observations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyAnalysis {
    pub passed: bool,
    pub score: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<String>,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SecurityAdvice {
    pub overall_risk: String,
    pub for_defenders: Vec<AdviceItem>,
    pub for_pentesters: Vec<AdviceItem>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdviceItem {
    pub category: String,
    pub title: String,
    pub description: String,
    pub priority: String,
}

impl AdviceItem {
    fn new(category: &str, title: &str, description: String, priority: &str) -> Self {
        Self {
            category: category.to_string(),
            title: title.to_string(),
            description,
            priority: priority.to_string(),
        }
    }
}

// ============================================================================
// Simple (default) analysis response
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SimpleAnalysisResult {
    pub risk_score: i32,
    pub risk_level: String,
    pub is_bot: bool,
    pub is_spoofed: bool,
    pub client: SimpleClient,
    pub fingerprints: SimpleFingerprints,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<AnalysisResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleClient {
    #[serde(rename = "type")]
    pub kind: String,
    pub claimed: String,
    pub detected: String,
    #[serde(rename = "match")]
    pub matches: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleFingerprints {
    pub ja3: String,
    pub ja4: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_os: Option<String>,
}

// ============================================================================
// Entry point
// ============================================================================

/// Analyze one combined fingerprint against the loaded catalogs.
pub fn analyze(
    fp: &CombinedFingerprint,
    _client_ip: &str,
    user_agent: &str,
    db: &FingerprintDatabase,
) -> AnalysisResult {
    let ua = parse_user_agent(user_agent);

    let (tls_analysis, mut warnings) = analyze_tls(&fp.tls, user_agent, db);
    let http2_analysis = fp.http2.as_ref().map(|h2| analyze_http2(h2, db));
    let tcp_analysis = fp.tcp.as_ref().map(analyze_tcp);

    let consistency = analyze_consistency(fp, &tls_analysis, http2_analysis.as_ref(), &ua);

    let summary = build_summary(
        &tls_analysis,
        http2_analysis.as_ref(),
        tcp_analysis.as_ref(),
        &consistency,
        &fp.tls,
        &ua,
        user_agent,
        &mut warnings,
    );

    let advice = build_advice(&summary, &tls_analysis, http2_analysis.as_ref(), tcp_analysis.as_ref(), &consistency, &fp.tls);

    AnalysisResult {
        summary,
        tls_analysis,
        http2_analysis,
        tcp_analysis,
        consistency_check: consistency,
        security_advice: advice,
        raw_fingerprint: fp.clone(),
    }
}

// ============================================================================
// TLS layer
// ============================================================================

fn analyze_tls(
    tls: &TlsFingerprint,
    user_agent: &str,
    db: &FingerprintDatabase,
) -> (TlsAnalysis, Vec<String>) {
    let mut analysis = TlsAnalysis::default();
    let mut warnings = Vec::new();

    match tls.tls_version_negotiated.as_deref() {
        Some(v) if v.contains("1.3") => {
            analysis.protocol = "TLS 1.3".to_string();
            analysis
                .observations
                .push("Using modern TLS 1.3 - good security".to_string());
        }
        Some(v) if v.contains("1.2") => {
            analysis.protocol = "TLS 1.2".to_string();
            analysis
                .observations
                .push("Using TLS 1.2 - acceptable security".to_string());
        }
        Some(v) => {
            analysis.protocol = v.to_string();
            analysis
                .observations
                .push("Using older TLS version - potential security concern".to_string());
        }
        None => {
            analysis.protocol = "Unknown".to_string();
        }
    }

    match db.lookup_ja3(&tls.ja3_hash) {
        Some((name, category)) => {
            analysis.ja3_popularity = "Known".to_string();
            analysis
                .observations
                .push(format!("JA3 matches known client: {name}"));
            if category == "malware" {
                warnings.push(format!("JA3 matches known malware: {name}"));
            }
            analysis.client_name = name;
        }
        None => {
            analysis.ja3_popularity = "Unknown".to_string();
            analysis.observations.push(
                "JA3 hash not in common client database - could be modified or uncommon client"
                    .to_string(),
            );
        }
    }

    match db.ja4_prefix_info(&tls.ja4) {
        Some(entry) => {
            if !entry.risk.is_empty() {
                analysis
                    .observations
                    .push(format!("JA4 prefix class: {} ({} risk)", entry.description, entry.risk));
            }
            analysis.ja4_popularity = entry.description;
        }
        None => analysis.ja4_popularity = "Unknown".to_string(),
    }

    analysis.client_type = classify_client_type(tls, user_agent);
    analysis.cipher_strength = cipher_strength(&tls.ciphers);

    if tls.alpn.is_empty() {
        analysis
            .observations
            .push("No ALPN extension - unusual for modern browsers".to_string());
    }
    if tls.sni.is_empty() {
        analysis.observations.push(
            "No SNI (Server Name Indication) - often indicates non-browser client or IP-direct access"
                .to_string(),
        );
    }
    if tls.cipher_ids.len() < 10 {
        analysis
            .observations
            .push("Few cipher suites offered - possibly a limited or custom client".to_string());
    } else if tls.cipher_ids.len() > 30 {
        analysis
            .observations
            .push("Many cipher suites offered - typical of browsers".to_string());
    }

    (analysis, warnings)
}

/// Browser-only extensions: their presence is a strong browser signal.
const BROWSER_ONLY_EXTENSIONS: &[u16] = &[
    65037, // encrypted_client_hello
    17513, // application_settings
    27,    // compress_certificate
];

/// Pattern-based client classification. Scores browser-ish and library-ish
/// traits independently; the verdict needs a clear margin, otherwise it is
/// hedged with `(likely)`.
fn classify_client_type(tls: &TlsFingerprint, user_agent: &str) -> String {
    if !user_agent.is_empty() && is_library_user_agent(user_agent) {
        return "Library".to_string();
    }

    let mut browser = 0i32;
    let mut library = 0i32;

    let cipher_count = tls.cipher_ids.len();
    if cipher_count >= 20 {
        browser += 2;
    } else if cipher_count >= 15 {
        browser += 1;
    } else if cipher_count < 10 {
        library += 2;
    }

    let ext_count = tls.extension_ids.len();
    if ext_count >= 12 {
        browser += 2;
    } else if ext_count >= 8 {
        browser += 1;
    } else if ext_count < 6 {
        library += 2;
    }

    if tls.grease_observed {
        browser += 3;
    }

    let has_h2 = tls.alpn.iter().any(|p| p == "h2");
    let has_h1 = tls.alpn.iter().any(|p| p == "http/1.1");
    if has_h2 && has_h1 {
        browser += 2;
    } else if has_h2 {
        browser += 1;
    } else if tls.alpn.is_empty() {
        library += 2;
    }

    if tls.sni.is_empty() {
        library += 2;
    } else {
        browser += 1;
    }

    if tls
        .extension_ids
        .iter()
        .any(|id| BROWSER_ONLY_EXTENSIONS.contains(id))
    {
        browser += 2;
    }

    let version_count = tls.supported_versions.len();
    if version_count >= 4 {
        browser += 1;
    } else if version_count <= 2 {
        library += 1;
    }

    let sig_count = tls.signature_algorithm_ids.len();
    if sig_count >= 10 {
        browser += 1;
    } else if sig_count < 5 {
        library += 1;
    }

    if browser >= library + 3 {
        "Browser".to_string()
    } else if library >= browser + 2 {
        "Library".to_string()
    } else if browser > library {
        "Browser (likely)".to_string()
    } else if library > browser {
        "Library (likely)".to_string()
    } else {
        "Unknown".to_string()
    }
}

fn cipher_strength(cipher_names: &[String]) -> String {
    let mut has_weak = false;
    let mut has_strong = false;
    for name in cipher_names {
        let lower = name.to_ascii_lowercase();
        if lower.contains("rc4")
            || lower.contains("des")
            || lower.contains("export")
            || lower.contains("null")
        {
            has_weak = true;
        }
        if lower.contains("aes_256") || lower.contains("chacha20") || lower.contains("gcm") {
            has_strong = true;
        }
    }
    if has_weak {
        "Weak".to_string()
    } else if has_strong {
        "Strong".to_string()
    } else {
        "Medium".to_string()
    }
}

// ============================================================================
// HTTP/2 layer
// ============================================================================

fn analyze_http2(h2: &Http2Fingerprint, db: &FingerprintDatabase) -> Http2Analysis {
    let mut analysis = Http2Analysis {
        detected: true,
        ..Http2Analysis::default()
    };

    let mut exact_impersonator = false;
    match db.lookup_http2(&h2.akamai) {
        Some((name, is_impersonator, detection)) => {
            analysis
                .observations
                .push(format!("HTTP/2 fingerprint matches {name}"));
            if is_impersonator {
                exact_impersonator = true;
                if !detection.is_empty() {
                    analysis.observations.push(detection);
                }
            }
            analysis.client_match = name;
        }
        None => {
            analysis
                .observations
                .push("HTTP/2 fingerprint doesn't match common browsers".to_string());
        }
    }

    let (rules_verdict, reasons) = db.impersonator_rules(&h2.akamai, &h2.pseudo_header_order);

    if rules_verdict || exact_impersonator {
        analysis.is_impersonator = true;
        analysis.impersonator_type = "curl-impersonate/curl_cffi".to_string();
        analysis.observations.push(format!(
            "Detected as browser impersonator ({} rule signals)",
            reasons.len()
        ));
        analysis.observations.extend(reasons);
    } else if !reasons.is_empty() {
        analysis.observations.push(format!(
            "Possible impersonator ({} signal): {}",
            reasons.len(),
            reasons.join(", ")
        ));
    }

    analysis
}

// ============================================================================
// TCP layer
// ============================================================================

fn analyze_tcp(tcp: &TcpFingerprint) -> TcpAnalysis {
    let mut analysis = TcpAnalysis {
        detected: true,
        inferred_os: tcp.inferred_os.clone(),
        os_confidence: tcp.os_confidence.clone(),
        ..TcpAnalysis::default()
    };

    if tcp.ttl > 0 {
        analysis.ttl_analysis = format!(
            "Observed TTL: {}, Initial TTL estimate: {}",
            tcp.ttl, tcp.initial_ttl
        );
        match tcp.initial_ttl {
            64 => analysis
                .observations
                .push("TTL suggests Linux/macOS/Unix system".to_string()),
            128 => analysis
                .observations
                .push("TTL suggests Windows system".to_string()),
            255 => analysis
                .observations
                .push("TTL suggests network device or specialized system".to_string()),
            _ => {}
        }
    }

    if !tcp.anomalies.is_empty() {
        analysis.observations.push(format!(
            "Detected {} anomalies in TCP fingerprint",
            tcp.anomalies.len()
        ));
        for anomaly in &tcp.anomalies {
            analysis.observations.push(format!("  - {anomaly}"));
        }
    }

    if !tcp.options_str.is_empty() {
        analysis
            .observations
            .push(format!("TCP options pattern: {}", tcp.options_str));
    }

    if let Some(ts) = &tcp.timestamp {
        if !ts.uptime.is_empty() {
            analysis
                .observations
                .push(format!("Estimated system uptime: {}", ts.uptime));
        }
    }

    analysis
}

// ============================================================================
// Cross-layer consistency
// ============================================================================

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

/// Edge ships Chromium's TLS and HTTP/2 stack; a Chrome-flavored fingerprint
/// under an Edge UA is expected, not an anomaly.
fn edge_uses_chrome(ua_browser: &str, detected: &str) -> bool {
    ua_browser.eq_ignore_ascii_case("edge") && contains_ci(detected, "chrome")
}

/// OS mismatch matrix between the UA claim and the TCP-inferred OS. Only the
/// combinations listed here count as mismatches; everything else (including
/// low-information inferences) passes.
fn os_mismatch(ua_os: &str, inferred: &str) -> bool {
    let inferred = inferred.to_ascii_lowercase();
    match ua_os.to_ascii_lowercase().as_str() {
        "windows" => {
            inferred.contains("linux")
                || inferred.contains("macos")
                || inferred.contains("ios")
                || inferred.contains("android")
        }
        "macos" => inferred.contains("linux") || inferred.contains("windows"),
        "linux" => inferred.contains("macos") || inferred.contains("windows"),
        "ios" => inferred.contains("windows") || inferred.contains("linux"),
        "android" => {
            !(inferred.contains("linux") || inferred.contains("android") || inferred.contains("unix"))
                && (inferred.contains("windows") || inferred.contains("macos"))
        }
        _ => false,
    }
}

fn analyze_consistency(
    fp: &CombinedFingerprint,
    tls_analysis: &TlsAnalysis,
    http2_analysis: Option<&Http2Analysis>,
    ua: &ParsedUserAgent,
) -> ConsistencyAnalysis {
    let mut check = ConsistencyAnalysis {
        passed: false,
        score: 100,
        anomalies: Vec::new(),
        details: Vec::new(),
    };

    let tls_client = tls_analysis.client_name.as_str();
    let h2_client = http2_analysis.map(|a| a.client_match.as_str()).unwrap_or("");

    // UA browser vs TLS-identified client.
    if let Some(browser) = &ua.browser {
        if !tls_client.is_empty()
            && !contains_ci(tls_client, browser)
            && !edge_uses_chrome(browser, tls_client)
        {
            check.anomalies.push(format!(
                "User-Agent claims {browser} but TLS fingerprint indicates {tls_client}"
            ));
            check.score -= 25;
        }
    }

    // UA browser vs HTTP/2-identified client.
    if let Some(browser) = &ua.browser {
        if !h2_client.is_empty()
            && !contains_ci(h2_client, browser)
            && !edge_uses_chrome(browser, h2_client)
        {
            check.anomalies.push(format!(
                "User-Agent claims {browser} but HTTP/2 fingerprint matches {h2_client}"
            ));
            check.score -= 20;
        }
    }

    // TLS-identified client vs HTTP/2-identified client.
    if !tls_client.is_empty() && !h2_client.is_empty() {
        if !contains_ci(tls_client, h2_client) && !contains_ci(h2_client, tls_client) {
            check.anomalies.push(format!(
                "TLS suggests {tls_client} but HTTP/2 suggests {h2_client}"
            ));
            check.score -= 20;
        } else {
            check
                .details
                .push("TLS and HTTP/2 fingerprints are consistent".to_string());
        }
    }

    // HTTP/2 impersonator verdict.
    if let Some(h2) = http2_analysis {
        if h2.is_impersonator {
            check.score -= 30;
            let reasons: Vec<&String> = h2
                .observations
                .iter()
                .filter(|o| {
                    o.contains("pseudo_header_order")
                        || o.contains("WINDOW_UPDATE")
                        || o.contains("Mixed fingerprint")
                        || o.contains("missing ':path'")
                })
                .collect();
            if reasons.is_empty() {
                check
                    .anomalies
                    .push("HTTP/2 fingerprint matches known impersonator".to_string());
            } else {
                for reason in reasons {
                    check.anomalies.push(reason.clone());
                }
            }
        }
    }

    // UA OS vs TCP-inferred OS.
    if let (Some(ua_os), Some(tcp)) = (&ua.os, &fp.tcp) {
        if os_mismatch(ua_os, &tcp.inferred_os) {
            check.anomalies.push(format!(
                "UA claims {ua_os} but TCP fingerprint suggests {}",
                tcp.inferred_os
            ));
            check.score -= 35;
        }
    }

    // Anomaly tags from the capture layer.
    if let Some(tcp) = &fp.tcp {
        for anomaly in &tcp.anomalies {
            check.anomalies.push(anomaly.clone());
            check.score -= 10;
        }
    }

    // UA claims a browser but the TLS stack scores as a library.
    if ua.browser.is_some() && tls_analysis.client_type.starts_with("Library") {
        check.anomalies.push(
            "User-Agent claims a browser but the TLS stack looks like an HTTP library".to_string(),
        );
        check.score -= 25;
    }

    // UA claims a mobile device but the SYN says Windows.
    if let Some(tcp) = &fp.tcp {
        if ua.is_mobile && tcp.initial_ttl == 128 {
            check.anomalies.push(
                "User-Agent claims a mobile device but TCP initial TTL 128 suggests Windows"
                    .to_string(),
            );
            check.score -= 20;
        }
    }

    check.score = check.score.clamp(0, 100);
    check.passed = check.anomalies.is_empty();
    if check.passed {
        check.details.push("All cross-layer checks passed".to_string());
    }

    check
}

// ============================================================================
// Summary and risk
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn build_summary(
    tls_analysis: &TlsAnalysis,
    http2_analysis: Option<&Http2Analysis>,
    tcp_analysis: Option<&TcpAnalysis>,
    consistency: &ConsistencyAnalysis,
    tls: &TlsFingerprint,
    ua: &ParsedUserAgent,
    user_agent: &str,
    warnings: &mut Vec<String>,
) -> AnalysisSummary {
    let mut summary = AnalysisSummary::default();

    let impersonator = http2_analysis.map(|a| a.is_impersonator).unwrap_or(false);

    summary.detected_client = if impersonator {
        let kind = http2_analysis
            .map(|a| a.impersonator_type.as_str())
            .unwrap_or("");
        format!("Impersonator ({kind})")
    } else if !tls_analysis.client_name.is_empty() {
        tls_analysis.client_name.clone()
    } else if let Some(browser) = &ua.browser {
        format!("{browser} (from UA, TLS unknown)")
    } else {
        "Unknown".to_string()
    };

    summary.detected_os = match tcp_analysis {
        Some(tcp) if !tcp.inferred_os.is_empty() && tcp.inferred_os != "Unknown" => {
            if tcp.os_confidence == "high" {
                format!("{} (high confidence)", tcp.inferred_os)
            } else {
                tcp.inferred_os.clone()
            }
        }
        _ => match &ua.os {
            Some(os) => format!("{os} (from UA only)"),
            None => "Unknown".to_string(),
        },
    };

    summary.uniqueness = if tls_analysis.ja3_popularity == "Known" {
        "common".to_string()
    } else {
        "uncommon".to_string()
    };

    let mut bot_signals = 0;
    if tls_analysis.client_type.starts_with("Library") || tls_analysis.client_type == "Bot" {
        bot_signals += 1;
    }
    if consistency.score < 70 {
        bot_signals += 1;
    }
    if tls.sni.is_empty() {
        bot_signals += 1;
    }
    if user_agent.is_empty() {
        bot_signals += 1;
    }
    if ua.is_bot_like {
        bot_signals += 1;
    }
    if impersonator {
        bot_signals += 2;
    }
    summary.is_bot = bot_signals >= 2;

    summary.is_spoofed = !consistency.anomalies.is_empty() || impersonator;

    summary.risk_level = if impersonator {
        if consistency.score >= 80 {
            "medium".to_string()
        } else {
            "high".to_string()
        }
    } else if consistency.score >= 90 && !summary.is_bot {
        "low".to_string()
    } else if summary.is_bot {
        "high".to_string()
    } else if consistency.score >= 60 {
        "medium".to_string()
    } else {
        "high".to_string()
    };

    if impersonator {
        let kind = http2_analysis
            .map(|a| a.impersonator_type.as_str())
            .unwrap_or("");
        warnings.push(format!("Browser impersonator detected: {kind}"));
    }
    if summary.is_bot {
        warnings.push("Client appears to be automated (bot/script)".to_string());
    }
    if summary.is_spoofed && !impersonator {
        warnings.push("Fingerprint inconsistencies detected - possible spoofing".to_string());
    }
    if tls_analysis.cipher_strength == "Weak" {
        warnings.push("Weak cipher suites detected".to_string());
    }

    summary.warnings = std::mem::take(warnings);
    summary
}

// ============================================================================
// Advice
// ============================================================================

fn build_advice(
    summary: &AnalysisSummary,
    tls_analysis: &TlsAnalysis,
    http2_analysis: Option<&Http2Analysis>,
    tcp_analysis: Option<&TcpAnalysis>,
    consistency: &ConsistencyAnalysis,
    tls: &TlsFingerprint,
) -> SecurityAdvice {
    let mut advice = SecurityAdvice {
        overall_risk: summary.risk_level.clone(),
        ..SecurityAdvice::default()
    };
    let impersonator = http2_analysis.map(|a| a.is_impersonator).unwrap_or(false);

    advice.for_defenders.push(AdviceItem::new(
        "Detection",
        "TLS Fingerprinting",
        format!(
            "This client's JA4 fingerprint is: {}. Use this for client identification.",
            tls.ja4
        ),
        "high",
    ));
    if summary.is_bot {
        advice.for_defenders.push(AdviceItem::new(
            "Bot Detection",
            "Likely Automated Client",
            "Multiple signals suggest this is an automated client. Consider blocking or challenging."
                .to_string(),
            "high",
        ));
    }
    if impersonator {
        let kind = http2_analysis
            .map(|a| a.impersonator_type.as_str())
            .unwrap_or("");
        advice.for_defenders.push(AdviceItem::new(
            "Impersonator Detection",
            &format!("Browser Impersonator: {kind}"),
            "This client is using a browser impersonation library (curl-impersonate, curl_cffi, \
             tls-client). The HTTP/2 fingerprint reveals impersonation artifacts."
                .to_string(),
            "critical",
        ));
    }
    if summary.is_spoofed && !impersonator {
        advice.for_defenders.push(AdviceItem::new(
            "Spoofing Detection",
            "Fingerprint Manipulation Detected",
            "Cross-layer analysis shows inconsistencies. This client may be trying to evade detection."
                .to_string(),
            "high",
        ));
    }
    if consistency.score < 100 {
        advice.for_defenders.push(AdviceItem::new(
            "Consistency",
            "Cross-Layer Verification",
            format!(
                "Consistency score: {}/100. Lower scores indicate potential manipulation.",
                consistency.score
            ),
            "medium",
        ));
    }

    advice.for_pentesters.push(AdviceItem::new(
        "Evasion",
        "Current Detection Risk",
        format!(
            "Your fingerprint has {} detection risk. Consistency score: {}/100.",
            summary.risk_level, consistency.score
        ),
        "high",
    ));
    if tls.sni.is_empty() {
        advice.for_pentesters.push(AdviceItem::new(
            "Improvement",
            "Add SNI",
            "Your client is not sending SNI. This is a common bot indicator. Configure your \
             client to send proper SNI."
                .to_string(),
            "high",
        ));
    }
    if tls_analysis.ja3_popularity == "Unknown" {
        advice.for_pentesters.push(AdviceItem::new(
            "Improvement",
            "TLS Fingerprint Stands Out",
            "Your JA3 hash is not common. Consider using a browser impersonation library like \
             'curl-impersonate' or 'tls-client'."
                .to_string(),
            "high",
        ));
    }
    if !consistency.anomalies.is_empty() {
        advice.for_pentesters.push(AdviceItem::new(
            "Improvement",
            "Fix Inconsistencies",
            format!(
                "Detected {} cross-layer anomalies. These can be used to detect your client.",
                consistency.anomalies.len()
            ),
            "high",
        ));
    }
    if impersonator {
        advice.for_pentesters.push(AdviceItem::new(
            "Warning",
            "Impersonator Detected via HTTP/2",
            "Your impersonation library is detected through the HTTP/2 fingerprint: the SETTINGS, \
             WINDOW_UPDATE and pseudo-header order do not agree on one browser."
                .to_string(),
            "critical",
        ));
        advice.for_pentesters.push(AdviceItem::new(
            "Recommendation",
            "Use Real Browser Instead",
            "For complete evasion, use Playwright/Puppeteer with stealth plugins, or a real \
             browser with automation. HTTP/2 frame-level fingerprints are hard to fake with \
             libraries."
                .to_string(),
            "high",
        ));
    }

    if summary.risk_level == "high" {
        advice
            .recommendations
            .push("High risk of detection - recommend improving fingerprint consistency".to_string());
    }
    if summary.is_bot {
        advice.recommendations.push(
            "Use browser automation tools (Playwright, Puppeteer) with stealth plugins for a \
             better fingerprint"
                .to_string(),
        );
    }
    if tcp_analysis.is_none() {
        advice.recommendations.push(
            "TCP/IP fingerprint not available - run the capture agent with elevated privileges \
             for complete analysis"
                .to_string(),
        );
    }
    if advice.recommendations.is_empty() {
        advice
            .recommendations
            .push("Fingerprint appears consistent and low-risk".to_string());
    }

    advice
}

// ============================================================================
// Simple result
// ============================================================================

/// Flatten an [`AnalysisResult`] into the default `/api/analysis` response
/// shape. `include_details` attaches the full result under `details`.
pub fn build_simple_result(
    analysis: &AnalysisResult,
    user_agent: &str,
    include_details: bool,
) -> SimpleAnalysisResult {
    let summary = &analysis.summary;
    let consistency = &analysis.consistency_check;
    let impersonator = analysis
        .http2_analysis
        .as_ref()
        .map(|a| a.is_impersonator)
        .unwrap_or(false);

    let mut risk_score = 100 - consistency.score;
    if impersonator {
        risk_score = risk_score.max(70);
    }
    if summary.is_bot {
        risk_score = risk_score.max(60);
    }
    let risk_score = risk_score.clamp(0, 100);

    let ua = parse_user_agent(user_agent);
    let claimed = ua.browser.clone().unwrap_or_else(|| "Unknown".to_string());
    let detected = summary.detected_client.clone();
    let matches = claimed != "Unknown"
        && (contains_ci(&detected, &claimed) || edge_uses_chrome(&claimed, &detected));

    let kind = if impersonator {
        "impersonator"
    } else if summary.is_bot {
        "bot"
    } else if analysis.tls_analysis.client_type.starts_with("Browser") {
        "browser"
    } else if analysis.tls_analysis.client_type.starts_with("Library") {
        "library"
    } else {
        "unknown"
    };

    let tls = &analysis.raw_fingerprint.tls;
    let tcp = analysis.raw_fingerprint.tcp.as_ref();
    let fingerprints = SimpleFingerprints {
        ja3: tls.ja3_hash.clone(),
        ja4: tls.ja4.clone(),
        http2: analysis
            .raw_fingerprint
            .http2
            .as_ref()
            .map(|h| h.akamai_hash.clone()),
        tcp: tcp.map(|t| format!("{}:{}:{}", t.initial_ttl, t.window_size, t.options_str)),
        tcp_os: tcp.map(|t| t.inferred_os.clone()),
    };

    SimpleAnalysisResult {
        risk_score,
        risk_level: summary.risk_level.clone(),
        is_bot: summary.is_bot,
        is_spoofed: summary.is_spoofed,
        client: SimpleClient {
            kind: kind.to_string(),
            claimed,
            detected,
            matches,
        },
        fingerprints,
        anomalies: if consistency.anomalies.is_empty() {
            None
        } else {
            Some(consistency.anomalies.clone())
        },
        details: if include_details {
            Some(analysis.clone())
        } else {
            None
        },
    }
}
