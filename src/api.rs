//! Query endpoints shared by the HTTP/1.1 and HTTP/2 paths.
//!
//! Both protocol handlers funnel into the same routing: `/api/fingerprint`
//! returns the stored [`CombinedFingerprint`](crate::store::CombinedFingerprint)
//! for the caller's IP, `/api/analysis` runs the analyzer on it, `/api/all`
//! dumps the store, and `/` serves a minimal HTML status page.
//!
//! Lookups use the bare client IP so HTTP/2 keep-alive reuse across source
//! ports still resolves. A missing entry is answered with HTTP 200 and an
//! `error` field to keep browser callers simple.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::analyzer::{analyze, build_simple_result};
use crate::database::FingerprintDatabase;
use crate::store::FingerprintStore;

/// Shared handles the endpoints need: the fingerprint store and the loaded
/// catalogs.
#[derive(Clone)]
pub struct AppContext {
    pub store: FingerprintStore,
    pub database: Arc<FingerprintDatabase>,
}

/// A routed response body with its content type.
pub enum Routed {
    Json(Vec<u8>),
    Html(Vec<u8>),
    NotFound(Vec<u8>),
}

const STATUS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>wirelens</title>
    <style>
        body { font-family: -apple-system, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; background: #f5f5f5; }
        h1 { color: #333; }
        a { color: #0066cc; }
    </style>
</head>
<body>
    <h1>wirelens</h1>
    <p>Your TLS fingerprint has been captured.</p>
    <ul>
        <li><a href="/api/fingerprint">/api/fingerprint</a> - raw TLS/HTTP2/TCP fingerprint</li>
        <li><a href="/api/analysis">/api/analysis</a> - cross-layer analysis and verdict</li>
        <li><a href="/api/all">/api/all</a> - all stored fingerprints</li>
    </ul>
</body>
</html>"#;

/// Route a request path (with optional query string) to a response body.
pub fn route(path_and_query: &str, user_agent: &str, peer: SocketAddr, ctx: &AppContext) -> Routed {
    let path = path_and_query
        .split('?')
        .next()
        .unwrap_or(path_and_query);
    let include_details = path_and_query.contains("details=true");

    match path {
        "/" | "/index.html" => Routed::Html(STATUS_PAGE.as_bytes().to_vec()),
        "/api/fingerprint" => Routed::Json(fingerprint_body(peer, ctx)),
        "/api/analysis" => Routed::Json(analysis_body(peer, user_agent, include_details, ctx)),
        "/api/all" => {
            let snapshot = ctx.store.snapshot();
            Routed::Json(to_pretty_json(&snapshot))
        }
        _ => Routed::NotFound(b"Not Found".to_vec()),
    }
}

/// HTTP/2 routing: the interceptor's responder always answers with JSON, so
/// unknown paths fall back to the fingerprint body.
pub fn route_h2(
    path_and_query: &str,
    user_agent: &str,
    peer: SocketAddr,
    ctx: &AppContext,
) -> Vec<u8> {
    let path = path_and_query
        .split('?')
        .next()
        .unwrap_or(path_and_query);
    let include_details = path_and_query.contains("details=true");

    match path {
        "/api/analysis" => analysis_body(peer, user_agent, include_details, ctx),
        "/api/all" => to_pretty_json(&ctx.store.snapshot()),
        _ => fingerprint_body(peer, ctx),
    }
}

fn fingerprint_body(peer: SocketAddr, ctx: &AppContext) -> Vec<u8> {
    let ip = peer.ip().to_string();
    match ctx.store.lookup_ip(&ip) {
        Some(fp) => to_pretty_json(&json!({
            "success": true,
            "client_ip": ip,
            "fingerprint": &*fp,
        })),
        None => to_pretty_json(&json!({
            "success": false,
            "error": "No fingerprint found",
        })),
    }
}

fn analysis_body(
    peer: SocketAddr,
    user_agent: &str,
    include_details: bool,
    ctx: &AppContext,
) -> Vec<u8> {
    let ip = peer.ip().to_string();
    match ctx.store.lookup_ip(&ip) {
        Some(fp) => {
            let analysis = analyze(&fp, &ip, user_agent, &ctx.database);
            let simple = build_simple_result(&analysis, user_agent, include_details);
            to_pretty_json(&simple)
        }
        None => to_pretty_json(&json!({
            "risk_score": 0,
            "risk_level": "unknown",
            "is_bot": false,
            "is_spoofed": false,
            "client": {
                "type": "unknown",
                "claimed": "Unknown",
                "detected": "Unknown",
                "match": false,
            },
            "error": "No fingerprint found. Visit this page in a browser first.",
        })),
    }
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec_pretty(value).unwrap_or_else(|_| b"{}".to_vec())
}

/// Serve one HTTP/1.1 connection over the already-established TLS stream.
pub async fn serve_http1<S>(stream: S, peer: SocketAddr, ctx: AppContext) -> crate::error::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let ctx = ctx.clone();
        async move {
            let user_agent = req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let path_and_query = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());

            let (status, content_type, body) =
                match route(&path_and_query, &user_agent, peer, &ctx) {
                    Routed::Json(body) => {
                        (StatusCode::OK, "application/json; charset=utf-8", body)
                    }
                    Routed::Html(body) => (StatusCode::OK, "text/html; charset=utf-8", body),
                    Routed::NotFound(body) => (StatusCode::NOT_FOUND, "text/plain", body),
                };

            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
            Ok::<_, Infallible>(response)
        }
    });

    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .serve_connection(io, service)
        .await
    {
        debug!(peer = %peer, error = %e, "HTTP/1.1 connection ended with error");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CombinedFingerprint;
    use crate::tls_parser::parse_client_hello;

    fn ctx_with_entry(peer: SocketAddr) -> AppContext {
        let ctx = AppContext {
            store: FingerprintStore::new(),
            database: Arc::new(FingerprintDatabase::from_parts(None, None, None)),
        };
        let mut hello: Vec<u8> = vec![0x16, 0x03, 0x01, 0x00, 0x2d];
        hello.extend_from_slice(&[0x01, 0x00, 0x00, 0x29, 0x03, 0x03]);
        hello.extend_from_slice(&[0u8; 32]);
        hello.push(0x00);
        hello.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]);
        hello.extend_from_slice(&[0x01, 0x00]);
        ctx.store.insert(
            peer,
            CombinedFingerprint {
                tls: parse_client_hello(&hello).unwrap(),
                http2: None,
                tcp: None,
            },
        );
        ctx
    }

    #[test]
    fn analysis_without_entry_reports_unknown() {
        let ctx = AppContext {
            store: FingerprintStore::new(),
            database: Arc::new(FingerprintDatabase::from_parts(None, None, None)),
        };
        let peer: SocketAddr = "203.0.113.10:443".parse().unwrap();
        let Routed::Json(body) = route("/api/analysis", "", peer, &ctx) else {
            panic!("expected JSON");
        };
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["risk_score"], 0);
        assert_eq!(parsed["risk_level"], "unknown");
        assert!(parsed["error"].as_str().unwrap().contains("No fingerprint found"));
    }

    #[test]
    fn fingerprint_roundtrip() {
        let peer: SocketAddr = "203.0.113.10:50001".parse().unwrap();
        let ctx = ctx_with_entry(peer);
        // Different source port, same IP: still found.
        let other: SocketAddr = "203.0.113.10:60002".parse().unwrap();
        let Routed::Json(body) = route("/api/fingerprint", "", other, &ctx) else {
            panic!("expected JSON");
        };
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["client_ip"], "203.0.113.10");
        assert!(parsed["fingerprint"]["tls"]["ja3_hash"].is_string());
    }

    #[test]
    fn analysis_details_flag() {
        let peer: SocketAddr = "203.0.113.10:50001".parse().unwrap();
        let ctx = ctx_with_entry(peer);
        let Routed::Json(body) = route("/api/analysis?details=true", "curl/8.5.0", peer, &ctx)
        else {
            panic!("expected JSON");
        };
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["details"].is_object());
        assert!(parsed["details"]["consistency_check"]["score"].is_number());

        let Routed::Json(body) = route("/api/analysis", "curl/8.5.0", peer, &ctx) else {
            panic!("expected JSON");
        };
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed.get("details").is_none());
    }

    #[test]
    fn unknown_path_is_not_found_on_http1_but_fingerprint_on_h2() {
        let peer: SocketAddr = "203.0.113.10:50001".parse().unwrap();
        let ctx = ctx_with_entry(peer);
        assert!(matches!(
            route("/nope", "", peer, &ctx),
            Routed::NotFound(_)
        ));
        let body = route_h2("/nope", "", peer, &ctx);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["success"], true);
    }

    #[test]
    fn status_page_lists_endpoints() {
        let peer: SocketAddr = "203.0.113.10:50001".parse().unwrap();
        let ctx = ctx_with_entry(peer);
        let Routed::Html(body) = route("/", "", peer, &ctx) else {
            panic!("expected HTML");
        };
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains("/api/fingerprint"));
        assert!(html.contains("/api/analysis"));
    }
}
