//! HTTP/2 connection-preface interception and Akamai-style fingerprinting.
//!
//! After the TLS handshake negotiates `h2`, the client's first frames carry a
//! stable fingerprint: the SETTINGS pairs it announces, the connection-level
//! WINDOW_UPDATE increment, any PRIORITY frames, and the order of the
//! pseudo-headers in its first HEADERS frame. Those four signals joined with
//! `|` form the Akamai fingerprint string.
//!
//! The interceptor parses at most [`MAX_FRAMES`] frames, then still serves
//! the request: server SETTINGS, SETTINGS ACK, and a HEADERS + DATA response
//! on the client's stream.
//!
//! HPACK state is connection-scoped: every connection gets a fresh decoder
//! with the standard 4096-byte dynamic table, never shared.

use hpack::{Decoder, Encoder};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// The 24-byte HTTP/2 connection preface. Its absence is a hard error.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Upper bound on frames inspected before the fingerprint is frozen.
const MAX_FRAMES: usize = 50;

// Frame types (RFC 7540 §6)
pub const FRAME_DATA: u8 = 0x0;
pub const FRAME_HEADERS: u8 = 0x1;
pub const FRAME_PRIORITY: u8 = 0x2;
pub const FRAME_RST_STREAM: u8 = 0x3;
pub const FRAME_SETTINGS: u8 = 0x4;
pub const FRAME_PUSH_PROMISE: u8 = 0x5;
pub const FRAME_PING: u8 = 0x6;
pub const FRAME_GOAWAY: u8 = 0x7;
pub const FRAME_WINDOW_UPDATE: u8 = 0x8;
pub const FRAME_CONTINUATION: u8 = 0x9;

const FLAG_ACK: u8 = 0x1;
const FLAG_END_STREAM: u8 = 0x1;
const FLAG_END_HEADERS: u8 = 0x4;
const FLAG_PADDED: u8 = 0x8;
const FLAG_PRIORITY: u8 = 0x20;

/// One SETTINGS pair in wire order.
#[derive(Debug, Clone, Serialize)]
pub struct SettingParam {
    pub id: u16,
    pub name: String,
    pub value: u32,
}

/// One PRIORITY frame.
#[derive(Debug, Clone, Serialize)]
pub struct PriorityInfo {
    pub stream_id: u32,
    pub exclusive: u8,
    pub depends_on: u32,
    pub weight: u8,
}

/// HTTP/2-layer fingerprint for one connection.
#[derive(Debug, Clone, Serialize)]
pub struct Http2Fingerprint {
    /// `SETTINGS|WINDOW_UPDATE|PRIORITY|pseudo_order`
    pub akamai: String,
    /// First 32 hex chars of SHA-256 over the Akamai string.
    pub akamai_hash: String,
    pub settings: Vec<SettingParam>,
    /// First connection-level WINDOW_UPDATE increment; 0 if none observed.
    pub window_update: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<PriorityInfo>,
    /// Transmission order of `:method`/`:authority`/`:scheme`/`:path` as
    /// comma-joined first letters. A missing letter is itself a signal.
    pub pseudo_header_order: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frame_order: Vec<String>,
}

/// The first request extracted from a HEADERS frame.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub stream_id: u32,
    pub path: String,
    pub user_agent: String,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            stream_id: 1,
            path: "/".to_string(),
            user_agent: String::new(),
        }
    }
}

struct FrameHeader {
    length: usize,
    frame_type: u8,
    flags: u8,
    stream_id: u32,
}

fn parse_frame_header(data: &[u8]) -> Option<FrameHeader> {
    if data.len() < 9 {
        return None;
    }
    Some(FrameHeader {
        length: (usize::from(data[0]) << 16) | (usize::from(data[1]) << 8) | usize::from(data[2]),
        frame_type: data[3],
        flags: data[4],
        stream_id: u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7fff_ffff,
    })
}

/// True when `data` starts with the HTTP/2 connection preface.
pub fn is_preface(data: &[u8]) -> bool {
    data.len() >= PREFACE.len() && &data[..PREFACE.len()] == PREFACE
}

/// Per-connection frame interceptor. Owns the connection's HPACK decoder so
/// a HEADERS frame arriving in a later read still decodes against the right
/// dynamic table.
pub struct FrameInterceptor {
    decoder: Decoder<'static>,
}

impl Default for FrameInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameInterceptor {
    pub fn new() -> Self {
        Self {
            decoder: Decoder::new(),
        }
    }

    /// Walk the client's initial frames (after the preface) and build the
    /// fingerprint. Returns the request too when a HEADERS frame was already
    /// present in this read.
    pub fn parse_initial(&mut self, data: &[u8]) -> (Http2Fingerprint, Option<RequestInfo>) {
        let mut fp = Http2Fingerprint {
            akamai: String::new(),
            akamai_hash: String::new(),
            settings: Vec::new(),
            window_update: 0,
            priorities: Vec::new(),
            pseudo_header_order: String::new(),
            frame_order: Vec::new(),
        };
        let mut request = None;

        let mut pos = 0;
        let mut frame_count = 0;
        while frame_count < MAX_FRAMES {
            let Some(header) = parse_frame_header(&data[pos.min(data.len())..]) else {
                break;
            };
            let payload_start = pos + 9;
            let payload_end = payload_start + header.length;
            if payload_end > data.len() {
                break;
            }
            let payload = &data[payload_start..payload_end];

            fp.frame_order.push(frame_type_name(header.frame_type));

            match header.frame_type {
                FRAME_SETTINGS if header.flags & FLAG_ACK == 0 => {
                    for entry in payload.chunks_exact(6) {
                        let id = u16::from_be_bytes([entry[0], entry[1]]);
                        let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
                        fp.settings.push(SettingParam {
                            id,
                            name: setting_name(id),
                            value,
                        });
                    }
                }
                FRAME_WINDOW_UPDATE if header.stream_id == 0 => {
                    if fp.window_update == 0 && payload.len() >= 4 {
                        fp.window_update =
                            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                                & 0x7fff_ffff;
                    }
                }
                FRAME_PRIORITY => {
                    if payload.len() >= 5 {
                        let dep = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                        fp.priorities.push(PriorityInfo {
                            stream_id: header.stream_id,
                            exclusive: ((dep >> 31) & 1) as u8,
                            depends_on: dep & 0x7fff_ffff,
                            weight: payload[4],
                        });
                    }
                }
                FRAME_HEADERS => {
                    if let Some(block) = header_block(payload, header.flags) {
                        let (order, req) = self.decode_headers(block, header.stream_id);
                        if fp.pseudo_header_order.is_empty() {
                            fp.pseudo_header_order = order;
                        }
                        if request.is_none() {
                            request = Some(req);
                        }
                    }
                }
                _ => {}
            }

            pos = payload_end;
            frame_count += 1;
        }

        fp.akamai = build_akamai(&fp);
        let mut hasher = Sha256::new();
        hasher.update(fp.akamai.as_bytes());
        fp.akamai_hash = hex::encode(hasher.finalize())[..32].to_string();

        (fp, request)
    }

    /// Scan a later read for the first HEADERS frame (the client usually
    /// sends its request only after seeing the server SETTINGS).
    pub fn find_request(&mut self, data: &[u8]) -> Option<RequestInfo> {
        let mut pos = 0;
        while let Some(header) = parse_frame_header(&data[pos.min(data.len())..]) {
            let payload_start = pos + 9;
            let payload_end = payload_start + header.length;
            if payload_end > data.len() {
                break;
            }
            if header.frame_type == FRAME_HEADERS {
                let payload = &data[payload_start..payload_end];
                if let Some(block) = header_block(payload, header.flags) {
                    let (_, req) = self.decode_headers(block, header.stream_id);
                    return Some(req);
                }
            }
            pos = payload_end;
        }
        None
    }

    /// HPACK-decode a header block, recording pseudo-header emission order
    /// and pulling out the request path and User-Agent.
    fn decode_headers(&mut self, block: &[u8], stream_id: u32) -> (String, RequestInfo) {
        let mut req = RequestInfo {
            stream_id,
            ..RequestInfo::default()
        };
        let mut order: Vec<&str> = Vec::new();

        let headers = match self.decoder.decode(block) {
            Ok(headers) => headers,
            Err(_) => return (String::new(), req),
        };

        for (name, value) in &headers {
            match name.as_slice() {
                b":method" => push_unique(&mut order, "m"),
                b":authority" => push_unique(&mut order, "a"),
                b":scheme" => push_unique(&mut order, "s"),
                b":path" => {
                    push_unique(&mut order, "p");
                    if let Ok(path) = std::str::from_utf8(value) {
                        req.path = path.to_string();
                    }
                }
                b"user-agent" => {
                    if let Ok(ua) = std::str::from_utf8(value) {
                        req.user_agent = ua.to_string();
                    }
                }
                _ => {}
            }
        }

        (order.join(","), req)
    }
}

fn push_unique<'a>(order: &mut Vec<&'a str>, letter: &'a str) {
    if !order.contains(&letter) {
        order.push(letter);
    }
}

/// Strip PADDED / PRIORITY prologue from a HEADERS payload.
fn header_block(payload: &[u8], flags: u8) -> Option<&[u8]> {
    let mut start = 0;
    let mut pad = 0;
    if flags & FLAG_PADDED != 0 {
        pad = *payload.first()? as usize;
        start = 1;
    }
    if flags & FLAG_PRIORITY != 0 {
        start += 5;
    }
    let end = payload.len().checked_sub(pad)?;
    payload.get(start..end)
}

/// `SETTINGS|WINDOW_UPDATE|PRIORITY|pseudo_order` — SETTINGS sorted ascending
/// by ID, empty sections written as `0` (priority) or the Chrome-order
/// fallback (pseudo headers).
fn build_akamai(fp: &Http2Fingerprint) -> String {
    let mut sorted = fp.settings.clone();
    sorted.sort_by_key(|s| s.id);
    let settings = sorted
        .iter()
        .map(|s| format!("{}:{}", s.id, s.value))
        .collect::<Vec<_>>()
        .join(";");

    let priority = if fp.priorities.is_empty() {
        "0".to_string()
    } else {
        fp.priorities
            .iter()
            .map(|p| format!("{}:{}:{}:{}", p.stream_id, p.exclusive, p.depends_on, p.weight))
            .collect::<Vec<_>>()
            .join(",")
    };

    let pseudo = if fp.pseudo_header_order.is_empty() {
        "m,a,s,p"
    } else {
        fp.pseudo_header_order.as_str()
    };

    format!("{}|{}|{}|{}", settings, fp.window_update, priority, pseudo)
}

pub fn frame_type_name(t: u8) -> String {
    match t {
        FRAME_DATA => "DATA".to_string(),
        FRAME_HEADERS => "HEADERS".to_string(),
        FRAME_PRIORITY => "PRIORITY".to_string(),
        FRAME_RST_STREAM => "RST_STREAM".to_string(),
        FRAME_SETTINGS => "SETTINGS".to_string(),
        FRAME_PUSH_PROMISE => "PUSH_PROMISE".to_string(),
        FRAME_PING => "PING".to_string(),
        FRAME_GOAWAY => "GOAWAY".to_string(),
        FRAME_WINDOW_UPDATE => "WINDOW_UPDATE".to_string(),
        FRAME_CONTINUATION => "CONTINUATION".to_string(),
        other => format!("UNKNOWN({other})"),
    }
}

pub fn setting_name(id: u16) -> String {
    match id {
        0x1 => "HEADER_TABLE_SIZE".to_string(),
        0x2 => "ENABLE_PUSH".to_string(),
        0x3 => "MAX_CONCURRENT_STREAMS".to_string(),
        0x4 => "INITIAL_WINDOW_SIZE".to_string(),
        0x5 => "MAX_FRAME_SIZE".to_string(),
        0x6 => "MAX_HEADER_LIST_SIZE".to_string(),
        other => format!("UNKNOWN({other})"),
    }
}

// ============================================================================
// Response-side frame builders
// ============================================================================

fn frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + payload.len());
    out.push((payload.len() >> 16) as u8);
    out.push((payload.len() >> 8) as u8);
    out.push(payload.len() as u8);
    out.push(frame_type);
    out.push(flags);
    out.extend_from_slice(&stream_id.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Server SETTINGS: MAX_CONCURRENT_STREAMS=100, INITIAL_WINDOW_SIZE=65535.
pub fn build_server_settings_frame() -> Vec<u8> {
    let payload: &[u8] = &[
        0x00, 0x03, 0x00, 0x00, 0x00, 0x64, // MAX_CONCURRENT_STREAMS = 100
        0x00, 0x04, 0x00, 0x00, 0xff, 0xff, // INITIAL_WINDOW_SIZE = 65535
    ];
    frame(FRAME_SETTINGS, 0, 0, payload)
}

/// ACK for the client's SETTINGS frame.
pub fn build_settings_ack_frame() -> Vec<u8> {
    frame(FRAME_SETTINGS, FLAG_ACK, 0, &[])
}

/// HEADERS response: `:status 200`, JSON content type, permissive CORS.
pub fn build_response_headers_frame(stream_id: u32) -> Vec<u8> {
    let mut encoder = Encoder::new();
    let headers: Vec<(&[u8], &[u8])> = vec![
        (b":status", b"200"),
        (b"content-type", b"application/json"),
        (b"access-control-allow-origin", b"*"),
    ];
    let block = encoder.encode(headers);
    frame(FRAME_HEADERS, FLAG_END_HEADERS, stream_id, &block)
}

/// DATA response carrying the JSON body, END_STREAM set.
pub fn build_data_frame(stream_id: u32, body: &[u8]) -> Vec<u8> {
    frame(FRAME_DATA, FLAG_END_STREAM, stream_id, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_frame(pairs: &[(u16, u32)]) -> Vec<u8> {
        let mut payload = Vec::new();
        for (id, value) in pairs {
            payload.extend_from_slice(&id.to_be_bytes());
            payload.extend_from_slice(&value.to_be_bytes());
        }
        frame(FRAME_SETTINGS, 0, 0, &payload)
    }

    fn window_update_frame(stream_id: u32, increment: u32) -> Vec<u8> {
        frame(FRAME_WINDOW_UPDATE, 0, stream_id, &increment.to_be_bytes())
    }

    fn headers_frame(stream_id: u32, headers: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut encoder = Encoder::new();
        let block = encoder.encode(headers.iter().copied());
        frame(FRAME_HEADERS, FLAG_END_HEADERS, stream_id, &block)
    }

    #[test]
    fn preface_check() {
        assert!(is_preface(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\nxxxx"));
        assert!(!is_preface(b"GET / HTTP/1.1\r\n"));
        assert!(!is_preface(b"PRI * HTTP/2"));
    }

    #[test]
    fn akamai_settings_sorted_ascending() {
        let mut data = settings_frame(&[(4, 6_291_456), (1, 65_536), (6, 262_144), (2, 0)]);
        data.extend_from_slice(&window_update_frame(0, 15_663_105));
        let (fp, _) = FrameInterceptor::new().parse_initial(&data);
        // Wire order preserved in the raw list...
        assert_eq!(fp.settings[0].id, 4);
        // ...but sorted in the Akamai string.
        assert!(fp.akamai.starts_with("1:65536;2:0;4:6291456;6:262144|15663105|"));
        assert_eq!(fp.akamai.split('|').count(), 4);
    }

    #[test]
    fn akamai_hash_is_32_hex() {
        let data = settings_frame(&[(1, 65_536)]);
        let (fp, _) = FrameInterceptor::new().parse_initial(&data);
        assert_eq!(fp.akamai_hash.len(), 32);
        assert!(fp.akamai_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn window_update_keeps_first_connection_level_value() {
        let mut data = window_update_frame(0, 15_663_105);
        data.extend_from_slice(&window_update_frame(0, 999));
        data.extend_from_slice(&window_update_frame(3, 777)); // stream-level, ignored
        let (fp, _) = FrameInterceptor::new().parse_initial(&data);
        assert_eq!(fp.window_update, 15_663_105);
    }

    #[test]
    fn priority_frames_recorded() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(0x8000_0000u32 | 0).to_be_bytes()); // exclusive, dep 0
        payload.push(200); // weight
        let data = frame(FRAME_PRIORITY, 0, 3, &payload);
        let (fp, _) = FrameInterceptor::new().parse_initial(&data);
        assert_eq!(fp.priorities.len(), 1);
        assert_eq!(fp.priorities[0].stream_id, 3);
        assert_eq!(fp.priorities[0].exclusive, 1);
        assert_eq!(fp.priorities[0].weight, 200);
        assert!(fp.akamai.contains("|3:1:0:200|"));
    }

    #[test]
    fn pseudo_header_order_from_hpack() {
        let data = headers_frame(
            1,
            &[
                (b":method", b"GET"),
                (b":authority", b"localhost"),
                (b":scheme", b"https"),
                (b":path", b"/api/analysis"),
                (b"user-agent", b"test-agent"),
            ],
        );
        let (fp, req) = FrameInterceptor::new().parse_initial(&data);
        assert_eq!(fp.pseudo_header_order, "m,a,s,p");
        let req = req.unwrap();
        assert_eq!(req.path, "/api/analysis");
        assert_eq!(req.user_agent, "test-agent");
        assert_eq!(req.stream_id, 1);
    }

    #[test]
    fn missing_path_shows_in_pseudo_order() {
        let data = headers_frame(
            1,
            &[(b":method", b"GET"), (b":authority", b"x"), (b":scheme", b"https")],
        );
        let (fp, _) = FrameInterceptor::new().parse_initial(&data);
        assert_eq!(fp.pseudo_header_order, "m,a,s");
        assert!(fp.akamai.ends_with("|m,a,s"));
    }

    #[test]
    fn no_headers_falls_back_to_chrome_order() {
        let data = settings_frame(&[(1, 65_536)]);
        let (fp, req) = FrameInterceptor::new().parse_initial(&data);
        assert!(fp.pseudo_header_order.is_empty());
        assert!(fp.akamai.ends_with("|m,a,s,p"));
        assert!(req.is_none());
    }

    #[test]
    fn empty_input_still_produces_four_parts() {
        let (fp, _) = FrameInterceptor::new().parse_initial(&[]);
        assert_eq!(fp.akamai, "|0|0|m,a,s,p");
        assert_eq!(fp.akamai.split('|').count(), 4);
    }

    #[test]
    fn truncated_frame_is_ignored() {
        let mut data = settings_frame(&[(1, 65_536)]);
        // Header claims 64 payload bytes that never arrive.
        data.extend_from_slice(&[0x00, 0x00, 0x40, FRAME_SETTINGS, 0, 0, 0, 0, 0]);
        let (fp, _) = FrameInterceptor::new().parse_initial(&data);
        assert_eq!(fp.settings.len(), 1);
    }

    #[test]
    fn request_found_in_second_read() {
        let mut interceptor = FrameInterceptor::new();
        let initial = settings_frame(&[(1, 65_536)]);
        let (_, req) = interceptor.parse_initial(&initial);
        assert!(req.is_none());

        let followup = headers_frame(5, &[(b":method", b"GET"), (b":path", b"/api/fingerprint")]);
        let req = interceptor.find_request(&followup).unwrap();
        assert_eq!(req.stream_id, 5);
        assert_eq!(req.path, "/api/fingerprint");
    }

    #[test]
    fn settings_ack_not_recorded() {
        let mut data = frame(FRAME_SETTINGS, FLAG_ACK, 0, &[]);
        data.extend_from_slice(&settings_frame(&[(4, 131_072)]));
        let (fp, _) = FrameInterceptor::new().parse_initial(&data);
        assert_eq!(fp.settings.len(), 1);
        assert_eq!(fp.settings[0].id, 4);
    }

    #[test]
    fn server_frame_builders() {
        let settings = build_server_settings_frame();
        assert_eq!(settings[3], FRAME_SETTINGS);
        assert_eq!(settings.len(), 9 + 12);

        let ack = build_settings_ack_frame();
        assert_eq!(ack[4], FLAG_ACK);
        assert_eq!(ack.len(), 9);

        let data = build_data_frame(1, b"{}");
        assert_eq!(data[3], FRAME_DATA);
        assert_eq!(data[4], FLAG_END_STREAM);
        assert_eq!(&data[9..], b"{}");

        let headers = build_response_headers_frame(1);
        assert_eq!(headers[3], FRAME_HEADERS);
        assert_eq!(headers[4], FLAG_END_HEADERS);
        // Decodes back to :status 200 plus the two fixed headers.
        let mut decoder = Decoder::new();
        let decoded = decoder.decode(&headers[9..]).unwrap();
        assert_eq!(decoded[0].0, b":status");
        assert_eq!(decoded[0].1, b"200");
        assert_eq!(decoded.len(), 3);
    }
}
