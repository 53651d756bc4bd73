//! TLS ClientHello parsing and JA3/JA4 derivation.
//!
//! A single pass over the raw record produces a [`TlsFingerprint`]: the full
//! wire-order cipher and extension lists (GREASE values preserved for
//! display, stripped for hashing), the parsed payloads of the extensions the
//! analyzer cares about, and the canonical JA3 / JA4 / JA4_r strings.
//!
//! JA3 is order-sensitive and MD5-based; JA4 sorts its hash inputs and uses
//! truncated SHA-256. Both treat GREASE identically: excluded from every
//! hash input, kept in the raw lists.

use md5::{Digest, Md5};
use serde::Serialize;
use sha2::Sha256;

use crate::error::{Error, Result};

/// TLS handshake record content type.
const CONTENT_TYPE_HANDSHAKE: u8 = 22;
/// ClientHello handshake message type.
const HANDSHAKE_CLIENT_HELLO: u8 = 1;

/// A parsed extension, with payload detail for the types we dissect.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Complete TLS-layer fingerprint for one ClientHello.
#[derive(Debug, Clone, Serialize)]
pub struct TlsFingerprint {
    pub ja3: String,
    pub ja3_hash: String,
    pub ja4: String,
    pub ja4_r: String,

    pub tls_version_record: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_version_negotiated: Option<String>,
    pub client_random: String,
    pub session_id: String,

    /// Cipher suites in wire order, human names (GREASE labelled, not removed).
    pub ciphers: Vec<String>,
    pub ciphers_hex: Vec<String>,
    /// Extensions in wire order (GREASE preserved).
    pub extensions: Vec<ExtensionInfo>,
    pub extensions_hex: Vec<String>,
    pub supported_groups: Vec<String>,
    pub ec_point_formats: Vec<String>,
    pub signature_algorithms: Vec<String>,
    pub alpn: Vec<String>,
    pub supported_versions: Vec<String>,
    pub sni: String,
    pub compress_methods: Vec<u8>,
    /// Whether any GREASE value appeared in the cipher or extension lists.
    pub grease_observed: bool,

    // GREASE-stripped numeric lists: hashing and analysis inputs, not part
    // of the serialized fingerprint.
    #[serde(skip)]
    pub cipher_ids: Vec<u16>,
    #[serde(skip)]
    pub extension_ids: Vec<u16>,
    #[serde(skip)]
    pub supported_group_ids: Vec<u16>,
    #[serde(skip)]
    pub ec_point_format_ids: Vec<u8>,
    #[serde(skip)]
    pub signature_algorithm_ids: Vec<u16>,
    #[serde(skip)]
    pub supported_version_ids: Vec<u16>,
}

/// Check for a GREASE value: both bytes end in nibble `0xa` (0x0a0a, 0x1a1a,
/// ... 0xfafa).
pub fn is_grease(value: u16) -> bool {
    value & 0x0f0f == 0x0a0a
}

// ============================================================================
// Wire cursor
// ============================================================================

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::MalformedClientHello(format!("truncated {what}")))?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let bytes = self.bytes(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::MalformedClientHello(format!("truncated {what}")))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

// ============================================================================
// ClientHello parsing
// ============================================================================

/// Parse a single TLS ClientHello record into a [`TlsFingerprint`].
///
/// `data` is the first raw read off the socket. Any truncation or internal
/// length mismatch fails the whole parse; the caller drops the connection
/// without storing anything.
pub fn parse_client_hello(data: &[u8]) -> Result<TlsFingerprint> {
    if data.len() < 5 {
        return Err(Error::MalformedClientHello("record header too short".into()));
    }
    if data[0] != CONTENT_TYPE_HANDSHAKE {
        return Err(Error::MalformedClientHello(format!(
            "not a handshake record: content type {}",
            data[0]
        )));
    }

    let record_version = u16::from_be_bytes([data[1], data[2]]);
    let record_len = u16::from_be_bytes([data[3], data[4]]) as usize;
    let record = data
        .get(5..5 + record_len)
        .ok_or_else(|| Error::MalformedClientHello("incomplete record".into()))?;

    if record.len() < 4 {
        return Err(Error::MalformedClientHello("handshake header too short".into()));
    }
    if record[0] != HANDSHAKE_CLIENT_HELLO {
        return Err(Error::MalformedClientHello(format!(
            "not a ClientHello: handshake type {}",
            record[0]
        )));
    }
    let handshake_len =
        (usize::from(record[1]) << 16) | (usize::from(record[2]) << 8) | usize::from(record[3]);
    let body = record
        .get(4..4 + handshake_len)
        .ok_or_else(|| Error::MalformedClientHello("incomplete ClientHello body".into()))?;

    let mut cur = Cursor::new(body);

    let client_version = cur.u16("client version")?;
    let client_random = hex::encode(cur.bytes(32, "client random")?);

    let session_id_len = cur.u8("session id length")? as usize;
    let session_id = hex::encode(cur.bytes(session_id_len, "session id")?);

    // Cipher suites: 2 bytes each, wire order kept for JA3.
    let cipher_bytes_len = cur.u16("cipher suites length")? as usize;
    let cipher_bytes = cur.bytes(cipher_bytes_len, "cipher suites")?;
    let mut ciphers = Vec::new();
    let mut ciphers_hex = Vec::new();
    let mut cipher_ids = Vec::new();
    let mut grease_observed = false;
    for pair in cipher_bytes.chunks_exact(2) {
        let cs = u16::from_be_bytes([pair[0], pair[1]]);
        if is_grease(cs) {
            grease_observed = true;
        } else {
            cipher_ids.push(cs);
        }
        ciphers.push(cipher_name(cs));
        ciphers_hex.push(format!("0x{cs:04x}"));
    }

    let comp_len = cur.u8("compression methods length")? as usize;
    let compress_methods = cur.bytes(comp_len, "compression methods")?.to_vec();

    let mut fp = TlsFingerprint {
        ja3: String::new(),
        ja3_hash: String::new(),
        ja4: String::new(),
        ja4_r: String::new(),
        tls_version_record: record_version.to_string(),
        tls_version_negotiated: None,
        client_random,
        session_id,
        ciphers,
        ciphers_hex,
        extensions: Vec::new(),
        extensions_hex: Vec::new(),
        supported_groups: Vec::new(),
        ec_point_formats: Vec::new(),
        signature_algorithms: Vec::new(),
        alpn: Vec::new(),
        supported_versions: Vec::new(),
        sni: String::new(),
        compress_methods,
        grease_observed,
        cipher_ids,
        extension_ids: Vec::new(),
        supported_group_ids: Vec::new(),
        ec_point_format_ids: Vec::new(),
        signature_algorithm_ids: Vec::new(),
        supported_version_ids: Vec::new(),
    };

    // Extensions block is optional (a bare ClientHello is legal).
    if cur.remaining() >= 2 {
        let ext_total = cur.u16("extensions length")? as usize;
        if ext_total > cur.remaining() {
            return Err(Error::MalformedClientHello(
                "extensions length exceeds ClientHello".into(),
            ));
        }
        let ext_end = cur.pos + ext_total;

        while cur.pos + 4 <= ext_end {
            let ext_type = cur.u16("extension type")?;
            let ext_len = cur.u16("extension length")? as usize;
            if cur.pos + ext_len > ext_end {
                return Err(Error::MalformedClientHello(format!(
                    "extension {ext_type} length exceeds extensions block"
                )));
            }
            let ext_data = cur.bytes(ext_len, "extension data")?;
            parse_extension(&mut fp, ext_type, ext_data);
        }
    }

    derive_ja3(&mut fp, client_version);
    derive_ja4(&mut fp, client_version);

    if let Some(&v) = fp.supported_version_ids.first() {
        fp.tls_version_negotiated = Some(version_name(v));
    }

    Ok(fp)
}

/// Dispatch a single extension payload into the fingerprint.
fn parse_extension(fp: &mut TlsFingerprint, ext_type: u16, data: &[u8]) {
    let mut info = ExtensionInfo {
        name: extension_name(ext_type),
        id: ext_type,
        data: None,
    };

    match ext_type {
        0 => {
            if let Some(host) = parse_sni(data) {
                fp.sni = host.clone();
                info.data = Some(serde_json::Value::String(host));
            }
        }
        10 => {
            for g in parse_u16_list(data) {
                if !is_grease(g) {
                    fp.supported_group_ids.push(g);
                }
                fp.supported_groups.push(group_name(g));
            }
        }
        11 => {
            for f in parse_ec_point_formats(data) {
                fp.ec_point_format_ids.push(f);
                fp.ec_point_formats.push(format!("0x{f:02x}"));
            }
        }
        13 => {
            for alg in parse_u16_list(data) {
                fp.signature_algorithm_ids.push(alg);
                fp.signature_algorithms.push(sig_alg_name(alg));
            }
        }
        16 => {
            let protos = parse_alpn(data);
            if !protos.is_empty() {
                info.data = Some(serde_json::json!(protos.clone()));
            }
            fp.alpn = protos;
        }
        43 => {
            for v in parse_supported_versions(data) {
                if !is_grease(v) {
                    fp.supported_version_ids.push(v);
                }
                fp.supported_versions.push(version_name(v));
            }
        }
        _ => {}
    }

    fp.extensions_hex.push(format!("0x{ext_type:04x}"));
    if is_grease(ext_type) {
        fp.grease_observed = true;
    } else {
        fp.extension_ids.push(ext_type);
    }
    fp.extensions.push(info);
}

// ============================================================================
// Per-extension payload parsers
// ============================================================================

/// SNI: list_length(2) + name_type(1) + name_length(2) + host_name.
/// Only the first `host_name` entry is extracted.
fn parse_sni(data: &[u8]) -> Option<String> {
    if data.len() < 5 {
        return None;
    }
    if data[2] != 0x00 {
        // Not a host_name entry.
        return None;
    }
    let name_len = u16::from_be_bytes([data[3], data[4]]) as usize;
    let name = data.get(5..5 + name_len)?;
    std::str::from_utf8(name).ok().map(str::to_string)
}

/// Generic `u16 length + u16 entries` list (supported_groups,
/// signature_algorithms).
fn parse_u16_list(data: &[u8]) -> Vec<u16> {
    if data.len() < 2 {
        return Vec::new();
    }
    let list_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    data[2..]
        .chunks_exact(2)
        .take(list_len / 2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// EC point formats: u8 length + u8 entries.
fn parse_ec_point_formats(data: &[u8]) -> Vec<u8> {
    match data.split_first() {
        Some((&len, rest)) => rest.iter().take(len as usize).copied().collect(),
        None => Vec::new(),
    }
}

/// ALPN: u16 list length + (u8 proto length + proto)*.
fn parse_alpn(data: &[u8]) -> Vec<String> {
    if data.len() < 2 {
        return Vec::new();
    }
    let list_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let mut protocols = Vec::new();
    let mut offset = 2;
    while offset < 2 + list_len && offset < data.len() {
        let proto_len = data[offset] as usize;
        offset += 1;
        if let Some(proto) = data.get(offset..offset + proto_len) {
            if let Ok(s) = std::str::from_utf8(proto) {
                protocols.push(s.to_string());
            }
        }
        offset += proto_len;
    }
    protocols
}

/// supported_versions: u8 list length + u16 entries.
fn parse_supported_versions(data: &[u8]) -> Vec<u16> {
    match data.split_first() {
        Some((&len, rest)) => rest
            .chunks_exact(2)
            .take(len as usize / 2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect(),
        None => Vec::new(),
    }
}

// ============================================================================
// JA3 / JA4 derivation
// ============================================================================

/// JA3: `version,ciphers,extensions,groups,ec_point_formats` — wire order,
/// GREASE stripped, MD5 hashed.
fn derive_ja3(fp: &mut TlsFingerprint, client_version: u16) {
    fp.ja3 = format!(
        "{},{},{},{},{}",
        client_version,
        join_decimal(&fp.cipher_ids),
        join_decimal(&fp.extension_ids),
        join_decimal(&fp.supported_group_ids),
        fp.ec_point_format_ids
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("-"),
    );
    let mut hasher = Md5::new();
    hasher.update(fp.ja3.as_bytes());
    fp.ja3_hash = hex::encode(hasher.finalize());
}

/// JA4 and JA4_r: `t<ver><sni><cc><ec><alpn>` prefix, then truncated
/// SHA-256 hashes (JA4) or the raw sorted hex lists (JA4_r).
fn derive_ja4(fp: &mut TlsFingerprint, client_version: u16) {
    let ver = fp
        .supported_version_ids
        .first()
        .copied()
        .unwrap_or(client_version);
    let sni_flag = if fp.sni.is_empty() { "i" } else { "d" };
    let cipher_count = fp.cipher_ids.len().min(99);
    let ext_count = fp.extension_ids.len().min(99);
    let alpn_first = match fp.alpn.first() {
        Some(a) if a.len() >= 2 => a.get(..2).unwrap_or("00").to_string(),
        Some(a) if !a.is_empty() => a.clone(),
        _ => "00".to_string(),
    };
    let prefix = format!(
        "t{}{}{:02}{:02}{}",
        ja4_version(ver),
        sni_flag,
        cipher_count,
        ext_count,
        alpn_first
    );

    let mut sorted_ciphers = fp.cipher_ids.clone();
    sorted_ciphers.sort_unstable();
    let cipher_part = join_hex(&sorted_ciphers);

    // Extension hash input excludes SNI (0) and ALPN (16); signature
    // algorithms are appended sorted.
    let mut filtered_exts: Vec<u16> = fp
        .extension_ids
        .iter()
        .copied()
        .filter(|&e| e != 0 && e != 16)
        .collect();
    filtered_exts.sort_unstable();
    let ext_part = join_hex(&filtered_exts);

    let mut sorted_sig_algs = fp.signature_algorithm_ids.clone();
    sorted_sig_algs.sort_unstable();
    let sig_part = join_hex(&sorted_sig_algs);

    let ext_hash_input = if sig_part.is_empty() {
        ext_part.clone()
    } else {
        format!("{ext_part}_{sig_part}")
    };

    fp.ja4 = format!(
        "{prefix}_{}_{}",
        truncated_sha256(&cipher_part),
        truncated_sha256(&ext_hash_input)
    );
    fp.ja4_r = format!("{prefix}_{cipher_part}_{ext_part}_{sig_part}");
}

fn ja4_version(v: u16) -> &'static str {
    match v {
        0x0304 => "13",
        0x0303 => "12",
        0x0302 => "11",
        0x0301 => "10",
        _ => "00",
    }
}

fn truncated_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

fn join_decimal(ids: &[u16]) -> String {
    ids.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

fn join_hex(ids: &[u16]) -> String {
    ids.iter()
        .map(|v| format!("{v:04x}"))
        .collect::<Vec<_>>()
        .join(",")
}

// ============================================================================
// Name tables
// ============================================================================

pub fn cipher_name(cs: u16) -> String {
    if is_grease(cs) {
        return format!("TLS_GREASE (0x{cs:04X})");
    }
    let name = match cs {
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        0xc02b => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        0xc02f => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        0xc02c => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        0xc030 => "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        0xcca9 => "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        0xcca8 => "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        0xc013 => "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
        0xc014 => "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
        0x009c => "TLS_RSA_WITH_AES_128_GCM_SHA256",
        0x009d => "TLS_RSA_WITH_AES_256_GCM_SHA384",
        0x002f => "TLS_RSA_WITH_AES_128_CBC_SHA",
        0x0035 => "TLS_RSA_WITH_AES_256_CBC_SHA",
        _ => return format!("0x{cs:04X}"),
    };
    name.to_string()
}

pub fn extension_name(ext: u16) -> String {
    if is_grease(ext) {
        return format!("TLS_GREASE (0x{ext:04x})");
    }
    let name = match ext {
        0 => "server_name",
        1 => "max_fragment_length",
        5 => "status_request",
        10 => "supported_groups",
        11 => "ec_point_formats",
        13 => "signature_algorithms",
        14 => "use_srtp",
        15 => "heartbeat",
        16 => "application_layer_protocol_negotiation",
        17 => "signed_certificate_timestamp",
        18 => "client_certificate_type",
        19 => "server_certificate_type",
        20 => "padding",
        21 => "encrypt_then_mac",
        22 | 23 => "extended_master_secret",
        27 => "compress_certificate",
        28 => "record_size_limit",
        35 => "session_ticket",
        41 => "pre_shared_key",
        42 => "early_data",
        43 => "supported_versions",
        44 => "cookie",
        45 => "psk_key_exchange_modes",
        47 => "certificate_authorities",
        48 => "oid_filters",
        49 => "post_handshake_auth",
        50 => "signature_algorithms_cert",
        51 => "key_share",
        17513 => "application_settings",
        65037 => "encrypted_client_hello",
        65281 => "renegotiation_info",
        _ => return format!("unknown ({ext})"),
    };
    format!("{name} ({ext})")
}

pub fn group_name(g: u16) -> String {
    if is_grease(g) {
        return format!("TLS_GREASE (0x{g:04X})");
    }
    let name = match g {
        23 => "secp256r1",
        24 => "secp384r1",
        25 => "secp521r1",
        29 => "x25519",
        30 => "x448",
        256 => "ffdhe2048",
        257 => "ffdhe3072",
        258 => "ffdhe4096",
        4588 => "X25519MLKEM768",
        _ => return format!("0x{g:04X}"),
    };
    format!("{name} ({g})")
}

pub fn sig_alg_name(alg: u16) -> String {
    let name = match alg {
        0x0401 => "rsa_pkcs1_sha256",
        0x0501 => "rsa_pkcs1_sha384",
        0x0601 => "rsa_pkcs1_sha512",
        0x0403 => "ecdsa_secp256r1_sha256",
        0x0503 => "ecdsa_secp384r1_sha384",
        0x0603 => "ecdsa_secp521r1_sha512",
        0x0804 => "rsa_pss_rsae_sha256",
        0x0805 => "rsa_pss_rsae_sha384",
        0x0806 => "rsa_pss_rsae_sha512",
        0x0807 => "ed25519",
        0x0808 => "ed448",
        _ => return format!("0x{alg:04x}"),
    };
    name.to_string()
}

pub fn version_name(v: u16) -> String {
    if is_grease(v) {
        return format!("TLS_GREASE (0x{v:04X})");
    }
    match v {
        0x0304 => "TLS 1.3".to_string(),
        0x0303 => "TLS 1.2".to_string(),
        0x0302 => "TLS 1.1".to_string(),
        0x0301 => "TLS 1.0".to_string(),
        _ => format!("0x{v:04X}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a ClientHello record from parts, fixing up the record and
    /// handshake lengths.
    fn build_client_hello(
        version: u16,
        ciphers: &[u16],
        extensions: &[(u16, Vec<u8>)],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&version.to_be_bytes());
        body.extend_from_slice(&[0u8; 32]); // client random
        body.push(0); // empty session id
        body.extend_from_slice(&((ciphers.len() * 2) as u16).to_be_bytes());
        for cs in ciphers {
            body.extend_from_slice(&cs.to_be_bytes());
        }
        body.extend_from_slice(&[1, 0]); // null compression

        let mut ext_block = Vec::new();
        for (id, data) in extensions {
            ext_block.extend_from_slice(&id.to_be_bytes());
            ext_block.extend_from_slice(&(data.len() as u16).to_be_bytes());
            ext_block.extend_from_slice(data);
        }
        body.extend_from_slice(&(ext_block.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext_block);

        let mut handshake = vec![HANDSHAKE_CLIENT_HELLO];
        handshake.push((body.len() >> 16) as u8);
        handshake.push((body.len() >> 8) as u8);
        handshake.push(body.len() as u8);
        handshake.extend_from_slice(&body);

        let mut record = vec![CONTENT_TYPE_HANDSHAKE, 0x03, 0x01];
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    fn sni_ext(host: &str) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&((host.len() + 3) as u16).to_be_bytes());
        data.push(0x00);
        data.extend_from_slice(&(host.len() as u16).to_be_bytes());
        data.extend_from_slice(host.as_bytes());
        data
    }

    fn alpn_ext(protos: &[&str]) -> Vec<u8> {
        let mut list = Vec::new();
        for p in protos {
            list.push(p.len() as u8);
            list.extend_from_slice(p.as_bytes());
        }
        let mut data = Vec::new();
        data.extend_from_slice(&(list.len() as u16).to_be_bytes());
        data.extend_from_slice(&list);
        data
    }

    fn u16_list_ext(values: &[u16]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&((values.len() * 2) as u16).to_be_bytes());
        for v in values {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data
    }

    fn supported_versions_ext(values: &[u16]) -> Vec<u8> {
        let mut data = vec![(values.len() * 2) as u8];
        for v in values {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data
    }

    #[test]
    fn grease_pattern() {
        assert!(is_grease(0x0a0a));
        assert!(is_grease(0x1a1a));
        assert!(is_grease(0xfafa));
        // Mixed high nibbles still match the 0x?a?a mask.
        assert!(is_grease(0x3a5a));
        assert!(!is_grease(0x1301));
        assert!(!is_grease(0x0a0b));
    }

    #[test]
    fn minimal_hello() {
        let hello = build_client_hello(0x0303, &[0x1301, 0xc02f], &[]);
        let fp = parse_client_hello(&hello).unwrap();
        assert_eq!(fp.cipher_ids, vec![0x1301, 0xc02f]);
        assert_eq!(fp.ciphers[0], "TLS_AES_128_GCM_SHA256");
        assert!(fp.sni.is_empty());
        assert!(fp.alpn.is_empty());
    }

    #[test]
    fn zero_extensions_ja3_shape() {
        let hello = build_client_hello(0x0303, &[0x1301], &[]);
        let fp = parse_client_hello(&hello).unwrap();
        assert_eq!(fp.ja3, "771,4865,,,");
        assert_eq!(fp.ja3_hash.len(), 32);
        // JA4 extension count falls to 00 with no extensions.
        assert!(fp.ja4.starts_with("t12i0100"));
    }

    #[test]
    fn ja3_hash_is_lowercase_hex() {
        let hello = build_client_hello(0x0303, &[0x1301, 0x1302], &[(13, u16_list_ext(&[0x0403]))]);
        let fp = parse_client_hello(&hello).unwrap();
        assert_eq!(fp.ja3_hash.len(), 32);
        assert!(fp.ja3_hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Determinism.
        let fp2 = parse_client_hello(&hello).unwrap();
        assert_eq!(fp.ja3_hash, fp2.ja3_hash);
    }

    #[test]
    fn sni_extraction() {
        let hello = build_client_hello(0x0303, &[0x1301], &[(0, sni_ext("example.com"))]);
        let fp = parse_client_hello(&hello).unwrap();
        assert_eq!(fp.sni, "example.com");
        assert!(fp.ja4.starts_with("t12d"));
    }

    #[test]
    fn grease_stripped_from_hashes_kept_in_raw() {
        let hello = build_client_hello(
            0x0303,
            &[0x0a0a, 0x1301, 0x1a1a],
            &[(0x2a2a, Vec::new()), (13, u16_list_ext(&[0x0403]))],
        );
        let fp = parse_client_hello(&hello).unwrap();
        assert_eq!(fp.cipher_ids, vec![0x1301]);
        assert_eq!(fp.extension_ids, vec![13]);
        // Raw lists keep the GREASE entries.
        assert_eq!(fp.ciphers.len(), 3);
        assert_eq!(fp.extensions.len(), 2);
        assert!(fp.grease_observed);
        assert!(!fp.ja3.contains("2570")); // 0x0a0a
    }

    #[test]
    fn ja4_shape_and_counts() {
        let hello = build_client_hello(
            0x0303,
            &[0x1301, 0x1302, 0x1303],
            &[
                (0, sni_ext("localhost")),
                (10, u16_list_ext(&[29, 23])),
                (13, u16_list_ext(&[0x0403, 0x0804])),
                (16, alpn_ext(&["h2", "http/1.1"])),
                (43, supported_versions_ext(&[0x0304, 0x0303])),
            ],
        );
        let fp = parse_client_hello(&hello).unwrap();
        // supported_versions present: first entry wins the version field.
        assert!(fp.ja4.starts_with("t13d0305h2_"), "ja4 = {}", fp.ja4);
        assert_eq!(fp.tls_version_negotiated.as_deref(), Some("TLS 1.3"));
        let parts: Vec<&str> = fp.ja4.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 12);
        assert_eq!(parts[2].len(), 12);
        // JA4_r carries the raw sorted hex lists in four parts.
        assert_eq!(fp.ja4_r.split('_').count(), 4);
        assert!(fp.ja4_r.contains("1301,1302,1303"));
    }

    #[test]
    fn ja4_version_from_supported_versions_skips_grease() {
        let hello = build_client_hello(
            0x0303,
            &[0x1301],
            &[(43, supported_versions_ext(&[0x7a7a, 0x0304]))],
        );
        let fp = parse_client_hello(&hello).unwrap();
        assert!(fp.ja4.starts_with("t13"));
    }

    #[test]
    fn rejects_non_handshake_record() {
        let err = parse_client_hello(&[0x17, 0x03, 0x03, 0x00, 0x10]).unwrap_err();
        assert!(matches!(err, Error::MalformedClientHello(_)));
    }

    #[test]
    fn rejects_truncated_record() {
        assert!(parse_client_hello(&[0x16, 0x03]).is_err());
        // Record length says 100 bytes but only a few follow.
        assert!(parse_client_hello(&[0x16, 0x03, 0x01, 0x00, 0x64, 0x01, 0x00]).is_err());
    }

    #[test]
    fn rejects_server_hello() {
        let mut record = vec![0x16, 0x03, 0x03, 0x00, 0x06];
        record.extend_from_slice(&[0x02, 0x00, 0x00, 0x02, 0x03, 0x03]);
        let err = parse_client_hello(&record).unwrap_err();
        assert!(err.to_string().contains("not a ClientHello"));
    }

    #[test]
    fn rejects_extension_overflowing_block() {
        let mut hello = build_client_hello(0x0303, &[0x1301], &[(13, u16_list_ext(&[0x0403]))]);
        // Corrupt the last extension's length field to point past the block.
        let len = hello.len();
        hello[len - 5] = 0xff;
        assert!(parse_client_hello(&hello).is_err());
    }

    #[test]
    fn alpn_counts_in_ja4_but_not_ext_hash() {
        let with_alpn = build_client_hello(
            0x0303,
            &[0x1301],
            &[(16, alpn_ext(&["h2"])), (13, u16_list_ext(&[0x0403]))],
        );
        let without_alpn = build_client_hello(0x0303, &[0x1301], &[(13, u16_list_ext(&[0x0403]))]);
        let fp_a = parse_client_hello(&with_alpn).unwrap();
        let fp_b = parse_client_hello(&without_alpn).unwrap();
        // Extension hash input excludes ALPN, so the trailing hash matches.
        assert_eq!(
            fp_a.ja4.rsplit('_').next().unwrap(),
            fp_b.ja4.rsplit('_').next().unwrap()
        );
        // But the prefix differs: count and ALPN marker.
        assert!(fp_a.ja4.contains("02h2"));
        assert!(fp_b.ja4.contains("0100"));
    }
}
