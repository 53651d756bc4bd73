//! Passive TCP SYN capture and p0f-style fingerprinting.
//!
//! One blocking capture loop per interface reads raw frames off a
//! `pnet` datalink channel, keeps only inbound SYNs for the service port
//! (SYN set, ACK clear — never the SYN-ACK), and publishes a
//! [`TcpFingerprint`] row per source IP.
//!
//! Capture needs elevated privileges. When the channel cannot be opened the
//! agent degrades to an inert stub: the store stays empty, a single warning
//! is logged, and every consumer must tolerate a missing TCP fingerprint.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;

use md5::{Digest, Md5};
use parking_lot::RwLock;
use pnet::datalink::{self, Channel, DataLinkReceiver, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{Ipv4Flags, Ipv4Packet};
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::{TcpFlags, TcpPacket};
use pnet::packet::Packet;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// TCP option kinds observed in SYN packets.
const OPT_END_OF_LIST: u8 = 0;
const OPT_NOP: u8 = 1;
const OPT_MSS: u8 = 2;
const OPT_WSCALE: u8 = 3;
const OPT_SACK_PERMITTED: u8 = 4;
const OPT_SACK: u8 = 5;
const OPT_TIMESTAMP: u8 = 8;

/// One TCP option in wire order.
#[derive(Debug, Clone, Serialize)]
pub struct TcpOption {
    pub kind: u8,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
}

/// Timestamp option values plus the derived (best-effort) uptime string.
#[derive(Debug, Clone, Serialize)]
pub struct TcpTimestamp {
    pub tsval: u32,
    pub tsecr: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uptime: String,
}

/// TCP/IP-layer fingerprint derived from a single SYN packet.
#[derive(Debug, Clone, Serialize)]
pub struct TcpFingerprint {
    pub ttl: u8,
    /// Observed TTL rounded up to the nearest common initial value.
    pub initial_ttl: u8,
    pub ip_version: u8,
    pub ip_flags: String,
    pub window_size: u16,
    pub mss: u16,
    pub window_scale: u8,
    pub options: Vec<TcpOption>,
    /// Compact option signature, e.g. `M1460,S,T,N,W7`.
    pub options_str: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TcpTimestamp>,
    /// MD5 over `ipver:initial_ttl:options:window:ip_flags`.
    pub signature: String,
    pub inferred_os: String,
    pub os_confidence: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<String>,
}

/// Shared map of source IP → latest SYN fingerprint.
///
/// A single reader-writer lock protects the map. No per-entry TTL is kept;
/// the cap-enforcement task replaces the whole map when it grows past the
/// bound.
#[derive(Clone, Default)]
pub struct TcpFingerprintStore {
    inner: Arc<RwLock<HashMap<String, Arc<TcpFingerprint>>>>,
}

impl TcpFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ip: IpAddr, fp: TcpFingerprint) {
        self.inner.write().insert(ip.to_string(), Arc::new(fp));
    }

    pub fn get(&self, ip: &str) -> Option<Arc<TcpFingerprint>> {
        self.inner.read().get(ip).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Replace the whole map with an empty one once it exceeds `cap`.
    pub fn enforce_cap(&self, cap: usize) {
        let mut guard = self.inner.write();
        if guard.len() > cap {
            let dropped = guard.len();
            *guard = HashMap::new();
            info!(dropped, "TCP fingerprint store cleared (capacity exceeded)");
        }
    }
}

/// Selected capture backend. The stub is a first-class outcome, not an
/// error: running without privileges or without a capture-capable platform
/// only loses the TCP signal.
enum Backend {
    Live { interfaces: Vec<String> },
    Stub,
}

/// The capture agent: owns the row store and whatever capture threads could
/// be started.
pub struct CaptureAgent {
    store: TcpFingerprintStore,
    backend: Backend,
}

impl CaptureAgent {
    /// A stub agent that never observes anything (`--disable-tcp`).
    pub fn disabled(store: TcpFingerprintStore) -> Self {
        Self {
            store,
            backend: Backend::Stub,
        }
    }

    /// Start capture threads on the requested interface, or on every usable
    /// interface plus loopback when none is named. Failure to open any
    /// channel degrades to the stub with one warning.
    pub fn start(requested_iface: Option<&str>, port: u16, store: TcpFingerprintStore) -> Self {
        let interfaces = select_interfaces(requested_iface);
        if interfaces.is_empty() {
            warn!("packet capture unavailable: no usable capture interface found");
            return Self::disabled(store);
        }

        let mut started = Vec::new();
        for interface in interfaces {
            match open_channel(&interface) {
                Ok(rx) => {
                    let name = interface.name.clone();
                    info!(iface = %name, port, "capturing TCP SYN packets");
                    let loop_store = store.clone();
                    let loop_name = name.clone();
                    thread::Builder::new()
                        .name(format!("syn-capture-{name}"))
                        .spawn(move || capture_loop(rx, &loop_name, port, loop_store))
                        .ok();
                    started.push(name);
                }
                Err(e) => {
                    debug!(iface = %interface.name, error = %e, "skipping capture interface");
                }
            }
        }

        if started.is_empty() {
            warn!(
                "packet capture unavailable: could not open any interface \
                 (missing privileges?); TCP fingerprinting disabled"
            );
            return Self::disabled(store);
        }

        Self {
            store,
            backend: Backend::Live { interfaces: started },
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.backend, Backend::Live { .. })
    }

    /// Interfaces the live backend is capturing on; empty for the stub.
    pub fn interfaces(&self) -> &[String] {
        match &self.backend {
            Backend::Live { interfaces } => interfaces,
            Backend::Stub => &[],
        }
    }

    pub fn store(&self) -> &TcpFingerprintStore {
        &self.store
    }
}

/// Interface selection: a named interface when requested, otherwise every
/// non-loopback interface that has addresses, plus the loopback (required
/// for same-host testing).
fn select_interfaces(requested: Option<&str>) -> Vec<NetworkInterface> {
    let all = datalink::interfaces();
    if let Some(name) = requested {
        return all.into_iter().filter(|i| i.name == name).collect();
    }

    let mut selected = Vec::new();
    let mut loopback = None;
    for interface in all {
        if interface.ips.is_empty() {
            continue;
        }
        if interface.is_loopback() {
            loopback = Some(interface);
            continue;
        }
        selected.push(interface);
    }
    if let Some(lo) = loopback {
        selected.push(lo);
    }
    selected
}

fn open_channel(interface: &NetworkInterface) -> Result<Box<dyn DataLinkReceiver>> {
    match datalink::channel(interface, datalink::Config::default()) {
        Ok(Channel::Ethernet(_tx, rx)) => Ok(rx),
        Ok(_) => Err(Error::CaptureUnavailable(format!(
            "unsupported channel type on {}",
            interface.name
        ))),
        Err(e) => Err(Error::CaptureUnavailable(format!(
            "failed to open {}: {e}",
            interface.name
        ))),
    }
}

/// Blocking per-interface loop: runs for the process lifetime.
fn capture_loop(
    mut rx: Box<dyn DataLinkReceiver>,
    iface: &str,
    port: u16,
    store: TcpFingerprintStore,
) {
    loop {
        match rx.next() {
            Ok(frame) => {
                if let Some((src, fp)) = process_frame(frame, port) {
                    debug!(
                        %src,
                        ttl = fp.ttl,
                        initial_ttl = fp.initial_ttl,
                        window = fp.window_size,
                        options = %fp.options_str,
                        os = %fp.inferred_os,
                        "captured SYN"
                    );
                    store.insert(src, fp);
                }
            }
            Err(e) => {
                debug!(iface, error = %e, "capture read error");
            }
        }
    }
}

/// Filter + decode one frame. Equivalent of the BPF filter
/// `tcp dst port P and SYN set and ACK clear`, applied in code.
fn process_frame(frame: &[u8], port: u16) -> Option<(IpAddr, TcpFingerprint)> {
    let eth = EthernetPacket::new(frame)?;

    let (src, ttl, ip_version, ip_flags, tcp_payload) = match eth.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ip = Ipv4Packet::new(eth.payload())?;
            if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
                return None;
            }
            (
                IpAddr::V4(ip.get_source()),
                ip.get_ttl(),
                4u8,
                format_ipv4_flags(ip.get_flags()),
                ip.payload().to_vec(),
            )
        }
        EtherTypes::Ipv6 => {
            let ip = Ipv6Packet::new(eth.payload())?;
            if ip.get_next_header() != IpNextHeaderProtocols::Tcp {
                return None;
            }
            (
                IpAddr::V6(ip.get_source()),
                ip.get_hop_limit(),
                6u8,
                String::new(),
                ip.payload().to_vec(),
            )
        }
        _ => return None,
    };

    let tcp = TcpPacket::new(&tcp_payload)?;
    if tcp.get_destination() != port {
        return None;
    }
    let flags = tcp.get_flags();
    if flags & TcpFlags::SYN == 0 || flags & TcpFlags::ACK != 0 {
        return None;
    }

    Some((
        src,
        build_fingerprint(
            ttl,
            ip_version,
            ip_flags,
            tcp.get_window(),
            tcp.get_options_raw(),
        ),
    ))
}

/// Assemble the fingerprint from decoded header fields and raw option bytes.
pub fn build_fingerprint(
    ttl: u8,
    ip_version: u8,
    ip_flags: String,
    window: u16,
    raw_options: &[u8],
) -> TcpFingerprint {
    let (options, options_str, mss, window_scale, timestamp) = parse_tcp_options(raw_options);

    let mut fp = TcpFingerprint {
        ttl,
        initial_ttl: guess_initial_ttl(ttl),
        ip_version,
        ip_flags,
        window_size: window,
        mss,
        window_scale,
        options,
        options_str,
        timestamp,
        signature: String::new(),
        inferred_os: String::new(),
        os_confidence: String::new(),
        anomalies: Vec::new(),
    };

    let (os, confidence) = infer_os(&fp);
    fp.inferred_os = os;
    fp.os_confidence = confidence;
    fp.signature = signature_hash(&fp);
    fp.anomalies = local_anomalies(&fp);
    fp
}

fn format_ipv4_flags(flags: u8) -> String {
    let mut parts = Vec::new();
    if flags & Ipv4Flags::DontFragment != 0 {
        parts.push("DF");
    }
    if flags & Ipv4Flags::MoreFragments != 0 {
        parts.push("MF");
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(",")
    }
}

/// Round the observed TTL up to the nearest common initial value.
pub fn guess_initial_ttl(ttl: u8) -> u8 {
    match ttl {
        0..=32 => 32,
        33..=64 => 64,
        65..=128 => 128,
        _ => 255,
    }
}

/// Walk raw TCP option bytes. Lenient on trailing garbage: capture is best
/// effort, a truncated option list just ends the walk.
fn parse_tcp_options(raw: &[u8]) -> (Vec<TcpOption>, String, u16, u8, Option<TcpTimestamp>) {
    let mut options = Vec::new();
    let mut opt_strs: Vec<String> = Vec::new();
    let mut mss = 0u16;
    let mut window_scale = 0u8;
    let mut timestamp = None;

    let mut rest = raw;
    while let Some((&kind, tail)) = rest.split_first() {
        match kind {
            OPT_END_OF_LIST => break,
            OPT_NOP => {
                options.push(TcpOption {
                    kind,
                    name: "NOP".to_string(),
                    value: None,
                });
                opt_strs.push("N".to_string());
                rest = tail;
            }
            _ => {
                let Some((&len_byte, data)) = tail.split_first() else {
                    break;
                };
                let data_len = (len_byte as usize).saturating_sub(2);
                let Some(option_data) = data.get(..data_len) else {
                    break;
                };

                match kind {
                    OPT_MSS => {
                        if option_data.len() >= 2 {
                            mss = u16::from_be_bytes([option_data[0], option_data[1]]);
                        }
                        options.push(TcpOption {
                            kind,
                            name: "MSS".to_string(),
                            value: Some(u32::from(mss)),
                        });
                        opt_strs.push(format!("M{mss}"));
                    }
                    OPT_WSCALE => {
                        if let Some(&ws) = option_data.first() {
                            window_scale = ws;
                        }
                        options.push(TcpOption {
                            kind,
                            name: "WScale".to_string(),
                            value: Some(u32::from(window_scale)),
                        });
                        opt_strs.push(format!("W{window_scale}"));
                    }
                    OPT_SACK_PERMITTED => {
                        options.push(TcpOption {
                            kind,
                            name: "SACK_PERM".to_string(),
                            value: None,
                        });
                        opt_strs.push("S".to_string());
                    }
                    OPT_SACK => {
                        options.push(TcpOption {
                            kind,
                            name: "SACK".to_string(),
                            value: None,
                        });
                        opt_strs.push("K".to_string());
                    }
                    OPT_TIMESTAMP => {
                        if option_data.len() >= 8 {
                            let tsval = u32::from_be_bytes([
                                option_data[0],
                                option_data[1],
                                option_data[2],
                                option_data[3],
                            ]);
                            let tsecr = u32::from_be_bytes([
                                option_data[4],
                                option_data[5],
                                option_data[6],
                                option_data[7],
                            ]);
                            timestamp = Some(TcpTimestamp {
                                tsval,
                                tsecr,
                                uptime: estimate_uptime(tsval),
                            });
                            options.push(TcpOption {
                                kind,
                                name: "Timestamp".to_string(),
                                value: Some(tsval),
                            });
                        } else {
                            options.push(TcpOption {
                                kind,
                                name: "Timestamp".to_string(),
                                value: None,
                            });
                        }
                        opt_strs.push("T".to_string());
                    }
                    other => {
                        options.push(TcpOption {
                            kind,
                            name: format!("Unknown({other})"),
                            value: None,
                        });
                        opt_strs.push(format!("U{other}"));
                    }
                }

                let Some(next) = data.get(data_len..) else {
                    break;
                };
                rest = next;
            }
        }
    }

    (options, opt_strs.join(","), mss, window_scale, timestamp)
}

/// Uptime estimate assuming a 1000 Hz TSval tick. Linux ticks at 1 kHz,
/// BSD/macOS use other rates; this is informational only.
pub fn estimate_uptime(tsval: u32) -> String {
    let seconds = tsval / 1000;
    if seconds == 0 {
        return String::new();
    }
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{seconds}s")
    }
}

/// Fixed OS inference table over (initial TTL, timestamp presence, window).
pub fn infer_os(fp: &TcpFingerprint) -> (String, String) {
    let has_timestamp = fp.timestamp.is_some();

    match fp.initial_ttl {
        128 => {
            // Windows rarely sends the TCP timestamp option.
            if has_timestamp {
                ("Windows".to_string(), "medium".to_string())
            } else {
                ("Windows".to_string(), "high".to_string())
            }
        }
        64 => {
            if fp.window_size == 65_535 {
                ("macOS/iOS".to_string(), "medium".to_string())
            } else if has_timestamp && fp.window_size < 20_000 {
                ("Android".to_string(), "low".to_string())
            } else if has_timestamp {
                ("Linux".to_string(), "medium".to_string())
            } else {
                ("Linux/Unix".to_string(), "low".to_string())
            }
        }
        255 => ("Network Device".to_string(), "medium".to_string()),
        32 => ("Embedded/Old".to_string(), "low".to_string()),
        _ => ("Unknown".to_string(), "low".to_string()),
    }
}

/// p0f-style signature hash over the canonical field string.
fn signature_hash(fp: &TcpFingerprint) -> String {
    let sig = format!(
        "{}:{}:{}:{}:{}",
        fp.ip_version, fp.initial_ttl, fp.options_str, fp.window_size, fp.ip_flags
    );
    let mut hasher = Md5::new();
    hasher.update(sig.as_bytes());
    hex::encode(hasher.finalize())
}

/// UA-independent anomaly tags computed at capture time. The analyzer later
/// deducts consistency points per tag.
fn local_anomalies(fp: &TcpFingerprint) -> Vec<String> {
    let mut anomalies = Vec::new();

    if fp.window_size == 65_535 && !fp.inferred_os.contains("macOS") && !fp.inferred_os.contains("iOS")
    {
        anomalies.push(
            "DEFAULT_WINDOW: Using default TCP window size 65535, possible bot/script".to_string(),
        );
    }

    if let Some(ts) = &fp.timestamp {
        let uptime_seconds = ts.tsval / 1000;
        if uptime_seconds > 0 && uptime_seconds < 600 {
            anomalies.push(format!(
                "SHORT_UPTIME: System uptime ~{}, possibly a newly started container/VM",
                ts.uptime
            ));
        }
    }

    if fp.options.len() < 3 {
        anomalies.push(
            "MINIMAL_OPTIONS: Very few TCP options, unusual for modern browsers".to_string(),
        );
    }

    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Typical Linux SYN options: MSS, SACK-permitted, Timestamp, NOP, WScale.
    fn linux_syn_options(tsval: u32) -> Vec<u8> {
        let mut raw = vec![OPT_MSS, 4, 0x05, 0xb4]; // MSS 1460
        raw.extend_from_slice(&[OPT_SACK_PERMITTED, 2]);
        raw.push(OPT_TIMESTAMP);
        raw.push(10);
        raw.extend_from_slice(&tsval.to_be_bytes());
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.extend_from_slice(&[OPT_NOP, OPT_WSCALE, 3, 7]);
        raw
    }

    #[test]
    fn option_string_in_wire_order() {
        let (options, options_str, mss, wscale, ts) =
            parse_tcp_options(&linux_syn_options(3_600_000 * 24));
        assert_eq!(options_str, "M1460,S,T,N,W7");
        assert_eq!(options.len(), 5);
        assert_eq!(mss, 1460);
        assert_eq!(wscale, 7);
        assert!(ts.is_some());
    }

    #[test]
    fn empty_options_still_fingerprint() {
        let fp = build_fingerprint(64, 4, "DF".to_string(), 65_535, &[]);
        assert_eq!(fp.options_str, "");
        assert_eq!(fp.inferred_os, "macOS/iOS");
        assert_eq!(fp.signature.len(), 32);
    }

    #[test]
    fn unknown_option_kind_preserved() {
        let raw = [OPT_NOP, 254, 4, 0xde, 0xad, OPT_SACK, 2];
        let (options, options_str, ..) = parse_tcp_options(&raw);
        assert_eq!(options_str, "N,U254,K");
        assert_eq!(options[1].name, "Unknown(254)");
    }

    #[test]
    fn end_of_list_stops_walk() {
        let raw = [OPT_NOP, OPT_END_OF_LIST, OPT_NOP, OPT_NOP];
        let (options, options_str, ..) = parse_tcp_options(&raw);
        assert_eq!(options.len(), 1);
        assert_eq!(options_str, "N");
    }

    #[test]
    fn truncated_option_ends_walk() {
        // MSS claims 4 bytes total but only the kind/len bytes are present.
        let (options, ..) = parse_tcp_options(&[OPT_NOP, OPT_MSS, 4]);
        assert_eq!(options.len(), 1);
    }

    #[test]
    fn initial_ttl_rounding() {
        assert_eq!(guess_initial_ttl(30), 32);
        assert_eq!(guess_initial_ttl(32), 32);
        assert_eq!(guess_initial_ttl(52), 64);
        assert_eq!(guess_initial_ttl(64), 64);
        assert_eq!(guess_initial_ttl(117), 128);
        assert_eq!(guess_initial_ttl(128), 128);
        assert_eq!(guess_initial_ttl(240), 255);
    }

    #[test]
    fn initial_ttl_never_below_observed() {
        for ttl in [1u8, 31, 33, 63, 65, 127, 129, 255] {
            assert!(guess_initial_ttl(ttl) >= ttl);
        }
    }

    #[test]
    fn os_inference_table() {
        // Windows: TTL 128, no timestamp.
        let fp = build_fingerprint(117, 4, "DF".into(), 8192, &[OPT_MSS, 4, 0x05, 0xb4]);
        assert_eq!(fp.inferred_os, "Windows");
        assert_eq!(fp.os_confidence, "high");

        // macOS/iOS: TTL 64, window 65535.
        let fp = build_fingerprint(60, 4, "DF".into(), 65_535, &linux_syn_options(90_000_000));
        assert_eq!(fp.inferred_os, "macOS/iOS");
        assert_eq!(fp.os_confidence, "medium");

        // Linux: TTL 64, timestamp, large window.
        let fp = build_fingerprint(64, 4, "DF".into(), 29_200, &linux_syn_options(90_000_000));
        assert_eq!(fp.inferred_os, "Linux");
        assert_eq!(fp.os_confidence, "medium");

        // Android: TTL 64, timestamp, small window.
        let fp = build_fingerprint(64, 4, "DF".into(), 17_520, &linux_syn_options(90_000_000));
        assert_eq!(fp.inferred_os, "Android");
        assert_eq!(fp.os_confidence, "low");

        // Network device: TTL 255.
        let fp = build_fingerprint(250, 4, "none".into(), 4096, &[]);
        assert_eq!(fp.inferred_os, "Network Device");

        // Embedded: TTL 32.
        let fp = build_fingerprint(28, 4, "none".into(), 4096, &[]);
        assert_eq!(fp.inferred_os, "Embedded/Old");
    }

    #[test]
    fn signature_is_stable() {
        let a = build_fingerprint(64, 4, "DF".into(), 29_200, &linux_syn_options(90_000_000));
        let b = build_fingerprint(64, 4, "DF".into(), 29_200, &linux_syn_options(90_000_000));
        assert_eq!(a.signature, b.signature);
        let c = build_fingerprint(64, 4, "DF".into(), 29_201, &linux_syn_options(90_000_000));
        assert_ne!(a.signature, c.signature);
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(estimate_uptime(0), "");
        assert_eq!(estimate_uptime(30_000), "30s");
        assert_eq!(estimate_uptime(5 * 60_000), "5m");
        assert_eq!(estimate_uptime(3_600_000 + 120_000), "1h 2m");
        assert_eq!(estimate_uptime(90_000_000), "1d 1h 0m");
    }

    #[test]
    fn short_uptime_anomaly() {
        let fp = build_fingerprint(64, 4, "DF".into(), 29_200, &linux_syn_options(120_000));
        assert!(fp.anomalies.iter().any(|a| a.starts_with("SHORT_UPTIME")));
    }

    #[test]
    fn default_window_anomaly_excludes_macos() {
        // macOS-looking SYN: 65535 window is its norm, no anomaly.
        let fp = build_fingerprint(64, 4, "DF".into(), 65_535, &linux_syn_options(90_000_000));
        assert!(!fp.anomalies.iter().any(|a| a.starts_with("DEFAULT_WINDOW")));

        // TTL 128 + 65535 window is not a macOS signature: flagged.
        let fp = build_fingerprint(128, 4, "DF".into(), 65_535, &[OPT_MSS, 4, 0x05, 0xb4]);
        assert!(fp.anomalies.iter().any(|a| a.starts_with("DEFAULT_WINDOW")));
    }

    #[test]
    fn minimal_options_anomaly() {
        let fp = build_fingerprint(64, 4, "DF".into(), 29_200, &[OPT_MSS, 4, 0x05, 0xb4]);
        assert!(fp.anomalies.iter().any(|a| a.starts_with("MINIMAL_OPTIONS")));
    }

    #[test]
    fn store_overwrites_and_enforces_cap() {
        let store = TcpFingerprintStore::new();
        let ip: IpAddr = "192.0.2.7".parse().unwrap();
        store.insert(ip, build_fingerprint(64, 4, "DF".into(), 100, &[]));
        store.insert(ip, build_fingerprint(64, 4, "DF".into(), 200, &[]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("192.0.2.7").unwrap().window_size, 200);

        store.enforce_cap(10_000);
        assert_eq!(store.len(), 1); // under cap, untouched
        store.enforce_cap(0);
        assert!(store.is_empty()); // over cap, wholesale clear
    }
}
