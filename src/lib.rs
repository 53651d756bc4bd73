// Crate-level lint configuration
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::struct_excessive_bools)]

//! `wirelens` - passive multi-layer network fingerprinting server
//!
//! A TLS server that fingerprints every client at three protocol layers and
//! cross-correlates them to spot browser impersonators and spoofed
//! User-Agents:
//! - Raw ClientHello parsing with JA3 / JA4 / JA4_r derivation
//! - HTTP/2 connection-preface interception for the Akamai-style fingerprint
//!   (SETTINGS | WINDOW_UPDATE | PRIORITY | pseudo-header order)
//! - Promiscuous TCP SYN capture for a p0f-style signature and OS inference
//! - A rule-driven analyzer joining all three layers into a risk verdict,
//!   served over `/api/fingerprint` and `/api/analysis`

pub mod analyzer;
pub mod api;
pub mod capture;
pub mod config;
pub mod database;
pub mod error;
pub mod http2;
pub mod listener;
pub mod store;
pub mod tls_parser;
pub mod useragent;

pub use analyzer::{analyze, build_simple_result, AnalysisResult};
pub use capture::{CaptureAgent, TcpFingerprint, TcpFingerprintStore};
pub use database::FingerprintDatabase;
pub use error::{Error, Result};
pub use http2::Http2Fingerprint;
pub use store::{CombinedFingerprint, FingerprintStore};
pub use tls_parser::TlsFingerprint;
