//! Error types shared across the fingerprinting pipeline.
//!
//! The propagation policy is local-by-default: wire-level errors end the
//! connection that produced them and nothing else. Only certificate loading
//! and socket binding are allowed to abort startup, and those surface through
//! `anyhow` in the binary.

use std::io;

use thiserror::Error;

/// Errors produced by the fingerprinting pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The first bytes of a connection were not a well-formed TLS ClientHello.
    ///
    /// Truncated records, non-handshake content types and inner length
    /// mismatches all land here. The connection is dropped without storing a
    /// fingerprint; scan traffic makes this too noisy for anything above
    /// debug logging.
    #[error("malformed ClientHello: {0}")]
    MalformedClientHello(String),

    /// HTTP/2 preface or frame data was truncated or internally inconsistent.
    #[error("malformed HTTP/2 data: {0}")]
    MalformedHttp2(String),

    /// The packet-capture backend could not be opened (permissions, missing
    /// library, no usable interface). The capture agent is disabled and the
    /// rest of the server keeps running.
    #[error("packet capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// A fingerprint catalog file is absent or unparseable. The affected
    /// lookups are disabled; the analyzer proceeds with an empty catalog.
    #[error("fingerprint database missing: {0}")]
    DatabaseMissing(String),

    /// The TLS handshake failed after the ClientHello parsed successfully.
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// A per-connection read or write deadline expired.
    #[error("connection deadline expired")]
    Timeout,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
