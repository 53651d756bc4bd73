//! In-memory fingerprint store shared between capture paths and the query
//! endpoints.
//!
//! Every successful handshake publishes one [`CombinedFingerprint`] under two
//! keys: the connection-scoped `ip:port` and the host-scoped bare `ip`. Both
//! keys point at the same shared snapshot; an update replaces the whole
//! record, never mutates it in place.
//!
//! The store is a short-lived cache, not a database: when it grows past its
//! cap the whole map is replaced with an empty one.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::capture::TcpFingerprint;
use crate::http2::Http2Fingerprint;
use crate::tls_parser::TlsFingerprint;

/// Default key cap before the map is wholesale-cleared.
pub const DEFAULT_STORE_CAP: usize = 10_000;

/// All fingerprint layers captured for one connection.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedFingerprint {
    pub tls: TlsFingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http2: Option<Http2Fingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpFingerprint>,
}

/// Map of `ip:port` and `ip` → latest combined fingerprint, behind a single
/// reader-writer lock.
#[derive(Clone, Default)]
pub struct FingerprintStore {
    inner: Arc<RwLock<HashMap<String, Arc<CombinedFingerprint>>>>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under both the connection key and the bare-IP key. Returns the
    /// shared snapshot for the caller to keep serving from.
    pub fn insert(&self, peer: SocketAddr, fp: CombinedFingerprint) -> Arc<CombinedFingerprint> {
        let shared = Arc::new(fp);
        let mut guard = self.inner.write();
        guard.insert(peer.to_string(), Arc::clone(&shared));
        guard.insert(peer.ip().to_string(), Arc::clone(&shared));
        shared
    }

    /// Reader policy: connection key first, then bare IP.
    pub fn lookup(&self, ip_port: &str, ip: &str) -> Option<Arc<CombinedFingerprint>> {
        let guard = self.inner.read();
        guard.get(ip_port).or_else(|| guard.get(ip)).cloned()
    }

    /// Host-scoped lookup, used by the `/api/*` endpoints so HTTP/2
    /// keep-alive reuse across ports still resolves.
    pub fn lookup_ip(&self, ip: &str) -> Option<Arc<CombinedFingerprint>> {
        self.inner.read().get(ip).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot of every entry, for the `/api/all` endpoint.
    pub fn snapshot(&self) -> HashMap<String, Arc<CombinedFingerprint>> {
        self.inner.read().clone()
    }

    /// Replace the whole map with an empty one once it exceeds `cap`.
    pub fn enforce_cap(&self, cap: usize) {
        let mut guard = self.inner.write();
        if guard.len() > cap {
            let dropped = guard.len();
            *guard = HashMap::new();
            info!(dropped, "fingerprint store cleared (capacity exceeded)");
        }
    }
}
