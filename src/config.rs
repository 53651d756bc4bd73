//! Runtime configuration assembled from the CLI.
//!
//! The server is configured entirely by flags; there is no config file. The
//! capture agent is the only component that can be disabled, and the store
//! cap is the only tunable with a behavioural effect (wholesale clear on
//! overflow).

use serde::Serialize;

use crate::store::DEFAULT_STORE_CAP;

/// Validated runtime configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConfig {
    /// TLS listen port.
    pub port: u16,
    /// Listen address.
    pub host: String,
    /// Path to the PEM certificate chain.
    pub cert_path: String,
    /// Path to the PEM private key.
    pub key_path: String,
    /// Capture interface; `None` auto-detects all usable interfaces plus
    /// loopback.
    pub iface: Option<String>,
    /// Disable the TCP capture agent entirely.
    pub disable_tcp: bool,
    /// Fingerprint store key cap before wholesale clearing.
    pub store_cap: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: 8443,
            host: "0.0.0.0".to_string(),
            cert_path: "server.crt".to_string(),
            key_path: "server.key".to_string(),
            iface: None,
            disable_tcp: false,
            store_cap: DEFAULT_STORE_CAP,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("listen port must be non-zero");
        }
        if self.host.is_empty() {
            anyhow::bail!("listen host must not be empty");
        }
        if self.cert_path.is_empty() || self.key_path.is_empty() {
            anyhow::bail!("certificate and key paths are required");
        }
        if self.store_cap == 0 {
            anyhow::bail!("store capacity must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let config = RuntimeConfig {
            port: 0,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_cert_path() {
        let config = RuntimeConfig {
            cert_path: String::new(),
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
