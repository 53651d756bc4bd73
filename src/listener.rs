//! TLS listener and connection multiplexing.
//!
//! Every accepted connection follows the same path: read the raw first bytes
//! (ClientHello) off the socket, parse them for the TLS fingerprint, then
//! replay those bytes into a standard rustls handshake so the client never
//! notices the detour. After the handshake the negotiated ALPN picks the
//! HTTP/2 interceptor or the plain HTTP/1.1 handler.
//!
//! Ordering guarantee: the combined fingerprint is inserted into the store
//! before the first response byte for that connection is written, so a
//! client that can read a response can always query its own fingerprint.

use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Context as _;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::api::{self, AppContext};
use crate::capture::{TcpFingerprint, TcpFingerprintStore};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::http2;
use crate::store::CombinedFingerprint;
use crate::tls_parser::{self, TlsFingerprint};

/// Maximum raw bytes read while waiting for the ClientHello.
const CLIENT_HELLO_READ_LIMIT: usize = 16 * 1024;
/// Deadline for the first raw read.
const FIRST_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for subsequent reads (handshake, HTTP/2 frames).
const READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for the follow-up HTTP/2 read carrying the request HEADERS.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

pin_project! {
    /// Single-use reader wrapper that serves a buffered prefix before
    /// delegating to the underlying socket. Ownership transfers to the TLS
    /// layer at handshake time; the TLS stack observes the replayed
    /// ClientHello as if it had just arrived.
    pub struct ReplayStream<S> {
        #[pin]
        inner: S,
        prefix: Vec<u8>,
        offset: usize,
    }
}

impl<S> ReplayStream<S> {
    pub fn new(inner: S, prefix: Vec<u8>) -> Self {
        Self {
            inner,
            prefix,
            offset: 0,
        }
    }
}

impl<S: AsyncRead> AsyncRead for ReplayStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        if *this.offset < this.prefix.len() {
            let n = buf.remaining().min(this.prefix.len() - *this.offset);
            buf.put_slice(&this.prefix[*this.offset..*this.offset + n]);
            *this.offset += n;
            if *this.offset == this.prefix.len() {
                this.prefix.clear();
                *this.offset = 0;
            }
            return Poll::Ready(Ok(()));
        }
        this.inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for ReplayStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

/// Build the rustls server config: ALPN `h2, http/1.1`, TLS 1.2 minimum.
pub fn load_tls_config(cert_path: &str, key_path: &str) -> anyhow::Result<Arc<rustls::ServerConfig>> {
    let cert_file =
        File::open(cert_path).with_context(|| format!("failed to open certificate {cert_path}"))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("failed to parse certificate {cert_path}"))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {cert_path}");
    }

    let key_file = File::open(key_path).with_context(|| format!("failed to open key {key_path}"))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .with_context(|| format!("failed to parse key {key_path}"))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {key_path}"))?;

    let mut config = rustls::ServerConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS13,
        &rustls::version::TLS12,
    ])
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .context("invalid certificate/key pair")?;

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Bind the listener and run the accept loop until the process shuts down.
pub async fn run(
    config: &RuntimeConfig,
    ctx: AppContext,
    tcp_store: TcpFingerprintStore,
) -> anyhow::Result<()> {
    let tls_config = load_tls_config(&config.cert_path, &config.key_path)?;
    let acceptor = TlsAcceptor::from(tls_config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("fingerprint server listening on https://{addr}");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept error");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let ctx = ctx.clone();
        let tcp_store = tcp_store.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, acceptor, ctx, tcp_store).await {
                // Scan traffic makes per-connection failures routine.
                debug!(peer = %peer, error = %e, "connection ended");
            }
        });
    }
}

/// Full lifetime of one accepted connection: raw read, ClientHello parse,
/// handshake over the replay stream, ALPN dispatch, store update.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    ctx: AppContext,
    tcp_store: TcpFingerprintStore,
) -> Result<()> {
    let mut buf = vec![0u8; CLIENT_HELLO_READ_LIMIT];
    let n = timeout(FIRST_READ_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| Error::Timeout)??;
    if n == 0 {
        return Ok(());
    }
    buf.truncate(n);

    let tls_fp = tls_parser::parse_client_hello(&buf)?;
    debug!(
        peer = %peer,
        ja3 = %tls_fp.ja3_hash,
        ja4 = %tls_fp.ja4,
        sni = %tls_fp.sni,
        "parsed ClientHello"
    );

    let tcp_fp = tcp_store
        .get(&peer.ip().to_string())
        .map(|shared| (*shared).clone());

    let replay = ReplayStream::new(stream, buf);
    let tls_stream = timeout(READ_TIMEOUT, acceptor.accept(replay))
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|e| Error::HandshakeFailed(e.to_string()))?;

    let negotiated_h2 = tls_stream
        .get_ref()
        .1
        .alpn_protocol()
        .map(|proto| proto == b"h2")
        .unwrap_or(false);
    debug!(peer = %peer, h2 = negotiated_h2, "TLS handshake complete");

    if negotiated_h2 {
        handle_h2(tls_stream, peer, tls_fp, tcp_fp, ctx).await
    } else {
        // HTTP/1.1: no HTTP/2 fingerprint for this connection. Store before
        // serving so the endpoints can answer from the same connection.
        ctx.store.insert(
            peer,
            CombinedFingerprint {
                tls: tls_fp,
                http2: None,
                tcp: tcp_fp,
            },
        );
        api::serve_http1(tls_stream, peer, ctx).await
    }
}

/// HTTP/2 path: intercept the preface and initial frames for the Akamai
/// fingerprint, store the combined record, then answer the first request.
async fn handle_h2<S>(
    mut stream: S,
    peer: SocketAddr,
    tls_fp: TlsFingerprint,
    tcp_fp: Option<TcpFingerprint>,
    ctx: AppContext,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 32 * 1024];
    let n = timeout(READ_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| Error::Timeout)??;
    let data = &buf[..n];

    if !http2::is_preface(data) {
        return Err(Error::MalformedHttp2("missing connection preface".into()));
    }

    let mut interceptor = http2::FrameInterceptor::new();
    let (h2_fp, mut request) = interceptor.parse_initial(&data[http2::PREFACE.len()..]);
    debug!(peer = %peer, akamai = %h2_fp.akamai, "HTTP/2 fingerprint");

    // Stored before any response frame is written.
    ctx.store.insert(
        peer,
        CombinedFingerprint {
            tls: tls_fp,
            http2: Some(h2_fp),
            tcp: tcp_fp,
        },
    );

    stream.write_all(&http2::build_server_settings_frame()).await?;
    stream.write_all(&http2::build_settings_ack_frame()).await?;
    stream.flush().await?;

    // Most clients send HEADERS only after seeing the server SETTINGS.
    if request.is_none() {
        let mut follow = vec![0u8; 32 * 1024];
        if let Ok(Ok(n)) = timeout(REQUEST_READ_TIMEOUT, stream.read(&mut follow)).await {
            if n > 0 {
                request = interceptor.find_request(&follow[..n]);
            }
        }
    }
    let request = request.unwrap_or_default();

    let body = api::route_h2(&request.path, &request.user_agent, peer, &ctx);
    stream
        .write_all(&http2::build_response_headers_frame(request.stream_id))
        .await?;
    stream
        .write_all(&http2::build_data_frame(request.stream_id, &body))
        .await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_stream_serves_prefix_then_inner() {
        let inner: &[u8] = b" world";
        let mut stream = ReplayStream::new(inner, b"hello".to_vec());
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn replay_stream_partial_reads() {
        let inner: &[u8] = b"cd";
        let mut stream = ReplayStream::new(inner, b"ab".to_vec());
        let mut byte = [0u8; 1];
        for expected in [b'a', b'b', b'c', b'd'] {
            stream.read_exact(&mut byte).await.unwrap();
            assert_eq!(byte[0], expected);
        }
    }

    #[tokio::test]
    async fn replay_stream_empty_prefix_passes_through() {
        let inner: &[u8] = b"data";
        let mut stream = ReplayStream::new(inner, Vec::new());
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"data");
    }
}
