//! Default network transport.
//!
//! [`NetConnection`] implements [`Connection`] over tokio TCP, with TLS
//! (rustls, webpki roots) selected automatically when the address uses the
//! standard TLS chat port 6697. The engine core is synchronous, so the
//! factory owns a small tokio runtime: `connect` blocks on it, and a
//! single spawned task pumps bytes in both directions afterwards.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;

use crate::connection::{
    Connection, ConnectionFactory, DisconnectedHandler, MessageReceivedHandler, TimeKeeper,
};

/// The production chat endpoint. Port 6697 selects TLS automatically.
pub const TWITCH_CHAT_SERVER: &str = "irc.chat.twitch.tv:6697";

/// A TCP (optionally TLS) connection to a chat server.
pub struct NetConnection {
    addr: String,
    runtime: Arc<Runtime>,
    on_message: Option<MessageReceivedHandler>,
    on_disconnect: Option<DisconnectedHandler>,
    /// Outbound lines; dropping this ends the pump task cleanly after the
    /// queue drains.
    writer: Option<mpsc::UnboundedSender<String>>,
}

enum Established {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl NetConnection {
    pub fn new(addr: impl Into<String>, runtime: Arc<Runtime>) -> Self {
        Self {
            addr: addr.into(),
            runtime,
            on_message: None,
            on_disconnect: None,
            writer: None,
        }
    }

    async fn establish(addr: &str) -> Result<Established> {
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| anyhow!("TCP connect to {addr} failed: {e}"))?;
        if !addr.ends_with(":6697") {
            return Ok(Established::Plain(tcp));
        }
        let connector = TlsConnector::from(Arc::new(tls_client_config()));
        let host = addr.split(':').next().unwrap_or("localhost");
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| anyhow!("TLS handshake with {addr} failed: {e}"))?;
        Ok(Established::Tls(tls))
    }
}

impl Connection for NetConnection {
    fn set_message_received(&mut self, handler: MessageReceivedHandler) {
        self.on_message = Some(handler);
    }

    fn set_disconnected(&mut self, handler: DisconnectedHandler) {
        self.on_disconnect = Some(handler);
    }

    fn connect(&mut self) -> bool {
        let established = match self.runtime.block_on(Self::establish(&self.addr)) {
            Ok(established) => established,
            Err(error) => {
                tracing::error!(addr = %self.addr, %error, "connection attempt failed");
                return false;
            }
        };
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let on_message = self.on_message.clone();
        let on_disconnect = self.on_disconnect.clone();
        match established {
            Established::Plain(stream) => {
                self.runtime
                    .spawn(pump(stream, line_rx, on_message, on_disconnect));
            }
            Established::Tls(stream) => {
                self.runtime
                    .spawn(pump(stream, line_rx, on_message, on_disconnect));
            }
        }
        self.writer = Some(line_tx);
        true
    }

    fn disconnect(&mut self) {
        // Closing the queue lets the pump flush anything already sent
        // (the farewell QUIT in particular) and then shut the socket.
        self.writer = None;
    }

    fn send(&mut self, text: &str) {
        if let Some(writer) = &self.writer {
            let _ = writer.send(text.to_string());
        }
    }
}

/// Shuttle bytes between the socket and the engine until either side
/// closes. The disconnected handler fires only for remote closure; a local
/// `disconnect` closes the outbound queue instead.
async fn pump<S>(
    stream: S,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    on_message: Option<MessageReceivedHandler>,
    on_disconnect: Option<DisconnectedHandler>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buffer = vec![0u8; 4096];
    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => {
                match read {
                    Ok(0) | Err(_) => {
                        if let Some(on_disconnect) = &on_disconnect {
                            on_disconnect();
                        }
                        break;
                    }
                    Ok(n) => {
                        if let Some(on_message) = &on_message {
                            on_message(&buffer[..n]);
                        }
                    }
                }
            }
            line = outgoing.recv() => {
                match line {
                    Some(text) => {
                        if writer.write_all(text.as_bytes()).await.is_err() {
                            if let Some(on_disconnect) = &on_disconnect {
                                on_disconnect();
                            }
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    let _ = writer.shutdown().await;
}

fn tls_client_config() -> rustls::ClientConfig {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Build a [`ConnectionFactory`] producing [`NetConnection`]s to `addr`.
///
/// The returned factory owns a single-worker tokio runtime shared by every
/// connection it creates.
pub fn twitch_connection_factory(addr: impl Into<String>) -> Result<ConnectionFactory> {
    let runtime = Arc::new(
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tmi-transport")
            .enable_all()
            .build()?,
    );
    let addr = addr.into();
    Ok(Box::new(move || {
        Box::new(NetConnection::new(addr.clone(), runtime.clone())) as Box<dyn Connection>
    }))
}

/// Monotonic wall time measured from construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeKeeper for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}
