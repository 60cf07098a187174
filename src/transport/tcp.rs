// TCP Transport Implementation
// Provides TCP/IP network transport for peer-to-peer communication
//
// Every node dials each configured peer once and keeps that outbound
// connection for sending. Connections accepted by the listener are only read
// from. Both directions therefore preserve per-peer message order.

use crate::sync::{encode_frame, FrameDecoder, Message, ProtocolError};
use crate::transport::{PeerLink, TransportError, TransportEvent};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

// ============================================================================
// TCP TRANSPORT CONFIG
// ============================================================================

/// Configuration for TCP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpTransportConfig {
    /// Address to bind to
    pub bind_address: String,
    /// Port to bind to (0 for random)
    pub bind_port: u16,
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// Dial timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Pause between redial attempts in milliseconds
    pub reconnect_delay_ms: u64,
    /// Frames queued per outbound connection before sends fail
    pub send_queue_capacity: usize,
    /// Read buffer size
    pub buffer_size: usize,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 0,
            nodelay: true,
            connect_timeout_ms: 1000,
            reconnect_delay_ms: 500,
            send_queue_capacity: 1024,
            buffer_size: 4096,
        }
    }
}

impl TcpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }
}

// ============================================================================
// TCP TRANSPORT
// ============================================================================

type WriterTable = Arc<RwLock<HashMap<String, mpsc::Sender<Vec<u8>>>>>;

/// TCP transport implementation
pub struct TcpTransport {
    name: String,
    config: TcpTransportConfig,
    local_addr: SocketAddr,
    /// Outbound frame queues keyed by peer name
    writers: WriterTable,
    events: mpsc::Sender<TransportEvent>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TcpTransport {
    /// Bind the listener and start accepting connections.
    ///
    /// Inbound messages are forwarded to `events`.
    pub async fn bind(
        name: &str,
        config: TcpTransportConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let bind_addr = format!("{}:{}", config.bind_address, config.bind_port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::Bind(format!("{}: {}", bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        info!(node = %name, address = %local_addr, "listening");

        let transport = Self {
            name: name.to_string(),
            config,
            local_addr,
            writers: Arc::new(RwLock::new(HashMap::new())),
            events,
            tasks: Arc::new(Mutex::new(Vec::new())),
        };

        let accept = tokio::spawn(accept_loop(
            transport.name.clone(),
            listener,
            transport.events.clone(),
            transport.tasks.clone(),
            transport.config.buffer_size,
        ));
        transport.track(accept);

        Ok(transport)
    }

    /// Keep a connection to `peer` at `address` open, redialing as needed
    pub fn connect_to(&self, peer: &str, address: &str) {
        let dialer = Dialer {
            me: self.name.clone(),
            peer: peer.to_string(),
            address: address.to_string(),
            config: self.config.clone(),
            writers: self.writers.clone(),
            events: self.events.clone(),
        };
        self.track(tokio::spawn(dialer.run()));
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Abort every task and close every connection
    pub fn shutdown(&self) {
        self.abort_all();
        info!(node = %self.name, "transport shut down");
    }

    fn abort_all(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for handle in tasks.drain(..) {
                handle.abort();
            }
        }
        if let Ok(mut writers) = self.writers.write() {
            writers.clear();
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|h| !h.is_finished());
            tasks.push(handle);
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[async_trait]
impl PeerLink for TcpTransport {
    async fn send(&self, peer: &str, message: &Message) -> Result<(), TransportError> {
        let writer = self
            .writers
            .read()
            .ok()
            .and_then(|writers| writers.get(peer).cloned())
            .ok_or_else(|| TransportError::PeerUnreachable(peer.to_string()))?;

        let frame = encode_frame(message)?;
        writer.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::SendFailed(format!("{}: send queue full", peer))
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::PeerUnreachable(peer.to_string()),
        })
    }

    fn connected_peers(&self) -> Vec<String> {
        self.writers
            .read()
            .map(|writers| writers.keys().cloned().collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// INBOUND CONNECTIONS
// ============================================================================

async fn accept_loop(
    me: String,
    listener: TcpListener,
    events: mpsc::Sender<TransportEvent>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    buffer_size: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(node = %me, remote = %addr, "accepted connection");
                let reader = tokio::spawn(read_frames(me.clone(), stream, addr, events.clone(), buffer_size));
                if let Ok(mut tasks) = tasks.lock() {
                    tasks.retain(|h| !h.is_finished());
                    tasks.push(reader);
                }
            }
            Err(e) => {
                warn!(node = %me, error = %e, "accept failed");
                sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

/// Decode frames from one inbound connection until it closes
async fn read_frames(
    me: String,
    mut stream: TcpStream,
    remote: SocketAddr,
    events: mpsc::Sender<TransportEvent>,
    buffer_size: usize,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => {
                debug!(node = %me, remote = %remote, "inbound connection closed");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(node = %me, remote = %remote, error = %e, "inbound read failed");
                return;
            }
        };
        decoder.extend(&buf[..n]);

        loop {
            let event = match decoder.next_frame() {
                Ok(Some(body)) => match Message::from_json(&body) {
                    Ok(message) => TransportEvent::MessageReceived { message },
                    Err(error) => {
                        warn!(node = %me, remote = %remote, error = %error, "discarding malformed message");
                        TransportEvent::MalformedMessage { error }
                    }
                },
                Ok(None) => break,
                Err(error @ ProtocolError::MessageTooLarge { .. }) => {
                    warn!(node = %me, remote = %remote, error = %error, "dropping connection");
                    let _ = events.send(TransportEvent::MalformedMessage { error }).await;
                    return;
                }
                Err(error) => TransportEvent::MalformedMessage { error },
            };
            if events.send(event).await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// OUTBOUND CONNECTIONS
// ============================================================================

struct Dialer {
    me: String,
    peer: String,
    address: String,
    config: TcpTransportConfig,
    writers: WriterTable,
    events: mpsc::Sender<TransportEvent>,
}

impl Dialer {
    async fn run(self) {
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        loop {
            match timeout(connect_timeout, TcpStream::connect(&self.address)).await {
                Ok(Ok(stream)) => {
                    let reason = self.serve(stream).await;
                    if let Ok(mut writers) = self.writers.write() {
                        writers.remove(&self.peer);
                    }
                    warn!(node = %self.me, peer = %self.peer, reason = %reason, "peer link lost");
                    let lost = TransportEvent::PeerDisconnected {
                        peer: self.peer.clone(),
                        reason,
                    };
                    if self.events.send(lost).await.is_err() {
                        return;
                    }
                }
                Ok(Err(e)) => {
                    debug!(node = %self.me, peer = %self.peer, error = %e, "dial failed");
                }
                Err(_) => {
                    debug!(node = %self.me, peer = %self.peer, "dial timed out");
                }
            }

            if self.events.is_closed() {
                return;
            }
            let jitter = rand::thread_rng().gen_range(0..=self.config.reconnect_delay_ms / 2);
            sleep(Duration::from_millis(self.config.reconnect_delay_ms + jitter)).await;
        }
    }

    /// Pump queued frames onto the socket until either side gives up
    async fn serve(&self, stream: TcpStream) -> String {
        stream.set_nodelay(self.config.nodelay).ok();
        let (mut reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(self.config.send_queue_capacity.max(1));

        if let Ok(mut writers) = self.writers.write() {
            writers.insert(self.peer.clone(), tx);
        }
        info!(node = %self.me, peer = %self.peer, address = %self.address, "connected to peer");
        let up = TransportEvent::PeerConnected {
            peer: self.peer.clone(),
        };
        if self.events.send(up).await.is_err() {
            return "node stopped".to_string();
        }

        let mut discard = [0u8; 64];
        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(bytes) => {
                        if let Err(e) = writer.write_all(&bytes).await {
                            return e.to_string();
                        }
                    }
                    None => return "send queue closed".to_string(),
                },
                read = reader.read(&mut discard) => match read {
                    Ok(0) => return "closed by peer".to_string(),
                    // Peers never reply on this connection
                    Ok(_) => continue,
                    Err(e) => return e.to_string(),
                },
            }
        }
    }
}
