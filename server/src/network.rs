//! Server network layer handling WebSocket connections and background tasks
//!
//! Every accepted connection gets a reader loop and a writer task. The
//! reader decodes frames and hands them to the [`SessionManager`] one at a
//! time, so messages of one connection are handled in order. The writer
//! drains the connection's outbox and encodes each packet the way the client
//! last spoke to us: JSON for text frames, bincode for binary frames.

use crate::authority::ChessAuthority;
use crate::config::ServerConfig;
use crate::manager::SessionManager;
use crate::persistence::{JsonLinesGateway, LogGateway, PersistenceGateway, PersistenceWorker};
use crate::session::ConnectionId;
use crate::store::InMemorySessionStore;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{Frame, Packet, WireFormat};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Main server accepting connections and running background tasks
pub struct Server {
    listener: TcpListener,
    manager: Arc<SessionManager>,
    persistence: PersistenceWorker,
    config: ServerConfig,
}

impl Server {
    /// Binds the listener and starts the persistence worker
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let gateway: Arc<dyn PersistenceGateway> = match &config.record_file {
            Some(path) => {
                let gateway = JsonLinesGateway::open(path).await?;
                info!("Recording sessions to {}", gateway.path().display());
                Arc::new(gateway)
            }
            None => Arc::new(LogGateway),
        };

        let (queue, persistence) = PersistenceWorker::spawn(gateway, config.persistence_queue);
        let manager = Arc::new(SessionManager::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(ChessAuthority::new()),
            queue,
            config.max_connections,
        ));

        let listener = TcpListener::bind(config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            manager,
            persistence,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn manager(&self) -> Arc<SessionManager> {
        Arc::clone(&self.manager)
    }

    /// Runs until Ctrl+C
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await
    }

    /// Accepts connections until `shutdown` completes, then drains the
    /// persistence queue
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let reaper = self.spawn_reaper();
        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                },
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        reaper.abort();
        self.persistence.shutdown().await;
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let manager = Arc::clone(&self.manager);
        let outbound_buffer = self.config.outbound_buffer;

        tokio::spawn(async move {
            if let Err(e) = handle_connection(manager, stream, addr, outbound_buffer).await {
                debug!("Connection from {} ended with error: {}", addr, e);
            }
        });
    }

    /// Spawns task that discards abandoned sessions
    fn spawn_reaper(&self) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);
        let timeout = self.config.abandon_timeout;
        let period = self.config.reap_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                let reaped = manager.reap_abandoned(timeout).await;
                let connections = manager.connection_count().await;
                if reaped > 0 || connections > 0 {
                    debug!(
                        "{} connections, {} sessions, {} queued, {} reaped",
                        connections,
                        manager.session_count().await,
                        manager.queue_len().await,
                        reaped
                    );
                }
            }
        })
    }
}

/// Serves one WebSocket connection until it closes
async fn handle_connection(
    manager: Arc<SessionManager>,
    stream: TcpStream,
    addr: SocketAddr,
    outbound_buffer: usize,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (outbox, mut outbox_rx) = mpsc::channel::<Packet>(outbound_buffer);
    let Some(connection) = manager.connect(addr, outbox).await else {
        warn!("Server full, refusing connection from {}", addr);
        ws_sender.close().await?;
        return Ok(());
    };

    let binary = Arc::new(AtomicBool::new(false));

    let writer = {
        let binary = Arc::clone(&binary);
        tokio::spawn(async move {
            while let Some(packet) = outbox_rx.recv().await {
                let format = if binary.load(Ordering::Relaxed) {
                    WireFormat::Bincode
                } else {
                    WireFormat::Json
                };

                let message = match packet.encode(format) {
                    Ok(Frame::Text(text)) => Message::Text(text),
                    Ok(Frame::Binary(bytes)) => Message::Binary(bytes),
                    Err(e) => {
                        error!("Failed to encode packet for connection {}: {}", connection, e);
                        continue;
                    }
                };

                if let Err(e) = ws_sender.send(message).await {
                    debug!("Failed to send to connection {}: {}", connection, e);
                    break;
                }
            }
            let _ = ws_sender.close().await;
        })
    };

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                binary.store(false, Ordering::Relaxed);
                dispatch(&manager, connection, Packet::from_json(&text)).await;
            }
            Ok(Message::Binary(bytes)) => {
                binary.store(true, Ordering::Relaxed);
                dispatch(&manager, connection, Packet::from_bytes(&bytes)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error on connection {}: {}", connection, e);
                break;
            }
        }
    }

    manager.disconnect(connection).await;
    if let Err(e) = writer.await {
        error!("Writer task of connection {} failed: {}", connection, e);
    }
    Ok(())
}

async fn dispatch(
    manager: &SessionManager,
    connection: ConnectionId,
    decoded: Result<Packet, shared::WireError>,
) {
    match decoded {
        Ok(packet) if packet.is_client_message() => {
            manager.handle_packet(connection, packet).await;
        }
        Ok(_) => warn!("Connection {} sent a server-only message", connection),
        Err(e) => warn!("Undecodable frame from connection {}: {}", connection, e),
    }
}
