//! OCPP WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{station_id}`
//! or `ws://<host>:<port>/{station_id}`. A connection without an id in the
//! path stays unidentified until a BootNotification carries a serial.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::application::handlers::{OcppHandlerV16, OcppServices};
use crate::config::ServerConfig;
use crate::domain::OcppVersion;
use crate::interfaces::ws::negotiator::{Negotiated, ProtocolNegotiator};
use crate::support::shutdown::ShutdownSignal;

type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// OCPP WebSocket Server
pub struct OcppServer {
    config: ServerConfig,
    services: OcppServices,
    negotiator: Arc<ProtocolNegotiator>,
    shutdown: ShutdownSignal,
}

impl OcppServer {
    pub fn new(config: ServerConfig, services: OcppServices) -> Self {
        Self {
            config,
            services,
            negotiator: Arc::new(ProtocolNegotiator::default()),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> ServerResult<()> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr).await?;

        info!(address = %addr, "🔌 OCPP Central System started");
        info!(
            subprotocols = ?self.negotiator.supported_subprotocols(),
            "Charge points should connect to ws://{}/ocpp/{{station_id}}",
            addr
        );
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> ServerResult<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = self.shutdown.wait() => {
                    info!("🛑 WebSocket server received shutdown signal");
                    self.graceful_shutdown();
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let services = self.services.clone();
        let negotiator = self.negotiator.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, services, negotiator, shutdown).await {
                warn!(remote = %addr, error = %e, "Connection error");
            }
        });
    }

    fn graceful_shutdown(&self) {
        let count = self.services.sessions.sessions().count();
        if count > 0 {
            info!(count, "📢 Closing connected charge points");
        }
        self.services.sessions.disconnect_all();
        info!("✅ WebSocket server shutdown complete");
    }

    pub fn services(&self) -> &OcppServices {
        &self.services
    }
}

/// Station id from the request path: `/ocpp/{id}` or `/{id}`.
pub fn extract_station_id(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/').trim_end_matches('/');

    if let Some(id) = path.strip_prefix("ocpp/") {
        let id = id.trim_start_matches('/');
        if !id.is_empty() && !id.contains('/') {
            return Some(id.to_string());
        }
        return None;
    }

    if !path.is_empty() && path != "ocpp" && !path.contains('/') {
        return Some(path.to_string());
    }

    None
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    services: OcppServices,
    negotiator: Arc<ProtocolNegotiator>,
    shutdown: ShutdownSignal,
) -> ServerResult<()> {
    debug!(remote = %addr, "New TCP connection");

    let mut path_id: Option<String> = None;
    let mut negotiated: Option<Negotiated> = None;

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut response: Response| {
            let path = req.uri().path();
            let requested = req
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            info!(remote = %addr, path, requested, "WebSocket handshake");

            if let Some(choice) = negotiator.negotiate(requested) {
                if !choice.recognized {
                    warn!(remote = %addr, offered = requested, "No known OCPP subprotocol offered, echoing first");
                }
                if let Ok(value) = HeaderValue::from_str(&choice.subprotocol) {
                    response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                }
                negotiated = Some(choice);
            }

            path_id = extract_station_id(path);
            Ok(response)
        },
    )
    .await?;

    let version = negotiated.map_or(OcppVersion::V16, |n| n.version);
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (close_guard, mut close_rx) = oneshot::channel::<()>();

    let mut handler = OcppHandlerV16::new(services, tx.clone(), version, Some(close_guard));
    if let Some(id) = path_id.as_deref() {
        handler.identify(id)?;
        info!(station_id = id, remote = %addr, %version, "Connected");
    } else {
        info!(remote = %addr, %version, "Connected without station id, awaiting BootNotification");
    }

    // Outgoing message sender task
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            debug!(frame = %msg, "->");
            if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                warn!(error = %e, "Send error");
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let reason = loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    debug!(station_id = ?handler.station_id(), frame = %text, "<-");
                    if let Some(reply) = handler.handle(&text) {
                        if tx.send(reply).is_err() {
                            break "send channel closed";
                        }
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!(station_id = ?handler.station_id(), bytes = data.len(), "Binary message ignored");
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(station_id = ?handler.station_id(), ?frame, "Close frame received");
                    break "closed by charger";
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(station_id = ?handler.station_id(), error = %e, "WebSocket error");
                    break "transport error";
                }
                None => break "closed by charger",
            },
            _ = &mut close_rx => break "session replaced or evicted",
            _ = shutdown.wait() => break "server shutdown",
        }
    };

    info!(station_id = ?handler.station_id(), remote = %addr, reason, "Disconnected");
    handler.close(reason);
    drop(handler);
    drop(tx);
    send_task.abort();
    Ok(())
}
