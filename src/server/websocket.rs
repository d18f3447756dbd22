use crate::models::websocket::{ ClientEvent, ServerEvent };
use crate::relay::RelayCoordinator;
use crate::server::tls::{ load_tls_config, TlsPaths };

use std::error::Error;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::sync::{ broadcast::error::RecvError, mpsc };

use futures::stream::SplitSink;
use futures::{ SinkExt, StreamExt };
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use log::{ info, warn, error };
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::{ accept_async, WebSocketStream };
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Admission and send-rate caps. Zero means no cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsLimits {
    pub max_connections_per_second: u32,
    pub max_messages_per_second: u32,
}

fn limiter(per_second: u32) -> Option<DirectLimiter> {
    NonZeroU32::new(per_second).map(|n| RateLimiter::direct(Quota::per_second(n)))
}

pub async fn start_ws_server(
    addr: &str,
    coordinator: Arc<RelayCoordinator>,
    tls: Option<TlsPaths>,
    limits: WsLimits
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let tls_acceptor = match &tls {
        Some(paths) => Some(TlsAcceptor::from(load_tls_config(paths)?)),
        None => {
            info!("TLS not enabled. Running plain WebSocket (WS) server.");
            None
        }
    };

    let listener = TcpListener::bind(addr).await?;
    let protocol = if tls_acceptor.is_some() { "WSS" } else { "WS" };
    info!("{} server listening on: {}", protocol, listener.local_addr()?);

    serve(listener, coordinator, tls_acceptor, limits).await
}

/// Retries `accept` until it yields a connection. Errors such as running out
/// of file descriptors are logged and must not stop the server.
async fn accept_retrying<F, Fut, T>(mut accept: F) -> T
    where F: FnMut() -> Fut, Fut: Future<Output = io::Result<T>>
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Accept loop. Each connection runs on its own task.
pub async fn serve(
    listener: TcpListener,
    coordinator: Arc<RelayCoordinator>,
    tls_acceptor: Option<TlsAcceptor>,
    limits: WsLimits
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let connection_limiter = limiter(limits.max_connections_per_second);

    loop {
        let (stream, peer) = accept_retrying(|| listener.accept()).await;

        if let Some(limiter) = &connection_limiter {
            if limiter.check().is_err() {
                warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
                continue;
            }
        }

        info!("Incoming connection from: {}", peer);
        let coordinator = Arc::clone(&coordinator);
        let tls_acceptor = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, coordinator, limits).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, coordinator, limits).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    coordinator: Arc<RelayCoordinator>,
    limits: WsLimits
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    match accept_async(stream).await {
        Ok(ws) => {
            handle_connection(peer, ws, coordinator, limits).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

async fn send_event<S>(
    tx: &mut SplitSink<WebSocketStream<S>, WsMessage>,
    event: &ServerEvent
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin
{
    let json = serde_json::to_string(event)?;
    tx.send(WsMessage::Text(json)).await?;
    Ok(())
}

/// Per-connection loop: history first, then client frames, broadcasts and
/// direct replies multiplexed until either side goes away.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    coordinator: Arc<RelayCoordinator>,
    limits: WsLimits
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let (mut tx, mut rx) = websocket.split();
    let connection = coordinator.connect(peer).await;
    let connection_id = connection.id;
    let mut updates = connection.updates;

    if let Err(e) = send_event(&mut tx, &ServerEvent::MessageHistory(connection.history)).await {
        error!("Failed to send message history to {}: {}", peer, e);
        coordinator.disconnect(connection_id).await;
        return;
    }

    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let send_limiter = limiter(limits.max_messages_per_second);

    loop {
        tokio::select! {
            frame = rx.next() => {
                let message = match frame {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        match e {
                            | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                            | tokio_tungstenite::tungstenite::Error::Protocol(_)
                            | tokio_tungstenite::tungstenite::Error::Utf8 => {
                                info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                            }
                            tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                                io_err.kind() == std::io::ErrorKind::ConnectionReset
                            => {
                                info!("WebSocket connection reset by peer {}", peer);
                            }
                            _ => {
                                error!("Error receiving message from {}: {}", peer, e);
                            }
                        }
                        break;
                    }
                    None => break,
                };

                match message {
                    WsMessage::Text(text) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                if let Some(limiter) = &send_limiter {
                                    if limiter.check().is_err() {
                                        warn!("Message rate limit exceeded for {}. Dropping event.", peer);
                                        let _ = direct_tx.send(ServerEvent::Error {
                                            message: "Rate limit exceeded".to_string(),
                                        });
                                        continue;
                                    }
                                }

                                // Runs detached: a disconnect does not cancel it.
                                let coordinator = Arc::clone(&coordinator);
                                let direct_tx = direct_tx.clone();
                                tokio::spawn(async move {
                                    if let Some(reply) = coordinator.dispatch(connection_id, event).await {
                                        let _ = direct_tx.send(reply);
                                    }
                                });
                            }
                            Err(e) => {
                                warn!("Failed to parse message from {}: {}", peer, e);
                                let _ = direct_tx.send(ServerEvent::Error {
                                    message: format!("Failed to parse message: {}", e),
                                });
                            }
                        }
                    }
                    WsMessage::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    // tungstenite queues the pong itself
                    WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                    WsMessage::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    WsMessage::Frame(_) => {}
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(message) => {
                        if let Err(e) = send_event(&mut tx, &ServerEvent::stored(message)).await {
                            error!("Error sending message to {}: {}", peer, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{} fell behind and missed {} broadcast messages", peer, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            Some(event) = direct_rx.recv() => {
                if let Err(e) = send_event(&mut tx, &event).await {
                    error!("Error sending direct message to {}: {}", peer, e);
                    break;
                }
            }
        }
    }

    coordinator.disconnect(connection_id).await;
    info!("WebSocket connection closed for {} ({})", peer, connection_id);
}
