//! WebSocket transport
//!
//! Accepts consumer connections and runs one [`RelaySession`] per
//! connection. Consumers only listen: every admitted message arrives as one
//! JSON text frame, and anything the consumer sends is ignored. A close
//! frame or read error from the consumer cancels its session.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::queue::BoundedQueue;
use crate::relay::filter::MessageFilter;
use crate::relay::session::{DeliveryChannel, RelaySession, SessionConfig};
use crate::utils::error::DeliveryError;

/// Pause after a failed `accept`, so errors like EMFILE do not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// One consumer's WebSocket, as seen by its relay session.
pub struct WsDelivery {
    peer: String,
    stream: Option<TcpStream>,
    sink: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WsDelivery {
    /// Wrap an accepted TCP connection. `cancel` fires when the consumer goes away.
    pub fn new(stream: TcpStream, peer: String, cancel: CancellationToken) -> Self {
        Self {
            peer,
            stream: Some(stream),
            sink: None,
            reader: None,
            cancel,
        }
    }

    fn sink(&mut self) -> Result<&mut WsSink, DeliveryError> {
        self.sink.as_mut().ok_or(DeliveryError::NotConnected)
    }
}

#[async_trait]
impl DeliveryChannel for WsDelivery {
    async fn handshake(&mut self) -> Result<(), DeliveryError> {
        let stream = self.stream.take().ok_or(DeliveryError::NotConnected)?;
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| DeliveryError::Handshake(e.to_string()))?;
        let (sink, mut source) = ws_stream.split();
        self.sink = Some(sink);

        let peer = self.peer.clone();
        let cancel = self.cancel.clone();
        self.reader = Some(tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(%peer, "read error: {e}");
                        break;
                    }
                }
            }
            debug!(%peer, "consumer went away");
            cancel.cancel();
        }));

        Ok(())
    }

    async fn deliver(&mut self, frame: &str) -> Result<(), DeliveryError> {
        self.sink()?.send(WsMessage::text(frame.to_owned())).await?;
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), DeliveryError> {
        // The consumer owns the connection, so the best we can do is check it still carries frames.
        self.sink()?.send(WsMessage::Ping(Default::default())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                debug!(peer = %self.peer, "close failed: {e}");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        info!(peer = %self.peer, "websocket is closed");
    }
}

/// Accept consumers on `listener` until `shutdown` fires.
///
/// Returns once every session it started has terminated, so the queue can be
/// disconnected safely afterwards.
pub async fn start_websocket_server(
    listener: TcpListener,
    queue: Arc<BoundedQueue>,
    filter: MessageFilter,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    match listener.local_addr() {
        Ok(addr) => info!("WebSocket server listening on ws://{addr}"),
        Err(e) => warn!("WebSocket server listening on an unknown address: {e}"),
    }

    let sessions = TaskTracker::new();
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept consumer: {e}");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => continue,
                }
            }
        };

        let session_id = format!("client-{}", uuid::Uuid::new_v4());
        let cancel = shutdown.child_token();
        let channel = WsDelivery::new(stream, peer.to_string(), cancel.clone());
        let session = RelaySession::new(
            session_id.clone(),
            channel,
            queue.clone(),
            filter.clone(),
            config.clone(),
            cancel,
        );

        info!(session = %session_id, %peer, "consumer connecting");
        sessions.spawn(session.run());
    }

    sessions.close();
    debug!(remaining = sessions.len(), "waiting for consumer sessions");
    sessions.wait().await;
    info!("WebSocket server stopped");
}
