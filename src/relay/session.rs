//! Consumer relay session
//!
//! A session moves one consumer through
//! `Connecting -> Active -> (Reconnecting -> Active)* -> Terminated`:
//!
//! - `Connecting`: handshake with the delivery channel; failure ends the session.
//! - `Active`: pop one entry, deliver it if the filter admits it, then sleep
//!   for the poll interval whether or not anything arrived.
//! - `Reconnecting`: entered when a delivery fails; up to
//!   `reconnect_max_attempts` tries to revive the channel. Entries that
//!   arrive meanwhile are not replayed.
//! - `Terminated`: absorbing. The channel is closed and `run` returns.
//!
//! Cancellation is checked at every suspension point: the pop wait, the poll
//! sleep and the reconnect sleep.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{QueueSettings, RelaySettings};
use crate::queue::BoundedQueue;
use crate::relay::filter::MessageFilter;
use crate::utils::error::DeliveryError;

/// The consumer side of a session, e.g. a WebSocket.
#[async_trait]
pub trait DeliveryChannel: Send {
    async fn handshake(&mut self) -> Result<(), DeliveryError>;

    /// Send one serialized message as one frame.
    async fn deliver(&mut self, frame: &str) -> Result<(), DeliveryError>;

    /// Try to bring a failed channel back.
    async fn reconnect(&mut self) -> Result<(), DeliveryError>;

    /// Close the channel if it is still open. Never fails.
    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Reconnecting,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    HandshakeFailed,
    ReconnectExhausted,
    Cancelled,
}

/// Summary returned when a session terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: String,
    pub reason: TerminationReason,
    pub delivered: u64,
    pub reconnect_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub pop_timeout: Duration,
    pub poll_interval: Duration,
    pub reconnect_max_attempts: u32,
    pub reconnect_delay: Duration,
}

impl SessionConfig {
    pub fn from_settings(relay: &RelaySettings, queue: &QueueSettings) -> Self {
        Self {
            pop_timeout: Duration::from_secs(queue.pop_timeout_secs),
            poll_interval: Duration::from_secs(relay.poll_interval_secs),
            reconnect_max_attempts: relay.reconnect_max_attempts,
            reconnect_delay: Duration::from_secs(relay.reconnect_delay_secs),
        }
    }
}

pub struct RelaySession<C> {
    id: String,
    channel: C,
    queue: Arc<BoundedQueue>,
    filter: MessageFilter,
    config: SessionConfig,
    cancel: CancellationToken,
    reason: TerminationReason,
    delivered: u64,
    reconnect_attempts: u32,
}

impl<C: DeliveryChannel> RelaySession<C> {
    pub fn new(
        id: impl Into<String>,
        channel: C,
        queue: Arc<BoundedQueue>,
        filter: MessageFilter,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            channel,
            queue,
            filter,
            config,
            cancel,
            reason: TerminationReason::Cancelled,
            delivered: 0,
            reconnect_attempts: 0,
        }
    }

    /// Drive the session until it terminates.
    pub async fn run(mut self) -> SessionReport {
        let mut state = SessionState::Connecting;
        while state != SessionState::Terminated {
            state = self.step(state).await;
        }

        self.channel.close().await;
        info!(
            session = %self.id,
            reason = ?self.reason,
            delivered = self.delivered,
            "session terminated"
        );

        SessionReport {
            id: self.id,
            reason: self.reason,
            delivered: self.delivered,
            reconnect_attempts: self.reconnect_attempts,
        }
    }

    async fn step(&mut self, state: SessionState) -> SessionState {
        match state {
            SessionState::Connecting => self.connect().await,
            SessionState::Active => self.relay_once().await,
            SessionState::Reconnecting => self.reconnect().await,
            SessionState::Terminated => SessionState::Terminated,
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> SessionState {
        self.reason = reason;
        SessionState::Terminated
    }

    async fn connect(&mut self) -> SessionState {
        match self.channel.handshake().await {
            Ok(()) => {
                info!(session = %self.id, "consumer connected");
                SessionState::Active
            }
            Err(e) => {
                warn!(session = %self.id, "handshake failed: {e}");
                self.terminate(TerminationReason::HandshakeFailed)
            }
        }
    }

    async fn relay_once(&mut self) -> SessionState {
        let popped = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            popped = self.queue.pop(self.config.pop_timeout) => Some(popped),
        };
        let Some(popped) = popped else {
            return self.terminate(TerminationReason::Cancelled);
        };

        let message = popped.unwrap_or_else(|e| {
            warn!(session = %self.id, "{e}; treating as empty");
            None
        });

        if let Some(message) = message {
            if self.filter.admits(&message) {
                match serde_json::to_string(&message) {
                    Ok(frame) => {
                        if let Err(e) = self.channel.deliver(&frame).await {
                            warn!(session = %self.id, "delivery failed: {e}");
                            return SessionState::Reconnecting;
                        }
                        self.delivered += 1;
                        info!(session = %self.id, "delivered: {frame}");
                    }
                    Err(e) => error!(session = %self.id, "failed to serialize message: {e}"),
                }
            } else {
                debug!(session = %self.id, kind = ?message.kind, "message filtered out");
            }
        }

        debug!(session = %self.id, "sleeping {:?}", self.config.poll_interval);
        if pause(&self.cancel, self.config.poll_interval).await {
            SessionState::Active
        } else {
            self.terminate(TerminationReason::Cancelled)
        }
    }

    async fn reconnect(&mut self) -> SessionState {
        let max = self.config.reconnect_max_attempts;
        for attempt in 1..=max {
            if self.cancel.is_cancelled() {
                return self.terminate(TerminationReason::Cancelled);
            }

            self.reconnect_attempts += 1;
            match self.channel.reconnect().await {
                Ok(()) => {
                    info!(session = %self.id, attempt, "delivery channel re-established");
                    return SessionState::Active;
                }
                Err(e) => warn!(session = %self.id, attempt, "reconnect failed: {e}"),
            }

            if attempt < max && !pause(&self.cancel, self.config.reconnect_delay).await {
                return self.terminate(TerminationReason::Cancelled);
            }
        }

        error!(session = %self.id, "giving up after {max} reconnect attempts");
        self.terminate(TerminationReason::ReconnectExhausted)
    }
}

/// Sleep for `duration`. `false` if `cancel` fired meanwhile.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
