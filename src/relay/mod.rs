//! The `relay` module carries messages from the queue to consumers.
//!
//! - `message`: the relayed message record.
//! - `filter`: which messages a consumer session may receive.
//! - `session`: the per-consumer polling loop and its reconnect state machine.

pub mod filter;
pub mod message;
pub mod session;

pub use filter::MessageFilter;
pub use message::Message;
pub use session::{
    DeliveryChannel, RelaySession, SessionConfig, SessionReport, SessionState, TerminationReason,
};
