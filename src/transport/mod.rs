//! The `transport` module connects consumer sessions to the network.
//!
//! It implements the WebSocket delivery channel and the listener that
//! starts one relay session per consumer connection.

pub mod websocket;

pub use websocket::{WsDelivery, start_websocket_server};
