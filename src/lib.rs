//! # PopRelay
//!
//! `poprelay` relays messages from HTTP producers to WebSocket consumers
//! through a durable, bounded queue.
//!
//! ## Core Modules
//!
//! - `persistence`: the ordered-list store behind the queue (`sled` or in-memory).
//! - `queue`: the bounded FIFO queue with retrying connect and push.
//! - `relay`: messages, the consumer filter, and the per-consumer relay session.
//! - `gateway`: producer validation and the HTTP endpoint.
//! - `transport`: the WebSocket listener and delivery channel.
//! - `config`: loading settings from files and the environment.
//! - `utils`: error types and logging setup.

pub mod config;
pub mod gateway;
pub mod persistence;
pub mod queue;
pub mod relay;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_support;
