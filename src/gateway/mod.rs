//! The `gateway` module is the producer side of the relay: message
//! validation and the HTTP endpoint that feeds the queue.

pub mod http;
pub mod producer;

pub use http::{AppState, router, serve};
pub use producer::Producer;
