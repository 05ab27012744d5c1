//! The `queue` module provides the bounded, retrying FIFO queue that sits
//! between producers and consumer sessions.
//!
//! The queue keeps no data of its own. It holds a queue name and a
//! connection handle to a [`ListStore`](crate::persistence::ListStore), and
//! turns store faults into plain results: `bool` for connect, disconnect and
//! push, `None` for pop and `0` for size. A pop that overruns its deadline is
//! the only fault reported as an error.

pub mod bounded;

pub use bounded::{BoundedQueue, PopOutcome, QueueConfig};

#[cfg(test)]
mod tests;
