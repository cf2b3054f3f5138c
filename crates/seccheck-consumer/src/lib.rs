//! # seccheck-consumer
//!
//! Receives checkpoint events streamed by remote senders.
//!
//! One thread accepts connections on a `SOCK_SEQPACKET` listener and
//! registers each with a single epoll instance; one poll thread waits on
//! all of them at once, parses each frame, and hands the decoded event to
//! the handler registered for its type.
//!
//! Malformed frames, unknown types, and closed connections are logged and
//! survived. Only failures to set up the listener are fatal.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod dispatcher;
pub mod output;
pub mod poller;
pub mod server;
pub mod stats;

pub use dispatcher::Dispatcher;
pub use server::Server;
pub use stats::ConsumerStats;
