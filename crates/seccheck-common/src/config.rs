//! Configuration models for the remote sender and the consumer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Configuration for a remote sender connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Path of the consumer's listening socket.
    pub socket_path: PathBuf,
    /// Put the connection in non-blocking mode so a full socket buffer
    /// drops the event (and counts it) instead of stalling the caller.
    pub drop_on_backpressure: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(constants::DEFAULT_SOCKET_PATH),
            drop_on_backpressure: false,
        }
    }
}

/// Configuration for the event consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Filesystem path the listening socket is bound to.
    pub socket_path: PathBuf,
    /// `listen(2)` backlog.
    pub backlog: i32,
    /// Readiness events fetched per wait.
    pub poll_events: usize,
    /// Largest frame accepted, header included.
    pub max_event_size: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(constants::DEFAULT_SOCKET_PATH),
            backlog: constants::DEFAULT_BACKLOG,
            poll_events: constants::POLL_EVENTS,
            max_event_size: constants::MAX_EVENT_SIZE,
        }
    }
}
