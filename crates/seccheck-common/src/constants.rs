//! System-wide constants and default paths.

/// Socket path used by the consumer and the remote sender when none is given.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/123.sock";

/// Maximum size of a single wire frame, header included.
pub const MAX_EVENT_SIZE: usize = 300 * 1024;

/// Prefix of every envelope type URL; the remainder is the message's full name.
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// Default `listen(2)` backlog for the consumer socket.
pub const DEFAULT_BACKLOG: i32 = 5;

/// Number of readiness events fetched per `epoll_wait(2)` call.
pub const POLL_EVENTS: usize = 64;

/// Number of checkpoints that precede the per-syscall range.
pub const POINTS_BEFORE_SYSCALLS: usize = 4;

/// Number of syscall numbers covered by the enter/exit checkpoint range.
pub const SYSCALL_POINTS: usize = 512;

/// Binary name for the consumer CLI.
pub const BIN_NAME: &str = "seccheck-server";
