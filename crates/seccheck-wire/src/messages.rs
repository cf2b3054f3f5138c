//! Protobuf payloads streamed to the consumer.
//!
//! The field layout matches the `gvisor.syscall` and `gvisor.container`
//! packages so existing consumers can decode the stream unchanged.

use prost::{Message, Name};

/// Outcome attached to a syscall event at syscall exit.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Exit {
    /// Return value of the syscall.
    #[prost(int64, tag = "1")]
    pub result: i64,
    /// Error number, zero on success.
    #[prost(int64, tag = "2")]
    pub errorno: i64,
}

impl Name for Exit {
    const NAME: &'static str = "Exit";
    const PACKAGE: &'static str = "gvisor.syscall";
}

/// `open(2)` family event.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Open {
    /// Present only at syscall exit.
    #[prost(message, optional, tag = "1")]
    pub exit: Option<Exit>,
    /// Directory file descriptor for `openat(2)`; `AT_FDCWD` otherwise.
    #[prost(int64, tag = "2")]
    pub fd: i64,
    /// Path as passed by the caller.
    #[prost(string, tag = "3")]
    pub pathname: String,
    /// Open flags.
    #[prost(uint32, tag = "4")]
    pub flags: u32,
    /// Creation mode.
    #[prost(uint32, tag = "5")]
    pub mode: u32,
}

impl Name for Open {
    const NAME: &'static str = "Open";
    const PACKAGE: &'static str = "gvisor.syscall";
}

/// `read(2)` event.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Read {
    /// Present only at syscall exit.
    #[prost(message, optional, tag = "1")]
    pub exit: Option<Exit>,
    /// File descriptor being read.
    #[prost(int64, tag = "2")]
    pub fd: i64,
    /// Requested byte count.
    #[prost(uint64, tag = "3")]
    pub count: u64,
    /// Path backing `fd`, when requested and resolvable.
    #[prost(string, tag = "4")]
    pub fd_path: String,
}

impl Name for Read {
    const NAME: &'static str = "Read";
    const PACKAGE: &'static str = "gvisor.syscall";
}

/// Raw syscall event for syscalls without a dedicated message.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Syscall {
    /// Present only at syscall exit.
    #[prost(message, optional, tag = "1")]
    pub exit: Option<Exit>,
    /// Syscall number in the target ABI.
    #[prost(uint64, tag = "2")]
    pub sysno: u64,
    /// First argument register.
    #[prost(uint64, tag = "3")]
    pub arg1: u64,
    /// Second argument register.
    #[prost(uint64, tag = "4")]
    pub arg2: u64,
    /// Third argument register.
    #[prost(uint64, tag = "5")]
    pub arg3: u64,
    /// Fourth argument register.
    #[prost(uint64, tag = "6")]
    pub arg4: u64,
    /// Fifth argument register.
    #[prost(uint64, tag = "7")]
    pub arg5: u64,
    /// Sixth argument register.
    #[prost(uint64, tag = "8")]
    pub arg6: u64,
}

impl Name for Syscall {
    const NAME: &'static str = "Syscall";
    const PACKAGE: &'static str = "gvisor.syscall";
}

/// Container start event.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Start {
    /// Container identifier.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Working directory of the init process.
    #[prost(string, tag = "2")]
    pub cwd: String,
    /// Init process argv.
    #[prost(string, repeated, tag = "3")]
    pub args: Vec<String>,
    /// Init process environment, when requested.
    #[prost(string, repeated, tag = "4")]
    pub env: Vec<String>,
}

impl Name for Start {
    const NAME: &'static str = "Start";
    const PACKAGE: &'static str = "gvisor.container";
}

impl Syscall {
    /// Builds a raw syscall event from the syscall number and argument registers.
    #[must_use]
    pub const fn new(sysno: u64, args: [u64; 6]) -> Self {
        Self {
            exit: None,
            sysno,
            arg1: args[0],
            arg2: args[1],
            arg3: args[2],
            arg4: args[3],
            arg5: args[4],
            arg6: args[5],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_names_match_the_consumer_table() {
        assert_eq!(Open::full_name(), "gvisor.syscall.Open");
        assert_eq!(Read::full_name(), "gvisor.syscall.Read");
        assert_eq!(Start::full_name(), "gvisor.container.Start");
    }

    #[test]
    fn enter_events_encode_without_exit() {
        let open = Open {
            pathname: "/etc/passwd".into(),
            ..Open::default()
        };
        let decoded = Open::decode(open.encode_to_vec().as_slice()).expect("decode");
        assert!(decoded.exit.is_none());
        assert_eq!(decoded.pathname, "/etc/passwd");
    }
}
