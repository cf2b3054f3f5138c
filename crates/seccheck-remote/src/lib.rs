//! # seccheck-remote
//!
//! A [`Checker`] that forwards checkpoint events to an external consumer.
//!
//! Each event is encoded as protobuf, wrapped in a type-tagged envelope,
//! framed, and sent with one vectored write over a `SOCK_SEQPACKET`
//! connection. The transport is best-effort: a failed write drops the event,
//! counts it, and never changes the outcome of the checked operation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;

use std::io::IoSlice;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use nix::sys::socket::{self, AddressFamily, MsgFlags, SockFlag, SockType, UnixAddr};
use prost::Name;
use prost_types::Any;
use seccheck_common::config::RemoteConfig;
use seccheck_common::constants::MAX_EVENT_SIZE;
use seccheck_common::error::{Result, SeccheckError};
use seccheck_core::fields::{ContainerStartFieldSet, SyscallFieldSet};
use seccheck_core::{Checker, TaskContext};
use seccheck_wire::messages::{Open, Read, Start, Syscall};
use seccheck_wire::{EncodedFrame, pack};

pub use crate::error::SendError;

/// Connects a `SOCK_SEQPACKET` socket to the consumer listening at `path`.
///
/// The socket is closed again if the connection fails.
///
/// # Errors
///
/// Returns [`SeccheckError::Socket`] naming the failing step.
pub fn setup(path: &Path) -> Result<OwnedFd> {
    let fd = socket::socket(
        AddressFamily::Unix,
        SockType::SeqPacket,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(|e| SeccheckError::socket("socket", e))?;
    let addr = UnixAddr::new(path).map_err(|e| SeccheckError::socket("connect", e))?;
    socket::connect(fd.as_raw_fd(), &addr).map_err(|e| SeccheckError::socket("connect", e))?;
    tracing::debug!(path = %path.display(), "connected to consumer");
    Ok(fd)
}

/// Checker streaming events over a connection it owns.
#[derive(Debug)]
pub struct Remote {
    endpoint: OwnedFd,
    flags: MsgFlags,
    /// Events lost since the last frame that reached the socket.
    pending_drops: AtomicU32,
    /// Events lost over the sender's lifetime.
    total_drops: AtomicU64,
}

impl Remote {
    /// Wraps an already connected endpoint. Writes block when the socket
    /// buffer is full.
    #[must_use]
    pub fn new(endpoint: OwnedFd) -> Self {
        Self::with_flags(endpoint, MsgFlags::MSG_NOSIGNAL)
    }

    /// Connects according to `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer socket cannot be reached.
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let endpoint = setup(&config.socket_path)?;
        let mut flags = MsgFlags::MSG_NOSIGNAL;
        if config.drop_on_backpressure {
            flags |= MsgFlags::MSG_DONTWAIT;
        }
        Ok(Self::with_flags(endpoint, flags))
    }

    const fn with_flags(endpoint: OwnedFd, flags: MsgFlags) -> Self {
        Self {
            endpoint,
            flags,
            pending_drops: AtomicU32::new(0),
            total_drops: AtomicU64::new(0),
        }
    }

    /// Number of events dropped over this sender's lifetime.
    pub fn dropped(&self) -> u64 {
        self.total_drops.load(Ordering::Relaxed)
    }

    /// Sends `msg`, dropping it on failure.
    fn write<M: Name>(&self, msg: &M) {
        let dropped = self.pending_drops.swap(0, Ordering::AcqRel);
        if let Err(err) = self.write_any(&pack(msg), dropped) {
            let lost = dropped.saturating_add(1);
            let _ = self
                .pending_drops
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    Some(n.saturating_add(lost))
                });
            let _ = self.total_drops.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %err, event = %M::full_name(), "event dropped");
        }
    }

    fn write_any(&self, any: &Any, dropped: u32) -> std::result::Result<(), SendError> {
        let frame = EncodedFrame::new(any, dropped, MAX_EVENT_SIZE)?;
        let iov: [IoSlice<'_>; 2] = frame.io_slices();
        let written =
            socket::sendmsg::<UnixAddr>(self.endpoint.as_raw_fd(), &iov, &[], self.flags, None)
                .map_err(|e| SendError::Io(e.into()))?;
        if written != frame.len() {
            return Err(SendError::Partial {
                written,
                expected: frame.len(),
            });
        }
        Ok(())
    }
}

impl Checker for Remote {
    fn open(&self, _ctx: &TaskContext, _mask: SyscallFieldSet, info: &Open) -> Result<()> {
        tracing::trace!(?info, "remote: open");
        self.write(info);
        Ok(())
    }

    fn read(&self, _ctx: &TaskContext, _mask: SyscallFieldSet, info: &Read) -> Result<()> {
        tracing::trace!(?info, "remote: read");
        self.write(info);
        Ok(())
    }

    fn syscall(&self, _ctx: &TaskContext, _mask: SyscallFieldSet, info: &Syscall) -> Result<()> {
        tracing::trace!(?info, "remote: syscall");
        self.write(info);
        Ok(())
    }

    fn container_start(
        &self,
        _ctx: &TaskContext,
        _mask: ContainerStartFieldSet,
        info: &Start,
    ) -> Result<()> {
        tracing::trace!(?info, "remote: container start");
        self.write(info);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{ErrorKind, Read as _};

    use seccheck_wire::{Event, Frame};

    use super::*;

    fn pair(flags: SockFlag) -> (OwnedFd, File) {
        let (a, b) = socket::socketpair(
            AddressFamily::Unix,
            SockType::SeqPacket,
            None,
            flags | SockFlag::SOCK_CLOEXEC,
        )
        .expect("socketpair");
        (a, File::from(b))
    }

    fn recv_event(peer: &mut File) -> (u32, Event) {
        let mut buf = vec![0u8; MAX_EVENT_SIZE];
        let n = peer.read(&mut buf).expect("read");
        let frame = Frame::parse(&buf[..n], MAX_EVENT_SIZE).expect("frame");
        let event = Event::decode(&frame.envelope().expect("envelope")).expect("event");
        (frame.header.dropped_count, event)
    }

    #[test]
    fn open_is_sent_as_one_frame() {
        let (a, mut peer) = pair(SockFlag::empty());
        let remote = Remote::new(a);
        let open = Open {
            pathname: "/etc/passwd".into(),
            ..Open::default()
        };
        remote
            .open(&TaskContext::default(), SyscallFieldSet::empty(), &open)
            .expect("never vetoes");

        let (dropped, event) = recv_event(&mut peer);
        assert_eq!(dropped, 0);
        assert_eq!(event, Event::Open(open));
    }

    #[test]
    fn write_failures_never_veto() {
        let (a, peer) = pair(SockFlag::empty());
        drop(peer);
        let remote = Remote::new(a);
        let result = remote.read(
            &TaskContext::default(),
            SyscallFieldSet::empty(),
            &Read::default(),
        );
        assert!(result.is_ok());
        assert_eq!(remote.dropped(), 1);
    }

    #[test]
    fn drops_are_reported_in_the_next_frame() {
        let (a, mut peer) = pair(SockFlag::SOCK_NONBLOCK);
        let remote = Remote::with_flags(a, MsgFlags::MSG_NOSIGNAL | MsgFlags::MSG_DONTWAIT);
        let ctx = TaskContext::default();
        let start = Start {
            id: "c1".into(),
            ..Start::default()
        };

        let mut attempts = 0;
        while remote.dropped() == 0 {
            attempts += 1;
            assert!(attempts < 1_000_000, "socket buffer never filled");
            remote
                .container_start(&ctx, ContainerStartFieldSet::empty(), &start)
                .expect("never vetoes");
        }
        let lost = remote.dropped();

        let mut buf = vec![0u8; MAX_EVENT_SIZE];
        loop {
            match peer.read(&mut buf) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => panic!("drain failed: {e}"),
            }
        }

        remote
            .container_start(&ctx, ContainerStartFieldSet::empty(), &start)
            .expect("never vetoes");
        let (dropped, event) = recv_event(&mut peer);
        assert_eq!(u64::from(dropped), lost);
        assert_eq!(event, Event::ContainerStart(start));
    }

    #[test]
    fn setup_fails_without_a_listener() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = setup(&dir.path().join("missing.sock")).expect_err("no listener");
        assert!(matches!(err, SeccheckError::Socket { op: "connect", .. }));
    }
}
