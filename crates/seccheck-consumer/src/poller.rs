//! Multiplexed read loop.
//!
//! Every accepted connection is registered with one epoll instance. The
//! poll thread waits on all of them, reads one frame per readiness
//! notification, and closes connections on hang-up or error.

use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use seccheck_common::error::{Result, SeccheckError};
use seccheck_wire::Frame;

use crate::dispatcher::{Dispatched, Dispatcher};
use crate::stats::ConsumerStats;

/// Outcome of reading one message from a connection.
enum ReadOutcome {
    /// A message of this many bytes is in the buffer.
    Message(usize),
    /// Nothing left to read.
    Empty,
    /// The connection failed.
    Failed(std::io::Error),
}

/// Waits on all connections and dispatches their frames.
#[derive(Debug)]
pub struct Poller {
    epoll: Epoll,
    connections: Mutex<HashMap<u64, File>>,
    next_token: AtomicU64,
    dispatcher: Dispatcher,
    stats: Arc<ConsumerStats>,
    max_event_size: usize,
    poll_events: usize,
}

impl Poller {
    /// Creates the epoll instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `epoll_create1(2)` fails.
    pub fn new(
        dispatcher: Dispatcher,
        stats: Arc<ConsumerStats>,
        max_event_size: usize,
        poll_events: usize,
    ) -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| SeccheckError::socket("epoll_create", e))?;
        Ok(Self {
            epoll,
            connections: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
            dispatcher,
            stats,
            max_event_size,
            poll_events: poll_events.max(1),
        })
    }

    /// Starts watching a freshly accepted connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be added to the epoll set;
    /// the connection is closed in that case.
    pub fn register(&self, conn: OwnedFd) -> Result<()> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.lock_connections();
        let event = EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLRDHUP, token);
        self.epoll
            .add(&conn, event)
            .map_err(|e| SeccheckError::socket("epoll_ctl(ADD)", e))?;
        let _ = connections.insert(token, File::from(conn));
        ConsumerStats::bump(&self.stats.connections_accepted);
        tracing::info!(token, "connection accepted");
        Ok(())
    }

    /// Waits for readiness forever.
    ///
    /// Interrupted waits are retried.
    ///
    /// # Errors
    ///
    /// Returns an error only if `epoll_wait(2)` itself fails.
    pub fn run(&self) -> Result<()> {
        let mut events = vec![EpollEvent::empty(); self.poll_events];
        let mut buf = vec![0u8; self.max_event_size];
        loop {
            let ready = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(SeccheckError::socket("epoll_wait", e)),
            };
            for event in &events[..ready] {
                self.handle_readiness(event.data(), event.events(), &mut buf);
            }
        }
    }

    fn handle_readiness(&self, token: u64, flags: EpollFlags, buf: &mut [u8]) {
        if flags.contains(EpollFlags::EPOLLIN) {
            match self.read_message(token, buf) {
                ReadOutcome::Message(n) => self.handle_message(&buf[..n]),
                ReadOutcome::Empty => {}
                ReadOutcome::Failed(err) => {
                    tracing::warn!(token, error = %err, "read failed");
                    self.close(token);
                    return;
                }
            }
        }
        if flags.intersects(EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLHUP) {
            self.drain(token, buf);
            tracing::info!(token, "connection closed");
            self.close(token);
        } else if flags.contains(EpollFlags::EPOLLERR) {
            tracing::warn!(token, "connection error");
            self.close(token);
        }
    }

    /// Consumes whatever the peer queued before hanging up.
    fn drain(&self, token: u64, buf: &mut [u8]) {
        while let ReadOutcome::Message(n) = self.read_message(token, buf) {
            self.handle_message(&buf[..n]);
        }
    }

    fn read_message(&self, token: u64, buf: &mut [u8]) -> ReadOutcome {
        let connections = self.lock_connections();
        let Some(mut conn) = connections.get(&token) else {
            return ReadOutcome::Empty;
        };
        loop {
            return match conn.read(buf) {
                Ok(0) => ReadOutcome::Empty,
                Ok(n) => ReadOutcome::Message(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => ReadOutcome::Empty,
                Err(e) => ReadOutcome::Failed(e),
            };
        }
    }

    /// Parses and dispatches one message. Every failure is logged and the
    /// frame dropped.
    pub(crate) fn handle_message(&self, buf: &[u8]) {
        let frame = match Frame::parse(buf, self.max_event_size) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, len = buf.len(), "dropping frame");
                ConsumerStats::bump(&self.stats.frames_malformed);
                return;
            }
        };
        if frame.header.dropped_count > 0 {
            tracing::warn!(dropped = frame.header.dropped_count, "sender reported dropped events");
            let _ = self
                .stats
                .sender_dropped
                .fetch_add(u64::from(frame.header.dropped_count), Ordering::Relaxed);
        }
        let dispatched = frame
            .envelope()
            .and_then(|any| self.dispatcher.dispatch(&any));
        match dispatched {
            Ok(Dispatched::Handled) => ConsumerStats::bump(&self.stats.frames_handled),
            Ok(Dispatched::Unhandled) => ConsumerStats::bump(&self.stats.frames_unhandled),
            Err(err) => {
                tracing::warn!(error = %err, "dropping frame");
                ConsumerStats::bump(&self.stats.frames_malformed);
            }
        }
    }

    fn close(&self, token: u64) {
        let Some(conn) = self.lock_connections().remove(&token) else {
            return;
        };
        if let Err(err) = self.epoll.delete(&conn) {
            tracing::debug!(token, error = %err, "epoll_ctl(DEL) failed");
        }
        drop(conn);
        ConsumerStats::bump(&self.stats.connections_closed);
        tracing::info!(token, stats = %self.stats.snapshot().to_json(), "connection released");
    }

    fn lock_connections(&self) -> std::sync::MutexGuard<'_, HashMap<u64, File>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
