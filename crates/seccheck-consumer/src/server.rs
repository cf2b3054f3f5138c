//! Listening socket and accept loop.

#![allow(unsafe_code)]

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::socket::{self, AddressFamily, Backlog, SockFlag, SockType, UnixAddr};
use seccheck_common::config::ConsumerConfig;
use seccheck_common::error::{Result, SeccheckError};

use crate::dispatcher::Dispatcher;
use crate::poller::Poller;
use crate::stats::ConsumerStats;

const LISTENER_TOKEN: u64 = 0;
const WAKE_TOKEN: u64 = 1;

/// A bound consumer, ready to accept senders.
#[derive(Debug)]
pub struct Server {
    listener: OwnedFd,
    path: PathBuf,
    poller: Arc<Poller>,
    stats: Arc<ConsumerStats>,
}

impl Server {
    /// Binds the listening socket at `config.socket_path`, replacing any
    /// stale entry left there by a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the socket, bind or listen steps fail.
    pub fn bind(config: &ConsumerConfig, dispatcher: Dispatcher) -> Result<Self> {
        let path = config.socket_path.clone();
        remove_stale(&path)?;

        let listener = socket::socket(
            AddressFamily::Unix,
            SockType::SeqPacket,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(|e| SeccheckError::socket("socket", e))?;
        let addr = UnixAddr::new(path.as_path()).map_err(|e| SeccheckError::socket("bind", e))?;
        socket::bind(listener.as_raw_fd(), &addr).map_err(|e| SeccheckError::socket("bind", e))?;
        let backlog = Backlog::new(config.backlog).map_err(|e| SeccheckError::socket("listen", e))?;
        socket::listen(&listener, backlog).map_err(|e| SeccheckError::socket("listen", e))?;

        let stats = Arc::new(ConsumerStats::default());
        let poller = Poller::new(
            dispatcher,
            Arc::clone(&stats),
            config.max_event_size,
            config.poll_events,
        )?;
        tracing::info!(path = %path.display(), backlog = config.backlog, "listening");
        Ok(Self {
            listener,
            path,
            poller: Arc::new(poller),
            stats,
        })
    }

    /// Path the listener is bound to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared handle to the live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Starts the poll thread and accepts connections until a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll thread cannot be started, if `accept(2)`
    /// fails with anything but an interruption, or as soon as the poll loop
    /// stops.
    pub fn run(self) -> Result<()> {
        self.serve(|poller| poller.run())
    }

    /// Accept loop around an arbitrary poll-thread body.
    ///
    /// The accept thread waits on the listener and on a wake-up socket the
    /// poll thread writes to when it exits, so a failed poll loop stops the
    /// server without waiting for another sender to connect.
    fn serve<F>(self, poll: F) -> Result<()>
    where
        F: FnOnce(&Poller) -> Result<()> + Send + 'static,
    {
        let (wake_rx, wake_tx) = socket::socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::SOCK_CLOEXEC,
        )
        .map_err(|e| SeccheckError::socket("socketpair", e))?;
        let waiter = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| SeccheckError::socket("epoll_create", e))?;
        waiter
            .add(&self.listener, EpollEvent::new(EpollFlags::EPOLLIN, LISTENER_TOKEN))
            .map_err(|e| SeccheckError::socket("epoll_ctl(ADD)", e))?;
        waiter
            .add(&wake_rx, EpollEvent::new(EpollFlags::EPOLLIN, WAKE_TOKEN))
            .map_err(|e| SeccheckError::socket("epoll_ctl(ADD)", e))?;

        let poller = Arc::clone(&self.poller);
        let poll_thread = thread::Builder::new()
            .name("seccheck-poll".into())
            .spawn(move || {
                let _wake = WakeOnExit(File::from(wake_tx));
                let result = poll(&poller);
                if let Err(err) = &result {
                    tracing::error!(error = %err, "poll loop stopped");
                }
                result
            })
            .map_err(|e| SeccheckError::socket("spawn", e))?;

        let mut events = [EpollEvent::empty(); 2];
        loop {
            let ready = match waiter.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(SeccheckError::socket("epoll_wait", e)),
            };
            for event in &events[..ready] {
                if event.data() == WAKE_TOKEN {
                    return match poll_thread.join() {
                        Ok(result) => result,
                        Err(_) => Err(SeccheckError::Config {
                            message: "poll thread panicked".into(),
                        }),
                    };
                }
                self.accept_one()?;
            }
        }
    }

    fn accept_one(&self) -> Result<()> {
        let conn = match socket::accept4(self.listener.as_raw_fd(), SockFlag::SOCK_CLOEXEC) {
            // SAFETY: accept4 returned a fresh descriptor that nothing else owns.
            Ok(raw) => unsafe { OwnedFd::from_raw_fd(raw) },
            Err(Errno::EINTR | Errno::ECONNABORTED) => return Ok(()),
            Err(e) => return Err(SeccheckError::socket("accept", e)),
        };
        if let Err(err) = self.poller.register(conn) {
            tracing::warn!(error = %err, "dropping connection");
        }
        Ok(())
    }
}

/// Wakes the accept thread when the poll thread exits, panics included.
struct WakeOnExit(File);

impl Drop for WakeOnExit {
    fn drop(&mut self) {
        let _ = self.0.write_all(&[1]);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %err, "socket path not removed");
        }
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SeccheckError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
