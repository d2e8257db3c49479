//! Client sockets as seen by the dispatcher.
//!
//! A [`Connection`] is a blocking stream with a short read timeout. Every timed-out or
//! interrupted read checks the [`Shutdown`] flag before retrying, so a command that is waiting
//! for the rest of its bytes unwinds promptly once shutdown is requested.
//!
//! All reads of one command share a single deadline, armed by [`Connection::begin_command`].
//! A peer that keeps trickling bytes cannot hold the server beyond it.
use std::{
    io::{self, ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream},
    os::fd::{AsFd, BorrowedFd},
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    Shutdown,
    server::{Config, MIN_INTERVAL},
};

/// Marker carried by the I/O error a read returns when it gave up because of shutdown.
#[derive(Debug, Error)]
#[error("shutdown requested")]
pub struct ShutdownRequested;

/// Returns true if `err` was produced by a read that observed the shutdown flag.
pub fn is_shutdown(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<ShutdownRequested>())
}

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: Shutdown,
    stall_timeout: Duration,
    deadline: Option<Instant>,
}

impl Connection {
    /// Prepares an accepted stream: blocking mode, read timeout of one poll interval and the
    /// configured write timeout.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        config: &Config,
        shutdown: Shutdown,
    ) -> io::Result<Connection> {
        stream.set_nonblocking(false)?;
        // A zero timeout is rejected by the socket layer
        stream.set_read_timeout(Some(config.poll_interval.max(MIN_INTERVAL)))?;
        stream.set_write_timeout(Some(config.read_write_timeout.max(MIN_INTERVAL)))?;
        Ok(Connection {
            stream,
            peer,
            shutdown,
            stall_timeout: config.read_write_timeout,
            deadline: None,
        })
    }

    /// Starts the stall deadline for the next command. Reads issued before the first call
    /// arm it themselves.
    pub fn begin_command(&mut self) {
        self.deadline = Some(Instant::now() + self.stall_timeout);
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let stall_timeout = self.stall_timeout;
        let deadline = *self
            .deadline
            .get_or_insert_with(|| Instant::now() + stall_timeout);
        loop {
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("command from {} not complete within {:?}", self.peer, stall_timeout),
                ));
            }
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    if self.shutdown.is_requested() {
                        return Err(io::Error::other(ShutdownRequested));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}
