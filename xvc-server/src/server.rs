use std::{
    io::{self, ErrorKind},
    net::{TcpListener, ToSocketAddrs},
    os::fd::AsFd,
    time::Duration,
};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
};
use xvc_protocol::{Version, XvcInfo};

use crate::{
    Shutdown, XvcServer,
    connection::Connection,
    dispatch::{self, Outcome},
};

/// Events a socket is watched for.
const INTEREST: PollFlags = PollFlags::POLLIN.union(PollFlags::POLLPRI);
/// Events that route a socket to accept or to the dispatcher.
const READABLE: PollFlags = PollFlags::POLLIN.union(PollFlags::POLLHUP);
/// Events that close a socket without reading from it.
const EXCEPTIONAL: PollFlags = PollFlags::POLLPRI
    .union(PollFlags::POLLERR)
    .union(PollFlags::POLLNVAL);
/// Events after which the listening socket can no longer accept.
const LISTENER_FAILED: PollFlags = EXCEPTIONAL.union(PollFlags::POLLHUP);

/// Shortest poll interval and socket timeout in use.
pub(crate) const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct Config {
    /// Scratch capacity in bytes. Bounds the TMS and TDI vectors of one shift together and is
    /// announced in the `getinfo` reply.
    pub max_vector_size: u32,
    /// Upper bound of one readiness wait and of one blocking read attempt. Shutdown is noticed
    /// within this interval.
    pub poll_interval: Duration,
    /// Socket write timeout, and how long a command may stall halfway before its connection
    /// is closed.
    pub read_write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_vector_size: XvcInfo::DEFAULT_MAX_VECTOR_LEN,
            poll_interval: Duration::from_secs(1),
            read_write_timeout: Duration::from_secs(30),
        }
    }
}

/// Serves XVC clients on one thread against a single backend.
#[derive(Debug)]
pub struct Server<T: XvcServer> {
    backend: T,
    config: Config,
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use xvc_server::server::Builder;
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .max_vector_size(2048)
///     .poll_interval(Duration::from_millis(250))
///     .build(my_backend);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the scratch capacity, in bytes, for the vectors of one shift.
    pub fn max_vector_size(mut self, size: u32) -> Self {
        self.config.max_vector_size = size;
        self
    }

    /// Set how long one readiness wait or read attempt may block. Intervals below one
    /// millisecond are raised to one millisecond.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the TCP write timeout and the mid-command stall limit.
    pub fn rw_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_write_timeout = timeout;
        self
    }

    pub fn build<T: XvcServer>(self, backend: T) -> Server<T> {
        Server::new(backend, self.config)
    }
}

impl<T: XvcServer> Server<T> {
    pub fn new(backend: T, config: Config) -> Server<T> {
        Server { backend, config }
    }

    /// Gives the backend back, for example to release hardware in a defined order.
    pub fn into_backend(self) -> T {
        self.backend
    }

    /// Binds `addr` and serves until shutdown is requested.
    ///
    /// Failing to bind is returned as an error; errors of individual connections are not.
    pub fn listen(&mut self, addr: impl ToSocketAddrs, shutdown: &Shutdown) -> io::Result<()> {
        let listener = TcpListener::bind(addr)?;
        log::info!("Server listening on {}", listener.local_addr()?);
        self.serve(listener, shutdown)
    }

    /// Runs the readiness loop on an already bound listener.
    ///
    /// Returns when shutdown is requested, or when the listener failed and the last client
    /// is gone. Every open connection is closed on return.
    pub fn serve(&mut self, listener: TcpListener, shutdown: &Shutdown) -> io::Result<()> {
        listener.set_nonblocking(true)?;
        let info = XvcInfo::new(Version::V1_0, self.config.max_vector_size);
        let mut listener = Some(listener);
        let mut clients: Vec<Connection> = Vec::new();

        'serve: while !shutdown.is_requested() {
            if listener.is_none() && clients.is_empty() {
                log::warn!("No listener and no clients left, stopping");
                break;
            }

            let events = {
                let mut fds: Vec<PollFd> = listener
                    .iter()
                    .map(|l| PollFd::new(l.as_fd(), INTEREST))
                    .chain(clients.iter().map(|c| PollFd::new(c.as_fd(), INTEREST)))
                    .collect();
                let timeout = PollTimeout::try_from(self.config.poll_interval.max(MIN_INTERVAL))
                    .unwrap_or(PollTimeout::MAX);
                match poll(&mut fds, timeout) {
                    Ok(0) | Err(Errno::EINTR) => continue,
                    Ok(_) => {}
                    Err(errno) => return Err(errno.into()),
                }
                fds.iter()
                    .map(|fd| fd.revents().unwrap_or(PollFlags::empty()))
                    .collect::<Vec<_>>()
            };
            let (listener_events, client_events) = events.split_at(usize::from(listener.is_some()));

            let mut closed = vec![false; clients.len()];
            for (index, events) in client_events.iter().enumerate() {
                let conn = &mut clients[index];
                if events.intersects(READABLE) {
                    match dispatch::serve_command(&mut self.backend, &info, conn) {
                        Outcome::Continue => {}
                        Outcome::Disconnected => {
                            log::info!("Client {} disconnected", conn.peer());
                            closed[index] = true;
                        }
                        Outcome::Failed(err) => {
                            log::error!("Closing connection to {}: {}", conn.peer(), err);
                            closed[index] = true;
                        }
                        Outcome::Shutdown => break 'serve,
                    }
                } else if events.intersects(EXCEPTIONAL) {
                    log::warn!("Connection to {} aborted", conn.peer());
                    closed[index] = true;
                }
            }
            let mut closed = closed.into_iter();
            clients.retain(|_| !closed.next().unwrap_or(false));

            if let Some(events) = listener_events.first() {
                if events.intersects(LISTENER_FAILED) {
                    log::error!("Listening socket failed, no longer accepting connections");
                    listener = None;
                } else if events.intersects(PollFlags::POLLIN) {
                    if let Some(conn) = listener.as_ref().and_then(|l| self.accept(l, shutdown)) {
                        clients.push(conn);
                    }
                }
            }
        }

        if shutdown.is_requested() {
            log::info!("Shutdown requested, closing {} connection(s)", clients.len());
        }
        Ok(())
    }

    /// Accepts one pending connection. Failures are logged and leave the loop running.
    fn accept(&self, listener: &TcpListener, shutdown: &Shutdown) -> Option<Connection> {
        let (tcp, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
            Err(e) => {
                log::error!("Connection error: {}", e);
                return None;
            }
        };
        log::info!("New client connection from {}", peer);
        if let Err(e) = tcp.set_nodelay(true) {
            log::warn!("Could not disable Nagle's algorithm for {}: {}", peer, e);
        }
        match Connection::new(tcp, peer, &self.config, shutdown.clone()) {
            Ok(conn) => Some(conn),
            Err(e) => {
                log::error!("Could not configure connection from {}: {}", peer, e);
                None
            }
        }
    }
}
