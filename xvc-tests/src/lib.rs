//! Fixtures shared by the end-to-end tests: a server on a background thread, a blocking
//! client and a JTAG line double that journals every operation.
use std::{
    io::{self, ErrorKind, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    os::fd::AsRawFd,
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};

use nix::sys::socket::{MsgFlags, send};
use xvc_protocol::{Message, XvcInfo, vector_len};
use xvc_server::{Shutdown, XvcServer, server::Builder};
use xvc_server_gpio::lines::JtagLines;

/// A server running on its own thread, bound to an ephemeral loopback port.
pub struct TestServer<T> {
    addr: SocketAddr,
    shutdown: Shutdown,
    handle: Option<JoinHandle<(io::Result<()>, T)>>,
}

impl<T: XvcServer + Send + 'static> TestServer<T> {
    pub fn spawn(backend: T) -> TestServer<T> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let flag = shutdown.clone();
        let handle = thread::spawn(move || {
            let mut server = Builder::new()
                .poll_interval(Duration::from_millis(50))
                .rw_timeout(Duration::from_secs(2))
                .build(backend);
            let result = server.serve(listener, &flag);
            (result, server.into_backend())
        });
        TestServer {
            addr,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn connect(&self) -> Client {
        Client::connect(self.addr)
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Requests shutdown and returns the backend once the loop has unwound.
    pub fn stop(mut self) -> T {
        self.shutdown.request();
        let (result, backend) = self
            .handle
            .take()
            .expect("server thread already joined")
            .join()
            .expect("server thread panicked");
        result.expect("server loop failed");
        backend
    }

    /// Waits for the loop to finish on its own, failing after `timeout`.
    pub fn join_within(mut self, timeout: Duration) -> T {
        let handle = self.handle.take().expect("server thread already joined");
        let deadline = std::time::Instant::now() + timeout;
        while !handle.is_finished() {
            assert!(
                std::time::Instant::now() < deadline,
                "server did not stop within {:?}",
                timeout
            );
            thread::sleep(Duration::from_millis(10));
        }
        let (result, backend) = handle.join().expect("server thread panicked");
        result.expect("server loop failed");
        backend
    }
}

impl<T> Drop for TestServer<T> {
    fn drop(&mut self) {
        self.shutdown.request();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Blocking XVC client that waits for every reply.
pub struct Client {
    tcp: TcpStream,
}

impl Client {
    pub fn connect(addr: SocketAddr) -> Client {
        let tcp = TcpStream::connect(addr).unwrap();
        tcp.set_nodelay(true).unwrap();
        tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        Client { tcp }
    }

    /// Sends raw bytes.
    pub fn send(&mut self, bytes: &[u8]) {
        self.tcp.write_all(bytes).unwrap();
    }

    /// Sends raw bytes one at a time, pausing between them.
    pub fn trickle(&mut self, bytes: &[u8], pause: Duration) {
        for byte in bytes {
            self.tcp.write_all(&[*byte]).unwrap();
            thread::sleep(pause);
        }
    }

    /// Sends `byte` as TCP urgent data.
    pub fn send_urgent(&mut self, byte: u8) {
        send(self.tcp.as_raw_fd(), &[byte], MsgFlags::MSG_OOB).unwrap();
    }

    pub fn read_reply(&mut self, len: usize) -> Vec<u8> {
        let mut reply = vec![0u8; len];
        self.tcp.read_exact(&mut reply).unwrap();
        reply
    }

    pub fn get_info(&mut self) -> XvcInfo {
        Message::GetInfo.write_to(&mut self.tcp).unwrap();
        XvcInfo::from_reader(&mut self.tcp).unwrap()
    }

    pub fn set_tck(&mut self, period_ns: u32) -> Vec<u8> {
        Message::SetTck { period_ns }.write_to(&mut self.tcp).unwrap();
        self.read_reply(4)
    }

    pub fn shift(&mut self, num_bits: u32, tms: &[u8], tdi: &[u8]) -> Vec<u8> {
        Message::Shift {
            num_bits,
            tms: tms.into(),
            tdi: tdi.into(),
        }
        .write_to(&mut self.tcp)
        .unwrap();
        self.read_reply(vector_len(num_bits))
    }

    /// Reads until the server closes the connection and returns whatever arrived first.
    pub fn drain_until_closed(&mut self) -> Vec<u8> {
        let mut rest = Vec::new();
        match self.tcp.read_to_end(&mut rest) {
            Ok(_) => rest,
            Err(e) if e.kind() == ErrorKind::ConnectionReset => rest,
            Err(e) => panic!("connection was not closed: {}", e),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    ShiftStart { num_bits: u32 },
    ShiftEnd,
    Write { tck: bool, tms: bool, tdi: bool },
    Read,
}

/// Ordered log of line operations; an event's index is its sequence number.
#[derive(Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap()
    }
}

/// Line double with TDO wired to TDI that journals every write and read.
pub struct JournalLines {
    journal: Journal,
    tdi: bool,
}

impl JournalLines {
    pub fn new(journal: Journal) -> JournalLines {
        JournalLines {
            journal,
            tdi: false,
        }
    }
}

impl JtagLines for JournalLines {
    fn write(&mut self, tck: bool, tms: bool, tdi: bool) {
        self.journal.record(Event::Write { tck, tms, tdi });
        self.tdi = tdi;
    }

    fn read(&mut self) -> bool {
        self.journal.record(Event::Read);
        self.tdi
    }
}

/// Brackets every shift of the wrapped backend with start and end events.
pub struct Bracketed<T> {
    inner: T,
    journal: Journal,
}

impl<T> Bracketed<T> {
    pub fn new(inner: T, journal: Journal) -> Bracketed<T> {
        Bracketed { inner, journal }
    }
}

impl<T: XvcServer> XvcServer for Bracketed<T> {
    fn set_tck(&mut self, period_ns: u32) -> u32 {
        self.inner.set_tck(period_ns)
    }

    fn shift(&mut self, num_bits: u32, tms: Box<[u8]>, tdi: Box<[u8]>) -> Box<[u8]> {
        self.journal.record(Event::ShiftStart { num_bits });
        let tdo = self.inner.shift(num_bits, tms, tdi);
        self.journal.record(Event::ShiftEnd);
        tdo
    }
}
