//! One command cycle on one connection.
use std::io::{self, Write};

use thiserror::Error;
use xvc_protocol::{Message, XvcInfo, error::ReadError, vector_len};

use crate::{
    XvcServer,
    connection::{Connection, is_shutdown},
};

/// Errors that end a connection.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to read command: {0}")]
    Read(#[source] ReadError),
    #[error("failed to write reply: {0}")]
    Write(#[source] io::Error),
    #[error("backend returned {got} TDO bytes for a {expected} byte shift")]
    ReplyLength { expected: usize, got: usize },
}

/// What the server should do with a connection after a command cycle.
#[derive(Debug)]
pub enum Outcome {
    /// The command was answered, keep watching the connection.
    Continue,
    /// The peer closed the stream between commands.
    Disconnected,
    /// The connection broke or violated the framing and must be closed.
    Failed(CommandError),
    /// Shutdown was requested while waiting for the command's bytes.
    Shutdown,
}

/// Reads one command from `conn`, runs it against `backend` and writes the reply.
///
/// `info` is both the `getinfo` reply and the source of the scratch capacity that bounds a
/// shift's TMS and TDI vectors.
pub fn serve_command<T: XvcServer + ?Sized>(
    backend: &mut T,
    info: &XvcInfo,
    conn: &mut Connection,
) -> Outcome {
    let capacity = info.max_vector_len() as usize;
    conn.begin_command();
    let message = match Message::from_reader(conn, capacity) {
        Ok(message) => message,
        Err(ReadError::Closed) => return Outcome::Disconnected,
        Err(ReadError::Io(err)) if is_shutdown(&err) => return Outcome::Shutdown,
        Err(err) => return Outcome::Failed(CommandError::Read(err)),
    };
    log::debug!("Received command '{}' from {}", message.name(), conn.peer());

    let reply = match message {
        Message::GetInfo => {
            let mut reply = Vec::with_capacity(32);
            // Writing into a Vec cannot fail
            let _ = info.write_to(&mut reply);
            log::debug!(
                "Replied with {}",
                String::from_utf8_lossy(&reply).trim_end()
            );
            reply.into_boxed_slice()
        }
        Message::SetTck { period_ns } => {
            let period = backend.set_tck(period_ns);
            log::debug!("Requested TCK period {} ns, replied {} ns", period_ns, period);
            Box::new(period.to_le_bytes()) as Box<[u8]>
        }
        Message::Shift { num_bits, tms, tdi } => {
            let num_bytes = vector_len(num_bits);
            log::debug!("Shift: num_bits={}, num_bytes={}", num_bits, num_bytes);
            log::trace!("Shift TMS data: {:02x?}", &tms[..]);
            log::trace!("Shift TDI data: {:02x?}", &tdi[..]);
            let tdo = backend.shift(num_bits, tms, tdi);
            log::trace!("Shift result TDO data: {:02x?}", &tdo[..]);
            if tdo.len() != num_bytes {
                return Outcome::Failed(CommandError::ReplyLength {
                    expected: num_bytes,
                    got: tdo.len(),
                });
            }
            tdo
        }
    };

    match conn.write_all(&reply) {
        Ok(()) => Outcome::Continue,
        Err(err) => Outcome::Failed(CommandError::Write(err)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Shutdown, server::Config};
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    /// Answers every shift with the TDI vector and remembers the requested periods.
    #[derive(Default)]
    struct Echo {
        periods: Vec<u32>,
        shifts: usize,
    }

    impl XvcServer for Echo {
        fn set_tck(&mut self, period_ns: u32) -> u32 {
            self.periods.push(period_ns);
            period_ns
        }

        fn shift(&mut self, _num_bits: u32, _tms: Box<[u8]>, tdi: Box<[u8]>) -> Box<[u8]> {
            self.shifts += 1;
            tdi
        }
    }

    /// Loses one byte of every reply.
    struct Truncating;

    impl XvcServer for Truncating {
        fn set_tck(&mut self, period_ns: u32) -> u32 {
            period_ns
        }

        fn shift(&mut self, _num_bits: u32, _tms: Box<[u8]>, tdi: Box<[u8]>) -> Box<[u8]> {
            tdi[1..].into()
        }
    }

    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        let config = Config {
            poll_interval: Duration::from_millis(20),
            read_write_timeout: Duration::from_millis(500),
            ..Config::default()
        };
        client
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        (
            Connection::new(stream, peer, &config, Shutdown::new()).unwrap(),
            client,
        )
    }

    fn read_reply(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut reply = vec![0u8; len];
        client.read_exact(&mut reply).unwrap();
        reply
    }

    #[test]
    fn getinfo_is_stable_across_commands() {
        let (mut conn, mut client) = pair();
        let mut backend = Echo::default();
        let info = XvcInfo::default();

        client.write_all(b"getinfo:settck:\x64\x00\x00\x00getinfo:").unwrap();
        for expected in [
            &b"xvcServer_v1.0:2048\n"[..],
            &[0x64u8, 0x00, 0x00, 0x00],
            b"xvcServer_v1.0:2048\n",
        ] {
            assert!(matches!(
                serve_command(&mut backend, &info, &mut conn),
                Outcome::Continue
            ));
            assert_eq!(read_reply(&mut client, expected.len()), expected);
        }
        assert_eq!(backend.periods, vec![100]);
    }

    #[test]
    fn shift_replies_with_backend_tdo() {
        let (mut conn, mut client) = pair();
        let mut backend = Echo::default();
        let tdi = [0xAA, 0x55, 0xAA, 0x55, 0xAA];
        Message::Shift {
            num_bits: 40,
            tms: vec![0; 5].into_boxed_slice(),
            tdi: tdi.into(),
        }
        .write_to(&mut client)
        .unwrap();

        assert!(matches!(
            serve_command(&mut backend, &XvcInfo::default(), &mut conn),
            Outcome::Continue
        ));
        assert_eq!(read_reply(&mut client, 5), tdi);
        assert_eq!(backend.shifts, 1);
    }

    #[test]
    fn peer_close_between_commands() {
        let (mut conn, client) = pair();
        drop(client);
        assert!(matches!(
            serve_command(&mut Echo::default(), &XvcInfo::default(), &mut conn),
            Outcome::Disconnected
        ));
    }

    #[test]
    fn peer_close_inside_command() {
        let (mut conn, mut client) = pair();
        client.write_all(b"sett").unwrap();
        drop(client);
        assert!(matches!(
            serve_command(&mut Echo::default(), &XvcInfo::default(), &mut conn),
            Outcome::Failed(CommandError::Read(ReadError::Io(_)))
        ));
    }

    #[test]
    fn unknown_token_fails() {
        let (mut conn, mut client) = pair();
        client.write_all(b"xx").unwrap();
        assert!(matches!(
            serve_command(&mut Echo::default(), &XvcInfo::default(), &mut conn),
            Outcome::Failed(CommandError::Read(ReadError::InvalidCommandPrefix(_)))
        ));
    }

    #[test]
    fn oversized_shift_is_rejected_without_reply() {
        let (mut conn, mut client) = pair();
        let mut backend = Echo::default();
        let mut data = b"shift:".to_vec();
        data.extend_from_slice(&(1025u32 * 8).to_le_bytes());
        client.write_all(&data).unwrap();

        assert!(matches!(
            serve_command(&mut backend, &XvcInfo::default(), &mut conn),
            Outcome::Failed(CommandError::Read(ReadError::TooManyBytes { .. }))
        ));
        assert_eq!(backend.shifts, 0);
        drop(conn);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn short_backend_reply_closes_connection() {
        let (mut conn, mut client) = pair();
        Message::Shift {
            num_bits: 16,
            tms: vec![0; 2].into_boxed_slice(),
            tdi: vec![1; 2].into_boxed_slice(),
        }
        .write_to(&mut client)
        .unwrap();
        assert!(matches!(
            serve_command(&mut Truncating, &XvcInfo::default(), &mut conn),
            Outcome::Failed(CommandError::ReplyLength {
                expected: 2,
                got: 1
            })
        ));
    }
}
