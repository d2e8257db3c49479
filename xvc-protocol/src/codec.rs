//! Read and write implementations for the protocol messages.
//!
//! Commands are recognized by their first two bytes. The rest of the command name is consumed
//! by length only, so the reader never needs to look ahead in the stream.
use std::io::{self, BufRead, BufReader, Read, Write};

use crate::{
    error::ReadError,
    protocol::{Message, Version, XvcInfo, vector_len},
};

const XVC_INFO_PREFIX: &str = "xvcServer_v";

impl XvcInfo {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writeln!(
            writer,
            "{}{}:{}",
            XVC_INFO_PREFIX,
            self.version(),
            self.max_vector_len()
        )
    }

    /// Parses the `xvcServer_v{version}:{max_vector_len}\n` reply line.
    pub fn from_reader(reader: &mut impl Read) -> Result<XvcInfo, ReadError> {
        let mut buf_reader = BufReader::with_capacity(32, reader);
        let mut line = Vec::with_capacity(32);
        if buf_reader.read_until(b'\n', &mut line)? == 0 {
            return Err(ReadError::Closed);
        }
        let line = str::from_utf8(line.trim_ascii_end())?;

        let rest = line.strip_prefix(XVC_INFO_PREFIX).ok_or_else(|| {
            ReadError::InvalidFormat(format!("Invalid prefix in info message {line:?}"))
        })?;
        let (version, max_vector_len) = rest.split_once(':').ok_or_else(|| {
            ReadError::InvalidFormat("Missing ':' separator in info message".to_string())
        })?;
        let version = match version {
            "1.0" => Version::V1_0,
            other => return Err(ReadError::UnsupportedVersion(other.to_string())),
        };
        Ok(XvcInfo::new(version, max_vector_len.parse::<u32>()?))
    }
}

/// Reads the two-byte command token.
///
/// An orderly end of stream before the first byte is [`ReadError::Closed`];
/// ending after one byte is a short read.
fn read_token(reader: &mut impl Read) -> Result<[u8; 2], ReadError> {
    let mut token = [0u8; 2];
    let mut filled = 0;
    while filled < token.len() {
        match reader.read(&mut token[filled..]) {
            Ok(0) if filled == 0 => return Err(ReadError::Closed),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(token)
}

impl Message {
    const CMD_NAME_GET_INFO: &[u8] = b"getinfo:";
    const CMD_NAME_SET_TCK: &[u8] = b"settck:";
    const CMD_NAME_SHIFT: &[u8] = b"shift:";
    const TOKEN_LEN: usize = 2;

    /// Reads one command.
    ///
    /// `capacity` is the scratch-buffer size in bytes. A shift whose TMS and TDI vectors
    /// together exceed it is rejected right after its length field, before any vector byte
    /// is consumed.
    pub fn from_reader(reader: &mut impl Read, capacity: usize) -> Result<Message, ReadError> {
        // Large enough for the longest fixed-size remainder: "ttck:" + period
        let mut buf = [0u8; 9];
        match &read_token(reader)? {
            b"ge" => {
                reader.read_exact(&mut buf[..Self::CMD_NAME_GET_INFO.len() - Self::TOKEN_LEN])?;
                Ok(Message::GetInfo)
            }
            b"se" => {
                let remainder = Self::CMD_NAME_SET_TCK.len() - Self::TOKEN_LEN;
                reader.read_exact(&mut buf[..remainder + 4])?;
                let mut period = [0u8; 4];
                period.copy_from_slice(&buf[remainder..remainder + 4]);
                Ok(Message::SetTck {
                    period_ns: u32::from_le_bytes(period),
                })
            }
            b"sh" => {
                reader.read_exact(&mut buf[..Self::CMD_NAME_SHIFT.len() - Self::TOKEN_LEN])?;
                let mut len = [0u8; 4];
                reader.read_exact(&mut len)?;
                let num_bits = u32::from_le_bytes(len);

                let num_bytes = vector_len(num_bits);
                let payload = num_bytes.saturating_mul(2);
                if payload > capacity {
                    return Err(ReadError::TooManyBytes {
                        max: capacity,
                        got: payload,
                    });
                }

                let mut vectors = vec![0_u8; payload];
                reader.read_exact(&mut vectors)?;
                let (tms, tdi) = vectors.split_at(num_bytes);
                Ok(Message::Shift {
                    num_bits,
                    tms: tms.into(),
                    tdi: tdi.into(),
                })
            }
            token => Err(ReadError::InvalidCommandPrefix(
                String::from_utf8_lossy(token).to_string(),
            )),
        }
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        match self {
            Message::GetInfo => writer.write_all(Self::CMD_NAME_GET_INFO),
            Message::SetTck { period_ns } => {
                writer.write_all(Self::CMD_NAME_SET_TCK)?;
                writer.write_all(&period_ns.to_le_bytes())
            }
            Message::Shift { num_bits, tms, tdi } => {
                writer.write_all(Self::CMD_NAME_SHIFT)?;
                writer.write_all(&num_bits.to_le_bytes())?;
                writer.write_all(tms)?;
                writer.write_all(tdi)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::error::ReadError;
    use crate::protocol::{Message, XvcInfo};
    use std::io::{self, Cursor, Read};

    const CAPACITY: usize = 2048;

    /// Hands out at most one byte per `read` call, like a peer sending byte by byte.
    struct Trickle<R>(R);

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    fn shift_bytes(num_bits: u32, tms: &[u8], tdi: &[u8]) -> Vec<u8> {
        let mut data = b"shift:".to_vec();
        data.extend_from_slice(&num_bits.to_le_bytes());
        data.extend_from_slice(tms);
        data.extend_from_slice(tdi);
        data
    }

    #[test]
    fn info_line() {
        let mut out = Vec::new();
        XvcInfo::default().write_to(&mut out).unwrap();
        assert_eq!(out, b"xvcServer_v1.0:2048\n".to_vec());

        let info = XvcInfo::from_reader(&mut Cursor::new(out)).unwrap();
        assert_eq!(info, XvcInfo::default());
    }

    #[test]
    fn info_line_with_bad_prefix() {
        let data = b"xvcClient_v1.0:32\n";
        assert!(matches!(
            XvcInfo::from_reader(&mut Cursor::new(data)),
            Err(ReadError::InvalidFormat(_))
        ));
        let data = b"xvcServer_v2.0:32\n";
        assert!(matches!(
            XvcInfo::from_reader(&mut Cursor::new(data)),
            Err(ReadError::UnsupportedVersion(v)) if v == "2.0"
        ));
    }

    #[test]
    fn read_getinfo() {
        let mut cursor = Cursor::new(b"getinfo:".to_vec());
        assert_eq!(
            Message::from_reader(&mut cursor, CAPACITY).unwrap(),
            Message::GetInfo
        );
        assert_eq!(cursor.position(), 8);
    }

    #[test]
    fn getinfo_remainder_is_not_validated() {
        let mut cursor = Cursor::new(b"ge??????".to_vec());
        assert_eq!(
            Message::from_reader(&mut cursor, CAPACITY).unwrap(),
            Message::GetInfo
        );
    }

    #[test]
    fn read_settck() {
        let mut data = b"settck:".to_vec();
        data.extend_from_slice(&[0x64, 0x00, 0x00, 0x00]);
        let mut cursor = Cursor::new(data);
        assert_eq!(
            Message::from_reader(&mut cursor, CAPACITY).unwrap(),
            Message::SetTck { period_ns: 100 }
        );
        assert_eq!(cursor.position(), 11);
    }

    #[test]
    fn read_shift() {
        let tms = [0xAA, 0x01];
        let tdi = [0x55, 0x1F];
        let mut cursor = Cursor::new(shift_bytes(13, &tms, &tdi));
        match Message::from_reader(&mut cursor, CAPACITY).unwrap() {
            Message::Shift {
                num_bits,
                tms: tms_vector,
                tdi: tdi_vector,
            } => {
                assert_eq!(num_bits, 13);
                assert_eq!(&*tms_vector, &tms[..]);
                assert_eq!(&*tdi_vector, &tdi[..]);
            }
            other => panic!("expected Shift, got {:?}", other),
        }
    }

    #[test]
    fn write_then_read_commands() {
        let commands = [
            Message::GetInfo,
            Message::SetTck {
                period_ns: 0x1234_5678,
            },
            Message::Shift {
                num_bits: 40,
                tms: vec![0; 5].into_boxed_slice(),
                tdi: vec![0xAA, 0x55, 0xAA, 0x55, 0xAA].into_boxed_slice(),
            },
        ];
        let mut out = Vec::new();
        for command in &commands {
            command.write_to(&mut out).unwrap();
        }
        let mut cursor = Cursor::new(out);
        for command in &commands {
            assert_eq!(&Message::from_reader(&mut cursor, CAPACITY).unwrap(), command);
        }
        assert!(matches!(
            Message::from_reader(&mut cursor, CAPACITY),
            Err(ReadError::Closed)
        ));
    }

    #[test]
    fn fragmented_delivery_is_reassembled() {
        let tms = [0x00; 5];
        let tdi = [0x55; 5];
        let data = shift_bytes(40, &tms, &tdi);
        let whole = Message::from_reader(&mut Cursor::new(data.clone()), CAPACITY).unwrap();
        let trickled = Message::from_reader(&mut Trickle(Cursor::new(data)), CAPACITY).unwrap();
        assert_eq!(whole, trickled);
    }

    #[test]
    fn clean_eof_is_closed() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(matches!(
            Message::from_reader(&mut cursor, CAPACITY),
            Err(ReadError::Closed)
        ));
    }

    #[test]
    fn eof_inside_command_is_short_read() {
        for data in [&b"g"[..], b"geti", b"settck:\x01", b"shift:\x08\x00\x00\x00\x01"] {
            match Message::from_reader(&mut Cursor::new(data.to_vec()), CAPACITY) {
                Err(ReadError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
                other => panic!("expected short read for {:?}, got {:?}", data, other),
            }
        }
    }

    #[test]
    fn invalid_prefix() {
        let mut cursor = Cursor::new(b"xx".to_vec());
        match Message::from_reader(&mut cursor, CAPACITY) {
            Err(ReadError::InvalidCommandPrefix(p)) => assert_eq!(p, "xx"),
            other => panic!("expected InvalidCommandPrefix, got {:?}", other),
        }
    }

    #[test]
    fn oversized_shift_stops_after_length() {
        // 1025 bytes per vector, 2050 in total
        let num_bits = 1025 * 8;
        let mut data = b"shift:".to_vec();
        data.extend_from_slice(&(num_bits as u32).to_le_bytes());
        data.extend_from_slice(&[0xFF; 64]);
        let mut cursor = Cursor::new(data);
        match Message::from_reader(&mut cursor, CAPACITY) {
            Err(ReadError::TooManyBytes { max, got }) => {
                assert_eq!(max, CAPACITY);
                assert_eq!(got, 2050);
            }
            other => panic!("expected TooManyBytes, got {:?}", other),
        }
        assert_eq!(cursor.position(), 10);
    }

    #[test]
    fn largest_shift_fits() {
        let data = shift_bytes(1024 * 8, &[0x0F; 1024], &[0xF0; 1024]);
        assert!(matches!(
            Message::from_reader(&mut Cursor::new(data), CAPACITY),
            Ok(Message::Shift { num_bits: 8192, .. })
        ));
    }

    #[test]
    fn zero_bit_shift() {
        let data = shift_bytes(0, &[], &[]);
        assert_eq!(
            Message::from_reader(&mut Cursor::new(data), CAPACITY).unwrap(),
            Message::Shift {
                num_bits: 0,
                tms: Box::default(),
                tdi: Box::default(),
            }
        );
    }
}
