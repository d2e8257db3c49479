//! # XVC Protocol Library
//!
//! Byte-exact framing of the [Xilinx Virtual Cable (XVC)](https://github.com/Xilinx/XilinxVirtualCable)
//! 1.0 protocol, the TCP stand-in for a physical JTAG cable.
//!
//! ## Message Format
//!
//! TCP is a byte stream, so the only boundaries are those implied by fixed and
//! length-prefixed fields:
//!
//! | Command | Client sends | Server replies |
//! |---|---|---|
//! | getinfo | `getinfo:` | `xvcServer_v1.0:<capacity>\n` |
//! | settck | `settck:<period_ns: u32 LE>` | the same 4 bytes |
//! | shift | `shift:<num_bits: u32 LE><TMS><TDI>` | TDO |
//!
//! Each of the TMS, TDI and TDO vectors holds `ceil(num_bits / 8)` bytes, and bit `i`
//! of a vector belongs to TCK cycle `i`.
//!
//! ## Reading Commands
//!
//! [`Message::from_reader`] reassembles short reads and keeps three terminal conditions apart:
//! an orderly end of stream between commands ([`error::ReadError::Closed`]), a stream that
//! ends or fails inside a command ([`error::ReadError::Io`]), and a framing violation.
//!
//! ```
//! use xvc_protocol::Message;
//! use std::io::Cursor;
//!
//! let mut reader = Cursor::new(b"settck:\x64\x00\x00\x00".to_vec());
//! let message = Message::from_reader(&mut reader, 2048).expect("settck should parse");
//! assert_eq!(message, Message::SetTck { period_ns: 100 });
//! ```
//!
//! ## Writing Commands
//!
//! ```
//! use xvc_protocol::Message;
//!
//! let shift = Message::Shift {
//!     num_bits: 4,
//!     tms: vec![0x03].into_boxed_slice(),
//!     tdi: vec![0x0A].into_boxed_slice(),
//! };
//! let mut output = Vec::new();
//! shift.write_to(&mut output).expect("Writing to vector shouldn't fail");
//! assert_eq!(output, b"shift:\x04\x00\x00\x00\x03\x0A");
//! ```
//!
//! ## Scratch Capacity
//!
//! A server announces its capacity in the `getinfo` reply and rejects any shift whose TMS and
//! TDI vectors together exceed it. The rejection happens before the vectors are read, as the
//! stream cannot be resynchronized once the sender has committed to a longer body.

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
