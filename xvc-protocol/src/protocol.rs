use std::fmt::Display;

/// The version of the protocol, made of a major and a minor part.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Version {
    major: usize,
    minor: usize,
}

impl Version {
    /// Version 1.0 of the protocol, the only one spoken by servers in this workspace.
    pub const V1_0: Version = Version { major: 1, minor: 0 };

    pub fn major(&self) -> usize {
        self.major
    }

    pub fn minor(&self) -> usize {
        self.minor
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::V1_0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Number of bytes needed to carry `num_bits` bits of one vector.
pub fn vector_len(num_bits: u32) -> usize {
    num_bits.div_ceil(8) as usize
}

/// One command sent by a client.
///
/// Commands are self-contained: a connection carries no state from one command to the next,
/// and every command is answered before the next one is read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// `getinfo:`. Asks for the server version and its vector capacity.
    GetInfo,
    /// `settck:<period_ns>`. Requests a TCK period in nanoseconds.
    SetTck { period_ns: u32 },
    /// `shift:<num_bits><tms><tdi>`. Clocks `num_bits` bits through the JTAG chain.
    Shift {
        /// Number of TCK cycles to run.
        num_bits: u32,
        /// TMS levels, bit `i` of the vector drives cycle `i`.
        /// Holds [`vector_len`]`(num_bits)` bytes.
        tms: Box<[u8]>,
        /// TDI levels, laid out like `tms`.
        tdi: Box<[u8]>,
    },
}

impl Message {
    /// Name of the command as used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            Message::GetInfo => "getinfo",
            Message::SetTck { .. } => "settck",
            Message::Shift { .. } => "shift",
        }
    }
}

/// Server capabilities returned in reply to [`Message::GetInfo`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct XvcInfo {
    version: Version,
    max_vector_len: u32,
}

impl XvcInfo {
    /// Default scratch capacity in bytes. It bounds the combined TMS and TDI payload of one shift.
    pub const DEFAULT_MAX_VECTOR_LEN: u32 = 2048;

    pub fn new(version: Version, max_vector_len: u32) -> XvcInfo {
        XvcInfo {
            version,
            max_vector_len,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The capacity announced to clients, in bytes.
    pub fn max_vector_len(&self) -> u32 {
        self.max_vector_len
    }
}

impl Default for XvcInfo {
    fn default() -> XvcInfo {
        XvcInfo {
            version: Version::default(),
            max_vector_len: Self::DEFAULT_MAX_VECTOR_LEN,
        }
    }
}
