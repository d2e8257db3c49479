//! # XVC Server Library
//!
//! A Xilinx Virtual Cable (XVC) server core that lets many TCP clients share one JTAG backend.
//!
//! ## Architecture
//!
//! - **[`XvcServer`] trait**: the backend that performs TCK configuration and vector shifting.
//! - **[`dispatch`]**: decodes one command from a connection and writes the reply.
//! - **[`server::Server`]**: owns the listening socket and every client socket, waits for
//!   readiness with `poll(2)` and routes each readable socket to the dispatcher.
//! - **[`Shutdown`]**: the cancellation flag observed by the readiness loop and by every
//!   blocking read.
//!
//! ## Thread Model
//!
//! Everything runs on the calling thread. A command, including its shift, always completes
//! before the next readable socket is serviced, so at most one shift is in flight and the
//! backend timing is never perturbed by other connections. Backends receive `&mut self`, which
//! makes this a property of the borrow checker rather than of a lock.
//!
//! ## Starting the Server
//!
//! ```ignore
//! use xvc_server::{Shutdown, server::Builder};
//!
//! let shutdown = Shutdown::new();
//! let mut server = Builder::new().max_vector_size(2048).build(my_backend);
//! server.listen("0.0.0.0:2542", &shutdown)?;
//! ```
//!
//! ## Error Handling
//!
//! Errors in one connection (framing violations, short reads, failed writes) close that
//! connection only. Failing to set up the listening socket is returned to the caller.
//! Shift operations have no error channel in XVC 1.0, so backends absorb line failures.
//!
//! ## Logging
//!
//! Diagnostics go through the `log` crate: connections and closes at `info`, commands at
//! `debug`, vector contents at `trace`.
pub mod connection;
pub mod dispatch;
pub mod server;
mod shutdown;

pub use shutdown::Shutdown;

/// The JTAG backend driven by the server.
pub trait XvcServer {
    /// Handles a requested TCK period and returns the period reported back to the client.
    ///
    /// Backends that cannot pace the clock acknowledge by returning `period_ns` unchanged.
    fn set_tck(&mut self, period_ns: u32) -> u32;

    /// Clocks `num_bits` cycles through the JTAG chain and returns the sampled TDO vector.
    ///
    /// `tms` and `tdi` hold `ceil(num_bits / 8)` bytes each, and the result must have the same
    /// length. A shift that has started runs to completion.
    fn shift(&mut self, num_bits: u32, tms: Box<[u8]>, tdi: Box<[u8]>) -> Box<[u8]>;
}
