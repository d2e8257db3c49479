//! # XVC Server over GPIO
//!
//! Bit-banged JTAG for the [`xvc_server`](https://docs.rs/xvc-server/) core. The four JTAG
//! signals are toggled from software through general-purpose I/O lines, which turns a board
//! such as a Raspberry Pi into a network JTAG cable.
//!
//! ## Overview
//!
//! - [`lines::JtagLines`] abstracts the TCK, TMS, TDI outputs and the TDO input.
//! - [`engine::BitBang`] runs XVC shifts on any [`lines::JtagLines`] and implements
//!   [`xvc_server::XvcServer`].
//! - [`backends`] provides the Raspberry Pi GPIO lines and a loopback target.
//!
//! ## Timing
//!
//! There is no clock hardware involved. Each line write is followed by a busy-wait of a
//! configurable number of spin iterations (the delay coefficient), so the TCK frequency is set
//! by the host speed and the coefficient together. Scheduler sleeps are far too coarse for this.
//! Raise the coefficient for long or noisy cables. The `settck` command is acknowledged but
//! does not change the pacing.
pub mod backends;
pub mod engine;
pub mod lines;
pub mod tap;
