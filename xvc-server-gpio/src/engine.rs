//! Bit-banged JTAG shifts.
//!
//! A shift is processed in 32-bit words: four bytes of TMS and TDI are loaded little-endian,
//! clocked out LSB first, and the sampled TDO bits are stored back as four bytes. The last word
//! covers only the remaining `1..=4` bytes and runs exactly as many cycles as bits are left.
//!
//! Every bit takes two writes: TCK low with the new TMS/TDI levels, then TCK high. TDO is
//! sampled right after the rising edge. Each write is followed by a spin of `delay` iterations,
//! so the resulting TCK frequency depends on the host and on the delay together.
use xvc_protocol::vector_len;
use xvc_server::XvcServer;

use crate::lines::JtagLines;

/// Delay coefficient used when none is configured.
pub const DEFAULT_DELAY: u32 = 40;

/// Spins for `cycles` iterations without yielding to the scheduler.
fn spin(cycles: u32) {
    for _ in 0..cycles {
        std::hint::spin_loop();
    }
}

/// Loads up to four bytes as a little-endian word, zero-extended.
fn le_word(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf[..bytes.len()].copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Drives [`JtagLines`] through XVC shift operations.
pub struct BitBang<L> {
    lines: L,
    delay: u32,
}

impl<L: JtagLines> BitBang<L> {
    pub fn new(lines: L, delay: u32) -> BitBang<L> {
        BitBang { lines, delay }
    }

    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn lines(&self) -> &L {
        &self.lines
    }

    pub fn into_lines(self) -> L {
        self.lines
    }

    fn write(&mut self, tck: bool, tms: bool, tdi: bool) {
        self.lines.write(tck, tms, tdi);
        spin(self.delay);
    }

    /// Clocks the `n` low bits of `tms` and `tdi` and returns the sampled TDO bits.
    fn transfer(&mut self, n: u32, mut tms: u32, mut tdi: u32) -> u32 {
        let mut tdo = 0;
        for i in 0..n {
            let tms_bit = tms & 1 == 1;
            let tdi_bit = tdi & 1 == 1;
            self.write(false, tms_bit, tdi_bit);
            self.write(true, tms_bit, tdi_bit);
            if self.lines.read() {
                tdo |= 1 << i;
            }
            tms >>= 1;
            tdi >>= 1;
        }
        tdo
    }

    /// Shifts `num_bits` bits and returns the TDO vector.
    ///
    /// `tms` and `tdi` hold exactly `ceil(num_bits / 8)` bytes, as checked by
    /// [`XvcServer::shift`]. The lines are left with TCK low, TMS high and TDI low.
    pub(crate) fn shift_vectors(&mut self, num_bits: u32, tms: &[u8], tdi: &[u8]) -> Box<[u8]> {
        let mut tdo = vec![0u8; vector_len(num_bits)].into_boxed_slice();
        if num_bits == 0 {
            return tdo;
        }

        // Present the first bit before the first rising edge
        self.write(false, tms[0] & 1 == 1, tdi[0] & 1 == 1);

        let mut bits_left = num_bits;
        for ((tms, tdi), tdo) in tms.chunks(4).zip(tdi.chunks(4)).zip(tdo.chunks_mut(4)) {
            let n = bits_left.min(32);
            let (tms_word, tdi_word) = (le_word(tms), le_word(tdi));
            let tdo_word = self.transfer(n, tms_word, tdi_word);
            tdo.copy_from_slice(&tdo_word.to_le_bytes()[..tdo.len()]);
            log::trace!("LEN : 0x{:08x}", n);
            log::trace!("TMS : 0x{:08x}", tms_word);
            log::trace!("TDI : 0x{:08x}", tdi_word);
            log::trace!("TDO : 0x{:08x}", tdo_word);
            bits_left -= n;
        }

        self.write(false, true, false);
        tdo
    }
}

impl<L: JtagLines> XvcServer for BitBang<L> {
    /// The requested period is acknowledged but not applied: pacing is set by the delay
    /// coefficient alone.
    fn set_tck(&mut self, period_ns: u32) -> u32 {
        log::debug!(
            "Requested TCK period {} ns, keeping delay coefficient {}",
            period_ns,
            self.delay
        );
        period_ns
    }

    fn shift(&mut self, num_bits: u32, tms: Box<[u8]>, tdi: Box<[u8]>) -> Box<[u8]> {
        let num_bytes = vector_len(num_bits);
        if tms.len() != num_bytes || tdi.len() != num_bytes {
            log::error!(
                "Vector size mismatch: expected {} bytes, got TMS {} and TDI {}",
                num_bytes,
                tms.len(),
                tdi.len()
            );
            // The protocol has no error reply, the server closes the connection instead
            return Box::default();
        }
        self.shift_vectors(num_bits, &tms, &tdi)
    }
}
