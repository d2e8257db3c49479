//! # Loopback Backend
//!
//! A software target for running the server without hardware: TDO is wired to TDI, so every
//! shift returns its own TDI vector. The TAP controller state is followed on each rising edge
//! of TCK, which makes the backend useful to watch what a client does.
use crate::{lines::JtagLines, tap::TapState};

#[derive(Debug)]
pub struct LoopbackLines {
    tck: bool,
    tms: bool,
    tdi: bool,
    state: TapState,
    cycles: u64,
}

impl Default for LoopbackLines {
    /// TCK low, TMS high and TDI low, the rest state of a freshly acquired cable.
    fn default() -> Self {
        LoopbackLines {
            tck: false,
            tms: true,
            tdi: false,
            state: TapState::default(),
            cycles: 0,
        }
    }
}

impl LoopbackLines {
    pub fn new() -> LoopbackLines {
        LoopbackLines::default()
    }

    /// TAP controller state after the last rising edge.
    pub fn state(&self) -> TapState {
        self.state
    }

    /// Number of rising edges of TCK seen so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Current levels of TCK, TMS and TDI.
    pub fn levels(&self) -> (bool, bool, bool) {
        (self.tck, self.tms, self.tdi)
    }
}

impl JtagLines for LoopbackLines {
    fn write(&mut self, tck: bool, tms: bool, tdi: bool) {
        if tck && !self.tck {
            let next = self.state.next(tms);
            if next != self.state {
                log::trace!("TAP {} -> {}", self.state, next);
            }
            self.state = next;
            self.cycles += 1;
        }
        self.tck = tck;
        self.tms = tms;
        self.tdi = tdi;
    }

    fn read(&mut self) -> bool {
        self.tdi
    }
}

impl Drop for LoopbackLines {
    fn drop(&mut self) {
        log::debug!(
            "Releasing loopback lines after {} cycles in state {}",
            self.cycles,
            self.state
        );
    }
}
