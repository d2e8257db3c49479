//! The IEEE 1149.1 TAP controller, followed one TCK rising edge at a time.
use std::fmt::Display;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum TapState {
    #[default]
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl TapState {
    /// The state entered on the next rising edge of TCK with the given TMS level.
    pub fn next(self, tms: bool) -> TapState {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, false) => RunTestIdle,
            (TestLogicReset, true) => TestLogicReset,
            (RunTestIdle, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,
            (SelectDrScan, false) => CaptureDr,
            (SelectDrScan, true) => SelectIrScan,
            (CaptureDr, false) => ShiftDr,
            (CaptureDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (Exit1Dr, false) => PauseDr,
            (Exit1Dr, true) => UpdateDr,
            (PauseDr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (Exit2Dr, false) => ShiftDr,
            (Exit2Dr, true) => UpdateDr,
            (UpdateDr, false) => RunTestIdle,
            (UpdateDr, true) => SelectDrScan,
            (SelectIrScan, false) => CaptureIr,
            (SelectIrScan, true) => TestLogicReset,
            (CaptureIr, false) => ShiftIr,
            (CaptureIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (Exit1Ir, false) => PauseIr,
            (Exit1Ir, true) => UpdateIr,
            (PauseIr, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (Exit2Ir, false) => ShiftIr,
            (Exit2Ir, true) => UpdateIr,
            (UpdateIr, false) => RunTestIdle,
            (UpdateIr, true) => SelectDrScan,
        }
    }

    /// True for the two states in which TDI is shifted into a register.
    pub fn is_shift(self) -> bool {
        matches!(self, TapState::ShiftDr | TapState::ShiftIr)
    }
}

impl Display for TapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TapState::TestLogicReset => "Test-Logic-Reset",
            TapState::RunTestIdle => "Run-Test/Idle",
            TapState::SelectDrScan => "Select-DR-Scan",
            TapState::CaptureDr => "Capture-DR",
            TapState::ShiftDr => "Shift-DR",
            TapState::Exit1Dr => "Exit1-DR",
            TapState::PauseDr => "Pause-DR",
            TapState::Exit2Dr => "Exit2-DR",
            TapState::UpdateDr => "Update-DR",
            TapState::SelectIrScan => "Select-IR-Scan",
            TapState::CaptureIr => "Capture-IR",
            TapState::ShiftIr => "Shift-IR",
            TapState::Exit1Ir => "Exit1-IR",
            TapState::PauseIr => "Pause-IR",
            TapState::Exit2Ir => "Exit2-IR",
            TapState::UpdateIr => "Update-IR",
        };
        f.write_str(name)
    }
}
