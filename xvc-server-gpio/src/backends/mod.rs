//! Line backends: real GPIO on Linux and a software loopback target.
pub mod loopback;
#[cfg(target_os = "linux")]
pub mod rpi;
