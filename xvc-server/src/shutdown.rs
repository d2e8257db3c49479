use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Process-wide cancellation flag.
///
/// Clones share the same flag. Setting it is the only work a signal path needs to do; the
/// server polls it once per readiness wait and inside every blocking read.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
