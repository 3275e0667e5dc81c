use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-global "shutdown requested" observer. The signal layer (or a
/// test harness) sets it; the event loop polls it between readiness waits
/// and descriptors. This flag is the loop's only coupling to OS signals.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear_and_latches() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_requested());
        let observer = flag.clone();
        flag.request();
        assert!(flag.is_requested());
        assert!(observer.is_requested());
    }
}
