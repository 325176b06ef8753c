use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide operator signals for a `ConcurrentRunner`. Reset at the
/// start of every `run()` so a flag raised in a previous run never leaks
/// into the next one.
#[derive(Default)]
pub struct ControlFlags {
    shutdown: AtomicBool,
    pause: AtomicBool,
    drain: AtomicBool,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.shutdown.store(false, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
        self.drain.store(false, Ordering::SeqCst);
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn drain(&self) {
        self.drain.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.drain.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_every_flag() {
        let flags = ControlFlags::new();
        flags.request_shutdown();
        flags.pause();
        flags.drain();
        flags.reset();
        assert!(!flags.is_shutdown());
        assert!(!flags.is_paused());
        assert!(!flags.is_draining());
    }
}
