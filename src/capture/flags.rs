use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// The two signals shared between the recorder task and the control plane.
///
/// Clones share the same flags. The recorder only reads them, and only at
/// iteration boundaries.
#[derive(Debug, Clone)]
pub struct ControlFlags {
    capturing: Arc<AtomicBool>,
    terminate: Arc<AtomicBool>,
}

impl ControlFlags {
    pub fn new(capturing: bool) -> Self {
        Self {
            capturing: Arc::new(AtomicBool::new(capturing)),
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true if this call changed the flag.
    pub fn start_capturing(&self) -> bool {
        !self.capturing.swap(true, Ordering::SeqCst)
    }

    /// Returns true if this call changed the flag.
    pub fn stop_capturing(&self) -> bool {
        self.capturing.swap(false, Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    /// One-way: there is no way to clear terminate.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_toggles_only_change_once() {
        let flags = ControlFlags::new(false);
        assert!(flags.start_capturing());
        assert!(!flags.start_capturing());
        assert!(flags.is_capturing());

        assert!(flags.stop_capturing());
        assert!(!flags.stop_capturing());
        assert!(!flags.is_capturing());
    }

    #[test]
    fn clones_share_state() {
        let flags = ControlFlags::new(true);
        let control_plane = flags.clone();
        control_plane.stop_capturing();
        control_plane.request_terminate();
        assert!(!flags.is_capturing());
        assert!(flags.is_terminating());
    }

    #[test]
    fn terminate_starts_clear() {
        assert!(!ControlFlags::default().is_terminating());
        assert!(ControlFlags::default().is_capturing());
    }
}
