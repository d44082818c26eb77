use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "still loaded" flag for periodic work.
///
/// The host scheduler has no cancel handle that reaches an in-flight
/// callback, so each periodic invocation checks the flag first and returns
/// early once the owner has been unloaded.
#[derive(Debug, Clone)]
pub struct LivenessFlag(Arc<AtomicBool>);

impl LivenessFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for LivenessFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = LivenessFlag::new();
        let task_view = flag.clone();
        assert!(task_view.is_alive());
        flag.kill();
        assert!(!task_view.is_alive());
    }
}
