//! Cooperative cancellation (spec section 5): a flag plus an optional
//! wall-clock deadline, checked by C4 between supersets and by C6 between
//! Monte Carlo iterations. No operation suspends; this is polled, not
//! awaited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Debug)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), deadline: None }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), deadline: Some(deadline) }
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_observed() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn deadline_in_the_past_is_already_cancelled() {
        let token = CancellationToken::with_deadline(Instant::now() - std::time::Duration::from_secs(1));
        assert!(token.is_cancelled());
    }
}
