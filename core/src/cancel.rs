//! Per-request cancellation.
//!
//! A new keystroke supersedes the decode started by the previous one.
//! [`RequestGate`] hands out one [`CancellationToken`] per request and
//! cancels the previous token when the next is issued; the lattice search and
//! the reranker poll the token between steps.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Issues request tokens, cancelling the one issued before.
#[derive(Debug, Default)]
pub struct RequestGate {
    current: Mutex<Option<CancellationToken>>,
    generation: AtomicU64,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request: cancels the previous token and returns a fresh one.
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut slot = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = slot.replace(token.clone()) {
            prev.cancel();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        token
    }

    /// Cancel whatever request is in flight without starting a new one.
    pub fn cancel_current(&self) {
        let slot = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }

    /// Number of requests started so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_flag() {
        let a = CancellationToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_begin_cancels_previous() {
        let gate = RequestGate::new();
        let first = gate.begin();
        let second = gate.begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(gate.generation(), 2);

        gate.cancel_current();
        assert!(second.is_cancelled());
    }
}
