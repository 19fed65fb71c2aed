//! Cancellation for in-flight render work.

use crate::viewport::RenderId;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative render cancellation.
///
/// A render task checks its token before every stage and again, under the
/// surface lock, before every write. All clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The renderer's handle on its current task.
#[derive(Debug)]
pub struct TaskHandle {
    pub id: RenderId,
    pub page_number: u32,
    token: CancellationToken,
}

impl TaskHandle {
    pub fn new(id: RenderId, page_number: u32) -> (Self, CancellationToken) {
        let token = CancellationToken::new();
        (
            Self {
                id,
                page_number,
                token: token.clone(),
            },
            token,
        )
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let (handle, token) = TaskHandle::new(RenderId(1), 1);
        let worker = token.clone();
        assert!(!worker.is_cancelled());

        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(worker.is_cancelled());
        assert!(handle.is_cancelled());
    }
}
