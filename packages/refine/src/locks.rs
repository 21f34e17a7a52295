//! Per-analysis serialization so two concurrent refine calls for the same
//! analysis never interleave their assistant replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// A registry of per-analysis locks, lazily created on first use.
///
/// The registry itself is guarded by a short-lived `std::sync::Mutex`; the
/// per-analysis lock handed back is an async `tokio::sync::Mutex` held
/// across the LLM call, so holding it never blocks an OS thread.
#[derive(Default)]
pub struct RefineLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl RefineLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `analysis_id`, creating it if this is the
    /// first call for that analysis. The returned guard serializes every
    /// other `lock` call for the same id until it is dropped.
    pub async fn lock(&self, analysis_id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().expect("lock registry poisoned");
            locks.entry(analysis_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_calls_for_different_analyses_do_not_block_each_other() {
        let locks = RefineLocks::new();
        let _a = locks.lock(Uuid::new_v4()).await;
        let b = tokio::time::timeout(std::time::Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn second_call_for_the_same_analysis_waits_for_the_first_to_drop() {
        let locks = RefineLocks::new();
        let analysis_id = Uuid::new_v4();
        let first = locks.lock(analysis_id).await;

        let second_attempt =
            tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock(analysis_id)).await;
        assert!(second_attempt.is_err(), "second lock should not be acquired while the first is held");

        drop(first);
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock(analysis_id)).await;
        assert!(second.is_ok());
    }
}
