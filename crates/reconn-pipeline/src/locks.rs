//! Per-persona turn sequencing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async mutex per persona id.
///
/// A conversational turn holds its persona's guard from the history read
/// until its reply is persisted, so turns for one persona never read a
/// half-written exchange. Turns for different personas do not contend.
#[derive(Clone, Default)]
pub struct PersonaLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

pub type PersonaGuard = OwnedMutexGuard<()>;

impl PersonaLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `persona_id`.
    pub async fn lock(&self, persona_id: i64) -> PersonaGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            map.retain(|id, l| *id == persona_id || Arc::strong_count(l) > 1);
            map.entry(persona_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of personas with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_persona_is_serialized() {
        let locks = PersonaLocks::new();
        let guard = locks.lock(1).await;

        let second = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_personas_do_not_contend() {
        let locks = PersonaLocks::new();
        let _a = locks.lock(1).await;
        tokio::time::timeout(Duration::from_millis(100), locks.lock(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = PersonaLocks::new();
        for id in 0..5 {
            drop(locks.lock(id).await);
        }
        drop(locks.lock(99).await);
        assert_eq!(locks.tracked(), 1);
    }
}
