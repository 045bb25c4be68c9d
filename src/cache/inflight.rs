//! Per-key compute leases for single-flight cache misses.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<()>>;

/// At most one holder per key; later callers queue behind the holder.
#[derive(Default)]
pub struct InFlightLeases {
    slots: Arc<DashMap<String, Slot>>,
}

impl InFlightLeases {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> Lease {
        let slot = {
            let entry = self.slots.entry(key.to_string()).or_default();
            Arc::clone(entry.value())
        };
        // The map shard lock is released above; only the per-key mutex is
        // awaited.
        let guard = slot.lock_owned().await;

        Lease {
            key: key.to_string(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.len()
    }
}

pub struct Lease {
    key: String,
    slots: Arc<DashMap<String, Slot>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the slot; keep it while any exist.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn lease_is_exclusive_per_key() {
        let leases = Arc::new(InFlightLeases::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let leases = Arc::clone(&leases);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _lease = leases.acquire("listing:main").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.expect("task completes");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(leases.tracked(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let leases = InFlightLeases::new();
        let first = leases.acquire("listing:main").await;
        let second = leases.acquire("listing:visits").await;
        assert_eq!(leases.tracked(), 2);
        drop(first);
        drop(second);
        assert_eq!(leases.tracked(), 0);
    }
}
