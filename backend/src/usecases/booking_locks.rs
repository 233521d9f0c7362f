use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// One async mutex per key, serialising "read + validate + write".
///
/// Keys are facility ids for the overlap check and rental ids for changes to a single
/// rental. A rental key is always taken before a facility key. Status reads never lock.
/// An entry lives only while some task holds or waits on its key.
#[derive(Debug, Default)]
pub struct BookingLocks {
    locks: LockMap,
}

/// Releases the key on drop and evicts its entry when nobody else is queued on it.
pub struct BookingGuard<'a> {
    locks: &'a LockMap,
    key: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl BookingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: Uuid) -> BookingGuard<'_> {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        BookingGuard {
            locks: &self.locks,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for BookingGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are taken under the shard lock, so a count of one means no waiters.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
