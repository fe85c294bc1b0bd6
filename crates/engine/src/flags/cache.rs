//! Time-bounded snapshot of all flag values.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::clock::Clock;

/// Default lifetime of a flag snapshot.
pub const DEFAULT_FLAG_TTL: Duration = Duration::seconds(60);

pub type FlagValues = Arc<BTreeMap<String, bool>>;

struct Snapshot {
    values: FlagValues,
    loaded_at: OffsetDateTime,
}

/// One snapshot covering every flag, valid for `ttl` after it was loaded.
///
/// Owned by a single `FlagStore`; different processes hold different
/// snapshots and may disagree for up to one TTL.
///
/// Every [`invalidate`](Self::invalidate) bumps a generation counter. A
/// loader captures [`generation`](Self::generation) before it reads storage
/// and hands it back to [`store_if`](Self::store_if), so a read that started
/// before a local write can never install its older values afterwards.
pub struct SnapshotCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    generation: AtomicU64,
}

impl SnapshotCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached values, if a snapshot exists and is younger than the TTL.
    pub async fn fresh(&self) -> Option<FlagValues> {
        let guard = self.snapshot.read().await;
        let snapshot = guard.as_ref()?;
        if self.clock.now() - snapshot.loaded_at < self.ttl {
            Some(snapshot.values.clone())
        } else {
            None
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Install `values` unless the cache was invalidated after `generation`
    /// was captured. Returns whether the snapshot was stored.
    pub async fn store_if(&self, values: FlagValues, generation: u64) -> bool {
        let mut guard = self.snapshot.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        *guard = Some(Snapshot {
            values,
            loaded_at: self.clock.now(),
        });
        true
    }

    pub async fn invalidate(&self) {
        let mut guard = self.snapshot.write().await;
        *guard = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
