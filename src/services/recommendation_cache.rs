use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::{
    db::Store,
    error::AppResult,
    models::{FusedMeal, NewRecommendation, StoredRecommendation},
};

/// Per-user recommendation cache on top of the store
///
/// Reads honour a freshness window; writes replace a user's whole set and are
/// serialised per user so request-path and background refreshes never interleave.
#[derive(Clone)]
pub struct RecommendationCache {
    store: Arc<dyn Store>,
    locks: Arc<LockMap>,
}

type UserLock = Arc<tokio::sync::Mutex<()>>;
type LockMap = Mutex<HashMap<i64, UserLock>>;

/// A user's write lock, removed from the map when the last holder lets go
struct LockLease<'a> {
    locks: &'a LockMap,
    user_id: i64,
    lock: UserLock,
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under the map lock; two means the map and this lease
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.user_id);
        }
    }
}

impl RecommendationCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lease(&self, user_id: i64) -> LockLease<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        LockLease {
            locks: &self.locks,
            user_id,
            lock: locks.entry(user_id).or_default().clone(),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Cached set for the user, or `None` on a miss
    ///
    /// A hit needs at least one entry younger than `max_age`; `refresh` forces a miss.
    pub async fn get(
        &self,
        user_id: i64,
        max_age: Duration,
        refresh: bool,
    ) -> AppResult<Option<Vec<StoredRecommendation>>> {
        if refresh {
            tracing::debug!(user_id, "Recommendation cache bypassed");
            return Ok(None);
        }

        let since = Utc::now() - max_age;
        let entries = self.store.recommendations_since(user_id, since).await?;

        if entries.is_empty() {
            tracing::debug!(user_id, "Recommendation cache miss");
            Ok(None)
        } else {
            tracing::debug!(user_id, entries = entries.len(), "Recommendation cache hit");
            Ok(Some(entries))
        }
    }

    /// Replaces the user's stored set with `fused`, stamped now
    pub async fn replace(&self, user_id: i64, fused: &[FusedMeal]) -> AppResult<DateTime<Utc>> {
        let lease = self.lease(user_id);
        let _guard = lease.lock.lock().await;

        let entries: Vec<NewRecommendation> = fused.iter().map(NewRecommendation::from).collect();
        let created_at = Utc::now();

        self.store
            .replace_recommendations(user_id, &entries, created_at)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, user_id, "Failed to replace stored recommendations");
            })?;

        tracing::info!(user_id, entries = entries.len(), "Stored recommendations replaced");
        Ok(created_at)
    }
}
