//! Short-lived lookup cache in front of a [`UserStore`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::Result;
use crate::service::Authenticator;
use crate::store::UserStore;
use crate::user::User;

const DEFAULT_POSITIVE_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
    SubjectId,
    Username,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    user: Option<User>,
    inserted: Instant,
}

/// [`UserStore`] caching lookups.
///
/// Credential validation always reaches the directories. "No user" answers
/// are kept for a shorter time than found users. Expired entries are swept
/// on insertion at most once per negative TTL, and nothing new is cached
/// while the map is full.
#[derive(Debug)]
pub struct CachedUserStore<A> {
    store: UserStore<A>,
    positive_ttl: Duration,
    negative_ttl: Duration,
    max_entries: usize,
    entries: DashMap<(Operation, String), CacheEntry>,
    created: Instant,
    /// Milliseconds between `created` and the last sweep.
    last_sweep: AtomicU64,
}

impl<A: Authenticator> CachedUserStore<A> {
    /// Create a new [`CachedUserStore`] with default TTLs.
    pub fn new(store: UserStore<A>) -> Self {
        Self {
            store,
            positive_ttl: DEFAULT_POSITIVE_TTL,
            negative_ttl: DEFAULT_NEGATIVE_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            entries: DashMap::new(),
            created: Instant::now(),
            last_sweep: AtomicU64::new(0),
        }
    }

    /// Update how many answers may be cached at once.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Update how long found users are kept.
    pub fn with_positive_ttl(mut self, ttl: Duration) -> Self {
        self.positive_ttl = ttl;
        self
    }

    /// Update how long "no user" answers are kept.
    ///
    /// It cannot exceed the positive TTL.
    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl.min(self.positive_ttl);
        self
    }

    /// Inner [`UserStore`].
    pub fn store(&self) -> &UserStore<A> {
        &self.store
    }

    /// See [`UserStore::validate_credentials`]. Never cached.
    pub async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        self.store.validate_credentials(username, password).await
    }

    /// See [`UserStore::validate_credentials_in`]. Never cached.
    pub async fn validate_credentials_in(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<Option<User>> {
        self.store
            .validate_credentials_in(username, password, domain)
            .await
    }

    /// Cached [`UserStore::find_by_subject_id`].
    pub async fn find_by_subject_id(&self, subject_id: &str) -> Option<User> {
        let key = (Operation::SubjectId, normalize(subject_id));
        if let Some(user) = self.get(&key) {
            return user;
        }

        let user = self.store.find_by_subject_id(subject_id).await;
        self.insert(key, user.clone());
        user
    }

    /// Cached [`UserStore::find_by_username`].
    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        let key = (Operation::Username, normalize(username));
        if let Some(user) = self.get(&key) {
            return user;
        }

        let user = self.store.find_by_username(username).await;
        self.insert(key, user.clone());
        user
    }

    /// Forget every cached answer about `id`.
    pub fn invalidate(&self, id: &str) {
        let id = normalize(id);
        self.entries.remove(&(Operation::SubjectId, id.clone()));
        self.entries.remove(&(Operation::Username, id));
    }

    /// Forget every cached answer.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Fresh cached answer for `key`, if any.
    fn get(&self, key: &(Operation, String)) -> Option<Option<User>> {
        let now = Instant::now();
        let is_fresh = |entry: &CacheEntry| {
            now.duration_since(entry.inserted) < self.ttl(entry)
        };

        // Shard guard must be released before `remove_if`.
        let hit = self.entries.get(key).and_then(|entry| {
            is_fresh(entry.value()).then(|| entry.user.clone())
        });

        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| !is_fresh(entry));
        }

        hit
    }

    fn insert(&self, key: (Operation, String), user: Option<User>) {
        self.sweep();

        if self.entries.len() >= self.max_entries
            && !self.entries.contains_key(&key)
        {
            tracing::debug!(max_entries = self.max_entries, "user cache full");
            return;
        }

        self.entries.insert(
            key,
            CacheEntry {
                user,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop expired entries when the last sweep is older than the negative
    /// TTL or the map is full.
    fn sweep(&self) {
        let now = Instant::now();
        let elapsed = millis(now.duration_since(self.created));
        let last = self.last_sweep.load(Ordering::Relaxed);

        let due = elapsed.saturating_sub(last) >= millis(self.negative_ttl)
            || self.entries.len() >= self.max_entries;
        // Another caller already sweeps.
        if !due
            || self
                .last_sweep
                .compare_exchange(
                    last,
                    elapsed,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_err()
        {
            return;
        }

        self.entries.retain(|_, entry| {
            now.duration_since(entry.inserted) < self.ttl(entry)
        });
    }

    fn ttl(&self, entry: &CacheEntry) -> Duration {
        if entry.user.is_some() {
            self.positive_ttl
        } else {
            self.negative_ttl
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}
