//! # Response Store
//! Persistence seam for accepted responses.
//!
//! The store owns id generation (UUID v4), so concurrent writers never collide
//! and callers never see a counter. [`InMemoryStore`] keeps a bounded,
//! per-account buffer; anything durable plugs in behind [`ResponseStore`].

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::Utc;

use crate::model::{AccountId, FeedbackSubmission, ResponseId, StoredResponse};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("response store unavailable: {0}")]
    Unavailable(String),
    #[error("response store rejected write: {0}")]
    Write(String),
}

#[async_trait::async_trait]
pub trait ResponseStore: Send + Sync {
    /// Persist an accepted submission and return its new id.
    async fn insert(
        &self,
        account: &AccountId,
        submission: FeedbackSubmission,
    ) -> Result<ResponseId, StoreError>;

    /// Responses for `account`, most recent first, at most `limit`.
    async fn list(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<StoredResponse>, StoreError>;
}

#[derive(Debug, Default)]
struct Bucket {
    responses: VecDeque<StoredResponse>,
    /// Value of the write clock at the last insert.
    last_write: u64,
}

#[derive(Debug, Default)]
struct Buckets {
    by_account: HashMap<AccountId, Bucket>,
    clock: u64,
}

/// Process-local store. Bounded twice: responses per account, and number of
/// accounts (the least recently written account is evicted first).
#[derive(Debug)]
pub struct InMemoryStore {
    inner: RwLock<Buckets>,
    cap: usize,
    max_accounts: usize,
}

pub const DEFAULT_MAX_PER_ACCOUNT: usize = 10_000;
pub const DEFAULT_MAX_ACCOUNTS: usize = 10_000;

impl InMemoryStore {
    pub fn with_capacity(cap_per_account: usize) -> Self {
        Self::with_limits(cap_per_account, DEFAULT_MAX_ACCOUNTS)
    }

    pub fn with_limits(cap_per_account: usize, max_accounts: usize) -> Self {
        Self {
            inner: RwLock::new(Buckets::default()),
            cap: cap_per_account.max(1),
            max_accounts: max_accounts.max(1),
        }
    }

    /// Number of responses held for `account`.
    pub fn count(&self, account: &AccountId) -> usize {
        self.inner
            .read()
            .map(|b| b.by_account.get(account).map_or(0, |b| b.responses.len()))
            .unwrap_or(0)
    }

    /// Number of accounts with at least one stored response.
    pub fn accounts(&self) -> usize {
        self.inner.read().map(|b| b.by_account.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_PER_ACCOUNT, DEFAULT_MAX_ACCOUNTS)
    }
}

impl Buckets {
    fn evict_least_recent(&mut self) -> Option<AccountId> {
        let victim = self
            .by_account
            .iter()
            .min_by_key(|(_, b)| b.last_write)
            .map(|(account, _)| account.clone())?;
        self.by_account.remove(&victim);
        Some(victim)
    }
}

#[async_trait::async_trait]
impl ResponseStore for InMemoryStore {
    async fn insert(
        &self,
        account: &AccountId,
        submission: FeedbackSubmission,
    ) -> Result<ResponseId, StoreError> {
        let id = ResponseId::generate();
        let entry = StoredResponse {
            id: id.clone(),
            account: account.clone(),
            submission,
            received_at: Utc::now(),
        };

        let mut buckets = self
            .inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;

        let is_new = !buckets.by_account.contains_key(account);
        if is_new && buckets.by_account.len() >= self.max_accounts {
            if let Some(evicted) = buckets.evict_least_recent() {
                tracing::debug!(target: "ingest", %evicted, "account limit reached; evicted oldest bucket");
            }
        }

        buckets.clock += 1;
        let now = buckets.clock;
        let bucket = buckets.by_account.entry(account.clone()).or_default();
        bucket.last_write = now;
        bucket.responses.push_back(entry);
        while bucket.responses.len() > self.cap {
            bucket.responses.pop_front();
        }
        Ok(id)
    }

    async fn list(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<StoredResponse>, StoreError> {
        let buckets = self
            .inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;
        Ok(buckets
            .by_account
            .get(account)
            .map(|b| b.responses.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{validate, SubmissionLimits};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn submission(score: u8) -> FeedbackSubmission {
        validate(
            &json!({ "score": score }),
            &SubmissionLimits::default(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn list_is_most_recent_first_and_scoped() {
        let store = InMemoryStore::default();
        let acme = AccountId::new("acme");
        let globex = AccountId::new("globex");

        for s in [1, 2, 3] {
            store.insert(&acme, submission(s)).await.unwrap();
        }
        store.insert(&globex, submission(10)).await.unwrap();

        let rows = store.list(&acme, 10).await.unwrap();
        let scores: Vec<u8> = rows.iter().map(|r| r.submission.score().get()).collect();
        assert_eq!(scores, vec![3, 2, 1]);
        assert!(rows.iter().all(|r| r.account == acme));

        assert_eq!(store.list(&acme, 2).await.unwrap().len(), 2);
        assert!(store
            .list(&AccountId::new("nobody"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn capacity_drops_oldest() {
        let store = InMemoryStore::with_capacity(2);
        let acme = AccountId::new("acme");
        for s in [4, 5, 6] {
            store.insert(&acme, submission(s)).await.unwrap();
        }
        assert_eq!(store.count(&acme), 2);
        let scores: Vec<u8> = store
            .list(&acme, 10)
            .await
            .unwrap()
            .iter()
            .map(|r| r.submission.score().get())
            .collect();
        assert_eq!(scores, vec![6, 5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_get_distinct_ids() {
        let store = Arc::new(InMemoryStore::default());
        let acme = AccountId::new("acme");

        let mut tasks = Vec::new();
        for i in 0..64u8 {
            let store = Arc::clone(&store);
            let acme = acme.clone();
            tasks.push(tokio::spawn(async move {
                store.insert(&acme, submission(i % 11)).await.unwrap()
            }));
        }
        let mut ids = HashSet::new();
        for t in tasks {
            ids.insert(t.await.unwrap());
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(store.count(&acme), 64);
    }

    #[tokio::test]
    async fn account_limit_evicts_least_recently_written() {
        let store = InMemoryStore::with_limits(1, 3);
        let (a, b, c, d) = (
            AccountId::new("a"),
            AccountId::new("b"),
            AccountId::new("c"),
            AccountId::new("d"),
        );
        for acct in [&a, &b, &c] {
            store.insert(acct, submission(5)).await.unwrap();
        }
        // Writing to `a` again makes `b` the oldest.
        store.insert(&a, submission(6)).await.unwrap();
        store.insert(&d, submission(7)).await.unwrap();

        assert_eq!(store.accounts(), 3);
        assert_eq!(store.count(&b), 0);
        for acct in [&a, &c, &d] {
            assert_eq!(store.count(acct), 1);
        }
    }

    #[tokio::test]
    async fn rotating_accounts_stays_bounded() {
        let store = InMemoryStore::with_limits(1, 50);
        for i in 0..2_000 {
            let acct = AccountId::new(format!("key-{i}"));
            store.insert(&acct, submission(9)).await.unwrap();
        }
        assert_eq!(store.accounts(), 50);
        assert_eq!(store.count(&AccountId::new("key-1999")), 1);
        assert_eq!(store.count(&AccountId::new("key-0")), 0);
    }
}
