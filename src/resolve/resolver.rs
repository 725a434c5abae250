//! Mention resolution: cache first, then the knowledge base with timeout and retry

use super::cache::{CacheEntry, ConceptCache};
use super::kb::{KbError, KbMatch, KnowledgeBase};
use super::retry::RetryPolicy;
use crate::concept::normalize_surface;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

/// A resolved concept as the assembler consumes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConcept {
    pub canonical_id: String,
    pub label: String,
    pub description: String,
}

/// Outcome of resolving one surface form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedConcept),
    NotFound,
}

impl From<CacheEntry> for Resolution {
    fn from(entry: CacheEntry) -> Self {
        match entry.canonical_id {
            Some(canonical_id) => Resolution::Resolved(ResolvedConcept {
                canonical_id,
                label: entry.label,
                description: entry.description,
            }),
            None => Resolution::NotFound,
        }
    }
}

impl From<KbMatch> for ResolvedConcept {
    fn from(found: KbMatch) -> Self {
        Self {
            canonical_id: found.canonical_id,
            label: found.label,
            description: found.description,
        }
    }
}

/// The knowledge base could not answer for one mention; the mention is skipped.
#[derive(Debug, Clone, Error)]
#[error("knowledge base unavailable for '{key}' after {attempts} attempt(s): {source}")]
pub struct ResolutionUnavailableError {
    pub key: String,
    pub attempts: u32,
    #[source]
    pub source: KbError,
}

/// Counters since the resolver was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub cache_hits: u64,
    /// Lookups answered by another task's in-flight call
    pub coalesced: u64,
    pub external_calls: u64,
    pub retries: u64,
    pub resolved: u64,
    pub not_found: u64,
    pub unavailable: u64,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    external_calls: AtomicU64,
    retries: AtomicU64,
    resolved: AtomicU64,
    not_found: AtomicU64,
    unavailable: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

type Outcome = Result<Resolution, ResolutionUnavailableError>;

/// Resolves surface forms to canonical knowledge-base ids.
///
/// Concurrent lookups of the same key share one in-flight cell: the first
/// task runs the lookup and every other task receives its outcome, a
/// failure included. One external lookup and one cache write happen per key.
pub struct ConceptResolver {
    kb: Arc<dyn KnowledgeBase>,
    cache: Arc<ConceptCache>,
    timeout: Duration,
    retry: RetryPolicy,
    in_flight: DashMap<String, Arc<OnceCell<Outcome>>>,
    counters: Counters,
}

impl ConceptResolver {
    pub fn new(kb: Arc<dyn KnowledgeBase>, cache: Arc<ConceptCache>) -> Self {
        Self {
            kb,
            cache,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            in_flight: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Per-call timeout for knowledge-base searches
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<ConceptCache> {
        &self.cache
    }

    pub fn knowledge_base(&self) -> &str {
        self.kb.name()
    }

    pub async fn resolve(&self, surface: &str) -> Outcome {
        let key = normalize_surface(surface);
        if key.is_empty() {
            return Ok(Resolution::NotFound);
        }
        if let Some(entry) = self.cache.get_fresh(&key) {
            bump(&self.counters.cache_hits);
            return Ok(entry.into());
        }

        let cell = self.in_flight.entry(key.clone()).or_default().clone();
        let mut led = false;
        let outcome = {
            let led = &mut led;
            let key = key.as_str();
            cell.get_or_init(|| async move {
                *led = true;
                // a previous leader may have finished between the two checks
                match self.cache.get_fresh(key) {
                    Some(entry) => Ok(entry.into()),
                    None => self.lookup(key).await,
                }
            })
            .await
            .clone()
        };
        if !led {
            bump(&self.counters.coalesced);
        }
        // later callers start a fresh cell; a failed key is retried next time
        self.in_flight.remove_if(&key, |_, c| Arc::ptr_eq(c, &cell));
        outcome
    }

    async fn lookup(&self, key: &str) -> Outcome {
        let (result, attempts) = self
            .retry
            .retry(|| self.search_once(key), KbError::is_transient)
            .await;
        self.counters
            .retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);

        match result {
            Ok(Some(found)) => {
                debug!("resolved '{}' → {}", key, found.canonical_id);
                self.remember(key, CacheEntry::positive(&found, Utc::now())).await;
                bump(&self.counters.resolved);
                Ok(Resolution::Resolved(found.into()))
            }
            Ok(None) => {
                debug!("no match for '{}'", key);
                self.remember(key, CacheEntry::negative(Utc::now())).await;
                bump(&self.counters.not_found);
                Ok(Resolution::NotFound)
            }
            Err(source) => {
                warn!("cannot resolve '{}' after {} attempt(s): {}", key, attempts, source);
                bump(&self.counters.unavailable);
                Err(ResolutionUnavailableError {
                    key: key.to_string(),
                    attempts,
                    source,
                })
            }
        }
    }

    /// Cache an answer; a due flush runs on the blocking pool.
    async fn remember(&self, key: &str, entry: CacheEntry) {
        self.cache.insert(key, entry);
        if !self.cache.flush_due() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.flush_if_due()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("cache flush failed, keeping entries in memory: {}", e),
            Err(e) => warn!("cache flush task failed: {}", e),
        }
    }

    async fn search_once(&self, key: &str) -> Result<Option<KbMatch>, KbError> {
        // rate limiting happens before the clock starts
        self.kb.ready().await;
        bump(&self.counters.external_calls);
        match tokio::time::timeout(self.timeout, self.kb.search(key)).await {
            Ok(result) => result,
            Err(_) => Err(KbError::Timeout(self.timeout)),
        }
    }

    /// Resolve many keys concurrently, at most `workers` at a time.
    pub async fn resolve_all(
        self: &Arc<Self>,
        keys: impl IntoIterator<Item = String>,
        workers: usize,
    ) -> Result<HashMap<String, Outcome>, JoinError> {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();
        for key in keys {
            let resolver = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = resolver.resolve(&key).await;
                (key, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) = joined?;
            outcomes.insert(key, outcome);
        }
        Ok(outcomes)
    }

    pub fn stats(&self) -> ResolverStats {
        let c = &self.counters;
        ResolverStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            external_calls: c.external_calls.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            resolved: c.resolved.load(Ordering::Relaxed),
            not_found: c.not_found.load(Ordering::Relaxed),
            unavailable: c.unavailable.load(Ordering::Relaxed),
        }
    }
}
