//! External knowledge base client trait and a deterministic mock
//!
//! Two implementations:
//! - `WikidataClient`: HTTP `wbsearchentities` lookups (production)
//! - `MockKnowledgeBase`: preconfigured entries, scripted failures (testing)

use crate::concept::normalize_surface;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Best match for a search label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbMatch {
    /// Stable external id (`Q9647`)
    pub canonical_id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// 0.0–1.0, how closely the match fits the search label
    pub confidence: f64,
}

impl KbMatch {
    pub fn new(canonical_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            label: label.into(),
            description: String::new(),
            confidence: 1.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Errors from knowledge-base lookups.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum KbError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited by knowledge base")]
    RateLimited,
    #[error("knowledge base unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl KbError {
    /// Transient errors are retried and never cached; permanent ones fail fast.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KbError::Timeout(_) | KbError::RateLimited | KbError::Unavailable(_)
        )
    }
}

/// Client trait for the external knowledge base.
///
/// `Ok(None)` is an explicit "no match" and gets cached as a negative entry.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Identifier used in Concept `source_ref`s (`wikidata`)
    fn name(&self) -> &str;

    /// Wait until another request may be sent. Callers await this before
    /// each `search` and keep it outside any per-call timeout.
    async fn ready(&self) {}

    async fn search(&self, label: &str) -> Result<Option<KbMatch>, KbError>;
}

/// Mock knowledge base for testing: answers from a fixed table.
#[derive(Default)]
pub struct MockKnowledgeBase {
    entries: HashMap<String, KbMatch>,
    failures: Mutex<HashMap<String, VecDeque<KbError>>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    calls_by_label: Mutex<HashMap<String, usize>>,
}

impl MockKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a match for a label (matched after normalization).
    pub fn with_entry(mut self, label: &str, found: KbMatch) -> Self {
        self.entries.insert(normalize_surface(label), found);
        self
    }

    /// Fail the next `times` searches for `label` with `error`.
    pub fn with_failures(self, label: &str, times: usize, error: KbError) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures
                .entry(normalize_surface(label))
                .or_default()
                .extend(std::iter::repeat(error).take(times));
        }
        self
    }

    /// Delay every search by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Total searches received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Searches received for one label
    pub fn calls_for(&self, label: &str) -> usize {
        self.calls_by_label
            .lock()
            .map(|calls| calls.get(&normalize_surface(label)).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl KnowledgeBase for MockKnowledgeBase {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, label: &str) -> Result<Option<KbMatch>, KbError> {
        let key = normalize_surface(label);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls_by_label.lock() {
            *calls.entry(key.clone()).or_default() += 1;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(&key).and_then(|queue| queue.pop_front()));
        if let Some(error) = scripted {
            return Err(error);
        }
        Ok(self.entries.get(&key).cloned())
    }
}
