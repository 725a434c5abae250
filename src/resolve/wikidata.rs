//! Wikidata `wbsearchentities` client

use super::kb::{KbError, KbMatch, KnowledgeBase};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub const WIKIDATA_API_URL: &str = "https://www.wikidata.org/w/api.php";
const DEFAULT_USER_AGENT: &str = concat!("folio/", env!("CARGO_PKG_VERSION"), " (textbook concept linking)");

/// Connection settings for [`WikidataClient`]
#[derive(Debug, Clone)]
pub struct WikidataSettings {
    pub endpoint: String,
    pub language: String,
    pub user_agent: String,
    /// Transport-level timeout; the resolver applies its own per-call timeout too
    pub request_timeout: Duration,
    /// Minimum spacing between two requests
    pub min_interval: Duration,
}

impl Default for WikidataSettings {
    fn default() -> Self {
        Self {
            endpoint: WIKIDATA_API_URL.to_string(),
            language: "en".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(10),
            min_interval: Duration::from_millis(500),
        }
    }
}

/// Rate-limited Wikidata entity search.
///
/// Requests are spaced `min_interval` apart through [`KnowledgeBase::ready`].
pub struct WikidataClient {
    client: Client,
    settings: WikidataSettings,
    last_request: Mutex<Option<Instant>>,
}

impl WikidataClient {
    pub fn new(settings: WikidataSettings) -> Result<Self, KbError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| KbError::Unavailable(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            settings,
            last_request: Mutex::new(None),
        })
    }

    /// Wait until `min_interval` has passed since the previous request.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.settings.min_interval {
                tokio::time::sleep(self.settings.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn transport_error(e: reqwest::Error) -> KbError {
    if e.is_timeout() {
        KbError::Unavailable(format!("transport timeout: {}", e))
    } else if e.is_decode() {
        KbError::Malformed(e.to_string())
    } else {
        KbError::Unavailable(e.to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> KbError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        KbError::RateLimited
    } else if status.is_server_error() {
        KbError::Unavailable(format!("{}: {}", status, body))
    } else {
        KbError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "match", default)]
    matched: Option<HitMatch>,
}

#[derive(Debug, Deserialize)]
struct HitMatch {
    #[serde(rename = "type", default)]
    kind: String,
}

impl SearchResponse {
    fn into_match(self) -> Result<Option<KbMatch>, KbError> {
        if let Some(error) = self.error {
            return Err(KbError::Rejected {
                status: 200,
                message: format!("{}: {}", error.code, error.info),
            });
        }
        let Some(hit) = self.search.into_iter().next() else {
            return Ok(None);
        };
        if hit.id.is_empty() {
            return Err(KbError::Malformed("search hit without id".to_string()));
        }
        let confidence = match hit.matched.as_ref().map(|m| m.kind.as_str()) {
            Some("label") => 1.0,
            Some("alias") => 0.8,
            _ => 0.5,
        };
        let label = if hit.label.is_empty() { hit.id.clone() } else { hit.label };
        Ok(Some(KbMatch {
            canonical_id: hit.id,
            label,
            description: hit.description,
            confidence,
        }))
    }
}

#[async_trait]
impl KnowledgeBase for WikidataClient {
    fn name(&self) -> &str {
        "wikidata"
    }

    async fn ready(&self) {
        self.throttle().await;
    }

    /// One HTTP request; does not wait for the rate limit (see `ready`).
    async fn search(&self, label: &str) -> Result<Option<KbMatch>, KbError> {
        debug!("wikidata search: {}", label);

        let response = self
            .client
            .get(&self.settings.endpoint)
            .query(&[
                ("action", "wbsearchentities"),
                ("search", label.trim()),
                ("language", self.settings.language.as_str()),
                ("format", "json"),
                ("limit", "1"),
                ("type", "item"),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let parsed: SearchResponse = response.json().await.map_err(transport_error)?;
        parsed.into_match()
    }
}
