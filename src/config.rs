//! Ingestion settings
//!
//! Every field has a default, so an empty YAML file (or none at all) is a
//! valid configuration. CLI flags override the paths after loading.

use crate::concept::{ConceptExtractor, GlossaryExtractor, RuleExtractor};
use crate::parse::{RuleSegmenter, Segmenter};
use crate::resolve::{CachePolicy, RetryPolicy, WikidataSettings, WIKIDATA_API_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Platform data directory for folio (`~/.local/share/folio` on Linux)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"))
        .join("folio")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// SQLite graph database
    pub db_path: PathBuf,
    /// Concept cache JSON file
    pub cache_path: PathBuf,
    /// Entries per import transaction
    pub batch_size: usize,
    /// Concurrent knowledge-base lookups
    pub workers: usize,
    /// Per-call knowledge-base timeout, seconds
    pub kb_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub cache: CacheSettings,
    pub wikidata: WikidataConfig,
    pub extractor: ExtractorConfig,
    pub segmenter: SegmenterConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: data_dir.join("folio.db"),
            cache_path: data_dir.join("concept-cache.json"),
            batch_size: 500,
            workers: 4,
            kb_timeout_secs: 10,
            retry: RetryPolicy::default(),
            cache: CacheSettings::default(),
            wikidata: WikidataConfig::default(),
            extractor: ExtractorConfig::default(),
            segmenter: SegmenterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Days a "no match" stays valid; `null` keeps it forever
    pub negative_ttl_days: Option<u64>,
    /// Days a match stays valid; `null` keeps it forever
    pub positive_ttl_days: Option<u64>,
    pub flush_every: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            negative_ttl_days: Some(30),
            positive_ttl_days: None,
            flush_every: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WikidataConfig {
    pub endpoint: String,
    pub language: String,
    /// Overrides the built-in User-Agent
    pub user_agent: Option<String>,
    pub min_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self {
            endpoint: WIKIDATA_API_URL.to_string(),
            language: "en".to_string(),
            user_agent: None,
            min_interval_ms: 500,
            request_timeout_secs: 10,
        }
    }
}

/// Which concept extractor to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExtractorConfig {
    Rule {
        #[serde(default = "default_max_phrase_words")]
        max_phrase_words: usize,
        #[serde(default)]
        extra_stop_words: Vec<String>,
    },
    Glossary {
        #[serde(default)]
        terms: Vec<String>,
        /// One term per line; blank lines and `#` comments ignored
        #[serde(default)]
        terms_file: Option<PathBuf>,
    },
}

fn default_max_phrase_words() -> usize {
    4
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig::Rule {
            max_phrase_words: default_max_phrase_words(),
            extra_stop_words: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmenterConfig {
    pub min_chars: usize,
    /// Added to the built-in abbreviation list
    pub abbreviations: Vec<String>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_chars: 3,
            abbreviations: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Read and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // an empty document deserializes to unit, not to an empty map
        let config: IngestConfig = if content.trim().is_empty() {
            IngestConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.workers == 0 {
            return Err(invalid("workers", "must be at least 1"));
        }
        if self.kb_timeout_secs == 0 {
            return Err(invalid("kb_timeout_secs", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(invalid("retry.jitter", "must be between 0.0 and 1.0"));
        }
        if let ExtractorConfig::Rule { max_phrase_words, .. } = &self.extractor {
            if *max_phrase_words == 0 {
                return Err(invalid("extractor.max_phrase_words", "must be at least 1"));
            }
        }
        Ok(())
    }

    pub fn kb_timeout(&self) -> Duration {
        Duration::from_secs(self.kb_timeout_secs)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        let days = |d: u64| Duration::from_secs(d * SECONDS_PER_DAY);
        CachePolicy {
            negative_ttl: self.cache.negative_ttl_days.map(days),
            positive_ttl: self.cache.positive_ttl_days.map(days),
            flush_every: self.cache.flush_every,
        }
    }

    pub fn wikidata_settings(&self) -> WikidataSettings {
        let defaults = WikidataSettings::default();
        WikidataSettings {
            endpoint: self.wikidata.endpoint.clone(),
            language: self.wikidata.language.clone(),
            user_agent: self
                .wikidata
                .user_agent
                .clone()
                .unwrap_or(defaults.user_agent),
            request_timeout: Duration::from_secs(self.wikidata.request_timeout_secs),
            min_interval: Duration::from_millis(self.wikidata.min_interval_ms),
        }
    }

    pub fn build_segmenter(&self) -> Arc<dyn Segmenter> {
        let mut segmenter = RuleSegmenter::new().with_min_chars(self.segmenter.min_chars);
        for abbreviation in &self.segmenter.abbreviations {
            segmenter = segmenter.with_abbreviation(abbreviation);
        }
        Arc::new(segmenter)
    }

    /// Build the configured extractor; a glossary `terms_file` is read here.
    pub fn build_extractor(&self) -> Result<Arc<dyn ConceptExtractor>, ConfigError> {
        match &self.extractor {
            ExtractorConfig::Rule {
                max_phrase_words,
                extra_stop_words,
            } => {
                let mut extractor = RuleExtractor::new().with_max_phrase_words(*max_phrase_words);
                for word in extra_stop_words {
                    extractor = extractor.with_stop_word(word);
                }
                Ok(Arc::new(extractor))
            }
            ExtractorConfig::Glossary { terms, terms_file } => {
                let mut all = terms.clone();
                if let Some(path) = terms_file {
                    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    all.extend(
                        content
                            .lines()
                            .map(str::trim)
                            .filter(|l| !l.is_empty() && !l.starts_with('#'))
                            .map(String::from),
                    );
                }
                let extractor = GlossaryExtractor::new(&all);
                if extractor.is_empty() {
                    return Err(invalid("extractor.terms", "glossary extractor has no terms"));
                }
                Ok(Arc::new(extractor))
            }
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = IngestConfig::from_yaml("").unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.batch_size, 500);
        assert!(config.db_path.ends_with("folio/folio.db"));
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let yaml = r#"
workers: 8
retry:
  max_attempts: 2
  base_delay: 100
cache:
  negative_ttl_days: 7
"#;
        let config = IngestConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_delay, RetryPolicy::default().max_delay);
        assert_eq!(
            config.cache_policy().negative_ttl,
            Some(Duration::from_secs(7 * SECONDS_PER_DAY))
        );
        assert_eq!(config.cache_policy().flush_every, 50);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = IngestConfig::from_yaml("wokers: 8").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let err = IngestConfig::from_yaml("workers: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "workers", .. }));
    }

    #[test]
    fn glossary_terms_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# organelles\nmitochondria\n\ncell membrane").unwrap();
        let yaml = format!(
            "extractor:\n  kind: glossary\n  terms: [ribosome]\n  terms_file: {}\n",
            file.path().display()
        );
        let config = IngestConfig::from_yaml(&yaml).unwrap();
        let extractor = config.build_extractor().unwrap();

        let found: Vec<_> = extractor
            .extract("The Cell  membrane and the ribosome near mitochondria.")
            .into_iter()
            .map(|c| c.surface)
            .collect();
        assert_eq!(found, vec!["Cell  membrane", "ribosome", "mitochondria"]);
    }

    #[test]
    fn empty_glossary_is_invalid() {
        let config = IngestConfig::from_yaml("extractor:\n  kind: glossary\n").unwrap();
        assert!(config.build_extractor().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = IngestConfig::load(Path::new("/nonexistent/folio.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/folio.yaml"));
    }

    #[test]
    fn wikidata_settings_apply_overrides() {
        let config = IngestConfig::from_yaml("wikidata:\n  language: de\n  min_interval_ms: 0\n").unwrap();
        let settings = config.wikidata_settings();
        assert_eq!(settings.language, "de");
        assert_eq!(settings.min_interval, Duration::ZERO);
        assert!(settings.user_agent.starts_with("folio/"));
    }
}
