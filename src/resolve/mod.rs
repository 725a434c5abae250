//! Knowledge-base resolution with a persistent cache

mod cache;
mod kb;
mod resolver;
mod retry;
mod wikidata;

pub use cache::{
    CacheCorruptionError, CacheEntry, CacheError, CachePolicy, CacheStats, ConceptCache,
    CACHE_FORMAT_VERSION,
};
pub use kb::{KbError, KbMatch, KnowledgeBase, MockKnowledgeBase};
pub use resolver::{
    ConceptResolver, Resolution, ResolutionUnavailableError, ResolvedConcept, ResolverStats,
};
pub use retry::RetryPolicy;
pub use wikidata::{WikidataClient, WikidataSettings, WIKIDATA_API_URL};
