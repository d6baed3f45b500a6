//! Record cleaning: deduplication, field enrichers, and the per-record
//! enrichment orchestrator.

pub mod dedupe;
pub mod enrichers;
pub mod orchestrator;

pub use dedupe::{deduplicate, token_sort_similarity};
pub use enrichers::{AiEnricher, ResponseShape, ai_enrichers, email_is_valid, normalize_name};
pub use orchestrator::{EnrichedRecord, enrich_record};
