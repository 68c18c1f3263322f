//! Metrics for the corpus.

use iroh_metrics::{Counter, MetricsGroup};
use serde::{Deserialize, Serialize};

/// Metrics for a [`Corpus`](crate::Corpus).
#[derive(Debug, Serialize, Deserialize, MetricsGroup)]
#[non_exhaustive]
#[metrics(name = "perma_index", default)]
pub struct Metrics {
    /// Claims added to the index
    pub claims_ingested: Counter,
    /// Claims ignored because their id was already indexed
    pub claims_duplicate: Counter,
    /// Malformed claims refused
    pub claims_rejected: Counter,
    /// Times the sorted caches were dropped by a mutation
    pub cache_invalidations: Counter,
    /// Sorted lookups served from a cached slot
    pub sort_cache_hit: Counter,
    /// Sorted lookups that rebuilt or reversed a slot
    pub sort_cache_miss: Counter,
    /// Enumerations started
    pub enumerations: Counter,
    /// Enumerations stopped by their caller
    pub enumerations_cancelled: Counter,
    /// Attribute reads served from the values kept on ingest
    pub attr_reads_fast: Counter,
    /// Attribute reads served by replaying claims
    pub attr_reads_replay: Counter,
}
