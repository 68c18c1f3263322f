//! The in-memory claim index.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use perma_base::{BlobRef, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    claim::{Claim, ClaimBody},
    clock::{Clock, SystemClock},
    config::CorpusConfig,
    deletes::DeletionIndex,
    error::IngestError,
    metrics::Metrics,
    permanode::PermanodeMeta,
    resolve::AsOf,
    sorted::{LazySorted, Lookup, Order, OrderKind},
};

/// Attributes holding the content time of a permanode, by priority.
pub const CONTENT_TIME_ATTRS: [&str; 4] =
    ["startDate", "dateCreated", "datePublished", "dateModified"];

/// Result of ingesting a single claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The claim was added.
    Inserted,
    /// A claim with this id was already indexed; nothing changed.
    Duplicate,
}

/// Statistics of one bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Claims added.
    pub inserted: usize,
    /// Claims already present.
    pub duplicates: usize,
    /// Malformed claims skipped.
    pub skipped: usize,
    /// Time spent holding the write lock.
    pub elapsed: Duration,
}

/// Size of the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    /// Known permanodes, deleted ones included.
    pub permanodes: usize,
    /// Indexed claims of every kind.
    pub claims: usize,
    /// Permanodes and claims with at least one deletion.
    pub deleted_targets: usize,
    /// Signers with a known key id.
    pub signers: usize,
    /// Current generation.
    pub generation: u64,
}

/// In-memory index over a claim log.
///
/// Cloning is cheap and every clone shares the same index. All state sits
/// behind one reader/writer lock: queries run concurrently, ingestion is
/// exclusive.
#[derive(Debug, Clone)]
pub struct Corpus {
    inner: Arc<RwLock<CorpusInner>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    config: Arc<CorpusConfig>,
}

impl Default for Corpus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub(crate) struct CorpusInner {
    permanodes: HashMap<BlobRef, PermanodeMeta>,
    /// Every indexed claim by id.
    claims: HashMap<BlobRef, Arc<Claim>>,
    deletes: DeletionIndex,
    /// Attribute claims whose value parses as a blob ref, by that ref.
    claim_back: HashMap<BlobRef, Vec<Arc<Claim>>>,
    key_ids: HashMap<BlobRef, String>,
    by_created: LazySorted,
    by_modified: LazySorted,
    generation: u64,
}

impl Default for CorpusInner {
    fn default() -> Self {
        Self {
            permanodes: Default::default(),
            claims: Default::default(),
            deletes: Default::default(),
            claim_back: Default::default(),
            key_ids: Default::default(),
            by_created: LazySorted::new(OrderKind::Created),
            by_modified: LazySorted::new(OrderKind::Modified),
            generation: 0,
        }
    }
}

impl CorpusInner {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn permanode_refs(&self) -> impl Iterator<Item = &BlobRef> + '_ {
        self.permanodes.keys()
    }

    pub fn is_deleted(&self, br: &BlobRef, cutoff: Option<Timestamp>) -> bool {
        self.deletes.is_deleted(br, cutoff)
    }

    pub fn permanode_created(&self, pn: &BlobRef) -> Option<Timestamp> {
        self.permanodes.get(pn)?.created()
    }

    /// Latest date among the permanode's claims that are not deleted.
    pub fn permanode_modtime(&self, pn: &BlobRef) -> Option<Timestamp> {
        self.permanodes
            .get(pn)?
            .claims()
            .iter()
            .filter(|c| !self.is_deleted(&c.id(), None))
            .map(|c| c.date())
            .max()
    }

    fn lazy(&self, kind: OrderKind) -> &LazySorted {
        match kind {
            OrderKind::Created => &self.by_created,
            OrderKind::Modified => &self.by_modified,
        }
    }

    /// Index a validated claim that is not yet present.
    fn insert(&mut self, claim: Arc<Claim>, bulk: bool) {
        self.claims.insert(claim.id(), claim.clone());
        match claim.body() {
            ClaimBody::Delete { target } => {
                self.deletes.insert(*target, claim.id(), claim.date());
            }
            _ => {
                if let Some(edit) = claim.as_attr() {
                    if let Ok(value_ref) = edit.value.parse::<BlobRef>() {
                        self.claim_back
                            .entry(value_ref)
                            .or_default()
                            .push(claim.clone());
                    }
                    let meta = self.permanodes.entry(edit.permanode).or_default();
                    if bulk {
                        meta.push_unsorted(claim.clone());
                    } else {
                        meta.insert(claim.clone());
                    }
                }
            }
        }
    }

    /// Bump the generation and drop every sorted slot.
    fn invalidate(&mut self) {
        self.generation += 1;
        self.by_created.invalidate();
        self.by_modified.invalidate();
    }
}

impl Corpus {
    /// Create an empty corpus with the default configuration.
    pub fn new() -> Self {
        Self::with_config(CorpusConfig::default())
    }

    /// Create an empty corpus.
    pub fn with_config(config: CorpusConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Create an empty corpus reading "now" from `clock`.
    pub fn with_clock(config: CorpusConfig, clock: impl Clock) -> Self {
        Self {
            inner: Default::default(),
            clock: Arc::new(clock),
            metrics: Default::default(),
            config: Arc::new(config),
        }
    }

    /// Metrics of this corpus.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// The configuration this corpus was created with.
    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    /// Add a claim to the index.
    ///
    /// Invalidates every sorted ordering unless the claim was already known.
    pub fn ingest(&self, claim: Claim) -> Result<IngestOutcome, IngestError> {
        if let Err(reason) = claim.validate() {
            self.metrics.claims_rejected.inc();
            debug!(id = %claim.id().fmt_short(), %reason, "refusing claim");
            return Err(IngestError::Malformed {
                id: claim.id(),
                reason,
            });
        }
        let mut inner = self.inner.write();
        if inner.claims.contains_key(&claim.id()) {
            self.metrics.claims_duplicate.inc();
            return Ok(IngestOutcome::Duplicate);
        }
        trace!(id = %claim.id().fmt_short(), target = %claim.target().fmt_short(), "ingest");
        inner.insert(Arc::new(claim), false);
        inner.invalidate();
        self.metrics.claims_ingested.inc();
        self.metrics.cache_invalidations.inc();
        Ok(IngestOutcome::Inserted)
    }

    /// Add many claims under a single write lock.
    ///
    /// Malformed claims are logged and skipped. Sorted orderings are dropped
    /// once, at the end.
    pub fn ingest_batch(&self, claims: impl IntoIterator<Item = Claim>) -> LoadStats {
        let mut stats = LoadStats::default();
        let mut inner = self.inner.write();
        let start = Instant::now();
        let mut touched = HashSet::new();
        for claim in claims {
            if let Err(reason) = claim.validate() {
                warn!(id = %claim.id().fmt_short(), %reason, "skipping malformed claim");
                self.metrics.claims_rejected.inc();
                stats.skipped += 1;
                continue;
            }
            if inner.claims.contains_key(&claim.id()) {
                self.metrics.claims_duplicate.inc();
                stats.duplicates += 1;
                continue;
            }
            if let Some(edit) = claim.as_attr() {
                touched.insert(edit.permanode);
            }
            inner.insert(Arc::new(claim), true);
            stats.inserted += 1;
        }
        for pn in touched {
            if let Some(meta) = inner.permanodes.get_mut(&pn) {
                meta.finish_load();
            }
        }
        if stats.inserted > 0 {
            inner.invalidate();
            self.metrics.cache_invalidations.inc();
            self.metrics.claims_ingested.inc_by(stats.inserted as u64);
        }
        stats.elapsed = start.elapsed();
        if self.config.log_load_stats {
            info!(
                inserted = stats.inserted,
                duplicates = stats.duplicates,
                skipped = stats.skipped,
                permanodes = inner.permanodes.len(),
                elapsed = ?stats.elapsed,
                "corpus loaded"
            );
        }
        stats
    }

    /// Values of `attr` on `pn`, in the order they were established.
    ///
    /// With a `signer`, only that signer's claims are replayed. Unknown
    /// permanodes and attributes yield an empty list.
    pub fn attr_values(
        &self,
        pn: &BlobRef,
        attr: &str,
        at: AsOf,
        signer: Option<BlobRef>,
    ) -> Vec<String> {
        let cutoff = at.cutoff(self.clock());
        let inner = self.inner.read();
        let Some(meta) = inner.permanodes.get(pn) else {
            return Vec::new();
        };
        if cutoff.is_none() && signer.is_none() && self.config.attr_fast_path {
            self.metrics.attr_reads_fast.inc();
            return meta.current(attr).to_vec();
        }
        self.metrics.attr_reads_replay.inc();
        meta.replay(attr, cutoff, signer)
    }

    /// The first of [`Self::attr_values`], if any.
    pub fn attr_value(
        &self,
        pn: &BlobRef,
        attr: &str,
        at: AsOf,
        signer: Option<BlobRef>,
    ) -> Option<String> {
        self.attr_values(pn, attr, at, signer).into_iter().next()
    }

    /// Whether `value` is among the values of `attr`.
    pub fn has_attr_value(
        &self,
        pn: &BlobRef,
        attr: &str,
        value: &str,
        at: AsOf,
        signer: Option<BlobRef>,
    ) -> bool {
        self.attr_values(pn, attr, at, signer)
            .iter()
            .any(|v| v == value)
    }

    /// Whether `pn` exists at `at` and is not deleted then.
    pub fn is_live(&self, pn: &BlobRef, at: AsOf) -> bool {
        let cutoff = at.cutoff(self.clock());
        let inner = self.inner.read();
        let Some(created) = inner.permanode_created(pn) else {
            return false;
        };
        if cutoff.is_some_and(|t| created > t) {
            return false;
        }
        !inner.is_deleted(pn, cutoff)
    }

    /// Whether the permanode or claim `br` is currently deleted.
    pub fn is_deleted(&self, br: &BlobRef) -> bool {
        self.inner.read().is_deleted(br, None)
    }

    /// Whether `br` was deleted at `at`.
    pub fn is_deleted_at(&self, br: &BlobRef, at: AsOf) -> bool {
        let cutoff = at.cutoff(self.clock());
        self.inner.read().is_deleted(br, cutoff)
    }

    /// Date of the earliest claim on `pn`.
    pub fn permanode_created(&self, pn: &BlobRef) -> Option<Timestamp> {
        self.inner.read().permanode_created(pn)
    }

    /// Date of the latest claim on `pn` that is not deleted.
    ///
    /// Neither a deleted claim's date nor its deletion's date count.
    pub fn permanode_modtime(&self, pn: &BlobRef) -> Option<Timestamp> {
        self.inner.read().permanode_modtime(pn)
    }

    /// Time of the permanode's content, from the first of
    /// [`CONTENT_TIME_ATTRS`] holding an RFC 3339 date.
    pub fn permanode_time(&self, pn: &BlobRef) -> Option<Timestamp> {
        CONTENT_TIME_ATTRS.iter().find_map(|attr| {
            self.attr_value(pn, attr, AsOf::Latest, None)
                .and_then(|v| Timestamp::parse_rfc3339(&v).ok())
        })
    }

    /// Claims on `pn` in claim order, leaving out deleted claims.
    pub fn claims(
        &self,
        pn: &BlobRef,
        signer: Option<BlobRef>,
        attr: Option<&str>,
    ) -> Vec<Arc<Claim>> {
        let inner = self.inner.read();
        let Some(meta) = inner.permanodes.get(pn) else {
            return Vec::new();
        };
        meta.claims()
            .iter()
            .filter(|c| !inner.is_deleted(&c.id(), None))
            .filter(|c| signer.map_or(true, |s| c.signer() == s))
            .filter(|c| attr.map_or(true, |a| c.attr() == Some(a)))
            .cloned()
            .collect()
    }

    /// Attribute claims whose value is `value`, dated at or before `at`.
    pub fn claims_referencing(&self, value: &BlobRef, at: AsOf) -> Vec<Arc<Claim>> {
        let cutoff = at.cutoff(self.clock());
        let inner = self.inner.read();
        inner
            .claim_back
            .get(value)
            .map(|claims| {
                claims
                    .iter()
                    .filter(|c| cutoff.map_or(true, |t| c.date() <= t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up an indexed claim.
    pub fn claim(&self, id: &BlobRef) -> Option<Arc<Claim>> {
        self.inner.read().claims.get(id).cloned()
    }

    /// Record the key id of a signer.
    pub fn set_signer_key_id(&self, signer: BlobRef, key_id: impl Into<String>) {
        self.inner.write().key_ids.insert(signer, key_id.into());
    }

    /// The key id of a signer, if known.
    pub fn key_id(&self, signer: &BlobRef) -> Option<String> {
        self.inner.read().key_ids.get(signer).cloned()
    }

    /// Incremented by every mutation of the claim state.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Current size of the index.
    pub fn stats(&self) -> CorpusStats {
        let inner = self.inner.read();
        CorpusStats {
            permanodes: inner.permanodes.len(),
            claims: inner.claims.len(),
            deleted_targets: inner.deletes.target_count(),
            signers: inner.key_ids.len(),
            generation: inner.generation,
        }
    }

    /// Whether the ordering `order` is cached.
    pub fn is_order_cached(&self, order: Order) -> bool {
        self.inner.read().lazy(order.kind).is_cached(order.direction)
    }

    /// Snapshot of the live permanodes in `order`.
    pub(crate) fn sorted(&self, order: Order) -> Arc<[BlobRef]> {
        let inner = self.inner.read();
        let (list, lookup) = inner.lazy(order.kind).sorted(&inner, order.direction);
        match lookup {
            Lookup::Hit => self.metrics.sort_cache_hit.inc(),
            Lookup::Reversed | Lookup::Rebuilt => self.metrics.sort_cache_miss.inc(),
        };
        list
    }
}
