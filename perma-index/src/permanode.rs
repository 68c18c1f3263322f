//! Per-permanode claim records.

use std::{collections::HashMap, sync::Arc};

use perma_base::{BlobRef, Timestamp};

use crate::{
    claim::Claim,
    resolve::{self, apply},
};

/// The claims targeting one permanode, in claim order.
///
/// Also keeps the latest unfiltered value set of every attribute, updated
/// as claims arrive.
#[derive(Debug, Default)]
pub(crate) struct PermanodeMeta {
    claims: Vec<Arc<Claim>>,
    current: HashMap<String, Vec<String>>,
    /// Set while bulk loading, when `claims` is not kept sorted.
    unsorted: bool,
}

impl PermanodeMeta {
    /// Insert an attribute claim, keeping claim order.
    pub fn insert(&mut self, claim: Arc<Claim>) {
        let key = claim.sort_key();
        let in_order = self.claims.last().map_or(true, |last| last.sort_key() <= key);
        if in_order {
            if let Some(edit) = claim.as_attr() {
                let values = self.current.entry(edit.attr.to_string()).or_default();
                apply(values, edit.verb, edit.value);
            }
            self.claims.push(claim);
        } else {
            let attr = claim.attr().map(ToOwned::to_owned);
            let pos = self.claims.partition_point(|c| c.sort_key() < key);
            self.claims.insert(pos, claim);
            if let Some(attr) = attr {
                self.recompute(&attr);
            }
        }
    }

    /// Append without maintaining order. Call [`Self::finish_load`] when done.
    pub fn push_unsorted(&mut self, claim: Arc<Claim>) {
        self.claims.push(claim);
        self.unsorted = true;
    }

    /// Sort claims appended by [`Self::push_unsorted`] and rebuild the
    /// attribute values.
    pub fn finish_load(&mut self) {
        if !self.unsorted {
            return;
        }
        self.claims.sort_by_key(|c| c.sort_key());
        self.current.clear();
        for claim in &self.claims {
            if let Some(edit) = claim.as_attr() {
                let values = self.current.entry(edit.attr.to_string()).or_default();
                apply(values, edit.verb, edit.value);
            }
        }
        self.unsorted = false;
    }

    fn recompute(&mut self, attr: &str) {
        let values = resolve::replay(self.claims.iter().map(AsRef::as_ref), attr, None, None);
        self.current.insert(attr.to_string(), values);
    }

    /// All claims, in claim order.
    pub fn claims(&self) -> &[Arc<Claim>] {
        debug_assert!(!self.unsorted, "claims read during bulk load");
        &self.claims
    }

    /// Latest unfiltered values of `attr`.
    pub fn current(&self, attr: &str) -> &[String] {
        debug_assert!(!self.unsorted, "attributes read during bulk load");
        self.current.get(attr).map(Vec::as_slice).unwrap_or_default()
    }

    /// Resolve `attr` by replaying the raw claims.
    pub fn replay(
        &self,
        attr: &str,
        cutoff: Option<Timestamp>,
        signer: Option<BlobRef>,
    ) -> Vec<String> {
        resolve::replay(self.claims().iter().map(AsRef::as_ref), attr, cutoff, signer)
    }

    /// Date of the earliest claim.
    pub fn created(&self) -> Option<Timestamp> {
        self.claims().first().map(|c| c.date())
    }
}
