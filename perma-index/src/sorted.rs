//! Lazily built, generation checked orderings of live permanodes.

use std::sync::Arc;

use parking_lot::Mutex;
use perma_base::{BlobRef, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::corpus::CorpusInner;

/// What permanodes are sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    /// Date of the earliest claim.
    #[default]
    Created,
    /// Date of the latest claim that is not deleted.
    Modified,
}

impl OrderKind {
    /// The sort key of `pn`, or `None` if it has no such time and is left
    /// out of the ordering.
    pub(crate) fn key(self, inner: &CorpusInner, pn: &BlobRef) -> Option<Timestamp> {
        match self {
            OrderKind::Created => inner.permanode_created(pn),
            OrderKind::Modified => inner.permanode_modtime(pn),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Oldest first.
    #[default]
    Asc,
    /// Newest first.
    Desc,
}

impl SortDirection {
    /// The other direction.
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// An enumeration order: a kind and a direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    /// What to sort by.
    pub kind: OrderKind,
    /// Which way.
    pub direction: SortDirection,
}

impl Order {
    /// Sort by creation, oldest first.
    pub const fn created() -> Self {
        Self {
            kind: OrderKind::Created,
            direction: SortDirection::Asc,
        }
    }

    /// Sort by modification, most recent first.
    pub const fn recently_modified() -> Self {
        Self {
            kind: OrderKind::Modified,
            direction: SortDirection::Desc,
        }
    }

    /// The same kind in the other direction.
    pub fn reversed(self) -> Self {
        Self {
            kind: self.kind,
            direction: self.direction.reversed(),
        }
    }
}

/// How a sorted lookup was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// The requested direction was cached.
    Hit,
    /// Built by reversing the cached other direction.
    Reversed,
    /// Rebuilt from the permanode map.
    Rebuilt,
}

/// Cached ascending and descending orderings for one [`OrderKind`].
#[derive(Debug)]
pub(crate) struct LazySorted {
    kind: OrderKind,
    slots: Mutex<Slots>,
}

#[derive(Debug, Default)]
struct Slots {
    asc: Option<Arc<[BlobRef]>>,
    desc: Option<Arc<[BlobRef]>>,
    /// Corpus generation the slots were built from.
    of_gen: u64,
}

impl Slots {
    fn get(&self, direction: SortDirection) -> &Option<Arc<[BlobRef]>> {
        match direction {
            SortDirection::Asc => &self.asc,
            SortDirection::Desc => &self.desc,
        }
    }

    fn get_mut(&mut self, direction: SortDirection) -> &mut Option<Arc<[BlobRef]>> {
        match direction {
            SortDirection::Asc => &mut self.asc,
            SortDirection::Desc => &mut self.desc,
        }
    }
}

impl LazySorted {
    pub fn new(kind: OrderKind) -> Self {
        Self {
            kind,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Drop both orderings. Requires exclusive access to the corpus.
    pub fn invalidate(&mut self) {
        let slots = self.slots.get_mut();
        slots.asc = None;
        slots.desc = None;
    }

    pub fn is_cached(&self, direction: SortDirection) -> bool {
        self.slots.lock().get(direction).is_some()
    }

    /// The live permanodes of `inner` in `direction`.
    ///
    /// The caller holds at least a read lock on `inner`. The returned slice
    /// is immutable and stays valid after later invalidations.
    pub fn sorted(
        &self,
        inner: &CorpusInner,
        direction: SortDirection,
    ) -> (Arc<[BlobRef]>, Lookup) {
        let mut slots = self.slots.lock();
        if slots.of_gen == inner.generation() {
            if let Some(list) = slots.get(direction) {
                return (list.clone(), Lookup::Hit);
            }
            if let Some(other) = slots.get(direction.reversed()) {
                let list: Arc<[BlobRef]> = other.iter().rev().copied().collect();
                *slots.get_mut(direction) = Some(list.clone());
                return (list, Lookup::Reversed);
            }
        } else {
            debug_assert!(
                slots.asc.is_none() && slots.desc.is_none(),
                "sorted cache of generation {} survived into generation {}",
                slots.of_gen,
                inner.generation()
            );
            slots.asc = None;
            slots.desc = None;
        }

        let mut pns: Vec<(Timestamp, BlobRef)> = inner
            .permanode_refs()
            .filter(|pn| !inner.is_deleted(pn, None))
            .filter_map(|pn| self.kind.key(inner, pn).map(|t| (t, *pn)))
            .collect();
        pns.sort_unstable();
        let list: Arc<[BlobRef]> = match direction {
            SortDirection::Asc => pns.into_iter().map(|(_, pn)| pn).collect(),
            SortDirection::Desc => pns.into_iter().rev().map(|(_, pn)| pn).collect(),
        };
        debug!(
            kind = ?self.kind,
            ?direction,
            len = list.len(),
            generation = inner.generation(),
            "rebuilt sorted permanodes"
        );
        *slots.get_mut(direction) = Some(list.clone());
        slots.of_gen = inner.generation();
        (list, Lookup::Rebuilt)
    }
}
