//! Deletion tracking for permanodes and claims.

use std::collections::{HashMap, HashSet};

use perma_base::{BlobRef, Timestamp};

/// One deletion of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Deletion {
    pub deleter: BlobRef,
    pub when: Timestamp,
}

/// Maps each deleted ref to the claims that delete it, newest first.
#[derive(Debug, Default)]
pub(crate) struct DeletionIndex {
    deletes: HashMap<BlobRef, Vec<Deletion>>,
}

impl DeletionIndex {
    /// Record that `deleter`, dated `when`, deletes `target`.
    ///
    /// Returns false if this deletion was already known.
    pub fn insert(&mut self, target: BlobRef, deleter: BlobRef, when: Timestamp) -> bool {
        let del = Deletion { deleter, when };
        let list = self.deletes.entry(target).or_default();
        if list.contains(&del) {
            return false;
        }
        let pos = list
            .iter()
            .position(|d| (d.when, d.deleter) < (when, deleter))
            .unwrap_or(list.len());
        list.insert(pos, del);
        true
    }

    /// Whether `br` is deleted, considering only deletions dated at or
    /// before `at` (all deletions if `None`).
    ///
    /// A ref is deleted if any of its deleters is not itself deleted.
    pub fn is_deleted(&self, br: &BlobRef, at: Option<Timestamp>) -> bool {
        if !self.deletes.contains_key(br) {
            return false;
        }
        // Delete chains can be deeper than the call stack. Each frame is a
        // ref and the index of its next deletion to look at.
        let mut memo: HashMap<BlobRef, bool> = HashMap::new();
        let mut on_path: HashSet<BlobRef> = HashSet::new();
        let mut stack: Vec<(BlobRef, usize)> = vec![(*br, 0)];
        on_path.insert(*br);
        while let Some(&(node, mut pos)) = stack.last() {
            let list = self.deletes.get(&node).map(Vec::as_slice).unwrap_or_default();
            let mut deleted = false;
            let mut descend = None;
            while let Some(d) = list.get(pos) {
                if at.map_or(true, |t| d.when <= t) {
                    let deleter_deleted = match memo.get(&d.deleter) {
                        Some(v) => *v,
                        None if !self.deletes.contains_key(&d.deleter) => false,
                        // a deletion cycle can only be built from externally assigned ids
                        None if on_path.contains(&d.deleter) => false,
                        None => {
                            descend = Some(d.deleter);
                            break;
                        }
                    };
                    if !deleter_deleted {
                        deleted = true;
                        break;
                    }
                }
                pos += 1;
            }
            if let Some(child) = descend {
                if let Some(top) = stack.last_mut() {
                    top.1 = pos;
                }
                on_path.insert(child);
                stack.push((child, 0));
                continue;
            }
            stack.pop();
            on_path.remove(&node);
            memo.insert(node, deleted);
        }
        memo.get(br).copied().unwrap_or_default()
    }

    /// Deletions of `br`, newest first.
    #[cfg(test)]
    pub fn deletions(&self, br: &BlobRef) -> &[Deletion] {
        self.deletes.get(br).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of refs with at least one deletion.
    pub fn target_count(&self) -> usize {
        self.deletes.len()
    }
}
