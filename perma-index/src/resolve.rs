//! Attribute resolution by replaying claims.

use perma_base::{BlobRef, Timestamp};

use crate::{
    claim::{AttrVerb, Claim},
    clock::Clock,
};

/// The point in time a query is evaluated at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AsOf {
    /// No upper bound: every claim counts.
    #[default]
    Latest,
    /// The corpus clock's current time.
    Now,
    /// Only claims dated at or before this instant count.
    At(Timestamp),
}

impl AsOf {
    /// The inclusive upper bound on claim dates, `None` if unbounded.
    pub fn cutoff(&self, clock: &dyn Clock) -> Option<Timestamp> {
        match self {
            AsOf::Latest => None,
            AsOf::Now => Some(clock.now()),
            AsOf::At(t) => Some(*t),
        }
    }
}

impl From<Timestamp> for AsOf {
    fn from(value: Timestamp) -> Self {
        AsOf::At(value)
    }
}

impl From<Option<Timestamp>> for AsOf {
    fn from(value: Option<Timestamp>) -> Self {
        value.map(AsOf::At).unwrap_or_default()
    }
}

/// Apply one attribute edit to a working value set.
pub(crate) fn apply(values: &mut Vec<String>, verb: AttrVerb, value: &str) {
    match verb {
        AttrVerb::Set => {
            values.clear();
            values.push(value.to_string());
        }
        AttrVerb::Add => {
            if !values.iter().any(|v| v == value) {
                values.push(value.to_string());
            }
        }
        AttrVerb::Del if value.is_empty() => values.clear(),
        AttrVerb::Del => values.retain(|v| v != value),
    }
}

/// Replay `claims`, which must be in claim order, for one attribute.
pub(crate) fn replay<'a>(
    claims: impl IntoIterator<Item = &'a Claim>,
    attr: &str,
    cutoff: Option<Timestamp>,
    signer: Option<BlobRef>,
) -> Vec<String> {
    let mut values = Vec::new();
    for claim in claims {
        if cutoff.is_some_and(|t| claim.date() > t) {
            break;
        }
        if signer.is_some_and(|s| s != claim.signer()) {
            continue;
        }
        match claim.as_attr() {
            Some(edit) if edit.attr == attr => apply(&mut values, edit.verb, edit.value),
            _ => {}
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(micros: u64) -> Timestamp {
        Timestamp::from_micros(micros)
    }

    #[test]
    fn set_add_delete() {
        let a = BlobRef::new("signer");
        let pn = BlobRef::new("pn");
        let claims = vec![
            Claim::set(a, ts(1), pn, "foo", "v1"),
            Claim::add(a, ts(2), pn, "tag", "a"),
            Claim::add(a, ts(3), pn, "tag", "b"),
            Claim::del(a, ts(4), pn, "tag", ""),
            Claim::add(a, ts(5), pn, "tag", "c"),
            Claim::add(a, ts(6), pn, "tag", "d"),
            Claim::add(a, ts(7), pn, "tag", "e"),
            Claim::del(a, ts(8), pn, "tag", "d"),
        ];
        assert_eq!(replay(&claims, "tag", None, None), vec!["c", "e"]);
        assert_eq!(replay(&claims, "foo", None, None), vec!["v1"]);
        assert_eq!(replay(&claims, "tag", Some(ts(3)), None), vec!["a", "b"]);
        assert_eq!(replay(&claims, "tag", Some(ts(4)), None), Vec::<String>::new());
        assert_eq!(replay(&claims, "tag", Some(ts(0)), None), Vec::<String>::new());
        assert!(replay(&claims, "missing", None, None).is_empty());
    }

    #[test]
    fn add_is_idempotent() {
        let mut values = Vec::new();
        apply(&mut values, AttrVerb::Add, "x");
        apply(&mut values, AttrVerb::Add, "y");
        apply(&mut values, AttrVerb::Add, "x");
        assert_eq!(values, vec!["x", "y"]);
        apply(&mut values, AttrVerb::Del, "x");
        apply(&mut values, AttrVerb::Del, "nope");
        assert_eq!(values, vec!["y"]);
        apply(&mut values, AttrVerb::Set, "z");
        assert_eq!(values, vec!["z"]);
    }

    #[test]
    fn signer_filter_is_an_isolated_timeline() {
        let a = BlobRef::new("a");
        let b = BlobRef::new("b");
        let pn = BlobRef::new("pn");
        let claims = vec![
            Claim::add(a, ts(1), pn, "tag", "a1"),
            Claim::set(b, ts(2), pn, "tag", "b1"),
            Claim::add(a, ts(3), pn, "tag", "a2"),
            Claim::del(b, ts(4), pn, "tag", ""),
            Claim::add(b, ts(5), pn, "tag", "b2"),
        ];
        assert_eq!(replay(&claims, "tag", None, Some(a)), vec!["a1", "a2"]);
        assert_eq!(replay(&claims, "tag", None, Some(b)), vec!["b2"]);
        assert_eq!(replay(&claims, "tag", None, None), vec!["b2"]);
        assert_eq!(replay(&claims, "tag", Some(ts(3)), None), vec!["b1", "a2"]);
    }

    #[test]
    fn as_of_cutoff() {
        let clock = crate::clock::ManualClock::new(ts(42));
        assert_eq!(AsOf::Latest.cutoff(&clock), None);
        assert_eq!(AsOf::Now.cutoff(&clock), Some(ts(42)));
        clock.advance(8);
        assert_eq!(AsOf::Now.cutoff(&clock), Some(ts(50)));
        assert_eq!(AsOf::At(ts(7)).cutoff(&clock), Some(ts(7)));
        assert_eq!(AsOf::from(None), AsOf::Latest);
    }
}
