use perma_base::{BlobRef, Timestamp};
use perma_index::{AsOf, Claim, Corpus, CorpusConfig, Order};
use proptest::prelude::*;

const ATTRS: [&str; 2] = ["tag", "title"];

fn signers() -> [BlobRef; 2] {
    [BlobRef::new("alice"), BlobRef::new("bob")]
}

fn pn() -> BlobRef {
    BlobRef::new("pn")
}

fn arb_claims() -> impl Strategy<Value = Vec<Claim>> {
    let edit = (
        0usize..2,
        0u8..3,
        0u64..30,
        prop::sample::select(ATTRS.to_vec()),
        prop::sample::select(vec!["", "a", "b", "c"]),
    );
    prop::collection::vec(edit, 0..60).prop_map(|edits| {
        edits
            .into_iter()
            .map(|(signer, verb, t, attr, value)| {
                let signer = signers()[signer];
                let t = Timestamp::from_micros(t);
                match verb {
                    0 => Claim::set(signer, t, pn(), attr, value),
                    1 => Claim::add(signer, t, pn(), attr, value),
                    _ => Claim::del(signer, t, pn(), attr, value),
                }
            })
            .collect()
    })
}

fn corpus_of(claims: impl IntoIterator<Item = Claim>, attr_fast_path: bool) -> Corpus {
    let corpus = Corpus::with_config(CorpusConfig {
        attr_fast_path,
        ..Default::default()
    });
    for claim in claims {
        corpus.ingest(claim).unwrap();
    }
    corpus
}

proptest! {
    #[test]
    fn fast_path_matches_replay(claims in arb_claims()) {
        let fast = corpus_of(claims.clone(), true);
        let slow = corpus_of(claims, false);
        for attr in ATTRS {
            prop_assert_eq!(
                fast.attr_values(&pn(), attr, AsOf::Latest, None),
                slow.attr_values(&pn(), attr, AsOf::Latest, None)
            );
        }
        prop_assert!(slow.metrics().attr_reads_fast.get() == 0);
    }

    #[test]
    fn ingest_order_is_irrelevant(claims in arb_claims()) {
        let forward = corpus_of(claims.clone(), true);
        let backward = corpus_of(claims.iter().rev().cloned(), true);
        let bulk = Corpus::new();
        bulk.ingest_batch(claims);
        for attr in ATTRS {
            let expected = forward.attr_values(&pn(), attr, AsOf::Latest, None);
            prop_assert_eq!(&backward.attr_values(&pn(), attr, AsOf::Latest, None), &expected);
            prop_assert_eq!(&bulk.attr_values(&pn(), attr, AsOf::Latest, None), &expected);
        }
    }

    #[test]
    fn signer_filter_equals_isolated_log(claims in arb_claims()) {
        let all = corpus_of(claims.clone(), true);
        for signer in signers() {
            let own = corpus_of(claims.iter().filter(|c| c.signer() == signer).cloned(), true);
            for attr in ATTRS {
                prop_assert_eq!(
                    all.attr_values(&pn(), attr, AsOf::Latest, Some(signer)),
                    own.attr_values(&pn(), attr, AsOf::Latest, None)
                );
            }
        }
    }

    #[test]
    fn time_travel_equals_truncated_log(claims in arb_claims(), cut in 0u64..30) {
        let cut = Timestamp::from_micros(cut);
        let all = corpus_of(claims.clone(), true);
        let truncated = corpus_of(claims.into_iter().filter(|c| c.date() <= cut), true);
        for attr in ATTRS {
            prop_assert_eq!(
                all.attr_values(&pn(), attr, AsOf::At(cut), None),
                truncated.attr_values(&pn(), attr, AsOf::Latest, None)
            );
        }
    }

    #[test]
    fn resolve_is_deterministic(claims in arb_claims()) {
        let corpus = corpus_of(claims, true);
        for attr in ATTRS {
            let cold = corpus.attr_values(&pn(), attr, AsOf::At(Timestamp::MAX), None);
            let warm = corpus.attr_values(&pn(), attr, AsOf::Latest, None);
            prop_assert_eq!(&cold, &warm);
            prop_assert_eq!(&cold, &corpus.attr_values(&pn(), attr, AsOf::Latest, None));
        }
    }
}

#[test]
fn deleted_permanodes_leave_enumeration() {
    let s = signers()[0];
    let t = Timestamp::from_micros;
    let corpus = Corpus::new();
    let keep = BlobRef::new("keep");
    let gone = BlobRef::new("gone");
    corpus.ingest(Claim::set(s, t(1), keep, "title", "keep")).unwrap();
    corpus.ingest(Claim::set(s, t(2), gone, "title", "gone")).unwrap();
    for order in [Order::created(), Order::recently_modified()] {
        assert_eq!(corpus.permanodes(order).len(), 2);
    }

    let deletion = Claim::delete(s, t(3), gone);
    corpus.ingest(deletion.clone()).unwrap();
    for order in [Order::created(), Order::recently_modified()] {
        assert_eq!(corpus.permanodes(order).collect::<Vec<_>>(), vec![keep]);
        assert_eq!(corpus.permanodes(order.reversed()).collect::<Vec<_>>(), vec![keep]);
    }
    assert!(corpus.is_live(&gone, AsOf::At(t(2))));
    assert!(!corpus.is_live(&gone, AsOf::Latest));

    corpus.ingest(Claim::delete(s, t(4), deletion.id())).unwrap();
    assert_eq!(
        corpus.permanodes(Order::created()).collect::<Vec<_>>(),
        vec![keep, gone]
    );
    assert!(corpus.is_live(&gone, AsOf::Latest));
}

#[test]
fn permanode_with_only_deleted_claims_has_no_modtime() {
    let s = signers()[0];
    let t = Timestamp::from_micros;
    let corpus = Corpus::new();
    let pn = BlobRef::new("pn");
    let only = Claim::set(s, t(1), pn, "title", "x");
    corpus.ingest(only.clone()).unwrap();
    corpus.ingest(Claim::delete(s, t(2), only.id())).unwrap();
    assert_eq!(corpus.permanode_modtime(&pn), None);
    assert!(corpus.permanodes(Order::recently_modified()).next().is_none());
    // still known by creation
    assert_eq!(corpus.permanodes(Order::created()).collect::<Vec<_>>(), vec![pn]);
}

#[test]
fn long_delete_undelete_chain() {
    let s = signers()[0];
    let t = Timestamp::from_micros;
    let corpus = Corpus::new();
    let pn = pn();
    let mut claims = vec![Claim::set(s, t(0), pn, "title", "x")];
    let mut target = pn;
    for i in 1..=100_001 {
        let deletion = Claim::delete(s, t(i), target);
        target = deletion.id();
        claims.push(deletion);
    }
    assert_eq!(corpus.ingest_batch(claims).inserted, 100_002);

    // the newest deletion is live, so every other link down to pn is deleted
    assert!(!corpus.is_live(&pn, AsOf::Latest));
    assert!(corpus.is_live(&pn, AsOf::At(t(100_000))));
    assert!(!corpus.is_live(&pn, AsOf::At(t(99_999))));
    assert!(corpus.permanodes(Order::created()).next().is_none());
    assert!(corpus.permanodes(Order::recently_modified()).next().is_none());
}
