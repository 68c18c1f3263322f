//! In-memory index over a log of permanode claims.
//!
//! Permanodes are stable identities whose attributes are never stored
//! directly. Instead, immutable [`Claim`]s set, add or delete attribute
//! values, and the [`Corpus`] derives the current (or any past) state by
//! replaying them.
//!
//! ```
//! use perma_base::{BlobRef, Timestamp};
//! use perma_index::{AsOf, Claim, Corpus, Order};
//!
//! let corpus = Corpus::new();
//! let signer = BlobRef::new("signer");
//! let pn = BlobRef::new("permanode");
//! corpus.ingest(Claim::set(signer, Timestamp::from_micros(1), pn, "title", "Hello"))?;
//! corpus.ingest(Claim::add(signer, Timestamp::from_micros(2), pn, "tag", "greeting"))?;
//!
//! assert_eq!(corpus.attr_value(&pn, "title", AsOf::Latest, None).as_deref(), Some("Hello"));
//! assert_eq!(corpus.permanodes(Order::created()).collect::<Vec<_>>(), vec![pn]);
//! # Ok::<(), perma_index::IngestError>(())
//! ```
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]
#![cfg_attr(perma_docsrs, feature(doc_auto_cfg))]

pub mod claim;
pub mod clock;
pub mod config;
mod corpus;
mod deletes;
mod enumerate;
pub mod error;
pub mod metrics;
mod permanode;
mod resolve;
mod sorted;
pub mod source;

pub use claim::{AttrEdit, AttrVerb, Claim, ClaimBody, ClaimError};
pub use config::CorpusConfig;
pub use corpus::{Corpus, CorpusStats, IngestOutcome, LoadStats, CONTENT_TIME_ATTRS};
pub use enumerate::PermanodeIter;
pub use error::{EnumerateError, IngestError};
pub use resolve::AsOf;
pub use sorted::{Order, OrderKind, SortDirection};
pub use source::{ClaimSource, JsonLinesLog, MemClaimLog};
