//! Base types and utilities for perma
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod blobref;
pub mod timestamp;

pub use blobref::{BlobRef, ParseBlobRefError};
pub use timestamp::{ParseTimestampError, Timestamp};
