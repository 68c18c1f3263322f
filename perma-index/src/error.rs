//! Errors returned by the corpus.

use perma_base::BlobRef;

use crate::claim::ClaimError;

/// Error returned by [`Corpus::ingest`](crate::Corpus::ingest).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The claim failed validation and the index was not touched.
    #[error("malformed claim {}: {reason}", .id.fmt_short())]
    Malformed {
        /// The refused claim.
        id: BlobRef,
        /// Why it was refused.
        #[source]
        reason: ClaimError,
    },
}

/// Why an enumeration stopped before delivering every permanode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnumerateError {
    /// The caller cancelled the enumeration.
    #[error("enumeration cancelled")]
    Cancelled,
    /// The receiving side of the channel went away.
    #[error("enumeration receiver dropped")]
    ReceiverDropped,
}
