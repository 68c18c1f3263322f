//! Claims: signed, immutable edits to a permanode.

use perma_base::{BlobRef, Timestamp};
use serde::{Deserialize, Serialize};

/// An immutable claim describing one change by one signer at one instant.
///
/// Claims for a permanode are totally ordered by [`Claim::sort_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    id: BlobRef,
    signer: BlobRef,
    date: Timestamp,
    body: ClaimBody,
}

/// What a claim does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClaimBody {
    /// Replace all values of `attr` with `value`.
    SetAttribute {
        /// Target permanode.
        permanode: BlobRef,
        /// Attribute name.
        attr: String,
        /// New sole value.
        value: String,
    },
    /// Add `value` to the values of `attr`.
    AddAttribute {
        /// Target permanode.
        permanode: BlobRef,
        /// Attribute name.
        attr: String,
        /// Value to add.
        value: String,
    },
    /// Remove `value` from `attr`, or every value if `value` is empty.
    DelAttribute {
        /// Target permanode.
        permanode: BlobRef,
        /// Attribute name.
        attr: String,
        /// Value to remove, empty for all.
        #[serde(default)]
        value: String,
    },
    /// Delete a permanode, or delete another claim.
    ///
    /// Deleting a deletion claim undeletes its target.
    Delete {
        /// The permanode or claim being deleted.
        target: BlobRef,
    },
}

/// The verb of an attribute claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrVerb {
    /// See [`ClaimBody::SetAttribute`].
    Set,
    /// See [`ClaimBody::AddAttribute`].
    Add,
    /// See [`ClaimBody::DelAttribute`].
    Del,
}

/// Borrowed view of an attribute claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrEdit<'a> {
    /// The verb.
    pub verb: AttrVerb,
    /// Target permanode.
    pub permanode: BlobRef,
    /// Attribute name.
    pub attr: &'a str,
    /// Value operand.
    pub value: &'a str,
}

/// Reasons a claim is refused by the index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    /// Attribute claims need a name.
    #[error("attribute name is empty")]
    EmptyAttribute,
    /// A claim may not target its own id.
    #[error("claim targets itself")]
    SelfReference,
}

impl ClaimBody {
    /// The ref this claim is about: the permanode for attribute claims,
    /// the deletion target otherwise.
    pub fn target(&self) -> BlobRef {
        match self {
            ClaimBody::SetAttribute { permanode, .. }
            | ClaimBody::AddAttribute { permanode, .. }
            | ClaimBody::DelAttribute { permanode, .. } => *permanode,
            ClaimBody::Delete { target } => *target,
        }
    }

    /// View as an attribute edit, `None` for deletions.
    pub fn as_attr(&self) -> Option<AttrEdit<'_>> {
        let (verb, permanode, attr, value) = match self {
            ClaimBody::SetAttribute {
                permanode,
                attr,
                value,
            } => (AttrVerb::Set, permanode, attr, value),
            ClaimBody::AddAttribute {
                permanode,
                attr,
                value,
            } => (AttrVerb::Add, permanode, attr, value),
            ClaimBody::DelAttribute {
                permanode,
                attr,
                value,
            } => (AttrVerb::Del, permanode, attr, value),
            ClaimBody::Delete { .. } => return None,
        };
        Some(AttrEdit {
            verb,
            permanode: *permanode,
            attr,
            value,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self.as_attr() {
            Some(edit) => {
                out.push(match edit.verb {
                    AttrVerb::Set => 0,
                    AttrVerb::Add => 1,
                    AttrVerb::Del => 2,
                });
                out.extend_from_slice(edit.permanode.as_bytes());
                encode_str(edit.attr, out);
                encode_str(edit.value, out);
            }
            None => {
                out.push(3);
                out.extend_from_slice(self.target().as_bytes());
            }
        }
    }
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u64).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

impl Claim {
    /// Create a claim, deriving its id from the canonical encoding.
    pub fn new(signer: BlobRef, date: Timestamp, body: ClaimBody) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(signer.as_bytes());
        buf.extend_from_slice(&date.as_micros().to_be_bytes());
        body.encode(&mut buf);
        let id = BlobRef::new(&buf);
        Self {
            id,
            signer,
            date,
            body,
        }
    }

    /// Create a claim with an id assigned by the blob store.
    pub fn with_id(id: BlobRef, signer: BlobRef, date: Timestamp, body: ClaimBody) -> Self {
        Self {
            id,
            signer,
            date,
            body,
        }
    }

    /// Shorthand for a [`ClaimBody::SetAttribute`] claim.
    pub fn set(
        signer: BlobRef,
        date: Timestamp,
        permanode: BlobRef,
        attr: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            signer,
            date,
            ClaimBody::SetAttribute {
                permanode,
                attr: attr.into(),
                value: value.into(),
            },
        )
    }

    /// Shorthand for a [`ClaimBody::AddAttribute`] claim.
    pub fn add(
        signer: BlobRef,
        date: Timestamp,
        permanode: BlobRef,
        attr: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            signer,
            date,
            ClaimBody::AddAttribute {
                permanode,
                attr: attr.into(),
                value: value.into(),
            },
        )
    }

    /// Shorthand for a [`ClaimBody::DelAttribute`] claim.
    pub fn del(
        signer: BlobRef,
        date: Timestamp,
        permanode: BlobRef,
        attr: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            signer,
            date,
            ClaimBody::DelAttribute {
                permanode,
                attr: attr.into(),
                value: value.into(),
            },
        )
    }

    /// Shorthand for a [`ClaimBody::Delete`] claim.
    pub fn delete(signer: BlobRef, date: Timestamp, target: BlobRef) -> Self {
        Self::new(signer, date, ClaimBody::Delete { target })
    }

    /// The claim's own blob ref.
    pub fn id(&self) -> BlobRef {
        self.id
    }

    /// Who issued the claim.
    pub fn signer(&self) -> BlobRef {
        self.signer
    }

    /// When the claim was made.
    pub fn date(&self) -> Timestamp {
        self.date
    }

    /// What the claim does.
    pub fn body(&self) -> &ClaimBody {
        &self.body
    }

    /// See [`ClaimBody::target`].
    pub fn target(&self) -> BlobRef {
        self.body.target()
    }

    /// See [`ClaimBody::as_attr`].
    pub fn as_attr(&self) -> Option<AttrEdit<'_>> {
        self.body.as_attr()
    }

    /// Attribute name, if this is an attribute claim.
    pub fn attr(&self) -> Option<&str> {
        self.as_attr().map(|e| e.attr)
    }

    /// The total order of claims on one permanode.
    pub fn sort_key(&self) -> (Timestamp, BlobRef) {
        (self.date, self.id)
    }

    /// Check the claim is well formed.
    pub fn validate(&self) -> Result<(), ClaimError> {
        if self.target() == self.id {
            return Err(ClaimError::SelfReference);
        }
        if let Some(edit) = self.as_attr() {
            if edit.attr.is_empty() {
                return Err(ClaimError::EmptyAttribute);
            }
        }
        Ok(())
    }
}
