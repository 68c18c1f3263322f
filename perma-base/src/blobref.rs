//! Content addresses for blobs in the store.

use std::{fmt, str::FromStr};

use serde::{
    de::{self, SeqAccess},
    ser::SerializeTuple,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// Digest bytes shown by [`BlobRef::fmt_short`].
const SHORT_LEN: usize = 10;

fn base32(bytes: &[u8]) -> String {
    let mut text = data_encoding::BASE32_NOPAD.encode(bytes);
    text.make_ascii_lowercase();
    text
}

/// Reference to an immutable blob: the blake3 digest of its bytes.
///
/// Permanodes, claims and signers are all identified by a `BlobRef`.
#[derive(PartialEq, Eq, Copy, Clone, Hash)]
pub struct BlobRef(blake3::Hash);

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BlobRef").field(&DD(self.fmt_short())).finish()
    }
}

struct DD<T: fmt::Display>(T);

impl<T: fmt::Display> fmt::Debug for DD<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Error when parsing a [`BlobRef`] from a string.
#[derive(Debug, thiserror::Error)]
pub enum ParseBlobRefError {
    /// The string has neither the base32 nor the hex length.
    #[error("invalid blob ref length {0}")]
    Length(usize),
    /// The string has the hex length but is not hex.
    #[error("invalid blob ref hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// The string has the base32 length but is not base32.
    #[error("invalid blob ref base32: {0}")]
    Base32(#[from] data_encoding::DecodeError),
}

impl BlobRef {
    /// Length of the textual (base32) form.
    pub const STR_LEN: usize = 52;
    /// Length of the hex form.
    pub const HEX_LEN: usize = 64;

    /// Calculate the reference of the provided bytes.
    pub fn new(buf: impl AsRef<[u8]>) -> Self {
        BlobRef(blake3::hash(buf.as_ref()))
    }

    /// Bytes of the digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Create a `BlobRef` from its raw bytes representation.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(blake3::Hash::from_bytes(bytes))
    }

    /// Convert to a hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// Short base32 form, for logging.
    pub fn fmt_short(&self) -> String {
        base32(&self.as_bytes()[..SHORT_LEN])
    }
}

impl AsRef<[u8]> for BlobRef {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<blake3::Hash> for BlobRef {
    fn from(value: blake3::Hash) -> Self {
        BlobRef(value)
    }
}

impl From<[u8; 32]> for BlobRef {
    fn from(value: [u8; 32]) -> Self {
        BlobRef::from_bytes(value)
    }
}

impl From<BlobRef> for [u8; 32] {
    fn from(value: BlobRef) -> Self {
        *value.as_bytes()
    }
}

impl PartialOrd for BlobRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlobRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base32(self.as_bytes()))
    }
}

impl FromStr for BlobRef {
    type Err = ParseBlobRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        match s.len() {
            Self::HEX_LEN => hex::decode_to_slice(s, &mut bytes)?,
            Self::STR_LEN => {
                let decoded = data_encoding::BASE32_NOPAD
                    .decode(s.to_ascii_uppercase().as_bytes())?;
                bytes = decoded
                    .try_into()
                    .map_err(|v: Vec<u8>| ParseBlobRefError::Length(v.len()))?;
            }
            len => return Err(ParseBlobRefError::Length(len)),
        }
        Ok(Self::from_bytes(bytes))
    }
}

impl Serialize for BlobRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.to_string().as_str())
        } else {
            let mut s = serializer.serialize_tuple(32)?;
            for item in self.0.as_bytes() {
                s.serialize_element(item)?;
            }
            s.end()
        }
    }
}

impl<'de> Deserialize<'de> for BlobRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            deserializer.deserialize_tuple(32, BlobRefVisitor)
        }
    }
}

struct BlobRefVisitor;

impl<'de> de::Visitor<'de> for BlobRefVisitor {
    type Value = BlobRef;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "an array of 32 bytes containing a blake3 digest")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut arr = [0u8; 32];
        for (i, byte) in arr.iter_mut().enumerate() {
            *byte = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(BlobRef::from_bytes(arr))
    }
}
