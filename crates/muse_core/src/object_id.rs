//! Object identification and canonical envelope format.

use crate::error::{MuseError, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A 32-byte BLAKE3 content hash used to identify objects.
///
/// The same content always produces the same ObjectId, so blobs, trees and
/// commits are deduplicated across the whole object graph and across
/// push/pull transfers.
///
/// In human-readable formats (JSON, TOML) an ObjectId is a 64-character
/// lowercase hex string; binary formats store the raw bytes.
///
/// # Examples
///
/// ```
/// use muse_core::ObjectId;
///
/// let id = ObjectId::from_bytes([0xab; 32]);
/// assert_eq!(id.as_hex().len(), 64);
/// assert_eq!(id.shard(), "ab");
/// assert_eq!(id.short(), "abababab");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// The length of an ObjectId in bytes.
    pub const LEN: usize = 32;

    /// The length of an ObjectId as a hex string.
    pub const HEX_LEN: usize = 64;

    /// Creates an ObjectId from raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns a reference to the underlying 32-byte BLAKE3 hash.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns this ObjectId as a lowercase hex string.
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the abbreviated 8-character form used in logs and CLI output.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Returns the shard prefix (first 2 hex characters).
    ///
    /// Used for directory sharding in the object store:
    /// `.muse/objects/{shard}/{full_hex}`
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Parses an ObjectId from a hex string.
    ///
    /// # Errors
    ///
    /// Returns `MuseError::InvalidHex` if the string is not valid hex
    /// or is not exactly 64 characters long.
    ///
    /// # Examples
    ///
    /// ```
    /// use muse_core::ObjectId;
    ///
    /// let hex = "a".repeat(64);
    /// let id = ObjectId::from_hex(&hex).unwrap();
    /// assert_eq!(id.as_hex(), hex);
    /// ```
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != Self::HEX_LEN {
            return Err(MuseError::InvalidHex(format!(
                "expected {} hex chars, got {}",
                Self::HEX_LEN,
                s.len()
            )));
        }

        let bytes = hex::decode(s).map_err(|e| MuseError::InvalidHex(e.to_string()))?;

        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| MuseError::InvalidHex("invalid length".to_string()))?;

        Ok(Self(arr))
    }

    /// Computes the ObjectId of a payload of the given kind.
    pub fn hash_object(kind: ObjectKind, payload: &[u8]) -> Self {
        let canonical = canonical_bytes(kind, payload);
        let hash = blake3::hash(&canonical);
        Self::from_bytes(*hash.as_bytes())
    }

    /// Computes the ObjectId a blob with this content would have.
    pub fn hash_blob(data: &[u8]) -> Self {
        Self::hash_object(ObjectKind::Blob, data)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}...)", &self.as_hex()[..12])
    }
}

impl std::str::FromStr for ObjectId {
    type Err = MuseError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.as_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            struct HexVisitor;

            impl Visitor<'_> for HexVisitor {
                type Value = ObjectId;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a 64-character hex object id")
                }

                fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ObjectId, E> {
                    ObjectId::from_hex(v).map_err(E::custom)
                }
            }

            deserializer.deserialize_str(HexVisitor)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(ObjectId)
        }
    }
}

/// Object kind discriminant for the canonical envelope.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Serialized musical document (canonical bytes).
    Blob = 1,
    /// Path → blob/tree mapping.
    Tree = 2,
    /// History node.
    Commit = 3,
}

impl ObjectKind {
    /// Parses the envelope discriminant byte.
    pub(crate) fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Blob),
            2 => Some(Self::Tree),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// Canonical envelope magic bytes.
pub(crate) const MAGIC: &[u8; 5] = b"MUSE1";

/// Size of the envelope header preceding the payload.
pub(crate) const HEADER_LEN: usize = 5 + 1 + 8;

/// Constructs canonical bytes for hashing.
///
/// Format:
/// - Magic: "MUSE1" (5 bytes)
/// - Kind: u8 (1 byte)
/// - Length: u64 LE (8 bytes)
/// - Payload: variable bytes
pub(crate) fn canonical_bytes(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(kind as u8);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}
