//! Item identity.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Opaque, globally unique item identifier.
///
/// An item's id never changes for its lifetime. Two fixed-width textual
/// encodings are supported: the canonical 36-character hyphenated form
/// and a 22-character compact base64 form used where names must stay
/// short (e.g. as the default item name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Canonical 36-character hyphenated encoding.
    pub fn to_hyphenated(&self) -> String {
        self.0.hyphenated().to_string()
    }

    /// Compact 22-character unpadded base64 encoding.
    pub fn to_compact(&self) -> String {
        Base64UrlUnpadded::encode_string(self.0.as_bytes())
    }

    /// Parse either encoding.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() == 22 {
            let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::TypeError {
                expected: "item id".into(),
                got: s.into(),
            })?;
            let bytes: [u8; 16] = bytes.try_into().map_err(|_| Error::TypeError {
                expected: "item id".into(),
                got: s.into(),
            })?;
            Ok(Self(Uuid::from_bytes(bytes)))
        } else {
            Uuid::parse_str(s).map(Self).map_err(|_| Error::TypeError {
                expected: "item id".into(),
                got: s.into(),
            })
        }
    }

    /// Whether a string is shaped like one of the two encodings.
    ///
    /// Used by `find` to classify a string as an id rather than a path.
    pub fn looks_like_id(s: &str) -> bool {
        (s.len() == 36 && s.as_bytes().get(8) == Some(&b'-')) || s.len() == 22
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
