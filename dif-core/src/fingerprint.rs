use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

pub const DIGEST_LEN: usize = 20;

/// SHA-1 digest of one piece.
pub type PieceDigest = [u8; DIGEST_LEN];

pub fn sha1_digest(data: &[u8]) -> PieceDigest {
    Sha1::digest(data).into()
}

/// Identity of a content tree: SHA-1 over the canonical encoding of its descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; DIGEST_LEN]);

impl Fingerprint {
    pub fn of(canonical: &[u8]) -> Self {
        Fingerprint(sha1_digest(canonical))
    }

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    /// Accepts 40 hex characters in either case.
    fn from_str(s: &str) -> Result<Self> {
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s.trim(), &mut out)
            .map_err(|e| Error::invalid(format!("fingerprint {s:?}: {e}")))?;
        Ok(Fingerprint(out))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}
