//! Canonical record identifiers: `"<did>/<collection>/<rkey>"`.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Parsed form of a canonical record id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId {
    pub did: String,
    pub collection: String,
    pub rkey: String,
}

impl RecordId {
    pub fn new(
        did: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Self {
        Self {
            did: did.into(),
            collection: collection.into(),
            rkey: rkey.into(),
        }
    }

    /// Parse `"<did>/<collection>/<rkey>"`.
    ///
    /// The DID itself contains no `/`, so splitting on the first two slashes
    /// is unambiguous.
    pub fn parse(id: &str) -> Result<Self, Error> {
        let mut parts = id.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(did), Some(collection), Some(rkey))
                if !did.is_empty() && !collection.is_empty() && !rkey.is_empty() =>
            {
                Ok(Self::new(did, collection, rkey))
            }
            _ => Err(Error::invalid(format!(
                "malformed record id {id:?}, expected <did>/<collection>/<rkey>"
            ))),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let id = RecordId::new("did:mesh:ab12", "agent.memory.note", "0001ABCDEF");
        let parsed = RecordId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn rejects_missing_segments() {
        assert!(RecordId::parse("did:mesh:ab12/agent.memory.note").is_err());
        assert!(RecordId::parse("").is_err());
        assert!(RecordId::parse("did:mesh:ab12//rkey").is_err());
    }

    #[test]
    fn rkey_may_not_be_split_further() {
        // Extra slashes end up in the rkey segment, by construction.
        let parsed = RecordId::parse("did:mesh:ab12/coll/a/b").unwrap();
        assert_eq!(parsed.rkey, "a/b");
    }
}
