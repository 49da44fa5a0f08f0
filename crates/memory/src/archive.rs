//! Session archival: trim the session to its message cap and store the
//! overflow prefix as one private `agent.session.archive` record.

use serde_json::json;

use mesh_domain::lexicon;
use mesh_domain::session::Session;

use crate::{Memory, OwnerKeys, Result};

/// Trim `session` in place.  When messages were dropped, they are written
/// as a single archive record and its id is returned.  Archival happens in
/// the same turn as the trim; callers persist the session afterwards.
pub fn archive_overflow(
    memory: &Memory,
    owner: &OwnerKeys,
    session: &mut Session,
) -> Result<Option<String>> {
    let overflow = session.split_overflow();
    if overflow.is_empty() {
        return Ok(None);
    }

    let record = json!({
        "$type": lexicon::SESSION_ARCHIVE,
        "messages": overflow,
        "archivedAt": chrono::Utc::now().to_rfc3339(),
    });
    let id = memory.store(owner, lexicon::SESSION_ARCHIVE, &record, false)?;
    tracing::info!(
        id = %id,
        archived = record["messages"].as_array().map(|m| m.len()).unwrap_or(0),
        "session overflow archived"
    );
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::keys::EncryptionKeyPair;
    use mesh_domain::session::{SessionMessage, MAX_SESSION_MESSAGES};
    use mesh_store::Store;

    fn setup() -> (Memory, OwnerKeys) {
        let memory = Memory::new(Store::open_in_memory().unwrap());
        let owner = OwnerKeys {
            did: mesh_crypto::did::did_from_name("alice"),
            encryption: EncryptionKeyPair::generate(),
        };
        (memory, owner)
    }

    #[test]
    fn no_archive_when_within_bounds() {
        let (memory, owner) = setup();
        let mut session = Session::default();
        session.messages = (0..10)
            .map(|i| SessionMessage::new("user", json!(format!("m{i}"))))
            .collect();

        let archived = archive_overflow(&memory, &owner, &mut session).unwrap();
        assert!(archived.is_none());
        assert_eq!(session.messages.len(), 10);
    }

    #[test]
    fn overflow_archived_as_one_private_record() {
        let (memory, owner) = setup();
        let mut session = Session::default();
        session.messages = (0..62)
            .map(|i| SessionMessage::new("user", json!(format!("m{i}"))))
            .collect();

        let id = archive_overflow(&memory, &owner, &mut session)
            .unwrap()
            .expect("overflow should archive");
        assert_eq!(session.messages.len(), MAX_SESSION_MESSAGES);

        let record = memory.load(&owner, &id).unwrap();
        assert_eq!(record["$type"], lexicon::SESSION_ARCHIVE);
        let archived = record["messages"].as_array().unwrap();
        assert_eq!(archived.len(), 12);
        assert_eq!(archived[0]["content"], "m0");
        assert_eq!(archived[11]["content"], "m11");

        let row = memory.store_handle().get_record(&id).unwrap().unwrap();
        assert!(!row.public);
    }
}
