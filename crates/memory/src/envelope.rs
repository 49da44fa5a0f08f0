//! The envelope-encryption contract: write, read, update, share, and the
//! shared-read path.

use serde_json::Value;
use x25519_dalek::PublicKey;

use mesh_crypto::aead::{self, DEK_LEN, NONCE_LEN};
use mesh_crypto::keys::EncryptionKeyPair;
use mesh_crypto::seal;
use mesh_domain::record::RecordId;
use mesh_store::{ListQuery, RecordRow, RecordUpdate, Store};

use crate::{rkey, MemoryError, Result};

/// An agent's view of its own keys, as needed by the memory paths.
#[derive(Clone)]
pub struct OwnerKeys {
    pub did: String,
    pub encryption: EncryptionKeyPair,
}

/// A decrypted record as returned to callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecordEntry {
    pub id: String,
    pub record: Value,
}

/// A decrypted listing page.
#[derive(Debug, serde::Serialize)]
pub struct RecordListing {
    pub entries: Vec<RecordEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Envelope-encrypted memory over the shared store.  Cheap to clone.
#[derive(Clone)]
pub struct Memory {
    store: Store,
}

impl Memory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store_handle(&self) -> &Store {
        &self.store
    }

    // ── Write path ─────────────────────────────────────────────────

    /// Store a record.  Private records are AEAD-encrypted under a fresh
    /// DEK sealed for the owner; public records keep plaintext bytes in the
    /// ciphertext column and no DEK.
    pub fn store(
        &self,
        owner: &OwnerKeys,
        collection: &str,
        record: &Value,
        public: bool,
    ) -> Result<String> {
        let plaintext = serde_json::to_vec(record)?;
        let rkey = rkey::next();
        let id = RecordId::new(&owner.did, collection, &rkey).to_string();
        let now = mesh_store::now_ms();

        let row = if public {
            RecordRow {
                id: id.clone(),
                did: owner.did.clone(),
                collection: collection.to_string(),
                rkey,
                ciphertext: plaintext,
                encrypted_dek: None,
                nonce: aead::generate_nonce().to_vec(),
                public: true,
                created_at: now,
                updated_at: None,
                deleted_at: None,
            }
        } else {
            let (ciphertext, sealed_dek, nonce) =
                encrypt_for(&owner.encryption.public_key(), &plaintext)?;
            RecordRow {
                id: id.clone(),
                did: owner.did.clone(),
                collection: collection.to_string(),
                rkey,
                ciphertext,
                encrypted_dek: Some(sealed_dek),
                nonce: nonce.to_vec(),
                public: false,
                created_at: now,
                updated_at: None,
                deleted_at: None,
            }
        };

        self.store.insert_record(&row)?;
        tracing::debug!(id = %id, collection, public, "record stored");
        Ok(id)
    }

    // ── Read path ──────────────────────────────────────────────────

    /// Load and decrypt a record owned by `owner`.
    pub fn load(&self, owner: &OwnerKeys, id: &str) -> Result<Value> {
        let row = self.fetch_owned(owner, id)?;
        self.decrypt_row(&owner.encryption, &row)
    }

    // ── Update path ────────────────────────────────────────────────

    /// Re-encrypt a record with a **new** DEK and nonce; privacy mode is
    /// preserved from the stored row.
    pub fn update(&self, owner: &OwnerKeys, id: &str, record: &Value) -> Result<()> {
        let row = self.fetch_owned(owner, id)?;
        let plaintext = serde_json::to_vec(record)?;
        let now = mesh_store::now_ms();

        let update = if row.public {
            RecordUpdate {
                ciphertext: Some(plaintext),
                nonce: Some(aead::generate_nonce().to_vec()),
                updated_at: Some(now),
                ..Default::default()
            }
        } else {
            let (ciphertext, sealed_dek, nonce) =
                encrypt_for(&owner.encryption.public_key(), &plaintext)?;
            RecordUpdate {
                ciphertext: Some(ciphertext),
                nonce: Some(nonce.to_vec()),
                encrypted_dek: Some(Some(sealed_dek)),
                updated_at: Some(now),
                ..Default::default()
            }
        };
        self.store.update_record(id, update)?;
        Ok(())
    }

    /// Soft-delete only.
    pub fn delete(&self, owner: &OwnerKeys, id: &str) -> Result<()> {
        self.fetch_owned(owner, id)?;
        self.store.soft_delete_record(id)?;
        Ok(())
    }

    // ── Share path ─────────────────────────────────────────────────

    /// Grant `recipient` access by re-sealing the record's DEK for their
    /// public key.  Idempotent: re-sharing replaces the grant.
    pub fn share(
        &self,
        owner: &OwnerKeys,
        id: &str,
        recipient_did: &str,
        recipient_pub: &PublicKey,
    ) -> Result<()> {
        let row = self.fetch_owned(owner, id)?;
        let sealed = row
            .encrypted_dek
            .as_deref()
            .ok_or_else(|| MemoryError::InvalidRecord("public records need no share".into()))?;
        let dek = seal::open_dek(&owner.encryption, sealed)?;
        let shared_dek = seal::seal_dek(recipient_pub, &dek)?;
        self.store
            .insert_share(id, recipient_did, &shared_dek, mesh_store::now_ms())?;
        tracing::debug!(id = %id, recipient = %recipient_did, "record shared");
        Ok(())
    }

    /// Read a record shared *to* `viewer`.  Fails `NotFound` without a
    /// grant; existence is not revealed to unshared viewers.
    pub fn load_shared(&self, viewer: &OwnerKeys, id: &str) -> Result<Value> {
        let share = self
            .store
            .get_share(id, &viewer.did)?
            .ok_or_else(|| MemoryError::NotFound(format!("shared record {id}")))?;
        let row = self
            .store
            .get_record(id)?
            .ok_or_else(|| MemoryError::NotFound(format!("shared record {id}")))?;

        let dek = seal::open_dek(&viewer.encryption, &share.encrypted_dek)?;
        let nonce = fixed_nonce(&row.nonce)?;
        let plaintext = aead::decrypt(&dek, &nonce, &row.ciphertext, None)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// List every record shared to `viewer`, decrypted.
    pub fn list_shared(&self, viewer: &OwnerKeys) -> Result<Vec<RecordEntry>> {
        let mut entries = Vec::new();
        for (share, row) in self.store.list_shared_to(&viewer.did)? {
            let dek = match seal::open_dek(&viewer.encryption, &share.encrypted_dek) {
                Ok(dek) => dek,
                Err(_) => {
                    tracing::warn!(id = %row.id, "skipping shared record with unopenable DEK");
                    continue;
                }
            };
            let nonce = fixed_nonce(&row.nonce)?;
            match aead::decrypt(&dek, &nonce, &row.ciphertext, None) {
                Ok(plaintext) => entries.push(RecordEntry {
                    id: row.id.clone(),
                    record: serde_json::from_slice(&plaintext)?,
                }),
                Err(_) => {
                    tracing::warn!(id = %row.id, "skipping undecryptable shared record");
                }
            }
        }
        Ok(entries)
    }

    // ── Listing ────────────────────────────────────────────────────

    /// List the owner's records, decrypted, newest first.
    pub fn list(&self, owner: &OwnerKeys, query: &ListQuery) -> Result<RecordListing> {
        let page = self.store.list_records(&owner.did, query)?;
        let mut entries = Vec::with_capacity(page.rows.len());
        for row in &page.rows {
            entries.push(RecordEntry {
                id: row.id.clone(),
                record: self.decrypt_row(&owner.encryption, row)?,
            });
        }
        Ok(RecordListing {
            entries,
            cursor: page.cursor,
        })
    }

    // ── Internals ──────────────────────────────────────────────────

    fn fetch_owned(&self, owner: &OwnerKeys, id: &str) -> Result<RecordRow> {
        let row = self
            .store
            .get_record(id)?
            .ok_or_else(|| MemoryError::NotFound(format!("record {id}")))?;
        if row.did != owner.did {
            // Treated as absence: other agents' ids are not guessable.
            return Err(MemoryError::NotFound(format!("record {id}")));
        }
        Ok(row)
    }

    fn decrypt_row(&self, keys: &EncryptionKeyPair, row: &RecordRow) -> Result<Value> {
        if row.public {
            return Ok(serde_json::from_slice(&row.ciphertext)?);
        }
        let sealed = row
            .encrypted_dek
            .as_deref()
            .ok_or(MemoryError::DecryptFailed)?;
        let dek = seal::open_dek(keys, sealed)?;
        let nonce = fixed_nonce(&row.nonce)?;
        let plaintext = aead::decrypt(&dek, &nonce, &row.ciphertext, None)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

fn encrypt_for(
    owner_pub: &PublicKey,
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>, [u8; NONCE_LEN])> {
    let dek: [u8; DEK_LEN] = aead::generate_dek();
    let nonce = aead::generate_nonce();
    let ciphertext = aead::encrypt(&dek, &nonce, plaintext, None)?;
    let sealed_dek = seal::seal_dek(owner_pub, &dek)?;
    Ok((ciphertext, sealed_dek, nonce))
}

fn fixed_nonce(nonce: &[u8]) -> Result<[u8; NONCE_LEN]> {
    nonce.try_into().map_err(|_| MemoryError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner(name: &str) -> OwnerKeys {
        OwnerKeys {
            did: mesh_crypto::did::did_from_name(name),
            encryption: EncryptionKeyPair::generate(),
        }
    }

    fn memory() -> Memory {
        Memory::new(Store::open_in_memory().unwrap())
    }

    #[test]
    fn private_round_trip_and_no_plaintext_at_rest() {
        let memory = memory();
        let alice = owner("alice");
        let record = json!({ "$type": "agent.memory.note", "summary": "s", "text": "secret" });

        let id = memory
            .store(&alice, "agent.memory.note", &record, false)
            .unwrap();
        assert!(id.starts_with(&format!("{}/agent.memory.note/", alice.did)));

        let row = memory.store_handle().get_record(&id).unwrap().unwrap();
        assert!(!row.public);
        assert!(row.encrypted_dek.as_ref().is_some_and(|d| !d.is_empty()));
        assert_ne!(row.ciphertext, serde_json::to_vec(&record).unwrap());

        assert_eq!(memory.load(&alice, &id).unwrap(), record);
    }

    #[test]
    fn public_record_stored_as_plaintext() {
        let memory = memory();
        let alice = owner("alice");
        let record = json!({ "$type": "agent.memory.note", "summary": "open" });

        let id = memory
            .store(&alice, "agent.memory.note", &record, true)
            .unwrap();
        let row = memory.store_handle().get_record(&id).unwrap().unwrap();
        assert!(row.public);
        assert!(row.encrypted_dek.is_none());
        assert_eq!(row.ciphertext, serde_json::to_vec(&record).unwrap());
        assert_eq!(memory.load(&alice, &id).unwrap(), record);
    }

    #[test]
    fn update_rotates_dek_and_nonce() {
        let memory = memory();
        let alice = owner("alice");
        let id = memory
            .store(&alice, "agent.memory.note", &json!({ "summary": "v1" }), false)
            .unwrap();
        let before = memory.store_handle().get_record(&id).unwrap().unwrap();

        memory
            .update(&alice, &id, &json!({ "summary": "v2" }))
            .unwrap();
        let after = memory.store_handle().get_record(&id).unwrap().unwrap();

        assert_ne!(before.nonce, after.nonce);
        assert_ne!(before.encrypted_dek, after.encrypted_dek);
        assert!(after.updated_at.is_some());
        assert_eq!(memory.load(&alice, &id).unwrap()["summary"], "v2");
    }

    #[test]
    fn sharing_gates_access() {
        let memory = memory();
        let alice = owner("alice");
        let bob = owner("bob");
        let carol = owner("carol");
        let record = json!({ "$type": "agent.memory.note", "summary": "for bob" });

        let id = memory
            .store(&alice, "agent.memory.note", &record, false)
            .unwrap();

        // Unshared: viewer sees NotFound.
        assert!(matches!(
            memory.load_shared(&bob, &id),
            Err(MemoryError::NotFound(_))
        ));

        memory
            .share(&alice, &id, &bob.did, &bob.encryption.public_key())
            .unwrap();
        assert_eq!(memory.load_shared(&bob, &id).unwrap(), record);

        // Intruder still locked out.
        assert!(matches!(
            memory.load_shared(&carol, &id),
            Err(MemoryError::NotFound(_))
        ));

        let listed = memory.list_shared(&bob).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record, record);
    }

    #[test]
    fn share_is_idempotent() {
        let memory = memory();
        let alice = owner("alice");
        let bob = owner("bob");
        let id = memory
            .store(&alice, "agent.memory.note", &json!({ "summary": "s" }), false)
            .unwrap();

        memory
            .share(&alice, &id, &bob.did, &bob.encryption.public_key())
            .unwrap();
        memory
            .share(&alice, &id, &bob.did, &bob.encryption.public_key())
            .unwrap();
        assert_eq!(memory.list_shared(&bob).unwrap().len(), 1);
    }

    #[test]
    fn tampered_row_fails_decrypt() {
        let memory = memory();
        let alice = owner("alice");
        let id = memory
            .store(&alice, "agent.memory.note", &json!({ "summary": "s" }), false)
            .unwrap();

        let row = memory.store_handle().get_record(&id).unwrap().unwrap();
        let mut tampered = row.ciphertext.clone();
        tampered[0] ^= 0x01;
        memory
            .store_handle()
            .update_record(
                &id,
                RecordUpdate {
                    ciphertext: Some(tampered),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(matches!(
            memory.load(&alice, &id),
            Err(MemoryError::DecryptFailed)
        ));
    }

    #[test]
    fn other_agents_records_read_as_absent() {
        let memory = memory();
        let alice = owner("alice");
        let bob = owner("bob");
        let id = memory
            .store(&alice, "agent.memory.note", &json!({ "summary": "s" }), false)
            .unwrap();

        assert!(matches!(
            memory.load(&bob, &id),
            Err(MemoryError::NotFound(_))
        ));
        assert!(matches!(
            memory.delete(&bob, &id),
            Err(MemoryError::NotFound(_))
        ));
    }

    #[test]
    fn deleted_record_loads_as_not_found() {
        let memory = memory();
        let alice = owner("alice");
        let id = memory
            .store(&alice, "agent.memory.note", &json!({ "summary": "s" }), false)
            .unwrap();
        memory.delete(&alice, &id).unwrap();
        assert!(matches!(
            memory.load(&alice, &id),
            Err(MemoryError::NotFound(_))
        ));
    }

    #[test]
    fn list_decrypts_and_orders_newest_first() {
        let memory = memory();
        let alice = owner("alice");
        for i in 0..3 {
            memory
                .store(
                    &alice,
                    "agent.memory.note",
                    &json!({ "summary": format!("n{i}") }),
                    i == 1,
                )
                .unwrap();
        }

        let listing = memory.list(&alice, &ListQuery::default()).unwrap();
        assert_eq!(listing.entries.len(), 3);
        // Insertion happened within milliseconds; ordering is by created_at
        // then id, both non-decreasing with insertion order.
        let summaries: Vec<_> = listing
            .entries
            .iter()
            .map(|e| e.record["summary"].as_str().unwrap().to_string())
            .collect();
        let mut sorted = summaries.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(summaries, sorted);
    }
}
