//! Authorized entities (spec §3): the dictionary of peers the protocol
//! service will complete a handshake with, and the capability triples each
//! one holds.

use std::collections::BTreeMap;
use std::sync::Mutex;

use uuid::Uuid;
use x25519_dalek::PublicKey as XPublicKey;

use crate::capability::CapabilitySet;
use crate::crypto::MlDsa65PublicKey;

/// A peer the protocol service will authenticate against (spec §3
/// "Authorized entity"). Keys are immutable after insertion; only the
/// capability set grows via `AUTH_ENTITY_CAP_ADD`.
pub struct AuthorizedEntity {
    pub uuid: Uuid,
    pub encryption_pubkey: XPublicKey,
    pub signing_pubkey: MlDsa65PublicKey,
    pub capabilities: Mutex<CapabilitySet>,
}

impl AuthorizedEntity {
    pub fn new(uuid: Uuid, encryption_pubkey: XPublicKey, signing_pubkey: MlDsa65PublicKey) -> Self {
        Self {
            uuid,
            encryption_pubkey,
            signing_pubkey,
            capabilities: Mutex::new(CapabilitySet::new()),
        }
    }
}

/// Dictionary of authorized entities, keyed by UUID. Created by control
/// commands, destroyed wholesale at context teardown.
#[derive(Default)]
pub struct EntityDictionary {
    entities: Mutex<BTreeMap<Uuid, std::sync::Arc<AuthorizedEntity>>>,
}

impl EntityDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: AuthorizedEntity) {
        self.entities.lock().unwrap().insert(entity.uuid, std::sync::Arc::new(entity));
    }

    pub fn lookup(&self, uuid: &Uuid) -> Option<std::sync::Arc<AuthorizedEntity>> {
        self.entities.lock().unwrap().get(uuid).cloned()
    }

    pub fn add_capability(
        &self,
        uuid: &Uuid,
        triple: crate::capability::CapabilityTriple,
    ) -> Result<(), crate::error::WireError> {
        let entities = self.entities.lock().unwrap();
        let entity = entities.get(uuid).ok_or(crate::error::WireError::NotFound)?;
        entity.capabilities.lock().unwrap().insert(triple);
        Ok(())
    }
}
