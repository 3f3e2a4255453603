use std::sync::RwLock;

use hadron_common::types::{Address, Atom, DecryptionState, ProcessedAtomData};

/// Produces the processed payload for an atom before it enters the dispatch
/// pipeline. Real implementations sit on key material (local or behind a
/// remote signer); the core only consumes the result.
pub trait AtomDecrypter: Send + Sync {
    fn decrypt(&self, atom: &Atom) -> ProcessedAtomData;
}

/// A keyless local identity. It can say who it is, but every payload comes
/// back undecryptable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalIdentity {
    address: Address,
}

impl LocalIdentity {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl AtomDecrypter for LocalIdentity {
    fn decrypt(&self, _atom: &Atom) -> ProcessedAtomData {
        ProcessedAtomData {
            state: DecryptionState::CannotDecrypt,
            payload: String::new(),
        }
    }
}

/// Registry of the identities this process acts for. Not part of the fold.
#[derive(Debug, Default)]
pub struct IdentityManager {
    identities: RwLock<Vec<LocalIdentity>>,
}

impl IdentityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, identity: LocalIdentity) {
        let mut identities = self
            .identities
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !identities.contains(&identity) {
            identities.push(identity);
        }
    }

    pub fn by_address(&self, address: &Address) -> Option<LocalIdentity> {
        self.identities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|identity| identity.address() == address)
            .cloned()
    }

    pub fn all(&self) -> Vec<LocalIdentity> {
        self.identities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}
