use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, trace};

use hadron_common::H256;
use hadron_common::types::{Address, Atom, AtomAction, AtomUpdate};

use crate::error::{AccountError, AtomStoreError};
use crate::system::AccountSystem;

/// Pluggable durable mirror of the atom stream. The projection is the source
/// of truth; no transactional semantics are required of implementations.
#[async_trait]
pub trait AtomStore: Send + Sync {
    async fn store_atom(&self, atom: &Atom) -> Result<(), AtomStoreError>;

    async fn delete_atom(&self, atom: &Atom) -> Result<(), AtomStoreError>;

    /// Every stored atom that touches the given address, in storage order.
    async fn get_atoms(&self, address: &Address) -> Result<Vec<Atom>, AtomStoreError>;
}

/// Write-through cache over an optional [`AtomStore`].
///
/// STORE writes the atom under its hid, DELETE removes it, and `load` hands
/// back everything previously stored so the account can re-inject it before
/// the live subscription starts. Without a configured store every operation
/// is a no-op.
#[derive(Clone)]
pub struct CacheAccountSystem {
    address: Address,
    store: Option<Arc<dyn AtomStore>>,
}

impl CacheAccountSystem {
    pub fn new(address: Address, store: Option<Arc<dyn AtomStore>>) -> Self {
        Self { address, store }
    }

    pub async fn load(&self) -> Result<Vec<Atom>, AtomStoreError> {
        match &self.store {
            Some(store) => store.get_atoms(&self.address).await,
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl AccountSystem for CacheAccountSystem {
    fn name(&self) -> &str {
        "CACHE"
    }

    async fn process_atom_update(&mut self, update: &AtomUpdate) -> Result<(), AccountError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        match update.action {
            AtomAction::Store => {
                trace!(hid = ?update.atom.hid(), "caching atom");
                store.store_atom(&update.atom).await?;
            }
            AtomAction::Delete => {
                trace!(hid = ?update.atom.hid(), "evicting atom");
                store.delete_atom(&update.atom).await?;
            }
        }
        Ok(())
    }
}

/// Keeps atoms in process memory, keyed by hid in insertion order. Ships for
/// tests and small embeddings.
#[derive(Debug, Default)]
pub struct InMemoryAtomStore {
    atoms: Mutex<IndexMap<H256, Atom>>,
}

impl InMemoryAtomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an atom directly, bypassing the write-through path.
    pub fn insert(&self, atom: Atom) {
        let mut atoms = self
            .atoms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        atoms.insert(atom.hid(), atom);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IndexMap<H256, Atom>>, AtomStoreError> {
        self.atoms
            .lock()
            .map_err(|e| AtomStoreError::Custom(e.to_string()))
    }
}

#[async_trait]
impl AtomStore for InMemoryAtomStore {
    async fn store_atom(&self, atom: &Atom) -> Result<(), AtomStoreError> {
        self.lock()?.insert(atom.hid(), atom.clone());
        Ok(())
    }

    async fn delete_atom(&self, atom: &Atom) -> Result<(), AtomStoreError> {
        self.lock()?.shift_remove(&atom.hid());
        Ok(())
    }

    async fn get_atoms(&self, address: &Address) -> Result<Vec<Atom>, AtomStoreError> {
        let atoms = self.lock()?;
        let matching = atoms
            .values()
            .filter(|atom| {
                atom.particles
                    .iter()
                    .any(|spun| spun.particle.address == *address)
            })
            .cloned()
            .collect::<Vec<_>>();
        debug!(%address, count = matching.len(), "loaded cached atoms");
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadron_common::types::{Particle, ParticleKind, SpunParticle, TokenRef};
    use num_bigint::BigUint;

    fn atom_for(owner: &Address, nonce: u64) -> Atom {
        Atom::new(
            nonce,
            vec![SpunParticle::up(Particle {
                address: owner.clone(),
                amount: BigUint::from(1u8),
                token: TokenRef::new(Address::new(vec![0xee]), "TST"),
                granularity: BigUint::from(1u8),
                kind: ParticleKind::Transfer,
                nonce,
                planck: 0,
            })],
        )
    }

    #[tokio::test]
    async fn write_through_and_eviction() {
        let owner = Address::new(vec![0x01]);
        let store = Arc::new(InMemoryAtomStore::new());
        let mut cache = CacheAccountSystem::new(owner.clone(), Some(store.clone()));

        let atom = atom_for(&owner, 1);
        cache
            .process_atom_update(&AtomUpdate::store(atom.clone()))
            .await
            .expect("store");
        assert_eq!(cache.load().await.expect("load").len(), 1);

        cache
            .process_atom_update(&AtomUpdate::delete(atom))
            .await
            .expect("delete");
        assert!(cache.load().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn load_filters_by_address() {
        let owner = Address::new(vec![0x01]);
        let other = Address::new(vec![0x02]);
        let store = Arc::new(InMemoryAtomStore::new());
        store.insert(atom_for(&owner, 1));
        store.insert(atom_for(&other, 2));

        let cache = CacheAccountSystem::new(owner, Some(store));
        assert_eq!(cache.load().await.expect("load").len(), 1);
    }

    #[tokio::test]
    async fn without_store_everything_is_a_no_op() {
        let owner = Address::new(vec![0x01]);
        let mut cache = CacheAccountSystem::new(owner.clone(), None);
        cache
            .process_atom_update(&AtomUpdate::store(atom_for(&owner, 1)))
            .await
            .expect("no-op store");
        assert!(cache.load().await.expect("load").is_empty());
    }
}
