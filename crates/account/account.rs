pub mod cache;
pub mod error;
pub mod identity;
pub mod message;
pub mod registry;
pub mod streams;
pub mod system;
pub mod transfer;

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use hadron_common::types::{Address, AtomUpdate};

use crate::cache::{AtomStore, CacheAccountSystem};
use crate::error::AccountError;
use crate::message::MessageAccountSystem;
use crate::system::AccountSystem;
use crate::transfer::TransferAccountSystem;

/// A local account: one address plus the ordered pipeline of account systems
/// that fold its atom-update stream.
///
/// All state mutation goes through [`Account::process_atom_update`], which
/// dispatches to every registered system in registration order and admits the
/// next update only once the previous one has been folded everywhere
/// (single-writer).
pub struct Account {
    address: Address,
    systems: Arc<Mutex<Vec<Box<dyn AccountSystem>>>>,
    cache: CacheAccountSystem,
    transfer: TransferAccountSystem,
    messages: MessageAccountSystem,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self::build(address, None)
    }

    /// An account whose cache system writes through to the given store.
    pub fn with_atom_store(address: Address, store: Arc<dyn AtomStore>) -> Self {
        Self::build(address, Some(store))
    }

    fn build(address: Address, store: Option<Arc<dyn AtomStore>>) -> Self {
        let cache = CacheAccountSystem::new(address.clone(), store);
        let transfer = TransferAccountSystem::new(address.clone());
        let messages = MessageAccountSystem::new();
        let systems: Vec<Box<dyn AccountSystem>> = vec![
            Box::new(cache.clone()),
            Box::new(transfer.clone()),
            Box::new(messages.clone()),
        ];
        Self {
            address,
            systems: Arc::new(Mutex::new(systems)),
            cache,
            transfer,
            messages,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn transfer(&self) -> &TransferAccountSystem {
        &self.transfer
    }

    pub fn messages(&self) -> &MessageAccountSystem {
        &self.messages
    }

    pub fn cache(&self) -> &CacheAccountSystem {
        &self.cache
    }

    /// Appends a system to the dispatch pipeline. Dispatch order is
    /// registration order.
    pub async fn register_system(&self, system: Box<dyn AccountSystem>) {
        self.systems.lock().await.push(system);
    }

    /// Folds one update through every registered system, sequentially.
    pub async fn process_atom_update(&self, update: &AtomUpdate) -> Result<(), AccountError> {
        dispatch(&self.address, &self.systems, update).await
    }

    /// Replays every cached atom for this account through the pipeline as a
    /// STORE event. Returns the number of replayed atoms.
    pub async fn initialize(&self) -> Result<usize, AccountError> {
        let atoms = self.cache.load().await?;
        let count = atoms.len();
        for atom in atoms {
            self.process_atom_update(&AtomUpdate::store(atom)).await?;
        }
        if count > 0 {
            info!(account = %self.address, count, "replayed cached atoms");
        }
        Ok(count)
    }

    /// Replays the cache, then pumps the live update stream through the
    /// pipeline. Replay strictly precedes the first live event; updates
    /// arriving during replay sit in the channel until replay is done.
    pub async fn connect(
        &self,
        mut updates: mpsc::UnboundedReceiver<AtomUpdate>,
    ) -> Result<JoinHandle<()>, AccountError> {
        self.initialize().await?;
        let address = self.address.clone();
        let systems = Arc::clone(&self.systems);
        Ok(tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                if let Err(e) = dispatch(&address, &systems, &update).await {
                    error!(account = %address, error = %e, "failed to fold atom update");
                }
            }
            debug!(account = %address, "update stream ended");
        }))
    }
}

async fn dispatch(
    address: &Address,
    systems: &Mutex<Vec<Box<dyn AccountSystem>>>,
    update: &AtomUpdate,
) -> Result<(), AccountError> {
    let mut systems = systems.lock().await;
    for system in systems.iter_mut() {
        debug!(
            account = %address,
            system = system.name(),
            action = ?update.action,
            "dispatching atom update"
        );
        system.process_atom_update(update).await?;
    }
    Ok(())
}
