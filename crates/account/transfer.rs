use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use indexmap::IndexMap;
use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use hadron_common::H256;
use hadron_common::types::{
    Address, AtomAction, AtomUpdate, DecryptionState, Particle, ParticleId, Spin, TokenRef,
    token::subunits_to_units,
};

use crate::error::AccountError;
use crate::registry::TokenRegistry;
use crate::streams::Multicast;
use crate::system::AccountSystem;

/// Net effect of one atom on one account: signed per-token deltas, the
/// decrypted message if any, and the non-owned addresses that took part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hid: H256,
    pub timestamp: u64,
    pub message: String,
    #[serde(with = "hadron_common::serde_utils::bigint::dec_str_map")]
    pub balance: HashMap<TokenRef, BigInt>,
    pub participants: HashMap<String, Address>,
    #[serde(with = "hadron_common::serde_utils::biguint::dec_str")]
    pub fee: BigUint,
}

/// Event pushed to transaction-stream subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub action: AtomAction,
    pub hid: H256,
    pub transaction: Transaction,
}

#[derive(Default)]
struct TransferState {
    transactions: IndexMap<H256, Transaction>,
    balance: HashMap<TokenRef, BigInt>,
    unspent: HashMap<ParticleId, Particle>,
    spent: HashMap<ParticleId, Particle>,
    listeners: Multicast<TransactionUpdate>,
}

/// The UTXO projection: unspent/spent consumable sets, per-token balances and
/// the transaction history, folded from the atom-update stream.
///
/// The fold is synchronous and runs under one write lock, so from the
/// pipeline's view an atom is applied whole or not at all. Balance maps are
/// kept canonical: an entry that would go to zero is removed, which is what
/// makes a STORE followed by the matching DELETE restore the previous state
/// exactly.
#[derive(Clone)]
pub struct TransferAccountSystem {
    address: Address,
    state: Arc<RwLock<TransferState>>,
    balance_watch: watch::Sender<HashMap<TokenRef, BigInt>>,
}

impl TransferAccountSystem {
    pub fn new(address: Address) -> Self {
        let (balance_watch, _) = watch::channel(HashMap::new());
        Self {
            address,
            state: Arc::new(RwLock::new(TransferState::default())),
            balance_watch,
        }
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TransferState>, AccountError> {
        self.state
            .write()
            .map_err(|e| AccountError::StateLock(e.to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, TransferState>, AccountError> {
        self.state
            .read()
            .map_err(|e| AccountError::StateLock(e.to_string()))
    }

    fn apply_store(&self, update: &AtomUpdate) -> Result<(), AccountError> {
        let atom = &update.atom;
        let hid = atom.hid();
        let mut state = self.write()?;
        if state.transactions.contains_key(&hid) {
            trace!(?hid, "duplicate STORE suppressed");
            return Ok(());
        }

        let mut transaction = Transaction {
            hid,
            timestamp: atom.timestamp,
            message: String::new(),
            balance: HashMap::new(),
            participants: HashMap::new(),
            fee: BigUint::zero(),
        };
        if let Some(data) = &update.processed_data {
            if data.state != DecryptionState::CannotDecrypt {
                transaction.message = data.payload.clone();
            }
        }

        for spun in &atom.particles {
            let particle = &spun.particle;
            if particle.is_fee() {
                transaction.fee += &particle.amount;
                continue;
            }
            if particle.address == self.address {
                let id = particle.id();
                let delta = match spun.spin {
                    Spin::Down => {
                        state.unspent.remove(&id);
                        state.spent.insert(id, particle.clone());
                        -BigInt::from(particle.amount.clone())
                    }
                    Spin::Up => {
                        // An id already seen spent must not resurface as
                        // spendable, whatever order the spins arrived in.
                        if !state.spent.contains_key(&id) {
                            state.unspent.insert(id, particle.clone());
                        }
                        BigInt::from(particle.amount.clone())
                    }
                };
                *transaction
                    .balance
                    .entry(particle.token.clone())
                    .or_default() += delta;
            } else {
                transaction
                    .participants
                    .insert(particle.address.to_string(), particle.address.clone());
            }
        }
        transaction.balance.retain(|_, delta| !delta.is_zero());

        for (token, delta) in &transaction.balance {
            let entry = state.balance.entry(token.clone()).or_default();
            *entry += delta;
            if entry.is_zero() {
                state.balance.remove(token);
            }
        }
        state.transactions.insert(hid, transaction.clone());
        debug!(account = %self.address, ?hid, "stored transaction");

        self.emit(
            &mut state,
            TransactionUpdate {
                action: AtomAction::Store,
                hid,
                transaction,
            },
        );
        Ok(())
    }

    fn apply_delete(&self, update: &AtomUpdate) -> Result<(), AccountError> {
        let atom = &update.atom;
        let hid = atom.hid();
        let mut state = self.write()?;
        let Some(transaction) = state.transactions.shift_remove(&hid) else {
            trace!(?hid, "DELETE of unknown atom ignored");
            return Ok(());
        };

        // Undo the particle fold step by step, last step first, so the sets
        // end up exactly where they were before the STORE.
        for spun in atom.particles.iter().rev() {
            let particle = &spun.particle;
            if particle.is_fee() || particle.address != self.address {
                continue;
            }
            let id = particle.id();
            match spun.spin {
                Spin::Down => {
                    state.spent.remove(&id);
                    state.unspent.insert(id, particle.clone());
                }
                Spin::Up => {
                    state.unspent.remove(&id);
                }
            }
        }

        for (token, delta) in &transaction.balance {
            let entry = state.balance.entry(token.clone()).or_default();
            *entry -= delta;
            if entry.is_zero() {
                state.balance.remove(token);
            }
        }
        debug!(account = %self.address, ?hid, "retracted transaction");

        self.emit(
            &mut state,
            TransactionUpdate {
                action: AtomAction::Delete,
                hid,
                transaction,
            },
        );
        Ok(())
    }

    /// Balance is published before the transaction event, and both go out
    /// while the fold still holds the write lock, so no subscriber can see a
    /// transaction whose balance effect is not yet visible.
    fn emit(&self, state: &mut RwLockWriteGuard<'_, TransferState>, update: TransactionUpdate) {
        self.balance_watch.send_replace(state.balance.clone());
        state.listeners.send(&update);
    }

    /// Point-in-time copy of the per-token balance, in subunits.
    pub fn balance(&self) -> HashMap<TokenRef, BigInt> {
        self.read()
            .map(|state| state.balance.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the unspent consumables. Iteration order is unspecified;
    /// callers that need determinism must sort.
    pub fn unspent_consumables(&self) -> Vec<Particle> {
        self.read()
            .map(|state| state.unspent.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn spent_consumables(&self) -> Vec<Particle> {
        self.read()
            .map(|state| state.spent.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Transaction history in arrival order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.read()
            .map(|state| state.transactions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Balances in whole token units (10^18 subunits each, truncated toward
    /// zero). Tokens the registry cannot resolve are omitted.
    pub fn token_units_balance(&self, registry: &TokenRegistry) -> HashMap<TokenRef, BigInt> {
        self.balance()
            .into_iter()
            .filter(|(token, _)| registry.get(token).is_some())
            .map(|(token, subunits)| {
                let units = subunits_to_units(&subunits);
                (token, units)
            })
            .collect()
    }

    /// Last-value-cached balance stream: `borrow()` on the returned receiver
    /// yields the current balance synchronously.
    pub fn subscribe_balance(&self) -> watch::Receiver<HashMap<TokenRef, BigInt>> {
        self.balance_watch.subscribe()
    }

    /// Every transaction known so far, replayed as STORE events, followed by
    /// the live stream. Registration and replay happen under one lock, so a
    /// late subscriber cannot miss or double-see an event.
    pub fn all_transactions(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<TransactionUpdate>, AccountError> {
        let mut state = self.write()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        for transaction in state.transactions.values() {
            // The subscriber just attached; a send can only fail if it
            // already hung up, which makes the replay moot anyway.
            let _ = sender.send(TransactionUpdate {
                action: AtomAction::Store,
                hid: transaction.hid,
                transaction: transaction.clone(),
            });
        }
        state.listeners.attach(sender);
        Ok(receiver)
    }
}

#[async_trait]
impl AccountSystem for TransferAccountSystem {
    fn name(&self) -> &str {
        "TRANSFER"
    }

    async fn process_atom_update(&mut self, update: &AtomUpdate) -> Result<(), AccountError> {
        if !update.atom.is_token_bearing() {
            return Ok(());
        }
        match update.action {
            AtomAction::Store => self.apply_store(update),
            AtomAction::Delete => self.apply_delete(update),
        }
    }
}
