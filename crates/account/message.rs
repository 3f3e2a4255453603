use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use hadron_common::H256;
use hadron_common::types::{AtomAction, AtomUpdate, DecryptionState};

use crate::error::AccountError;
use crate::streams::Multicast;
use crate::system::AccountSystem;

/// A decrypted application payload attached to a stored atom.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub hid: H256,
    pub timestamp: u64,
    pub payload: String,
    pub state: DecryptionState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
    pub action: AtomAction,
    pub record: MessageRecord,
}

#[derive(Default)]
struct MessageState {
    records: IndexMap<H256, MessageRecord>,
    listeners: Multicast<MessageUpdate>,
}

/// Projects the decrypted payloads out of the atom stream: STORE of an atom
/// whose processed data could be decrypted records the payload, DELETE
/// retracts it. Atoms without processed data pass through untouched.
#[derive(Clone)]
pub struct MessageAccountSystem {
    state: Arc<RwLock<MessageState>>,
}

impl MessageAccountSystem {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MessageState::default())),
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MessageState>, AccountError> {
        self.state
            .write()
            .map_err(|e| AccountError::StateLock(e.to_string()))
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.state
            .read()
            .map(|state| state.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Known records replayed as STORE events, then the live stream.
    pub fn all_messages(&self) -> Result<mpsc::UnboundedReceiver<MessageUpdate>, AccountError> {
        let mut state = self.write()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        for record in state.records.values() {
            let _ = sender.send(MessageUpdate {
                action: AtomAction::Store,
                record: record.clone(),
            });
        }
        state.listeners.attach(sender);
        Ok(receiver)
    }
}

#[async_trait]
impl AccountSystem for MessageAccountSystem {
    fn name(&self) -> &str {
        "MESSAGE"
    }

    async fn process_atom_update(&mut self, update: &AtomUpdate) -> Result<(), AccountError> {
        let Some(data) = &update.processed_data else {
            return Ok(());
        };
        if data.state == DecryptionState::CannotDecrypt {
            trace!("skipping undecryptable payload");
            return Ok(());
        }
        let hid = update.atom.hid();
        let mut state = self.write()?;
        match update.action {
            AtomAction::Store => {
                if state.records.contains_key(&hid) {
                    return Ok(());
                }
                let record = MessageRecord {
                    hid,
                    timestamp: update.atom.timestamp,
                    payload: data.payload.clone(),
                    state: data.state,
                };
                state.records.insert(hid, record.clone());
                let event = MessageUpdate {
                    action: AtomAction::Store,
                    record,
                };
                state.listeners.send(&event);
            }
            AtomAction::Delete => {
                let Some(record) = state.records.shift_remove(&hid) else {
                    return Ok(());
                };
                let event = MessageUpdate {
                    action: AtomAction::Delete,
                    record,
                };
                state.listeners.send(&event);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadron_common::types::{Atom, ProcessedAtomData};

    fn stored_message(timestamp: u64, payload: &str) -> AtomUpdate {
        AtomUpdate::store(Atom::new(timestamp, vec![])).with_processed_data(ProcessedAtomData {
            state: DecryptionState::Decrypted,
            payload: payload.to_string(),
        })
    }

    #[tokio::test]
    async fn records_decrypted_payloads_and_retracts_them() {
        let mut system = MessageAccountSystem::new();
        let update = stored_message(1, "hi");
        system.process_atom_update(&update).await.expect("store");
        assert_eq!(system.messages().len(), 1);
        assert_eq!(system.messages()[0].payload, "hi");

        let delete = AtomUpdate {
            action: AtomAction::Delete,
            ..update
        };
        system.process_atom_update(&delete).await.expect("delete");
        assert!(system.messages().is_empty());
    }

    #[tokio::test]
    async fn undecryptable_payloads_are_not_recorded() {
        let mut system = MessageAccountSystem::new();
        let update = AtomUpdate::store(Atom::new(1, vec![])).with_processed_data(
            ProcessedAtomData {
                state: DecryptionState::CannotDecrypt,
                payload: "ciphertext".to_string(),
            },
        );
        system.process_atom_update(&update).await.expect("fold");
        assert!(system.messages().is_empty());
    }

    #[tokio::test]
    async fn all_messages_replays_then_streams() {
        let mut system = MessageAccountSystem::new();
        system
            .process_atom_update(&stored_message(1, "first"))
            .await
            .expect("store");

        let mut events = system.all_messages().expect("subscribe");
        assert_eq!(events.recv().await.expect("replay").record.payload, "first");

        system
            .process_atom_update(&stored_message(2, "second"))
            .await
            .expect("store");
        assert_eq!(events.recv().await.expect("live").record.payload, "second");
    }
}
