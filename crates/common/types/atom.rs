use keccak_hash::keccak;
use serde::{Deserialize, Serialize};

use crate::H256;
use crate::types::{Spin, SpunParticle};

/// The unit of ledger commitment: a hashed bundle of spun particles.
///
/// The content id `hid` is derived from the particle contents and the
/// timestamp, so any node can recompute it from a deserialized atom and
/// compare against the transported value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    pub timestamp: u64,
    pub particles: Vec<SpunParticle>,
}

impl Atom {
    pub fn new(timestamp: u64, particles: Vec<SpunParticle>) -> Self {
        Self {
            timestamp,
            particles,
        }
    }

    /// Content id: keccak over the timestamp and every (spin, particle id) pair.
    pub fn hid(&self) -> H256 {
        let mut buf = Vec::with_capacity(8 + self.particles.len() * 33);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        for spun in &self.particles {
            buf.push(match spun.spin {
                Spin::Up => 1,
                Spin::Down => 0,
            });
            buf.extend_from_slice(spun.particle.id().as_bytes());
        }
        keccak(&buf)
    }

    pub fn is_token_bearing(&self) -> bool {
        !self.particles.is_empty()
    }
}

/// Whether an atom update asserts new visibility or retracts a previously
/// stored atom (reorg).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AtomAction {
    Store,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecryptionState {
    Decrypted,
    EncryptedNotOwned,
    CannotDecrypt,
}

/// Auxiliary data attached to an atom after payload decryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedAtomData {
    pub state: DecryptionState,
    pub payload: String,
}

/// The event envelope every account system folds over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomUpdate {
    pub action: AtomAction,
    pub atom: Atom,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_data: Option<ProcessedAtomData>,
}

impl AtomUpdate {
    pub fn store(atom: Atom) -> Self {
        Self {
            action: AtomAction::Store,
            atom,
            processed_data: None,
        }
    }

    pub fn delete(atom: Atom) -> Self {
        Self {
            action: AtomAction::Delete,
            atom,
            processed_data: None,
        }
    }

    pub fn with_processed_data(mut self, data: ProcessedAtomData) -> Self {
        self.processed_data = Some(data);
        self
    }
}
