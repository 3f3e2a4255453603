use keccak_hash::keccak;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::H256;
use crate::types::{Address, TokenRef};

/// Content-derived particle identity, unique within an atom.
pub type ParticleId = H256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ParticleKind {
    Mint = 0,
    Transfer = 1,
    Burn = 2,
    /// Proof-of-work fee. Token-bearing, but excluded from balance accounting.
    Fee = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Spin {
    /// The particle is being created and becomes spendable.
    Up,
    /// The particle is being consumed.
    Down,
}

/// Token-bearing value object carried inside an atom.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Particle {
    pub address: Address,
    #[serde(with = "crate::serde_utils::biguint::dec_str")]
    pub amount: BigUint,
    pub token: TokenRef,
    #[serde(with = "crate::serde_utils::biguint::dec_str")]
    pub granularity: BigUint,
    pub kind: ParticleKind,
    pub nonce: u64,
    pub planck: u64,
}

impl Particle {
    /// Keccak hash of the particle content. Variable-length fields are
    /// length-prefixed so distinct contents cannot collide by concatenation.
    pub fn id(&self) -> ParticleId {
        let mut buf = Vec::new();
        push_prefixed(&mut buf, self.address.as_bytes());
        push_prefixed(&mut buf, &self.amount.to_bytes_be());
        push_prefixed(&mut buf, self.token.to_string().as_bytes());
        push_prefixed(&mut buf, &self.granularity.to_bytes_be());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.planck.to_be_bytes());
        keccak(&buf)
    }

    pub fn is_fee(&self) -> bool {
        matches!(self.kind, ParticleKind::Fee)
    }
}

fn push_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// A particle together with the direction of its effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpunParticle {
    pub spin: Spin,
    pub particle: Particle,
}

impl SpunParticle {
    pub fn up(particle: Particle) -> Self {
        Self {
            spin: Spin::Up,
            particle,
        }
    }

    pub fn down(particle: Particle) -> Self {
        Self {
            spin: Spin::Down,
            particle,
        }
    }
}
