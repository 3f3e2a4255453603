// Keep H256 from ethereum_types as the content-id type used across the core
pub use ethereum_types::H256;

pub use bytes::Bytes;

pub mod constants;
pub mod errors;
pub mod serde_utils;
pub mod types;

pub use types::{
    Address, Atom, AtomAction, AtomUpdate, DecryptionState, Particle, ParticleId, ParticleKind,
    ProcessedAtomData, Spin, SpunParticle, TokenDefinition, TokenRef,
};
