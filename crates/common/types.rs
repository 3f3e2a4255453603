pub mod address;
pub mod atom;
pub mod particle;
pub mod token;

pub use address::Address;
pub use atom::{Atom, AtomAction, AtomUpdate, DecryptionState, ProcessedAtomData};
pub use particle::{Particle, ParticleId, ParticleKind, Spin, SpunParticle};
pub use token::{TokenDefinition, TokenRef};
