use num_bigint::{BigInt, BigUint};
use once_cell::sync::Lazy;

/// Decimal exponent of the fixed subunit factor: 1 token unit = 10^18 subunits.
pub const SUBUNITS_EXPONENT: u32 = 18;

pub static SUBUNITS_PER_UNIT: Lazy<BigUint> =
    Lazy::new(|| BigUint::from(10u8).pow(SUBUNITS_EXPONENT));

pub static SUBUNITS_PER_UNIT_SIGNED: Lazy<BigInt> =
    Lazy::new(|| BigInt::from(10u8).pow(SUBUNITS_EXPONENT));
