use std::fmt;
use std::str::FromStr;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::constants::{SUBUNITS_PER_UNIT, SUBUNITS_PER_UNIT_SIGNED};
use crate::errors::{TokenRefParseError, TokenUnitError};
use crate::types::Address;

/// Reference to a token class: the issuing address plus the token symbol.
///
/// The canonical form `<issuer>/@<symbol>` is what appears on the wire and
/// in every balance map key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenRef {
    pub issuer: Address,
    pub symbol: String,
}

impl TokenRef {
    pub fn new(issuer: Address, symbol: impl Into<String>) -> Self {
        Self {
            issuer,
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/@{}", self.issuer, self.symbol)
    }
}

impl fmt::Debug for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenRef({})", self)
    }
}

impl FromStr for TokenRef {
    type Err = TokenRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (issuer, symbol) = s
            .split_once("/@")
            .ok_or_else(|| TokenRefParseError::MissingSeparator(s.to_string()))?;
        if symbol.is_empty() {
            return Err(TokenRefParseError::EmptySymbol);
        }
        Ok(Self {
            issuer: issuer.parse()?,
            symbol: symbol.to_string(),
        })
    }
}

impl Serialize for TokenRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        TokenRef::from_str(&value).map_err(|e| D::Error::custom(e.to_string()))
    }
}

/// Descriptive metadata for a token class, resolved through the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDefinition {
    pub reference: TokenRef,
    pub name: String,
    pub description: String,
    #[serde(with = "crate::serde_utils::biguint::dec_str")]
    pub granularity: BigUint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl TokenDefinition {
    /// An amount is well formed for this token iff it is a non-zero multiple
    /// of the declared granularity.
    pub fn check_granularity(&self, amount: &BigUint) -> Result<(), TokenUnitError> {
        if self.granularity.is_zero() {
            return Err(TokenUnitError::ZeroGranularity);
        }
        if (amount % &self.granularity).is_zero() {
            Ok(())
        } else {
            Err(TokenUnitError::NotMultipleOfGranularity {
                amount: amount.to_string(),
                granularity: self.granularity.to_string(),
            })
        }
    }
}

/// Whole token units from a signed subunit amount, truncating toward zero.
pub fn subunits_to_units(subunits: &BigInt) -> BigInt {
    subunits / &*SUBUNITS_PER_UNIT_SIGNED
}

/// Subunits from a whole-unit amount.
pub fn units_to_subunits(units: &BigInt) -> BigInt {
    units * &*SUBUNITS_PER_UNIT_SIGNED
}

/// Decimal rendering of a signed subunit amount, e.g. `-1.5`.
///
/// Trailing zeros of the fractional part are trimmed; whole amounts render
/// with no decimal point.
pub fn format_units(subunits: &BigInt) -> String {
    let (sign, magnitude) = subunits.clone().into_parts();
    let whole = &magnitude / &*SUBUNITS_PER_UNIT;
    let frac = &magnitude % &*SUBUNITS_PER_UNIT;
    let prefix = if sign == Sign::Minus { "-" } else { "" };
    if frac.is_zero() {
        return format!("{prefix}{whole}");
    }
    let frac = format!(
        "{:0>width$}",
        frac.to_string(),
        width = crate::constants::SUBUNITS_EXPONENT as usize
    );
    format!("{prefix}{whole}.{}", frac.trim_end_matches('0'))
}
