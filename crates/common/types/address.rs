use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::errors::AddressParseError;

/// Opaque account identifier.
///
/// Equality is byte-exact over the underlying key material; the canonical
/// string form (used as a map key wherever addresses index other values) is
/// the lowercase hex encoding of those bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Bytes);

impl Address {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AddressParseError::Empty);
        }
        let bytes = hex::decode(s)?;
        Ok(Self(bytes.into()))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Address::from_str(&value).map_err(|e| D::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_round_trip() {
        let address = Address::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(address.to_string(), "deadbeef");
        assert_eq!("deadbeef".parse::<Address>().expect("parse"), address);
    }

    #[test]
    fn empty_address_string_is_rejected() {
        assert!(matches!(
            "".parse::<Address>(),
            Err(AddressParseError::Empty)
        ));
    }

    #[test]
    fn address_serde_is_the_canonical_string() {
        let address = Address::new(vec![0x01, 0x02]);
        let json = serde_json::to_string(&address).expect("serialize");
        assert_eq!(json, "\"0102\"");
        let back: Address = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, address);
    }
}
