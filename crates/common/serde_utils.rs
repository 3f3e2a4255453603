use serde::{Deserialize, Deserializer, Serializer, de::Error};

pub mod biguint {
    use super::*;
    use num_bigint::BigUint;

    pub mod dec_str {
        use super::*;
        use std::str::FromStr;

        pub fn deserialize<'de, D>(d: D) -> Result<BigUint, D::Error>
        where
            D: Deserializer<'de>,
        {
            let value = String::deserialize(d)?;
            BigUint::from_str(&value).map_err(|e| D::Error::custom(e.to_string()))
        }

        pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&value.to_string())
        }
    }
}

pub mod bigint {
    use super::*;
    use num_bigint::BigInt;

    /// Maps with signed big-integer values, carried as decimal strings like
    /// every other amount on the wire.
    pub mod dec_str_map {
        use super::*;
        use serde::ser::SerializeMap;
        use std::collections::HashMap;
        use std::hash::Hash;
        use std::str::FromStr;

        pub fn deserialize<'de, K, D>(d: D) -> Result<HashMap<K, BigInt>, D::Error>
        where
            K: serde::Deserialize<'de> + Eq + Hash,
            D: Deserializer<'de>,
        {
            let raw = HashMap::<K, String>::deserialize(d)?;
            raw.into_iter()
                .map(|(key, value)| {
                    BigInt::from_str(&value)
                        .map(|value| (key, value))
                        .map_err(|e| D::Error::custom(e.to_string()))
                })
                .collect()
        }

        pub fn serialize<K, S>(map: &HashMap<K, BigInt>, serializer: S) -> Result<S::Ok, S::Error>
        where
            K: serde::Serialize,
            S: Serializer,
        {
            let mut entries = serializer.serialize_map(Some(map.len()))?;
            for (key, value) in map {
                entries.serialize_entry(key, &value.to_string())?;
            }
            entries.end()
        }
    }
}
