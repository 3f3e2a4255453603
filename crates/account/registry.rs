use std::collections::HashMap;
use std::sync::RwLock;

use hadron_common::types::{TokenDefinition, TokenRef};

/// Shared lookup of token metadata. Tokens the registry does not know are
/// simply omitted from unit-denominated queries.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    definitions: RwLock<HashMap<TokenRef, TokenDefinition>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, definition: TokenDefinition) {
        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        definitions.insert(definition.reference.clone(), definition);
    }

    pub fn get(&self, reference: &TokenRef) -> Option<TokenDefinition> {
        self.definitions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(reference)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadron_common::types::Address;
    use num_bigint::BigUint;

    #[test]
    fn register_then_resolve() {
        let registry = TokenRegistry::new();
        let reference = TokenRef::new(Address::new(vec![0xee]), "TST");
        assert!(registry.get(&reference).is_none());

        registry.register(TokenDefinition {
            reference: reference.clone(),
            name: "Test token".to_string(),
            description: String::new(),
            granularity: BigUint::from(1u8),
            icon_url: None,
        });
        assert_eq!(registry.get(&reference).map(|d| d.name), Some("Test token".to_string()));
    }
}
