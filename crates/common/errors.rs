#[derive(Debug, thiserror::Error)]
pub enum AddressParseError {
    #[error("Address hex string is empty")]
    Empty,
    #[error("Failed to decode address hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

#[derive(Debug, thiserror::Error)]
pub enum TokenRefParseError {
    #[error("Token reference `{0}` is missing the `/@` separator")]
    MissingSeparator(String),
    #[error("Token reference has an empty symbol")]
    EmptySymbol,
    #[error("Failed to parse token issuer address: {0}")]
    InvalidIssuer(#[from] AddressParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum TokenUnitError {
    #[error("Token granularity cannot be zero")]
    ZeroGranularity,
    #[error("Amount {amount} is not a multiple of granularity {granularity}")]
    NotMultipleOfGranularity { amount: String, granularity: String },
}
