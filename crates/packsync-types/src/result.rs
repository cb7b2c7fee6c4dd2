//! Result type alias for packsync operations

/// Result type used throughout the packsync workspace
pub type Result<T> = std::result::Result<T, crate::Error>;
