//! Error types for Smart Energy Lader

use thiserror::Error;

/// Main error type for the simulation core and register I/O
#[derive(Error, Debug)]
pub enum LaderError {
    #[error("Unknown register: address {0} is not mapped")]
    UnknownRegister(u16),

    #[error("Unknown register name: {0}")]
    UnknownRegisterName(String),

    #[error("Value out of range for register {address}: {value} (raw {raw} does not fit {size} word(s))")]
    OutOfRange {
        address: u16,
        value: f64,
        raw: f64,
        size: u8,
    },

    #[error("Duplicate register address: {address} ({existing} collides with {incoming})")]
    DuplicateAddress {
        address: u16,
        existing: String,
        incoming: String,
    },

    #[error("Register {0} is an input register and cannot be written by a device feed")]
    ReadOnlyRegister(u16),

    #[error("Invalid register mapping for '{name}': {reason}")]
    InvalidMapping { name: String, reason: String },

    #[error("Invalid action: {0} (expected 0..=7)")]
    InvalidAction(i64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Lader operations
pub type Result<T> = std::result::Result<T, LaderError>;
