//! Error types for registry and handle operations

use std::fmt;

/// Errors surfaced by registry lookups and handle bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Address has no record in the registry
    UnregisteredAddress { address: usize },
    /// Decrement requested on a record whose count is already zero
    RefcountUnderflow { address: usize },
    /// Insert requested for an address that is already tracked
    DuplicateAddress { address: usize },
    /// Array allocation does not match the registry's declared length
    LengthMismatch { expected: usize, found: usize },
    /// Handles belong to different registries
    RegistryMismatch,
    /// Registry finalizer already ran; no new addresses are accepted
    ShutDown,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnregisteredAddress { address } => {
                write!(f, "Unregistered address: {:#x}", address)
            }
            Self::RefcountUnderflow { address } => {
                write!(f, "Refcount underflow at address {:#x}", address)
            }
            Self::DuplicateAddress { address } => {
                write!(f, "Address {:#x} is already registered", address)
            }
            Self::LengthMismatch { expected, found } => {
                write!(f, "Length mismatch: expected {}, found {}", expected, found)
            }
            Self::RegistryMismatch => write!(f, "Handles belong to different registries"),
            Self::ShutDown => write!(f, "Registry has been shut down"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
