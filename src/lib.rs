//! refptr - registry-backed reference-counted handles
//!
//! Handles behave like raw pointers (dereference, indexing, cursor
//! iteration) while a [`Registry`] counts how many handles share each heap
//! allocation. Allocations are reclaimed by a throttled sweep once their
//! count drops to zero, and a finalizer registered with an [`ExitHook`]
//! reclaims whatever is left at process exit.
//!
//! ```
//! use refptr::{Handle, Registry};
//!
//! let registry = Registry::<String>::builder().without_exit_hook().build();
//! let first = Handle::new(&registry, "Test".to_string()).unwrap();
//! let second = first.clone();
//! assert_eq!(first.refcount().unwrap(), 2);
//!
//! drop(second);
//! drop(first);
//! assert!(registry.is_empty());
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod handle;
pub mod logging;
pub mod registry;

// Re-export core types
pub use collector::{
    run_exit_finalizers, CollectorStats, ExitFinalizer, ExitHook, ManualExit, NoExit, ProcessExit,
    Sweep,
};
pub use config::GcConfig;
pub use error::{RegistryError, RegistryResult};
pub use handle::{Cursor, Handle};
pub use registry::{RecordInfo, Registry, RegistryBuilder};
