//! In-memory substrate storage: fixed-size addressable byte regions and the
//! namespaced associative store with brute-force vector search.

mod assoc_store;
mod forget;
mod state_store;
pub mod vector;

pub use assoc_store::AssocStore;
pub use forget::ForgetPolicy;
pub use state_store::{RegionInfo, StateStore};

use msi_types::StateHandle;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown state handle '{0}'")]
    UnknownHandle(StateHandle),
    #[error("out of bounds: offset={offset}, len={len}, size={size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("state region '{name}' is read-only")]
    PermissionDenied { name: String },
    #[error("state region size must be positive, got {0}")]
    InvalidSize(usize),
    #[error("state region of {size} bytes exceeds the {max} byte limit")]
    RegionTooLarge { size: usize, max: usize },
}
