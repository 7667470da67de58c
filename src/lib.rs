//! Partition metadata catalog over a single relational key/value table.
//!
//! Rows are `(namespace, keytype, key, value)` with a composite primary key
//! on the first three columns. Partitions live in the `"Partition"/"name"`
//! slice, keyed by name with the decimal identifier as value; every other
//! slice is free for caller metadata.

pub mod catalog;
pub mod config;
pub mod error;
pub mod storage;

pub use crate::catalog::PartitionCatalog;
pub use crate::catalog::partition::{Partition, PartitionId};
pub use crate::config::CatalogConfig;
pub use crate::error::{MdError, MdErrorCode};
pub use crate::storage::connection::{SharedConnection, share};

/// Partition lifecycle change, emitted after the write has succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionEvent {
    Added { partition: Partition },
    Removed { partition: Partition },
}

impl PartitionEvent {
    pub fn partition(&self) -> &Partition {
        match self {
            PartitionEvent::Added { partition } | PartitionEvent::Removed { partition } => {
                partition
            }
        }
    }
}

/// Observer for partition lifecycle changes. Hooks run synchronously on the
/// writing thread, in registration order.
pub trait PartitionHook: Send + Sync {
    fn on_event(&self, event: &PartitionEvent);
}
