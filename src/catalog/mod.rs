pub mod partition;

use crate::catalog::partition::{
    PARTITION_KEYTYPE, PARTITION_NAMESPACE, Partition, PartitionId, decode_id,
};
use crate::config::CatalogConfig;
use crate::error::MdError;
use crate::storage::connection::{ConnectionHandle, SharedConnection};
use crate::storage::rows::{RowStore, is_partition_slice};
use crate::storage::schema::SchemaBootstrapper;
use crate::{PartitionEvent, PartitionHook};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Partition records and caller metadata stored in one relational table.
///
/// The catalog keeps a name -> identifier cache. The cache mirrors rows this
/// instance has written or explicitly loaded; it is never consulted by the
/// lookup operations and never refreshed implicitly. Other catalogs sharing
/// the table only see each other's writes through the store.
///
/// Add is check-then-insert and not atomic. Two writers racing on one name
/// are separated by the table's primary key, and the loser is reported the
/// same way as a failed pre-check.
pub struct PartitionCatalog {
    handle: ConnectionHandle,
    schema: SchemaBootstrapper,
    rows: RowStore,
    partition_names: HashMap<String, PartitionId>,
    hooks: Vec<Arc<dyn PartitionHook>>,
}

impl std::fmt::Debug for PartitionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionCatalog")
            .field("table_name", &self.handle.table_name())
            .field("cached_partitions", &self.partition_names.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl PartitionCatalog {
    /// Builds a catalog with an empty cache. Touches neither the schema nor
    /// the rows.
    pub fn new(conn: SharedConnection, config: &CatalogConfig) -> Result<Self, MdError> {
        config.validate()?;
        let handle = ConnectionHandle::new(conn, config.table_name.clone())?;
        Ok(Self {
            schema: SchemaBootstrapper::new(handle.clone()),
            rows: RowStore::new(handle.clone()).with_column_limits(config.enforce_column_limits),
            handle,
            partition_names: HashMap::new(),
            hooks: Vec::new(),
        })
    }

    /// Like [`PartitionCatalog::new`], then applies the open-time steps the
    /// config asks for. Both steps fail soft.
    pub fn open(conn: SharedConnection, config: &CatalogConfig) -> Result<Self, MdError> {
        let mut catalog = Self::new(conn, config)?;
        if config.create_table_on_open {
            catalog.ensure_table();
        }
        if config.preload_partition_names {
            catalog.load_partition_names();
        }
        Ok(catalog)
    }

    pub fn connection(&self) -> &SharedConnection {
        self.handle.connection()
    }

    pub fn table_name(&self) -> &str {
        self.handle.table_name()
    }

    pub fn schema(&self) -> &SchemaBootstrapper {
        &self.schema
    }

    pub fn rows(&self) -> &RowStore {
        &self.rows
    }

    pub fn table_exists(&self) -> bool {
        self.schema.table_exists()
    }

    pub fn ensure_table(&self) {
        self.schema.ensure_table();
    }

    // ---- cache ----

    /// Replaces the cache with the persisted partition records. Returns the
    /// number of cached names.
    pub fn try_load_partition_names(&mut self) -> Result<usize, MdError> {
        let values = self
            .rows
            .try_list_by_type(PARTITION_NAMESPACE, PARTITION_KEYTYPE)?;
        let mut loaded = HashMap::with_capacity(values.len());
        for (name, value) in values {
            let id = decode_id(&name, &value)?;
            loaded.insert(name, id);
        }
        self.partition_names = loaded;
        Ok(self.partition_names.len())
    }

    /// Replaces the cache with the persisted names; entries absent from the
    /// store are dropped. On failure the cache is left as it was.
    pub fn load_partition_names(&mut self) {
        match self.try_load_partition_names() {
            Ok(count) => debug!(table = self.table_name(), count, "loaded partition names"),
            Err(err) => error!(
                table = self.table_name(),
                error = %err,
                "could not load partition names"
            ),
        }
    }

    pub fn cached_partition_id(&self, name: &str) -> Option<PartitionId> {
        self.partition_names.get(name).copied()
    }

    pub fn cached_partitions(&self) -> impl Iterator<Item = Partition> + '_ {
        self.partition_names
            .iter()
            .map(|(name, id)| Partition::new(*id, name.clone()))
    }

    pub fn cached_len(&self) -> usize {
        self.partition_names.len()
    }

    // ---- reads ----

    pub fn try_get_partition_by_name(&self, name: &str) -> Result<Option<Partition>, MdError> {
        self.rows
            .try_lookup(PARTITION_NAMESPACE, PARTITION_KEYTYPE, name)?
            .map(|value| Partition::decode(name, &value))
            .transpose()
    }

    /// Always a store round-trip; the cache is not consulted.
    pub fn get_partition_by_name(&self, name: &str) -> Option<Partition> {
        match self.try_get_partition_by_name(name) {
            Ok(partition) => partition,
            Err(err) => {
                warn!(
                    table = self.table_name(),
                    partition = name,
                    error = %err,
                    "error getting partition by name"
                );
                None
            }
        }
    }

    pub fn try_get_all_partitions(&self) -> Result<HashSet<Partition>, MdError> {
        self.rows
            .try_list_by_type(PARTITION_NAMESPACE, PARTITION_KEYTYPE)?
            .iter()
            .map(|(name, value)| Partition::decode(name, value))
            .collect()
    }

    /// `None` when the listing failed, as opposed to an empty set.
    pub fn get_all_partitions(&self) -> Option<HashSet<Partition>> {
        match self.try_get_all_partitions() {
            Ok(partitions) => Some(partitions),
            Err(err) => {
                error!(
                    table = self.table_name(),
                    error = %err,
                    "error listing partitions"
                );
                None
            }
        }
    }

    /// `Ok(None)` for an empty catalog.
    pub fn try_get_max_partition(&self) -> Result<Option<PartitionId>, MdError> {
        self.rows
            .try_max_int_value(PARTITION_NAMESPACE, PARTITION_KEYTYPE)?
            .map(|max| {
                PartitionId::try_from(max).map_err(|_| {
                    MdError::Decode(format!("max partition identifier {max} is out of range"))
                })
            })
            .transpose()
    }

    /// Returns 0 both for an empty catalog and on failure.
    pub fn get_max_partition(&self) -> PartitionId {
        match self.try_get_max_partition() {
            Ok(max) => max.unwrap_or(0),
            Err(err) => {
                error!(
                    table = self.table_name(),
                    error = %err,
                    "could not get max partition"
                );
                0
            }
        }
    }

    // ---- writes ----

    pub fn try_add_partition(&mut self, partition: &Partition) -> Result<(), MdError> {
        let already_exists = || MdError::PartitionAlreadyExists {
            name: partition.name.clone(),
        };
        if self
            .rows
            .try_lookup(PARTITION_NAMESPACE, PARTITION_KEYTYPE, &partition.name)?
            .is_some()
        {
            return Err(already_exists());
        }
        match self.rows.try_insert(
            PARTITION_NAMESPACE,
            PARTITION_KEYTYPE,
            &partition.name,
            &partition.encoded_id(),
        ) {
            Ok(()) => {}
            Err(MdError::DuplicateKey { .. }) => return Err(already_exists()),
            Err(err) => return Err(err),
        }
        self.partition_names.insert(partition.name.clone(), partition.id);
        debug!(
            table = self.table_name(),
            partition = %partition,
            "added partition"
        );
        self.dispatch(PartitionEvent::Added {
            partition: partition.clone(),
        });
        Ok(())
    }

    /// Rejects names that are already present, whether caught before the
    /// insert or by the primary key.
    pub fn add_partition(&mut self, partition: &Partition) -> bool {
        match self.try_add_partition(partition) {
            Ok(()) => true,
            Err(err) if err.is_conflict() => {
                error!(
                    table = self.table_name(),
                    partition = %partition,
                    "partition named {} already exists",
                    partition.name
                );
                false
            }
            Err(err) => {
                warn!(
                    table = self.table_name(),
                    partition = %partition,
                    error = %err,
                    "error adding partition"
                );
                false
            }
        }
    }

    /// Deletes by name only; the identifier is not compared. Returns whether
    /// a row was actually removed.
    pub fn try_remove_partition(&mut self, partition: &Partition) -> Result<bool, MdError> {
        let removed = self
            .rows
            .try_delete(PARTITION_NAMESPACE, PARTITION_KEYTYPE, &partition.name)?;
        self.partition_names.remove(&partition.name);
        if removed > 0 {
            debug!(
                table = self.table_name(),
                partition = %partition,
                "removed partition"
            );
            self.dispatch(PartitionEvent::Removed {
                partition: partition.clone(),
            });
        }
        Ok(removed > 0)
    }

    /// Removing an absent partition succeeds.
    pub fn remove_partition(&mut self, partition: &Partition) -> bool {
        match self.try_remove_partition(partition) {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    table = self.table_name(),
                    partition = %partition,
                    error = %err,
                    "error removing partition"
                );
                false
            }
        }
    }

    // ---- caller metadata ----

    /// Inserts a caller metadata row. The partition slice is refused.
    pub fn put_metadata(
        &self,
        namespace: &str,
        keytype: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MdError> {
        reject_partition_slice(namespace, keytype)?;
        self.rows.try_insert(namespace, keytype, key, value)
    }

    pub fn remove_metadata(
        &self,
        namespace: &str,
        keytype: &str,
        key: &str,
    ) -> Result<bool, MdError> {
        reject_partition_slice(namespace, keytype)?;
        Ok(self.rows.try_delete(namespace, keytype, key)? > 0)
    }

    // ---- hooks ----

    pub fn add_hook(&mut self, hook: Arc<dyn PartitionHook>) {
        self.hooks.push(hook);
    }

    pub fn remove_hook(&mut self, hook: &Arc<dyn PartitionHook>) {
        self.hooks.retain(|existing| !Arc::ptr_eq(existing, hook));
    }

    fn dispatch(&self, event: PartitionEvent) {
        for hook in &self.hooks {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook.on_event(&event)))
                .is_err()
            {
                warn!(
                    table = self.table_name(),
                    event = ?event,
                    "partition hook panicked while handling event"
                );
            }
        }
    }
}

fn reject_partition_slice(namespace: &str, keytype: &str) -> Result<(), MdError> {
    if is_partition_slice(namespace, keytype) {
        return Err(MdError::Validation(format!(
            "{namespace}/{keytype} is reserved for partition records"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::connection::share;
    use rusqlite::Connection;

    fn catalog() -> PartitionCatalog {
        let conn = share(Connection::open_in_memory().expect("open"));
        PartitionCatalog::open(conn, &CatalogConfig::new("md")).expect("catalog")
    }

    #[test]
    fn new_does_not_touch_the_store() {
        let conn = share(Connection::open_in_memory().expect("open"));
        let catalog = PartitionCatalog::new(conn, &CatalogConfig::new("md")).expect("catalog");
        assert!(!catalog.table_exists());
        assert_eq!(catalog.cached_len(), 0);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let conn = share(Connection::open_in_memory().expect("open"));
        let err = PartitionCatalog::new(conn, &CatalogConfig::new("bad name")).expect_err("config");
        assert_eq!(err.code_str(), "invalid_config");
    }

    #[test]
    fn duplicate_add_is_already_exists() {
        let mut catalog = catalog();
        catalog
            .try_add_partition(&Partition::new(1, "a"))
            .expect("first add");
        let err = catalog
            .try_add_partition(&Partition::new(2, "a"))
            .expect_err("second add");
        assert_eq!(err.code_str(), "partition_already_exists");
        assert_eq!(catalog.cached_partition_id("a"), Some(1));
    }

    #[test]
    fn try_remove_reports_whether_a_row_existed() {
        let mut catalog = catalog();
        let p = Partition::new(4, "gone");
        assert!(!catalog.try_remove_partition(&p).expect("remove absent"));
        catalog.try_add_partition(&p).expect("add");
        assert!(catalog.try_remove_partition(&p).expect("remove present"));
        assert_eq!(catalog.cached_partition_id("gone"), None);
    }

    #[test]
    fn remove_ignores_identifier_mismatch() {
        let mut catalog = catalog();
        assert!(catalog.add_partition(&Partition::new(5, "p")));
        assert!(catalog.remove_partition(&Partition::new(99, "p")));
        assert_eq!(catalog.get_partition_by_name("p"), None);
    }

    #[test]
    fn corrupt_identifier_surfaces_as_decode_error() {
        let catalog = catalog();
        catalog
            .rows()
            .try_insert(PARTITION_NAMESPACE, PARTITION_KEYTYPE, "bad", "not-a-number")
            .expect("raw insert");
        let err = catalog
            .try_get_partition_by_name("bad")
            .expect_err("decode");
        assert_eq!(err.code_str(), "decode");
        assert_eq!(catalog.get_partition_by_name("bad"), None);
        assert!(catalog.get_all_partitions().is_none());
    }

    #[test]
    fn metadata_helpers_refuse_partition_slice() {
        let catalog = catalog();
        let err = catalog
            .put_metadata(PARTITION_NAMESPACE, PARTITION_KEYTYPE, "x", "1")
            .expect_err("reserved");
        assert_eq!(err.code_str(), "validation");
        assert!(
            catalog
                .remove_metadata(PARTITION_NAMESPACE, PARTITION_KEYTYPE, "x")
                .is_err()
        );

        catalog
            .put_metadata(PARTITION_NAMESPACE, "label", "x", "evidence")
            .expect("other keytype in partition namespace");
        let removed = catalog
            .remove_metadata(PARTITION_NAMESPACE, "label", "x")
            .expect("remove");
        assert!(removed);
        let removed_again = catalog
            .remove_metadata(PARTITION_NAMESPACE, "label", "x")
            .expect("remove again");
        assert!(!removed_again);
    }
}
