use crate::error::MdError;
use crate::storage::connection::ConnectionHandle;
use rusqlite::OptionalExtension;
use rusqlite::params;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

pub const NAMESPACE_MAX_LEN: usize = 20;
pub const KEYTYPE_MAX_LEN: usize = 20;
pub const KEY_MAX_LEN: usize = 255;
pub const VALUE_MAX_LEN: usize = 255;

/// DDL for the metadata table. Column names, widths and the composite
/// primary key are a persisted contract shared with other readers.
pub fn create_table_sql(table_name: &str) -> String {
    format!(
        "CREATE TABLE {table_name} (namespace VARCHAR({NAMESPACE_MAX_LEN}), \
         keytype VARCHAR({KEYTYPE_MAX_LEN}), key VARCHAR({KEY_MAX_LEN}), \
         value VARCHAR({VALUE_MAX_LEN}), PRIMARY KEY(namespace,keytype,key))"
    )
}

/// Idempotent check-and-create of the metadata table.
///
/// A positive existence check is remembered for the lifetime of the value;
/// tables are not expected to disappear underneath a running process. A
/// negative check is never remembered.
#[derive(Debug)]
pub struct SchemaBootstrapper {
    handle: ConnectionHandle,
    exists: AtomicBool,
}

impl SchemaBootstrapper {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            exists: AtomicBool::new(false),
        }
    }

    pub fn try_table_exists(&self) -> Result<bool, MdError> {
        if self.exists.load(Ordering::Acquire) {
            return Ok(true);
        }
        let found = self.handle.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                params![self.handle.table_name()],
                |_| Ok(()),
            )
            .optional()
        })?;
        if found.is_some() {
            self.exists.store(true, Ordering::Release);
        }
        Ok(found.is_some())
    }

    pub fn table_exists(&self) -> bool {
        match self.try_table_exists() {
            Ok(exists) => exists,
            Err(err) => {
                error!(
                    table = self.handle.table_name(),
                    error = %err,
                    "could not determine if metadata table exists"
                );
                false
            }
        }
    }

    /// Returns `Ok(true)` when this call issued the DDL.
    pub fn try_create_table(&self) -> Result<bool, MdError> {
        if self.try_table_exists()? {
            return Ok(false);
        }
        let sql = create_table_sql(self.handle.table_name());
        self.handle.with_conn(|conn| conn.execute_batch(&sql))?;
        debug!(table = self.handle.table_name(), "created metadata table");
        Ok(true)
    }

    /// Creates the table if missing. Failures are logged and swallowed;
    /// they resurface as failed row operations.
    pub fn ensure_table(&self) {
        if self.table_exists() {
            return;
        }
        let sql = create_table_sql(self.handle.table_name());
        if let Err(err) = self.handle.with_conn(|conn| conn.execute_batch(&sql)) {
            error!(
                table = self.handle.table_name(),
                error = %err,
                "error while creating metadata table"
            );
        } else {
            debug!(table = self.handle.table_name(), "created metadata table");
        }
    }
}
