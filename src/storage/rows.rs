use crate::catalog::partition::{PARTITION_KEYTYPE, PARTITION_NAMESPACE};
use crate::error::MdError;
use crate::storage::connection::ConnectionHandle;
use crate::storage::schema::{KEY_MAX_LEN, KEYTYPE_MAX_LEN, NAMESPACE_MAX_LEN, VALUE_MAX_LEN};
use rusqlite::{ErrorCode, OptionalExtension, params};
use std::collections::BTreeMap;
use tracing::{error, warn};

/// One row of the metadata table. `(namespace, keytype, key)` is the
/// primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataRow {
    pub namespace: String,
    pub keytype: String,
    pub key: String,
    pub value: String,
}

impl MetadataRow {
    pub fn new(
        namespace: impl Into<String>,
        keytype: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            keytype: keytype.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

pub(crate) fn is_partition_slice(namespace: &str, keytype: &str) -> bool {
    namespace == PARTITION_NAMESPACE && keytype == PARTITION_KEYTYPE
}

/// Namespaced key/value access over the single metadata table.
///
/// Every caller-supplied value is bound as a parameter; only the validated
/// table name is interpolated.
#[derive(Debug, Clone)]
pub struct RowStore {
    handle: ConnectionHandle,
    enforce_column_limits: bool,
}

impl RowStore {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            enforce_column_limits: true,
        }
    }

    pub fn with_column_limits(mut self, enabled: bool) -> Self {
        self.enforce_column_limits = enabled;
        self
    }

    pub fn table_name(&self) -> &str {
        self.handle.table_name()
    }

    pub fn try_insert(
        &self,
        namespace: &str,
        keytype: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MdError> {
        if self.enforce_column_limits {
            check_width("namespace", namespace, NAMESPACE_MAX_LEN)?;
            check_width("keytype", keytype, KEYTYPE_MAX_LEN)?;
            check_width("key", key, KEY_MAX_LEN)?;
            check_width("value", value, VALUE_MAX_LEN)?;
        }
        let sql = format!("INSERT INTO {} VALUES (?1, ?2, ?3, ?4)", self.table_name());
        let result = self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.execute(params![namespace, keytype, key, value])
        });
        match result {
            Ok(_) => Ok(()),
            Err(MdError::Storage(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(MdError::DuplicateKey {
                    namespace: namespace.to_string(),
                    keytype: keytype.to_string(),
                    key: key.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    pub fn insert(&self, namespace: &str, keytype: &str, key: &str, value: &str) -> bool {
        match self.try_insert(namespace, keytype, key, value) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    table = self.table_name(),
                    namespace,
                    keytype,
                    key,
                    error = %err,
                    "error adding metadata row"
                );
                false
            }
        }
    }

    pub fn insert_row(&self, row: &MetadataRow) -> bool {
        self.insert(&row.namespace, &row.keytype, &row.key, &row.value)
    }

    pub fn try_lookup(
        &self,
        namespace: &str,
        keytype: &str,
        key: &str,
    ) -> Result<Option<String>, MdError> {
        let sql = format!(
            "SELECT value FROM {} WHERE namespace = ?1 AND keytype = ?2 AND key = ?3",
            self.table_name()
        );
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row(params![namespace, keytype, key], |row| row.get(0))
                .optional()
        })
    }

    /// Missing rows and failed queries both come back as `None`.
    pub fn lookup(&self, namespace: &str, keytype: &str, key: &str) -> Option<String> {
        match self.try_lookup(namespace, keytype, key) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    table = self.table_name(),
                    namespace,
                    keytype,
                    key,
                    error = %err,
                    "error getting metadata value"
                );
                None
            }
        }
    }

    /// Returns the number of rows removed; zero is still success.
    pub fn try_delete(&self, namespace: &str, keytype: &str, key: &str) -> Result<usize, MdError> {
        let sql = format!(
            "DELETE FROM {} WHERE namespace = ?1 AND keytype = ?2 AND key = ?3",
            self.table_name()
        );
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.execute(params![namespace, keytype, key])
        })
    }

    pub fn delete(&self, namespace: &str, keytype: &str, key: &str) -> bool {
        match self.try_delete(namespace, keytype, key) {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    table = self.table_name(),
                    namespace,
                    keytype,
                    key,
                    error = %err,
                    "error removing metadata row"
                );
                false
            }
        }
    }

    pub fn try_list_by_type(
        &self,
        namespace: &str,
        keytype: &str,
    ) -> Result<BTreeMap<String, String>, MdError> {
        let sql = format!(
            "SELECT key, value FROM {} WHERE namespace = ?1 AND keytype = ?2",
            self.table_name()
        );
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![namespace, keytype], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect()
        })
    }

    /// `None` means the query failed; an empty map means no rows matched.
    pub fn list_by_type(&self, namespace: &str, keytype: &str) -> Option<BTreeMap<String, String>> {
        match self.try_list_by_type(namespace, keytype) {
            Ok(values) => Some(values),
            Err(err) => {
                error!(
                    table = self.table_name(),
                    namespace,
                    keytype,
                    error = %err,
                    "error getting all metadata values for type"
                );
                None
            }
        }
    }

    /// `MAX(CAST(value AS INT))` over one namespace/keytype slice. `None`
    /// when the slice is empty.
    pub(crate) fn try_max_int_value(
        &self,
        namespace: &str,
        keytype: &str,
    ) -> Result<Option<i64>, MdError> {
        let sql = format!(
            "SELECT MAX(CAST(value AS INT)) FROM {} WHERE namespace = ?1 AND keytype = ?2",
            self.table_name()
        );
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row(params![namespace, keytype], |row| row.get(0))
        })
    }
}

fn check_width(column: &str, value: &str, max: usize) -> Result<(), MdError> {
    let len = value.chars().count();
    if len > max {
        return Err(MdError::Validation(format!(
            "{column} is {len} characters, column allows {max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::connection::share;
    use crate::storage::schema::SchemaBootstrapper;
    use rusqlite::Connection;

    fn store() -> RowStore {
        let conn = share(Connection::open_in_memory().expect("open"));
        let handle = ConnectionHandle::new(conn, "md").expect("handle");
        SchemaBootstrapper::new(handle.clone()).ensure_table();
        RowStore::new(handle)
    }

    #[test]
    fn duplicate_primary_key_is_classified() {
        let rows = store();
        rows.try_insert("ns", "kt", "k", "v1").expect("first insert");
        let err = rows
            .try_insert("ns", "kt", "k", "v2")
            .expect_err("duplicate insert");
        assert_eq!(err.code_str(), "duplicate_key");
        assert_eq!(rows.lookup("ns", "kt", "k").as_deref(), Some("v1"));
    }

    #[test]
    fn same_key_in_other_slices_is_independent() {
        let rows = store();
        assert!(rows.insert("ns", "kt", "k", "a"));
        assert!(rows.insert("ns", "other", "k", "b"));
        assert!(rows.insert("ns2", "kt", "k", "c"));
        assert_eq!(rows.lookup("ns", "other", "k").as_deref(), Some("b"));
        assert_eq!(rows.lookup("ns2", "kt", "k").as_deref(), Some("c"));
    }

    #[test]
    fn column_widths_are_enforced_when_enabled() {
        let rows = store();
        let wide_ns = "n".repeat(NAMESPACE_MAX_LEN + 1);
        let err = rows
            .try_insert(&wide_ns, "kt", "k", "v")
            .expect_err("namespace too wide");
        assert_eq!(err.code_str(), "validation");
        assert!(!rows.insert("ns", "kt", "k", &"v".repeat(VALUE_MAX_LEN + 1)));
        assert!(rows.insert("ns", "kt", "k", &"v".repeat(VALUE_MAX_LEN)));

        let relaxed = rows.clone().with_column_limits(false);
        assert!(relaxed.insert(&wide_ns, "kt", "k", "v"));
    }

    #[test]
    fn width_counts_characters_not_bytes() {
        let rows = store();
        let key = "é".repeat(KEY_MAX_LEN);
        assert!(rows.insert("ns", "kt", &key, "v"));
    }

    #[test]
    fn max_int_value_of_empty_slice_is_none() {
        let rows = store();
        assert_eq!(rows.try_max_int_value("ns", "kt").expect("max"), None);
        rows.insert("ns", "kt", "a", "12");
        rows.insert("ns", "kt", "b", "9");
        assert_eq!(rows.try_max_int_value("ns", "kt").expect("max"), Some(12));
    }

    #[test]
    fn partition_slice_detection() {
        assert!(is_partition_slice("Partition", "name"));
        assert!(!is_partition_slice("Partition", "label"));
        assert!(!is_partition_slice("partition", "name"));
    }
}
