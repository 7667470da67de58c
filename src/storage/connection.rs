use crate::config::validate_table_name;
use crate::error::MdError;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;

/// A connection owned by the caller and lent to one or more catalogs.
///
/// The catalog never opens or closes it. Each operation holds the lock for
/// exactly one statement.
pub type SharedConnection = Arc<Mutex<Connection>>;

pub fn share(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// The live connection plus the name of the metadata table it serves.
#[derive(Clone)]
pub struct ConnectionHandle {
    conn: SharedConnection,
    table_name: String,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub fn new(conn: SharedConnection, table_name: impl Into<String>) -> Result<Self, MdError> {
        let table_name = table_name.into();
        validate_table_name(&table_name)?;
        Ok(Self { conn, table_name })
    }

    pub fn connection(&self) -> &SharedConnection {
        &self.conn
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, MdError> {
        let guard = self.conn.lock();
        f(&guard).map_err(MdError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_rejects_unsafe_table_names() {
        let conn = share(Connection::open_in_memory().expect("open"));
        let err = ConnectionHandle::new(conn, "md; DROP TABLE md").expect_err("unsafe name");
        assert_eq!(err.code_str(), "invalid_config");
    }

    #[test]
    fn clones_share_the_same_connection() {
        let conn = share(Connection::open_in_memory().expect("open"));
        let a = ConnectionHandle::new(conn, "md").expect("handle");
        let b = a.clone();
        assert!(Arc::ptr_eq(a.connection(), b.connection()));
        assert_eq!(b.table_name(), "md");

        a.with_conn(|c| c.execute_batch("CREATE TABLE shared_check (x INTEGER)"))
            .expect("create");
        let count: i64 = b
            .with_conn(|c| {
                c.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 'shared_check'",
                    [],
                    |row| row.get(0),
                )
            })
            .expect("count");
        assert_eq!(count, 1);
    }
}
