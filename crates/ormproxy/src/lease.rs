//! Connection leasing.
//!
//! Every proxy operation works on the proxy's single connection through a
//! [`Lease`]. The [`LeaseManager`] counts outstanding leases, opens the
//! connection on the first one and, for helper-managed databases, closes it
//! again when the count returns to zero. Caller-supplied connections are
//! never closed.

use ormproxy_core::{DescriptorCache, Error, Result, TableSchema};
use ormproxy_sqlite::{OpenHelper, SqliteConnection};
use std::ops::Deref;
use std::sync::Arc;

/// Resolves an entity type to its table layout using the proxy's cache.
pub type TableRegistration = fn(&mut DescriptorCache) -> Result<TableSchema>;

/// Where the proxy's connection comes from.
pub enum ConnectionSource {
    /// Opened through the helper on demand and closed at lease count zero.
    Helper(Box<OpenHelper>),
    /// Owned by the caller; never closed here.
    External(Arc<SqliteConnection>),
    /// Nothing configured; every acquisition fails.
    Unconfigured,
}

impl std::fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionSource::Helper(helper) => f.debug_tuple("Helper").field(helper).finish(),
            ConnectionSource::External(conn) => f.debug_tuple("External").field(conn).finish(),
            ConnectionSource::Unconfigured => f.write_str("Unconfigured"),
        }
    }
}

/// Lease counter and owner of the live connection.
///
/// Lives inside the proxy's mutex, so every method runs under that lock.
#[derive(Debug)]
pub struct LeaseManager {
    source: ConnectionSource,
    pending_tables: Vec<TableRegistration>,
    active: Option<Arc<SqliteConnection>>,
    count: usize,
}

impl LeaseManager {
    pub fn new(source: ConnectionSource) -> Self {
        Self {
            source,
            pending_tables: Vec::new(),
            active: None,
            count: 0,
        }
    }

    /// Queue an entity table; it is resolved and handed to the helper on the
    /// first open. Ignored for external and unconfigured sources.
    pub fn register_table(&mut self, registration: TableRegistration) {
        self.pending_tables.push(registration);
    }

    /// Number of outstanding leases.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether a connection is currently held open.
    pub fn is_open(&self) -> bool {
        match &self.source {
            ConnectionSource::External(conn) => conn.is_open(),
            _ => self.active.is_some(),
        }
    }

    pub fn source(&self) -> &ConnectionSource {
        &self.source
    }

    /// Take a lease, opening the connection if needed.
    ///
    /// On failure the count is left untouched.
    #[allow(clippy::result_large_err)]
    pub fn acquire(&mut self, cache: &mut DescriptorCache) -> Result<Lease<'_>> {
        let conn = self.connection(cache)?;
        self.count += 1;
        tracing::trace!(count = self.count, "Lease acquired");
        Ok(Lease {
            manager: self,
            conn,
        })
    }

    /// Give back one lease.
    ///
    /// At zero a helper-opened connection is closed. A release with no
    /// outstanding lease is ignored.
    pub fn release(&mut self) {
        if self.count == 0 {
            tracing::warn!("Unmatched lease release ignored");
            return;
        }
        self.count -= 1;
        tracing::trace!(count = self.count, "Lease released");

        if self.count == 0 {
            if let Some(conn) = self.active.take() {
                match conn.close() {
                    Ok(()) => tracing::debug!(path = %conn.path(), "Closed idle connection"),
                    Err(e) => tracing::warn!(error = %e, "Failed to close idle connection"),
                }
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn connection(&mut self, cache: &mut DescriptorCache) -> Result<Arc<SqliteConnection>> {
        match &mut self.source {
            ConnectionSource::Unconfigured => Err(Error::Unconfigured),
            ConnectionSource::External(conn) => Ok(Arc::clone(conn)),
            ConnectionSource::Helper(helper) => {
                if let Some(conn) = &self.active {
                    return Ok(Arc::clone(conn));
                }

                if !self.pending_tables.is_empty() {
                    let tables = self
                        .pending_tables
                        .iter()
                        .map(|register| register(cache))
                        .collect::<Result<Vec<_>>>()?;
                    for table in tables {
                        helper.add_table(table);
                    }
                    self.pending_tables.clear();
                }

                let conn = Arc::new(helper.open()?);
                self.active = Some(Arc::clone(&conn));
                Ok(conn)
            }
        }
    }
}

/// A counted borrow of the proxy's connection.
///
/// Dropping the lease releases it.
pub struct Lease<'a> {
    manager: &'a mut LeaseManager,
    conn: Arc<SqliteConnection>,
}

impl Lease<'_> {
    /// Take a further lease on the same connection for a compound operation.
    pub fn nested(&mut self) -> Lease<'_> {
        self.manager.count += 1;
        tracing::trace!(count = self.manager.count, "Nested lease acquired");
        Lease {
            conn: Arc::clone(&self.conn),
            manager: &mut *self.manager,
        }
    }

    pub fn connection(&self) -> &SqliteConnection {
        &self.conn
    }

    /// Outstanding leases, this one included.
    pub fn count(&self) -> usize {
        self.manager.count
    }
}

impl Deref for Lease<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.manager.release();
    }
}

impl std::fmt::Debug for Lease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("connection", &self.conn)
            .field("count", &self.manager.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormproxy_core::{ColumnSchema, SemanticType};
    use ormproxy_sqlite::SqliteConfig;

    fn helper_manager(dir: &tempfile::TempDir) -> LeaseManager {
        let path = dir.path().join("lease.db").to_string_lossy().into_owned();
        let helper = OpenHelper::new(SqliteConfig::file(path), 1);
        LeaseManager::new(ConnectionSource::Helper(Box::new(helper)))
    }

    fn note_table(_: &mut DescriptorCache) -> Result<TableSchema> {
        Ok(TableSchema::new(
            "note",
            vec![ColumnSchema::new("body", SemanticType::Text)],
        ))
    }

    #[test]
    fn test_unconfigured_acquire_fails_without_counting() {
        let mut cache = DescriptorCache::new();
        let mut manager = LeaseManager::new(ConnectionSource::Unconfigured);
        assert!(matches!(manager.acquire(&mut cache), Err(Error::Unconfigured)));
        assert_eq!(manager.count(), 0);
        assert!(!manager.is_open());
    }

    #[test]
    fn test_helper_connection_closes_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DescriptorCache::new();
        let mut manager = helper_manager(&dir);

        {
            let lease = manager.acquire(&mut cache).unwrap();
            assert_eq!(lease.count(), 1);
            lease.execute_raw("CREATE TABLE t (x INTEGER)").unwrap();
        }
        assert_eq!(manager.count(), 0);
        assert!(!manager.is_open());

        // Reopened on the next lease, with the earlier write persisted.
        let lease = manager.acquire(&mut cache).unwrap();
        assert!(lease.query("SELECT * FROM t", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_nested_lease_keeps_connection_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DescriptorCache::new();
        let mut manager = helper_manager(&dir);

        let mut outer = manager.acquire(&mut cache).unwrap();
        {
            let inner = outer.nested();
            assert_eq!(inner.count(), 2);
        }
        assert_eq!(outer.count(), 1);
        assert!(outer.is_open());
        drop(outer);
        assert!(!manager.is_open());
    }

    #[test]
    fn test_unmatched_release_never_goes_negative() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DescriptorCache::new();
        let mut manager = helper_manager(&dir);

        manager.release();
        manager.release();
        assert_eq!(manager.count(), 0);

        drop(manager.acquire(&mut cache).unwrap());
        manager.release();
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_external_connection_is_never_closed() {
        let mut cache = DescriptorCache::new();
        let conn = Arc::new(SqliteConnection::open_memory().unwrap());
        let mut manager = LeaseManager::new(ConnectionSource::External(Arc::clone(&conn)));

        for _ in 0..5 {
            let lease = manager.acquire(&mut cache).unwrap();
            lease.execute_raw("SELECT 1").unwrap();
        }
        manager.release();

        assert_eq!(manager.count(), 0);
        assert!(conn.is_open());
        assert!(manager.is_open());
    }

    #[test]
    fn test_registered_tables_are_created_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DescriptorCache::new();
        let mut manager = helper_manager(&dir);
        manager.register_table(note_table);

        let lease = manager.acquire(&mut cache).unwrap();
        let columns = ormproxy_sqlite::helper::table_columns(&lease, "note").unwrap();
        assert_eq!(columns, vec!["_key_id", "body"]);
    }
}
