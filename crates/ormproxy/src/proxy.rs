//! The entity persistence surface.
//!
//! [`DbProxy`] maps entity types to tables and runs typed create, read,
//! update and delete operations over one SQLite connection. Every call holds
//! the proxy's lock for its whole duration. Writes run inside a single
//! transaction per call and are rolled back on any error.

#![allow(clippy::result_large_err)]

use crate::lease::{ConnectionSource, LeaseManager, TableRegistration};
use crate::sql::{self, QueryOptions};
use ormproxy_core::marshal::{from_row, to_insert_row, to_update_row};
use ormproxy_core::{
    ConnectionError, ConnectionErrorKind, DescriptorCache, Entity, EntityDescriptor, Error,
    Result, Row, Value,
};
use ormproxy_sqlite::{OpenHelper, SqliteConnection};
use std::sync::{Arc, Mutex, MutexGuard};

/// Returned by row-producing operations when there was nothing to write or
/// nothing was found.
pub const NO_ROW: i64 = -1;

/// Returned by [`DbProxy::update`] for an entity that was never persisted.
pub const NOT_APPLICABLE: i64 = -1;

struct ProxyState {
    cache: DescriptorCache,
    leases: LeaseManager,
}

/// Typed access to the tables of one database.
///
/// # Example
///
/// ```
/// use ormproxy::{DbProxy, Entity};
///
/// #[derive(Entity, Debug, Default, Clone, PartialEq)]
/// struct User {
///     id: i64,
///     name: String,
///     age: i32,
/// }
///
/// let dir = tempfile::tempdir().unwrap();
/// let proxy = DbProxy::builder()
///     .name("users.db")
///     .directory(dir.path())
///     .version(1)
///     .create_table::<User>()
///     .build()
///     .unwrap();
///
/// let mut user = User { id: 0, name: "ada".into(), age: 36 };
/// let id = proxy.insert(&mut user).unwrap();
/// assert_eq!(user.id, id);
///
/// let found: Option<User> = proxy.query_by_key(id).unwrap();
/// assert_eq!(found, Some(user));
/// ```
pub struct DbProxy {
    state: Mutex<ProxyState>,
}

impl DbProxy {
    pub fn builder() -> crate::ProxyBuilder {
        crate::ProxyBuilder::new()
    }

    /// A proxy over a helper-managed database; `tables` are created or
    /// upgraded when the helper first opens it.
    pub fn with_helper(helper: OpenHelper) -> Self {
        Self::from_parts(ConnectionSource::Helper(Box::new(helper)), Vec::new())
    }

    /// A proxy over a caller-owned connection, which is never closed here.
    pub fn with_connection(conn: Arc<SqliteConnection>) -> Self {
        Self::from_parts(ConnectionSource::External(conn), Vec::new())
    }

    /// A proxy with no database; every operation fails with
    /// [`Error::Unconfigured`].
    pub fn unconfigured() -> Self {
        Self::from_parts(ConnectionSource::Unconfigured, Vec::new())
    }

    pub(crate) fn from_parts(source: ConnectionSource, tables: Vec<TableRegistration>) -> Self {
        let mut leases = LeaseManager::new(source);
        for table in tables {
            leases.register_table(table);
        }
        Self {
            state: Mutex::new(ProxyState {
                cache: DescriptorCache::new(),
                leases,
            }),
        }
    }

    /// Outstanding connection leases; zero between calls.
    pub fn lease_count(&self) -> Result<usize> {
        Ok(self.lock()?.leases.count())
    }

    /// Whether the connection is currently open.
    pub fn is_open(&self) -> Result<bool> {
        Ok(self.lock()?.leases.is_open())
    }

    /// The table an entity type is stored in, for use in raw SQL.
    pub fn table_name<T: Entity>(&self) -> Result<String> {
        let mut state = self.lock()?;
        Ok(state.cache.get::<T>()?.table_name().to_string())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert `entity`, store the assigned key in it and return that key.
    pub fn insert<T: Entity>(&self, entity: &mut T) -> Result<i64> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let descriptor = state.cache.get::<T>()?;
        let lease = state.leases.acquire(&mut state.cache)?;
        insert_one(&lease, &descriptor, entity)
    }

    /// Insert every entity in one transaction and store their keys.
    pub fn insert_all<T: Entity>(&self, entities: &mut [T]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let descriptor = state.cache.get::<T>()?;
        let lease = state.leases.acquire(&mut state.cache)?;

        let tx = lease.begin()?;
        let mut keys = Vec::with_capacity(entities.len());
        for entity in entities.iter() {
            let key = match to_insert_row(&descriptor, Some(entity)) {
                Some(row) => {
                    let (sql, params) = sql::insert(descriptor.table_name(), &row);
                    Some(tx.insert(&sql, &params)?)
                }
                None => None,
            };
            keys.push(key);
        }
        tx.commit()?;

        for (entity, key) in entities.iter_mut().zip(keys) {
            if let Some(key) = key {
                entity.set_primary_key(key);
            }
        }
        tracing::debug!(table = %descriptor.table_name(), rows = entities.len(), "Inserted batch");
        Ok(())
    }

    /// Update the rows matching `predicate` with the entity's non-key
    /// columns.
    ///
    /// Returns the number of rows changed, or [`NO_ROW`] when the entity
    /// produced nothing to write. The signed return type is there for that
    /// sentinel; the batch operations have none and return `u64`.
    pub fn update_where<T: Entity>(
        &self,
        entity: &T,
        predicate: Option<&str>,
        args: &[Value],
    ) -> Result<i64> {
        let predicate = sql::predicate(predicate).ok_or(Error::MissingPredicate("update"))?;
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let descriptor = state.cache.get::<T>()?;
        let lease = state.leases.acquire(&mut state.cache)?;
        update_one(&lease, &descriptor, entity, predicate, args)
    }

    /// Update the entity's own row. Returns [`NOT_APPLICABLE`] when the
    /// entity has no key yet.
    pub fn update<T: Entity>(&self, entity: &T) -> Result<i64> {
        if !entity.is_persisted() {
            return Ok(NOT_APPLICABLE);
        }
        self.update_by_key(entity, entity.primary_key())
    }

    /// Update the row with key `key` from the entity's non-key columns.
    pub fn update_by_key<T: Entity>(&self, entity: &T, key: i64) -> Result<i64> {
        let (predicate, args) = sql::key_predicate(key);
        self.update_where(entity, Some(&predicate), &args)
    }

    /// Update every persisted entity by key in one transaction; entities
    /// without a key are skipped. Returns the total rows changed.
    pub fn update_all<T: Entity>(&self, entities: &[T]) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let descriptor = state.cache.get::<T>()?;
        let lease = state.leases.acquire(&mut state.cache)?;

        let tx = lease.begin()?;
        let mut changed = 0;
        for entity in entities.iter().filter(|e| e.is_persisted()) {
            if let Some(row) = to_update_row(&descriptor, Some(entity)) {
                let (predicate, args) = sql::key_predicate(entity.primary_key());
                let (sql, params) = sql::update(descriptor.table_name(), &row, &predicate, &args);
                changed += tx.execute(&sql, &params)?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Update the entity when it has a key, insert it otherwise.
    ///
    /// Returns rows changed for an update and the new key for an insert,
    /// or [`NO_ROW`] when there was nothing to write.
    pub fn insert_or_update<T: Entity>(&self, entity: &mut T) -> Result<i64> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let descriptor = state.cache.get::<T>()?;
        let mut outer = state.leases.acquire(&mut state.cache)?;
        let inner = outer.nested();

        if entity.is_persisted() {
            let (predicate, args) = sql::key_predicate(entity.primary_key());
            update_one(&inner, &descriptor, entity, &predicate, &args)
        } else {
            insert_one(&inner, &descriptor, entity)
        }
    }

    /// Per element, update by key or insert, all in one transaction. New
    /// keys are stored in the inserted entities.
    pub fn insert_or_update_all<T: Entity>(&self, entities: &mut [T]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let descriptor = state.cache.get::<T>()?;
        let lease = state.leases.acquire(&mut state.cache)?;
        let table = descriptor.table_name();

        let tx = lease.begin()?;
        let mut keys = Vec::with_capacity(entities.len());
        for entity in entities.iter() {
            if entity.is_persisted() {
                if let Some(row) = to_update_row(&descriptor, Some(entity)) {
                    let (predicate, args) = sql::key_predicate(entity.primary_key());
                    let (sql, params) = sql::update(table, &row, &predicate, &args);
                    tx.execute(&sql, &params)?;
                }
                keys.push(None);
            } else if let Some(row) = to_insert_row(&descriptor, Some(entity)) {
                let (sql, params) = sql::insert(table, &row);
                keys.push(Some(tx.insert(&sql, &params)?));
            } else {
                keys.push(None);
            }
        }
        tx.commit()?;

        for (entity, key) in entities.iter_mut().zip(keys) {
            if let Some(key) = key {
                entity.set_primary_key(key);
            }
        }
        Ok(())
    }

    /// Delete the rows of `T` matching `predicate`; `None` deletes them all.
    pub fn delete<T: Entity>(&self, predicate: Option<&str>, args: &[Value]) -> Result<u64> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let descriptor = state.cache.get::<T>()?;
        let lease = state.leases.acquire(&mut state.cache)?;

        let sql = sql::delete(descriptor.table_name(), predicate);
        let tx = lease.begin()?;
        let deleted = tx.execute(&sql, args)?;
        tx.commit()?;
        tracing::debug!(table = %descriptor.table_name(), deleted, "Deleted rows");
        Ok(deleted)
    }

    pub fn delete_by_key<T: Entity>(&self, key: i64) -> Result<u64> {
        let (predicate, args) = sql::key_predicate(key);
        self.delete::<T>(Some(&predicate), &args)
    }

    /// Run raw statements in one transaction.
    pub fn execute(&self, statements: &[&str]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let lease = state.leases.acquire(&mut state.cache)?;

        let tx = lease.begin()?;
        for statement in statements {
            tx.execute_raw(statement)?;
        }
        tx.commit()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Count the rows of `T` matching `predicate`.
    pub fn query_count<T: Entity>(&self, predicate: Option<&str>, args: &[Value]) -> Result<i64> {
        self.with_table::<T, _>(|conn, table| {
            let rows = conn.query(&sql::count(table, predicate), args)?;
            Ok(first_i64(&rows).unwrap_or(0))
        })
    }

    /// Key of the first row matching `predicate`, or [`NO_ROW`].
    pub fn query_primary_key<T: Entity>(
        &self,
        predicate: Option<&str>,
        args: &[Value],
    ) -> Result<i64> {
        let predicate =
            sql::predicate(predicate).ok_or(Error::MissingPredicate("query_primary_key"))?;
        self.with_table::<T, _>(|conn, table| {
            let rows = conn.query(&sql::primary_key(table, predicate), args)?;
            Ok(first_i64(&rows).unwrap_or(NO_ROW))
        })
    }

    /// First row of `T` matching `predicate`.
    pub fn query<T: Entity>(&self, predicate: Option<&str>, args: &[Value]) -> Result<Option<T>> {
        let options = QueryOptions::new().limit("1");
        let mut found = self.query_list::<T>(predicate, args, &options)?;
        Ok(found.pop())
    }

    pub fn query_by_key<T: Entity>(&self, key: i64) -> Result<Option<T>> {
        let (predicate, args) = sql::key_predicate(key);
        self.query::<T>(Some(&predicate), &args)
    }

    /// Run raw SQL and build an entity from its first row.
    pub fn query_sql<T: Entity>(&self, sql: &str, args: &[Value]) -> Result<Option<T>> {
        self.with_descriptor::<T, _>(|conn, descriptor| {
            conn.query(sql, args)?
                .first()
                .map(|row| from_row(descriptor, row))
                .transpose()
        })
    }

    /// Run raw SQL and build an entity from every row.
    pub fn query_sql_list<T: Entity>(&self, sql: &str, args: &[Value]) -> Result<Vec<T>> {
        self.with_descriptor::<T, _>(|conn, descriptor| {
            conn.query(sql, args)?
                .iter()
                .map(|row| from_row(descriptor, row))
                .collect()
        })
    }

    /// Rows of `T` matching `predicate`, shaped by `options`.
    pub fn query_list<T: Entity>(
        &self,
        predicate: Option<&str>,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<Vec<T>> {
        self.with_descriptor::<T, _>(|conn, descriptor| {
            let sql = sql::select(descriptor.table_name(), predicate, options);
            conn.query(&sql, args)?
                .iter()
                .map(|row| from_row(descriptor, row))
                .collect()
        })
    }

    /// One page of rows of `T`; pages are numbered from 1.
    pub fn query_page<T: Entity>(
        &self,
        predicate: Option<&str>,
        page_number: u32,
        page_size: u32,
        args: &[Value],
    ) -> Result<Vec<T>> {
        self.query_list::<T>(predicate, args, &QueryOptions::page(page_number, page_size))
    }

    /// Run raw SQL and return its first row as a column map.
    ///
    /// Integers come back as `BigInt`, reals as `Double`, text as `Text` and
    /// blobs as `Bytes`; NULL cells are `Null`.
    pub fn query_map(&self, sql: &str, args: &[Value]) -> Result<Option<Row>> {
        Ok(self.query_map_list(sql, args)?.into_iter().next())
    }

    /// Like [`query_map`](Self::query_map), for every row.
    pub fn query_map_list(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let lease = state.leases.acquire(&mut state.cache)?;
        lease.query_generic(sql, args)
    }

    // ------------------------------------------------------------------

    fn with_descriptor<T, R>(
        &self,
        f: impl FnOnce(&SqliteConnection, &EntityDescriptor<T>) -> Result<R>,
    ) -> Result<R>
    where
        T: Entity,
    {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let descriptor = state.cache.get::<T>()?;
        let lease = state.leases.acquire(&mut state.cache)?;
        f(lease.connection(), &*descriptor)
    }

    fn with_table<T, R>(&self, f: impl FnOnce(&SqliteConnection, &str) -> Result<R>) -> Result<R>
    where
        T: Entity,
    {
        self.with_descriptor::<T, _>(|conn, descriptor| f(conn, descriptor.table_name()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ProxyState>> {
        self.state.lock().map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Poisoned,
                message: "DbProxy lock poisoned".to_string(),
                source: None,
            })
        })
    }
}

impl std::fmt::Debug for DbProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state.lock() {
            Ok(state) => f
                .debug_struct("DbProxy")
                .field("cache", &state.cache)
                .field("leases", &state.leases)
                .finish(),
            Err(_) => f.debug_struct("DbProxy").finish_non_exhaustive(),
        }
    }
}

fn insert_one<T: Entity>(
    conn: &SqliteConnection,
    descriptor: &EntityDescriptor<T>,
    entity: &mut T,
) -> Result<i64> {
    let Some(row) = to_insert_row(descriptor, Some(&*entity)) else {
        return Ok(NO_ROW);
    };
    let (sql, params) = sql::insert(descriptor.table_name(), &row);

    let tx = conn.begin()?;
    let key = tx.insert(&sql, &params)?;
    tx.commit()?;

    entity.set_primary_key(key);
    tracing::debug!(table = %descriptor.table_name(), key, "Inserted row");
    Ok(key)
}

fn update_one<T: Entity>(
    conn: &SqliteConnection,
    descriptor: &EntityDescriptor<T>,
    entity: &T,
    predicate: &str,
    args: &[Value],
) -> Result<i64> {
    let Some(row) = to_update_row(descriptor, Some(entity)) else {
        return Ok(NO_ROW);
    };
    let (sql, params) = sql::update(descriptor.table_name(), &row, predicate, args);

    let tx = conn.begin()?;
    let changed = tx.execute(&sql, &params)?;
    tx.commit()?;

    tracing::debug!(table = %descriptor.table_name(), changed, "Updated rows");
    // SQLite counts changes in a C int, so the count always fits.
    Ok(i64::try_from(changed).unwrap_or(i64::MAX))
}

fn first_i64(rows: &[Row]) -> Option<i64> {
    rows.first()?.get(0)?.as_i64()
}
