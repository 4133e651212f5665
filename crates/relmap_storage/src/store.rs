//! In-memory transactional table store.

use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use relmap_core::query::eval;
use relmap_core::{Connection, CoreResult, QueryRule, Row, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One table: rows in insertion order plus its id sequence and constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Table {
    pub(crate) rows: Vec<Row>,
    pub(crate) next_id: i64,
    #[serde(default)]
    pub(crate) id_field: String,
    #[serde(default)]
    pub(crate) unique: Vec<Vec<String>>,
}

impl Table {
    fn position(&self, id_field: &str, id: &Value) -> Option<usize> {
        self.rows.iter().position(|r| r.get(id_field) == id)
    }

    /// Fails if `row` repeats a unique tuple of any row other than `skip`.
    fn check_unique(&self, name: &str, row: &Row, skip: Option<usize>) -> StorageResult<()> {
        for fields in &self.unique {
            let values: Vec<&Value> = fields.iter().map(|f| row.get(f)).collect();
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            let clash = self.rows.iter().enumerate().any(|(i, other)| {
                Some(i) != skip
                    && fields
                        .iter()
                        .zip(&values)
                        .all(|(f, v)| other.get(f).loosely_equals(v))
            });
            if clash {
                return Err(StorageError::ConstraintViolation {
                    table: name.to_string(),
                    fields: fields.clone(),
                    values: values
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(";"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    /// Committed tables while a transaction is open.
    snapshot: Option<BTreeMap<String, Table>>,
}

/// A set of named tables of [`Row`]s with snapshot transactions.
///
/// Every write call is atomic on its own: it either applies to all given
/// rows or to none. Between [`MemoryStore::begin`] and
/// [`MemoryStore::commit`] writes are visible to readers of this store but
/// [`MemoryStore::rollback`] restores the state captured at `begin`.
///
/// # Thread Safety
///
/// The store is thread-safe and is usually shared as `Arc<MemoryStore>`
/// between the database (as its [`Connection`]) and its mappers.
///
/// # Example
///
/// ```rust
/// use relmap_core::{Row, Value};
/// use relmap_storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// let mut rows = vec![Row::new().with("name", "x")];
/// store.insert("Sample", "id", &mut rows).unwrap();
/// assert_eq!(rows[0].get("id"), &Value::Int(1));
/// assert_eq!(store.table_len("Sample"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store ready to be shared.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub(crate) fn from_tables(tables: BTreeMap<String, Table>) -> Self {
        Self {
            state: RwLock::new(State {
                tables,
                snapshot: None,
            }),
        }
    }

    /// Committed tables: the snapshot while a transaction is open.
    pub(crate) fn committed_tables(&self) -> BTreeMap<String, Table> {
        let state = self.state.read();
        state.snapshot.as_ref().unwrap_or(&state.tables).clone()
    }

    /// Declares that no two rows of `table` may share values for `fields`.
    /// Rows with a null in any of the fields are exempt.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if existing rows already clash.
    pub fn add_unique_constraint(&self, table: &str, fields: &[&str]) -> StorageResult<()> {
        let mut state = self.state.write();
        let entry = state.tables.entry(table.to_string()).or_default();
        let fields: Vec<String> = fields.iter().map(|f| (*f).to_string()).collect();
        let mut candidate = Table {
            unique: vec![fields.clone()],
            ..Table::default()
        };
        for row in &entry.rows {
            candidate.check_unique(table, row, None)?;
            candidate.rows.push(row.clone());
        }
        if !entry.unique.contains(&fields) {
            entry.unique.push(fields);
        }
        tracing::debug!(table, "unique constraint added");
        Ok(())
    }

    /// Inserts rows. A null identity is assigned from the table's sequence
    /// and written back into the row.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` or `ConstraintViolation`; nothing is inserted then.
    pub fn insert(&self, table: &str, id_field: &str, rows: &mut [Row]) -> StorageResult<usize> {
        let mut state = self.state.write();
        let mut staged = state.tables.get(table).cloned().unwrap_or_default();
        if staged.id_field.is_empty() {
            staged.id_field = id_field.to_string();
        }
        for row in rows.iter_mut() {
            match row.get(id_field) {
                Value::Null => {
                    staged.next_id += 1;
                    row.set(id_field, staged.next_id);
                }
                Value::Int(n) => staged.next_id = staged.next_id.max(*n),
                _ => {}
            }
            let id = row.get(id_field);
            if staged.position(id_field, id).is_some() {
                return Err(StorageError::DuplicateId {
                    table: table.to_string(),
                    id: id.to_string(),
                });
            }
            staged.check_unique(table, row, None)?;
            staged.rows.push(row.clone());
        }
        state.tables.insert(table.to_string(), staged);
        Ok(rows.len())
    }

    /// Replaces stored rows matched by identity. Rows with no stored
    /// counterpart are not counted.
    ///
    /// # Errors
    ///
    /// Returns `MissingId` or `ConstraintViolation`; nothing is updated then.
    pub fn update(&self, table: &str, id_field: &str, rows: &[Row]) -> StorageResult<usize> {
        let mut state = self.state.write();
        let Some(current) = state.tables.get(table) else {
            return Ok(0);
        };
        let mut staged = current.clone();
        let mut updated = 0;
        for row in rows {
            let id = Self::require_id(table, id_field, row)?;
            if let Some(i) = staged.position(id_field, id) {
                staged.check_unique(table, row, Some(i))?;
                staged.rows[i] = row.clone();
                updated += 1;
            }
        }
        state.tables.insert(table.to_string(), staged);
        Ok(updated)
    }

    /// Deletes stored rows matched by identity.
    ///
    /// # Errors
    ///
    /// Returns `MissingId`; nothing is deleted then.
    pub fn delete(&self, table: &str, id_field: &str, rows: &[Row]) -> StorageResult<usize> {
        let mut state = self.state.write();
        let Some(staged) = state.tables.get_mut(table) else {
            return Ok(0);
        };
        let ids = rows
            .iter()
            .map(|row| Self::require_id(table, id_field, row))
            .collect::<StorageResult<Vec<_>>>()?;
        let before = staged.rows.len();
        staged
            .rows
            .retain(|r| !ids.iter().any(|id| r.get(id_field) == *id));
        Ok(before - staged.rows.len())
    }

    /// Rows matching the rules, sorted and paged as they request.
    pub fn select(&self, table: &str, rules: &[QueryRule]) -> Vec<Row> {
        let state = self.state.read();
        match state.tables.get(table) {
            Some(t) => eval::select(t.rows.iter().cloned(), rules),
            None => Vec::new(),
        }
    }

    /// Number of rows matching the rules.
    pub fn count(&self, table: &str, rules: &[QueryRule]) -> usize {
        let state = self.state.read();
        state
            .tables
            .get(table)
            .map_or(0, |t| eval::count(&t.rows, rules))
    }

    /// Number of rows in a table.
    pub fn table_len(&self, table: &str) -> usize {
        self.state.read().tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Names of all tables.
    pub fn tables(&self) -> Vec<String> {
        self.state.read().tables.keys().cloned().collect()
    }

    /// Checks whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.state.read().snapshot.is_some()
    }

    /// Captures the current state for a later rollback.
    pub fn begin(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.snapshot.is_some() {
            return Err(StorageError::TransactionOpen);
        }
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    /// Keeps the changes made since `begin`.
    pub fn commit(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        state
            .snapshot
            .take()
            .map(|_| ())
            .ok_or(StorageError::NoTransaction)
    }

    /// Restores the state captured at `begin`.
    pub fn rollback(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        let snapshot = state.snapshot.take().ok_or(StorageError::NoTransaction)?;
        state.tables = snapshot;
        Ok(())
    }

    fn require_id<'r>(table: &str, id_field: &str, row: &'r Row) -> StorageResult<&'r Value> {
        let id = row.get(id_field);
        if id.is_null() {
            return Err(StorageError::MissingId {
                table: table.to_string(),
                id_field: id_field.to_string(),
            });
        }
        Ok(id)
    }
}

impl Connection for MemoryStore {
    fn begin(&self) -> CoreResult<()> {
        Ok(MemoryStore::begin(self)?)
    }

    fn commit(&self) -> CoreResult<()> {
        Ok(MemoryStore::commit(self)?)
    }

    fn rollback(&self) -> CoreResult<()> {
        Ok(MemoryStore::rollback(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(name: &str) -> Row {
        Row::new().with("name", name)
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let mut rows = vec![row("a"), row("b")];
        assert_eq!(store.insert("T", "id", &mut rows).unwrap(), 2);
        assert_eq!(rows[0].get("id"), &Value::Int(1));
        assert_eq!(rows[1].get("id"), &Value::Int(2));

        let mut explicit = vec![row("c").with("id", 10i64), row("d")];
        store.insert("T", "id", &mut explicit).unwrap();
        assert_eq!(explicit[1].get("id"), &Value::Int(11));
    }

    #[test]
    fn duplicate_id_rejects_whole_batch() {
        let store = MemoryStore::new();
        store
            .insert("T", "id", &mut [row("a").with("id", 1i64)])
            .unwrap();
        let mut rows = vec![row("b"), row("c").with("id", 1i64)];
        let err = store.insert("T", "id", &mut rows).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId { .. }));
        assert_eq!(store.table_len("T"), 1);
    }

    #[test]
    fn unique_constraint_is_enforced() {
        let store = MemoryStore::new();
        store.add_unique_constraint("T", &["name"]).unwrap();
        store.insert("T", "id", &mut [row("a")]).unwrap();
        let err = store.insert("T", "id", &mut [row("a")]).unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation { .. }));
        // nulls are exempt
        store
            .insert("T", "id", &mut [Row::new(), Row::new()])
            .unwrap();
        assert_eq!(store.table_len("T"), 3);
    }

    #[test]
    fn existing_clash_blocks_new_constraint() {
        let store = MemoryStore::new();
        store.insert("T", "id", &mut [row("a"), row("a")]).unwrap();
        assert!(store.add_unique_constraint("T", &["name"]).is_err());
    }

    #[test]
    fn update_and_delete_by_id() {
        let store = MemoryStore::new();
        let mut rows = vec![row("a"), row("b")];
        store.insert("T", "id", &mut rows).unwrap();

        let changed = rows[0].clone().with("name", "z");
        let missing = row("q").with("id", 99i64);
        assert_eq!(store.update("T", "id", &[changed, missing]).unwrap(), 1);
        assert_eq!(store.select("T", &[QueryRule::equals("name", "z")]).len(), 1);

        let err = store.delete("T", "id", &[row("no-id")]).unwrap_err();
        assert!(matches!(err, StorageError::MissingId { .. }));
        assert_eq!(store.delete("T", "id", &rows[1..]).unwrap(), 1);
        assert_eq!(store.table_len("T"), 1);
    }

    #[test]
    fn rollback_restores_snapshot() {
        let store = MemoryStore::new();
        store.insert("T", "id", &mut [row("a")]).unwrap();
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(StorageError::TransactionOpen)));
        store.insert("T", "id", &mut [row("b")]).unwrap();
        assert_eq!(store.table_len("T"), 2);
        store.rollback().unwrap();
        assert_eq!(store.table_len("T"), 1);
        assert!(matches!(store.commit(), Err(StorageError::NoTransaction)));
    }

    #[test]
    fn count_and_select_follow_rules() {
        let store = MemoryStore::new();
        store
            .insert("T", "id", &mut [row("a"), row("b"), row("c")])
            .unwrap();
        let rules = [QueryRule::sort_desc("name"), QueryRule::limit(2)];
        let names: Vec<String> = store
            .select("T", &rules)
            .iter()
            .map(|r| r.get("name").to_string())
            .collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(store.count("T", &rules), 3);
        assert_eq!(store.count("missing", &[]), 0);
        assert_eq!(store.tables(), vec!["T".to_string()]);
    }

    proptest! {
        #[test]
        fn sequence_ids_are_dense_and_distinct(batches in prop::collection::vec(0usize..5, 1..6)) {
            let store = MemoryStore::new();
            let mut ids = Vec::new();
            for size in batches {
                let mut rows = vec![Row::new(); size];
                store.insert("T", "id", &mut rows).unwrap();
                ids.extend(rows.iter().filter_map(|r| r.get("id").as_int()));
            }
            let expected: Vec<i64> = (1..=ids.len() as i64).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
