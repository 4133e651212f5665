//! Test fixtures and database helpers.
//!
//! Provides sample entity types, a database pre-wired with mappers for all
//! of them, and a mapper wrapper that counts calls and injects failures.

use relmap_core::{
    Config, CoreError, CoreResult, Database, Entity, EntitySchema, Mapper, QueryRule, Value,
};
use relmap_storage::{MemoryMapper, MemoryStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A person, labelled by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    /// Identity.
    pub id: Option<i64>,
    /// Label field.
    pub name: Option<String>,
    /// Age in years.
    pub age: Option<i64>,
    /// Free-form tags (a multi-valued field).
    pub tags: Vec<String>,
}

const PERSON: EntitySchema =
    EntitySchema::new("Person", &["id", "name", "age", "tags"], "id", &["name"]);

impl Person {
    /// A person with a name and age.
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            name: Some(name.into()),
            age: Some(age),
            ..Self::default()
        }
    }
}

impl Entity for Person {
    fn schema() -> &'static EntitySchema {
        &PERSON
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "id" => self.id.into(),
            "name" => self.name.clone().into(),
            "age" => self.age.into(),
            "tags" => self.tags.clone().into(),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> CoreResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "name" => self.name = value.into_typed()?,
            "age" => self.age = value.into_typed()?,
            "tags" => self.tags = value.into_typed()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
}

/// An investigation grouping samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Investigation {
    /// Identity.
    pub id: Option<i64>,
    /// Label field.
    pub name: Option<String>,
}

const INVESTIGATION: EntitySchema =
    EntitySchema::new("Investigation", &["id", "name"], "id", &["name"]);

impl Investigation {
    /// An investigation with a name.
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }
}

impl Entity for Investigation {
    fn schema() -> &'static EntitySchema {
        &INVESTIGATION
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "id" => self.id.into(),
            "name" => self.name.clone().into(),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> CoreResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "name" => self.name = value.into_typed()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
}

/// A sample identified by `(investigation, name)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    /// Identity.
    pub id: Option<i64>,
    /// Owning investigation name; label field.
    pub investigation: Option<String>,
    /// Sample name; label field.
    pub name: Option<String>,
    /// An optional measurement.
    pub extra: Option<i64>,
}

const SAMPLE: EntitySchema = EntitySchema::new(
    "Sample",
    &["id", "investigation", "name", "extra"],
    "id",
    &["investigation", "name"],
);

impl Sample {
    /// A sample with no measurement.
    pub fn new(investigation: &str, name: &str) -> Self {
        Self {
            investigation: Some(investigation.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets the measurement.
    #[must_use]
    pub fn with_extra(mut self, extra: i64) -> Self {
        self.extra = Some(extra);
        self
    }
}

impl Entity for Sample {
    fn schema() -> &'static EntitySchema {
        &SAMPLE
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "id" => self.id.into(),
            "investigation" => self.investigation.clone().into(),
            "name" => self.name.clone().into(),
            "extra" => self.extra.into(),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> CoreResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "investigation" => self.investigation = value.into_typed()?,
            "name" => self.name = value.into_typed()?,
            "extra" => self.extra = value.into_typed()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
}

/// A tag with no label fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    /// Identity.
    pub id: Option<i64>,
    /// Natural key.
    pub code: Option<String>,
    /// Description.
    pub note: Option<String>,
}

const TAG: EntitySchema = EntitySchema::new("Tag", &["id", "code", "note"], "id", &[]);

impl Tag {
    /// A tag with a code and note.
    pub fn new(code: &str, note: &str) -> Self {
        Self {
            id: None,
            code: Some(code.into()),
            note: Some(note.into()),
        }
    }
}

impl Entity for Tag {
    fn schema() -> &'static EntitySchema {
        &TAG
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "id" => self.id.into(),
            "code" => self.code.clone().into(),
            "note" => self.note.clone().into(),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> CoreResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "code" => self.code = value.into_typed()?,
            "note" => self.note = value.into_typed()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
}

/// Counts mapper calls and fails chosen writes.
///
/// Write calls (`add`, `update`, `remove`) are numbered from 1 in the order
/// they reach the mapper. A write whose number is scheduled to fail returns
/// a backend error without touching storage.
pub struct FlakyMapper<E> {
    inner: Arc<dyn Mapper<E>>,
    fail_on_write: Option<usize>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<E: Entity> FlakyMapper<E> {
    /// Wraps a mapper without scheduling failures.
    pub fn new(inner: Arc<dyn Mapper<E>>) -> Self {
        Self {
            inner,
            fail_on_write: None,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Fails the `n`th write call.
    #[must_use]
    pub fn failing_write(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    /// Number of `find` and `count` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write calls so far, including failed ones.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total number of calls so far.
    pub fn calls(&self) -> usize {
        self.reads() + self.writes()
    }

    fn write(&self, op: &str) -> CoreResult<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_write == Some(n) {
            tracing::debug!(op, n, "injected write failure");
            return Err(CoreError::backend(format!("injected failure on {op} #{n}")));
        }
        Ok(())
    }
}

impl<E: Entity> Mapper<E> for FlakyMapper<E> {
    fn find(&self, rules: &[QueryRule]) -> CoreResult<Vec<E>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find(rules)
    }

    fn count(&self, rules: &[QueryRule]) -> CoreResult<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.count(rules)
    }

    fn add(&self, entities: &mut [E]) -> CoreResult<usize> {
        self.write("add")?;
        self.inner.add(entities)
    }

    fn update(&self, entities: &[E]) -> CoreResult<usize> {
        self.write("update")?;
        self.inner.update(entities)
    }

    fn remove(&self, entities: &[E]) -> CoreResult<usize> {
        self.write("remove")?;
        self.inner.remove(entities)
    }
}

/// A database over a fresh [`MemoryStore`] with mappers for every fixture type.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    store: Arc<MemoryStore>,
}

impl TestDatabase {
    /// Creates a test database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a test database with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let store = MemoryStore::shared();
        let samples = MemoryMapper::shared(&store);
        Self::assemble(store, config, samples)
    }

    fn assemble(
        store: Arc<MemoryStore>,
        config: Config,
        samples: Arc<dyn Mapper<Sample>>,
    ) -> Self {
        let db = Database::builder(store.clone())
            .config(config)
            .mapper::<Person>(MemoryMapper::shared(&store))
            .mapper::<Investigation>(MemoryMapper::shared(&store))
            .mapper::<Sample>(samples)
            .mapper::<Tag>(MemoryMapper::shared(&store))
            .build()
            .expect("Failed to build test database");
        Self { db, store }
    }

    /// Creates a test database whose `Sample` mapper is wrapped by `wrap`.
    ///
    /// Returns the database and the wrapper so tests can inspect it.
    pub fn with_sample_mapper<M, F>(config: Config, wrap: F) -> (Self, Arc<M>)
    where
        M: Mapper<Sample> + 'static,
        F: FnOnce(Arc<dyn Mapper<Sample>>) -> M,
    {
        let store = MemoryStore::shared();
        let wrapper = Arc::new(wrap(MemoryMapper::shared(&store)));
        let mapper: Arc<dyn Mapper<Sample>> = wrapper.clone();
        (Self::assemble(store, config, mapper), wrapper)
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a fresh test database.
///
/// # Example
///
/// ```rust
/// use relmap_testkit::{with_test_db, Sample};
///
/// with_test_db(|db| {
///     let mut batch = vec![Sample::new("A", "x")];
///     db.add(&mut batch).unwrap();
///     assert_eq!(db.count::<Sample>(&[]).unwrap(), 1);
/// });
/// ```
pub fn with_test_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::new();
    f(&test_db.db)
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, once per process.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Two investigations with two samples each: `A/x`, `A/y`, `B/x`, `B/z`.
    pub fn populated_database() -> TestDatabase {
        let test_db = TestDatabase::new();
        let mut investigations = vec![Investigation::new("A"), Investigation::new("B")];
        test_db
            .add(&mut investigations)
            .expect("Failed to add investigations");
        let mut samples = vec![
            Sample::new("A", "x").with_extra(1),
            Sample::new("A", "y").with_extra(2),
            Sample::new("B", "x").with_extra(3),
            Sample::new("B", "z").with_extra(4),
        ];
        test_db.add(&mut samples).expect("Failed to add samples");
        test_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_registers_all_fixtures() {
        let test_db = TestDatabase::new();
        let kinds: Vec<&str> = test_db.entity_kinds().iter().map(|k| k.name()).collect();
        assert_eq!(kinds, vec!["Investigation", "Person", "Sample", "Tag"]);
    }

    #[test]
    fn flaky_mapper_fails_scheduled_write() {
        let (test_db, flaky) = TestDatabase::with_sample_mapper(Config::default(), |m| {
            FlakyMapper::new(m).failing_write(2)
        });
        test_db.add(&mut [Sample::new("A", "x")]).unwrap();
        assert!(test_db.add(&mut [Sample::new("A", "y")]).is_err());
        assert_eq!(flaky.writes(), 2);
        assert_eq!(test_db.store().table_len("Sample"), 1);
    }

    #[test]
    fn populated_scenario() {
        let test_db = scenarios::populated_database();
        assert_eq!(test_db.count::<Sample>(&[]).unwrap(), 4);
        assert_eq!(test_db.count::<Investigation>(&[]).unwrap(), 2);
    }

    #[test]
    fn list_fields_survive_storage() {
        with_test_db(|db| {
            let mut person = Person::new("ada", 36);
            person.tags = vec!["math".into(), "engines".into()];
            db.add_one(&mut person).unwrap();
            let found: Option<Person> = db.find_by_id(person.id).unwrap();
            assert_eq!(found, Some(person));
        });
    }
}
