//! Database facade.

use crate::config::Config;
use crate::entity::{Entity, EntityKind, Value};
use crate::error::{CoreError, CoreResult};
use crate::mapper::{add_batched, remove_batched, update_batched, Mapper, MapperRegistry};
use crate::query::{check_fields, example_rules, JoinQuery, Query, QueryRule};
use crate::reconcile::{DatabaseAction, MergeStrategy, ReconcileReport, Reconciler};
use crate::transaction::{Connection, Transaction, TransactionScope};
use std::sync::Arc;

/// The main database handle.
///
/// `Database` is the entry point for persisting entities. It provides:
/// - Typed finds, counts and queries through the registered mappers
/// - Batched add, update and remove
/// - Key-based reconciliation of bulk entity lists
/// - Joins across entity kinds
/// - Transaction management
///
/// # Building a Database
///
/// ```rust,ignore
/// use relmap_core::{Database, DatabaseAction};
/// use relmap_storage::{MemoryMapper, MemoryStore};
///
/// let store = MemoryStore::shared();
/// let db = Database::builder(store.clone())
///     .mapper::<Sample>(MemoryMapper::shared(&store))
///     .build()?;
///
/// let mut batch = vec![sample("A", "x"), sample("A", "y")];
/// db.reconcile(&mut batch, DatabaseAction::AddUpdateExisting, &["investigation", "name"])?;
/// ```
///
/// # Transactions
///
/// Every list operation runs in a private transaction: it commits on its
/// own when no transaction is active and otherwise joins the active one.
///
/// ```rust,ignore
/// db.transaction(|db| {
///     db.add(&mut investigations)?;
///     db.reconcile(&mut samples, DatabaseAction::Add, &["investigation", "name"])?;
///     Ok(())
/// })?;
/// ```
pub struct Database {
    config: Config,
    registry: MapperRegistry,
    scope: TransactionScope,
}

/// Builder for [`Database`].
pub struct DatabaseBuilder {
    connection: Arc<dyn Connection>,
    config: Config,
    registry: MapperRegistry,
}

impl DatabaseBuilder {
    /// Starts a builder over a backend connection.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            config: Config::default(),
            registry: MapperRegistry::new(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Registers the mapper for `E`.
    #[must_use]
    pub fn mapper<E: Entity>(mut self, mapper: Arc<dyn Mapper<E>>) -> Self {
        self.registry.register::<E>(mapper);
        self
    }

    /// Builds the database.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the configuration is unusable.
    pub fn build(self) -> CoreResult<Database> {
        self.config.validate()?;
        tracing::info!(
            kinds = self.registry.len(),
            batch_size = self.config.batch_size,
            "database ready"
        );
        Ok(Database {
            config: self.config,
            registry: self.registry,
            scope: TransactionScope::new(self.connection),
        })
    }
}

impl Database {
    /// Starts a builder over a backend connection.
    pub fn builder(connection: Arc<dyn Connection>) -> DatabaseBuilder {
        DatabaseBuilder::new(connection)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the mapper registry.
    #[must_use]
    pub fn registry(&self) -> &MapperRegistry {
        &self.registry
    }

    /// Kinds with a registered mapper, in name order.
    pub fn entity_kinds(&self) -> Vec<EntityKind> {
        self.registry.kinds()
    }

    /// Starts a query over `E`.
    pub fn query<E: Entity>(&self) -> CoreResult<Query<E>> {
        Ok(Query::new(self.registry.resolve::<E>()?))
    }

    /// Finds entities matching the rules.
    pub fn find<E: Entity>(&self, rules: &[QueryRule]) -> CoreResult<Vec<E>> {
        check_fields(E::schema(), rules)?;
        self.registry.resolve::<E>()?.find(rules)
    }

    /// Finds entities whose fields equal every set field of `example`.
    pub fn find_by_example<E: Entity>(&self, example: &E) -> CoreResult<Vec<E>> {
        self.find(&example_rules(example))
    }

    /// Finds the entity with the given identity.
    ///
    /// Returns `Ok(None)` when nothing matches.
    pub fn find_by_id<E: Entity>(&self, id: impl Into<Value>) -> CoreResult<Option<E>> {
        let mapper = self.registry.resolve::<E>()?;
        let id_field = mapper.create().id_field();
        Ok(mapper
            .find(&[QueryRule::equals(id_field, id)])?
            .into_iter()
            .next())
    }

    /// Counts entities matching the rules.
    pub fn count<E: Entity>(&self, rules: &[QueryRule]) -> CoreResult<usize> {
        check_fields(E::schema(), rules)?;
        self.registry.resolve::<E>()?.count(rules)
    }

    /// Inserts entities, writing assigned identities back into them.
    pub fn add<E: Entity>(&self, entities: &mut [E]) -> CoreResult<usize> {
        if entities.is_empty() {
            return Ok(0);
        }
        let mapper = self.registry.resolve_batch(entities)?;
        self.run_assigning(entities, |entities| {
            add_batched(mapper.as_ref(), entities, self.config.batch_size)
        })
    }

    /// Inserts one entity.
    pub fn add_one<E: Entity>(&self, entity: &mut E) -> CoreResult<usize> {
        self.add(std::slice::from_mut(entity))
    }

    /// Updates stored entities by identity.
    pub fn update<E: Entity>(&self, entities: &[E]) -> CoreResult<usize> {
        if entities.is_empty() {
            return Ok(0);
        }
        let mapper = self.registry.resolve_batch(entities)?;
        self.scope
            .run_private(|| update_batched(mapper.as_ref(), entities, self.config.batch_size))
    }

    /// Updates one entity.
    pub fn update_one<E: Entity>(&self, entity: &E) -> CoreResult<usize> {
        self.update(std::slice::from_ref(entity))
    }

    /// Deletes stored entities by identity.
    pub fn remove<E: Entity>(&self, entities: &[E]) -> CoreResult<usize> {
        if entities.is_empty() {
            return Ok(0);
        }
        let mapper = self.registry.resolve_batch(entities)?;
        self.scope
            .run_private(|| remove_batched(mapper.as_ref(), entities, self.config.batch_size))
    }

    /// Deletes one entity.
    pub fn remove_one<E: Entity>(&self, entity: &E) -> CoreResult<usize> {
        self.remove(std::slice::from_ref(entity))
    }

    /// Reconciles a batch against storage and returns the number of
    /// affected rows.
    ///
    /// Candidates are matched to stored entities by the composite of
    /// `key_fields`; `action` decides what happens to new and existing ones.
    /// All writes happen in one transaction, and policy violations are
    /// detected before anything is written.
    ///
    /// # Errors
    ///
    /// - `MissingKey` if a candidate has no value for any key field (unless
    ///   adding with the identity field as sole key)
    /// - `DuplicateKey` when `Add` meets stored keys or an add-family batch
    ///   repeats a key
    /// - `MissingEntity` when `Update` or `Remove` meets unknown keys
    /// - `UnconfirmedMerge` when an updating action meets stored entities of
    ///   a type without label fields; see [`Database::reconcile_with`]
    pub fn reconcile<E: Entity>(
        &self,
        entities: &mut [E],
        action: DatabaseAction,
        key_fields: &[&str],
    ) -> CoreResult<usize> {
        self.reconcile_with(entities, action, key_fields, MergeStrategy::default())
            .map(|report| report.affected())
    }

    /// Reconciles with an explicit merge strategy and returns per-class counts.
    pub fn reconcile_with<E: Entity>(
        &self,
        entities: &mut [E],
        action: DatabaseAction,
        key_fields: &[&str],
        strategy: MergeStrategy,
    ) -> CoreResult<ReconcileReport> {
        if entities.is_empty() {
            return Ok(ReconcileReport::default());
        }
        let mapper = self.registry.resolve_batch(entities)?;
        let reconciler = Reconciler::new(mapper.as_ref(), &self.config, strategy);
        self.run_assigning(entities, |entities| {
            reconciler.run(entities, action, key_fields)
        })
    }

    /// Runs a write that may assign identities inside a private transaction.
    ///
    /// If the write fails its rows are rolled back, so identities it gave to
    /// previously unsaved entities are cleared again.
    fn run_assigning<E: Entity, T>(
        &self,
        entities: &mut [E],
        write: impl FnOnce(&mut [E]) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let unsaved: Vec<usize> = entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.id().is_null())
            .map(|(i, _)| i)
            .collect();
        let result = self.scope.run_private(|| write(&mut *entities));
        if result.is_err() {
            for &i in &unsaved {
                let entity = &mut entities[i];
                let id_field = entity.id_field();
                if let Err(err) = entity.set(id_field, Value::Null) {
                    tracing::warn!(kind = %E::kind(), error = %err, "could not clear identity");
                }
            }
        }
        result
    }

    /// Starts a join over the given kinds.
    ///
    /// # Errors
    ///
    /// Returns `MapperNotFound` if any kind has no registered mapper.
    pub fn join(&self, kinds: &[EntityKind]) -> CoreResult<JoinQuery> {
        if kinds.is_empty() {
            return Err(CoreError::invalid_operation("a join needs at least one kind"));
        }
        let sources = kinds
            .iter()
            .map(|kind| self.registry.resolve_rows(*kind))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(JoinQuery::new(sources, self.config.max_join_rows))
    }

    /// Begins an explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionAlreadyActive` if one is already running.
    pub fn begin_transaction(&self) -> CoreResult<Transaction<'_>> {
        let id = self.scope.begin()?;
        Ok(Transaction::new(&self.scope, id))
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed.
    /// If it returns `Err`, the transaction is rolled back.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Self) -> CoreResult<T>,
    {
        let txn = self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Checks whether a transaction is active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.scope.is_active()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("kinds", &self.entity_kinds())
            .field("in_transaction", &self.in_transaction())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
