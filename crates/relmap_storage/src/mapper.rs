//! Entity mappers over a [`MemoryStore`].

use crate::store::MemoryStore;
use relmap_core::{CoreResult, Entity, Mapper, QueryRule, Row};
use std::marker::PhantomData;
use std::sync::Arc;

/// Maps one entity type onto the table named after its kind.
///
/// The mapper holds no state besides its handle on the store, so the same
/// store can back any number of mappers and serve as the database
/// connection at the same time.
pub struct MemoryMapper<E> {
    store: Arc<MemoryStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> MemoryMapper<E> {
    /// Creates a mapper over `store`.
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Creates a mapper ready to be registered with a database.
    #[must_use]
    pub fn shared(store: &Arc<MemoryStore>) -> Arc<dyn Mapper<E>> {
        Arc::new(Self::new(Arc::clone(store)))
    }

    /// The backing table.
    pub fn table(&self) -> &'static str {
        E::kind().name()
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl<E: Entity> Mapper<E> for MemoryMapper<E> {
    fn find(&self, rules: &[QueryRule]) -> CoreResult<Vec<E>> {
        self.store
            .select(self.table(), rules)
            .iter()
            .map(E::from_row)
            .collect()
    }

    fn count(&self, rules: &[QueryRule]) -> CoreResult<usize> {
        Ok(self.store.count(self.table(), rules))
    }

    fn add(&self, entities: &mut [E]) -> CoreResult<usize> {
        let id_field = E::schema().id_field();
        let mut rows: Vec<Row> = entities.iter().map(Entity::to_row).collect();
        let added = self.store.insert(self.table(), id_field, &mut rows)?;
        for (entity, row) in entities.iter_mut().zip(&rows) {
            entity.set(id_field, row.get(id_field).clone())?;
        }
        tracing::trace!(table = self.table(), added, "rows inserted");
        Ok(added)
    }

    fn update(&self, entities: &[E]) -> CoreResult<usize> {
        let rows: Vec<Row> = entities.iter().map(Entity::to_row).collect();
        Ok(self
            .store
            .update(self.table(), E::schema().id_field(), &rows)?)
    }

    fn remove(&self, entities: &[E]) -> CoreResult<usize> {
        let rows: Vec<Row> = entities.iter().map(Entity::to_row).collect();
        Ok(self
            .store
            .delete(self.table(), E::schema().id_field(), &rows)?)
    }
}

impl<E> std::fmt::Debug for MemoryMapper<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMapper")
            .field("entity", &std::any::type_name::<E>())
            .finish_non_exhaustive()
    }
}
