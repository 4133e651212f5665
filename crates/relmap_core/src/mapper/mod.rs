//! Per-entity-type storage adapters and their registry.

mod erased;
mod registry;

pub use erased::RowMapper;
pub use registry::MapperRegistry;

pub(crate) use erased::TypedRows;

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::query::QueryRule;

/// Storage adapter for one entity type.
///
/// A mapper translates rules to native queries and entities to rows. It is
/// stateless aside from its handle on the backend connection, so all
/// transaction control stays with the [`Connection`](crate::Connection)
/// shared by the database.
pub trait Mapper<E: Entity>: Send + Sync {
    /// Returns every stored entity matching the rules.
    fn find(&self, rules: &[QueryRule]) -> CoreResult<Vec<E>>;

    /// Counts stored entities matching the rules.
    fn count(&self, rules: &[QueryRule]) -> CoreResult<usize>;

    /// Inserts entities, writing backend-assigned identities back into them.
    fn add(&self, entities: &mut [E]) -> CoreResult<usize>;

    /// Updates stored entities, matched by identity.
    fn update(&self, entities: &[E]) -> CoreResult<usize>;

    /// Deletes stored entities, matched by identity.
    fn remove(&self, entities: &[E]) -> CoreResult<usize>;

    /// Creates a new empty entity.
    fn create(&self) -> E {
        E::default()
    }
}

pub(crate) fn add_batched<E: Entity>(
    mapper: &dyn Mapper<E>,
    entities: &mut [E],
    batch_size: usize,
) -> CoreResult<usize> {
    let mut total = 0;
    for chunk in entities.chunks_mut(batch_size) {
        total += mapper.add(chunk)?;
    }
    Ok(total)
}

pub(crate) fn update_batched<E: Entity>(
    mapper: &dyn Mapper<E>,
    entities: &[E],
    batch_size: usize,
) -> CoreResult<usize> {
    let mut total = 0;
    for chunk in entities.chunks(batch_size) {
        total += mapper.update(chunk)?;
    }
    Ok(total)
}

pub(crate) fn remove_batched<E: Entity>(
    mapper: &dyn Mapper<E>,
    entities: &[E],
    batch_size: usize,
) -> CoreResult<usize> {
    let mut total = 0;
    for chunk in entities.chunks(batch_size) {
        total += mapper.remove(chunk)?;
    }
    Ok(total)
}
