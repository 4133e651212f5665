//! Registry of mappers keyed by entity kind.

use crate::entity::{Entity, EntityKind};
use crate::error::{CoreError, CoreResult};
use crate::mapper::{Mapper, RowMapper, TypedRows};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Registration {
    /// `Arc<dyn Mapper<E>>` for the registered entity type.
    typed: Box<dyn Any + Send + Sync>,
    rows: Arc<dyn RowMapper>,
}

/// Maps entity kinds to their storage adapters.
///
/// Populated once while a database is built, read-only afterwards.
#[derive(Default)]
pub struct MapperRegistry {
    entries: BTreeMap<EntityKind, Registration>,
}

impl MapperRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the mapper for `E`, replacing any previous registration.
    pub fn register<E: Entity>(&mut self, mapper: Arc<dyn Mapper<E>>) {
        let kind = E::kind();
        let rows: Arc<dyn RowMapper> = Arc::new(TypedRows::new(Arc::clone(&mapper)));
        let previous = self.entries.insert(
            kind,
            Registration {
                typed: Box::new(mapper),
                rows,
            },
        );
        if previous.is_some() {
            tracing::warn!(%kind, "replaced existing mapper registration");
        } else {
            tracing::debug!(%kind, "registered mapper");
        }
    }

    /// Resolves the mapper for `E`.
    ///
    /// # Errors
    ///
    /// Returns `MapperNotFound` if no mapper is registered for `E`'s kind.
    pub fn resolve<E: Entity>(&self) -> CoreResult<Arc<dyn Mapper<E>>> {
        self.resolve_kind::<E>(E::kind())
    }

    /// Resolves the mapper from the kind tag of the batch's first entity.
    ///
    /// # Errors
    ///
    /// Returns `EmptyBatch` for an empty batch and `MapperNotFound` when the
    /// kind is not registered.
    pub fn resolve_batch<E: Entity>(&self, entities: &[E]) -> CoreResult<Arc<dyn Mapper<E>>> {
        let first = entities.first().ok_or(CoreError::EmptyBatch)?;
        self.resolve_kind::<E>(first.entity_kind())
    }

    /// Resolves the row-level mapper for a kind.
    pub fn resolve_rows(&self, kind: EntityKind) -> CoreResult<Arc<dyn RowMapper>> {
        self.entries
            .get(&kind)
            .map(|r| Arc::clone(&r.rows))
            .ok_or_else(|| CoreError::mapper_not_found(kind))
    }

    fn resolve_kind<E: Entity>(&self, kind: EntityKind) -> CoreResult<Arc<dyn Mapper<E>>> {
        self.entries
            .get(&kind)
            .and_then(|r| r.typed.downcast_ref::<Arc<dyn Mapper<E>>>())
            .map(Arc::clone)
            .ok_or_else(|| CoreError::mapper_not_found(kind))
    }

    /// Checks whether a kind is registered.
    #[must_use]
    pub fn contains(&self, kind: EntityKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Registered kinds, in name order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.entries.keys().copied().collect()
    }

    /// Number of registered mappers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
