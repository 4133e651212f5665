//! Row-level view of a typed mapper, used where the entity type is not
//! known statically (joins).

use crate::entity::{Entity, EntityKind, EntitySchema, Row};
use crate::error::CoreResult;
use crate::mapper::Mapper;
use crate::query::QueryRule;
use std::sync::Arc;

/// A mapper seen through rows instead of typed entities.
pub trait RowMapper: Send + Sync {
    /// Kind of the entities this mapper stores.
    fn kind(&self) -> EntityKind;

    /// Schema of the entities this mapper stores.
    fn schema(&self) -> &'static EntitySchema;

    /// Returns matching rows.
    fn find_rows(&self, rules: &[QueryRule]) -> CoreResult<Vec<Row>>;

    /// Counts matching rows.
    fn count_rows(&self, rules: &[QueryRule]) -> CoreResult<usize>;
}

pub(crate) struct TypedRows<E: Entity> {
    mapper: Arc<dyn Mapper<E>>,
}

impl<E: Entity> TypedRows<E> {
    pub(crate) fn new(mapper: Arc<dyn Mapper<E>>) -> Self {
        Self { mapper }
    }
}

impl<E: Entity> RowMapper for TypedRows<E> {
    fn kind(&self) -> EntityKind {
        E::kind()
    }

    fn schema(&self) -> &'static EntitySchema {
        E::schema()
    }

    fn find_rows(&self, rules: &[QueryRule]) -> CoreResult<Vec<Row>> {
        Ok(self
            .mapper
            .find(rules)?
            .iter()
            .map(Entity::to_row)
            .collect())
    }

    fn count_rows(&self, rules: &[QueryRule]) -> CoreResult<usize> {
        self.mapper.count(rules)
    }
}
