//! Existence lookup: which candidate keys are already stored.
//!
//! A single key field becomes one `IN` rule per batch. A composite key has
//! no such shortcut and becomes a disjunction of per-candidate groups,
//! `(k1 = a AND k2 = b) OR (k1 = c AND k2 = d) ...`, whose evaluation cost
//! grows with both the batch size and the number of key fields. Prefer a
//! single-field key where the data model allows one.

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::mapper::Mapper;
use crate::query::QueryRule;
use crate::reconcile::key::CompositeKey;

/// Fetches every stored entity whose key matches one of `keys`.
pub(crate) fn find_existing<E: Entity>(
    mapper: &dyn Mapper<E>,
    key_fields: &[&str],
    keys: &[&CompositeKey],
    batch_size: usize,
) -> CoreResult<Vec<E>> {
    let mut found = Vec::new();
    for chunk in keys.chunks(batch_size) {
        let rules = if let [field] = key_fields {
            single_key_rules(field, chunk)?
        } else {
            composite_key_rules(key_fields, chunk)
        };
        found.extend(mapper.find(&rules)?);
    }
    tracing::debug!(
        kind = %E::kind(),
        candidates = keys.len(),
        found = found.len(),
        "existence lookup"
    );
    Ok(found)
}

fn single_key_rules(field: &str, keys: &[&CompositeKey]) -> CoreResult<Vec<QueryRule>> {
    let values = keys.iter().flat_map(|k| k.values().iter().cloned()).collect();
    Ok(vec![QueryRule::is_in(field, values)?])
}

fn composite_key_rules(fields: &[&str], keys: &[&CompositeKey]) -> Vec<QueryRule> {
    let mut rules = Vec::with_capacity(keys.len() * 2);
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            rules.push(QueryRule::or());
        }
        let group = fields
            .iter()
            .zip(key.values())
            .map(|(field, value)| QueryRule::equals(*field, value.clone()))
            .collect();
        rules.push(QueryRule::nested(group));
    }
    rules
}
