//! Predicate rules, typed queries and joins.

mod builder;
pub mod eval;
mod join;
mod rule;

pub use builder::Query;
pub use join::JoinQuery;
pub use rule::{Operator, QueryRule};

use crate::entity::{Entity, EntitySchema, Value};
use crate::error::CoreResult;

/// Fails with `InvalidField` if a rule names a field outside the schema.
pub(crate) fn check_fields(schema: &EntitySchema, rules: &[QueryRule]) -> CoreResult<()> {
    for rule in rules {
        for field in rule.referenced_fields() {
            schema.check_field(field)?;
        }
    }
    Ok(())
}

/// Rules matching every set field of `example`: `EQUALS` for scalars and
/// `IN` for non-empty lists. Unset fields and empty lists add no rule.
pub fn example_rules<E: Entity>(example: &E) -> Vec<QueryRule> {
    let mut rules = Vec::new();
    for field in example.fields() {
        match example.get(field) {
            Value::Null => {}
            Value::List(items) => {
                if let Ok(rule) = QueryRule::is_in(*field, items) {
                    rules.push(rule);
                }
            }
            value => rules.push(QueryRule::equals(*field, value)),
        }
    }
    rules
}
