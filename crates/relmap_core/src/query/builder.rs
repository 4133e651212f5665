//! Typed query builder.

use crate::entity::{Entity, Value};
use crate::error::CoreResult;
use crate::mapper::Mapper;
use crate::query::{check_fields, QueryRule};
use std::sync::Arc;

/// A rule sequence bound to one entity type.
///
/// ```rust,ignore
/// let adults = db
///     .query::<Person>()?
///     .greater_equal("age", 18)
///     .sort_asc("name")
///     .find()?;
/// ```
pub struct Query<E: Entity> {
    mapper: Arc<dyn Mapper<E>>,
    rules: Vec<QueryRule>,
}

impl<E: Entity> Query<E> {
    pub(crate) fn new(mapper: Arc<dyn Mapper<E>>) -> Self {
        Self {
            mapper,
            rules: Vec::new(),
        }
    }

    /// Appends a rule.
    #[must_use]
    pub fn add_rule(mut self, rule: QueryRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Appends several rules.
    #[must_use]
    pub fn add_rules(mut self, rules: impl IntoIterator<Item = QueryRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// `field = value`.
    #[must_use]
    pub fn equals(self, field: &str, value: impl Into<Value>) -> Self {
        self.add_rule(QueryRule::equals(field, value))
    }

    /// `field != value`.
    #[must_use]
    pub fn not_equals(self, field: &str, value: impl Into<Value>) -> Self {
        self.add_rule(QueryRule::not_equals(field, value))
    }

    /// `field < value`.
    #[must_use]
    pub fn less(self, field: &str, value: impl Into<Value>) -> Self {
        self.add_rule(QueryRule::less(field, value))
    }

    /// `field <= value`.
    #[must_use]
    pub fn less_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.add_rule(QueryRule::less_equal(field, value))
    }

    /// `field > value`.
    #[must_use]
    pub fn greater(self, field: &str, value: impl Into<Value>) -> Self {
        self.add_rule(QueryRule::greater(field, value))
    }

    /// `field >= value`.
    #[must_use]
    pub fn greater_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.add_rule(QueryRule::greater_equal(field, value))
    }

    /// `field LIKE pattern`.
    #[must_use]
    pub fn like(self, field: &str, pattern: &str) -> Self {
        self.add_rule(QueryRule::like(field, pattern))
    }

    /// `field IN (values)`. An empty list adds no rule, so it neither
    /// matches everything nor nothing.
    #[must_use]
    pub fn in_values(self, field: &str, values: Vec<Value>) -> Self {
        match QueryRule::is_in(field, values) {
            Ok(rule) => self.add_rule(rule),
            Err(_) => self,
        }
    }

    /// Starts an alternative.
    #[must_use]
    pub fn or(self) -> Self {
        self.add_rule(QueryRule::or())
    }

    /// Explicit AND (the default between rules).
    #[must_use]
    pub fn and(self) -> Self {
        self.add_rule(QueryRule::and())
    }

    /// Parenthesised group.
    #[must_use]
    pub fn nested(self, rules: Vec<QueryRule>) -> Self {
        self.add_rule(QueryRule::nested(rules))
    }

    /// Ascending sort.
    #[must_use]
    pub fn sort_asc(self, field: &str) -> Self {
        self.add_rule(QueryRule::sort_asc(field))
    }

    /// Descending sort.
    #[must_use]
    pub fn sort_desc(self, field: &str) -> Self {
        self.add_rule(QueryRule::sort_desc(field))
    }

    /// At most `n` results.
    #[must_use]
    pub fn limit(self, n: usize) -> Self {
        self.add_rule(QueryRule::limit(n))
    }

    /// Skip the first `n` results.
    #[must_use]
    pub fn offset(self, n: usize) -> Self {
        self.add_rule(QueryRule::offset(n))
    }

    /// The rules collected so far.
    pub fn rules(&self) -> &[QueryRule] {
        &self.rules
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// Returns `InvalidField` if a rule names a field outside `E`'s schema.
    pub fn find(&self) -> CoreResult<Vec<E>> {
        check_fields(E::schema(), &self.rules)?;
        self.mapper.find(&self.rules)
    }

    /// Runs the query and returns the first result.
    pub fn find_first(&self) -> CoreResult<Option<E>> {
        Ok(self.find()?.into_iter().next())
    }

    /// Counts matching entities, ignoring limit and offset.
    pub fn count(&self) -> CoreResult<usize> {
        check_fields(E::schema(), &self.rules)?;
        self.mapper.count(&self.rules)
    }
}

impl<E: Entity> std::fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("kind", &E::kind())
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::Sample;
    use crate::error::CoreError;
    use crate::mapper::tests::VecMapper;

    fn query() -> Query<Sample> {
        let mapper = VecMapper::<Sample>::new();
        let mut rows = vec![
            Sample::new("A", "x"),
            Sample::new("A", "y"),
            Sample::new("B", "z"),
        ];
        mapper.add(&mut rows).unwrap();
        Query::new(Arc::new(mapper))
    }

    #[test]
    fn rules_compose_in_order() {
        let q = query().equals("investigation", "A").or().equals("name", "z");
        assert_eq!(q.rules().len(), 3);
        assert_eq!(q.find().unwrap().len(), 3);
        assert_eq!(q.count().unwrap(), 3);
    }

    #[test]
    fn empty_in_adds_no_rule() {
        let q = query().in_values("name", Vec::new());
        assert!(q.rules().is_empty());
        assert_eq!(q.count().unwrap(), 3);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = query().equals("bogus", 1i64).find().unwrap_err();
        assert!(matches!(err, CoreError::InvalidField { .. }));
    }

    #[test]
    fn find_first_respects_sort() {
        let first = query().sort_desc("name").find_first().unwrap().unwrap();
        assert_eq!(first.name.as_deref(), Some("z"));
    }
}
