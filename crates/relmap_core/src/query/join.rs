//! Queries correlating several entity kinds.

use crate::entity::{EntityKind, Row, Value};
use crate::error::{CoreError, CoreResult};
use crate::mapper::RowMapper;
use crate::query::{eval, QueryRule};
use std::sync::Arc;

/// A query over the product of several entity kinds.
///
/// Fields are addressed as `Kind.field` and result rows carry every field
/// of every participating kind under that qualified name. Simple conditions
/// on one kind are pushed down to that kind's mapper unless the rule list
/// contains a top-level OR.
///
/// ```rust,ignore
/// let rows = db
///     .join(&[Investigation::kind(), Sample::kind()])?
///     .join_on("Investigation.name", "Sample.investigation")
///     .equals("Investigation.name", "A")
///     .find()?;
/// ```
pub struct JoinQuery {
    sources: Vec<Arc<dyn RowMapper>>,
    rules: Vec<QueryRule>,
    max_rows: usize,
}

impl JoinQuery {
    pub(crate) fn new(sources: Vec<Arc<dyn RowMapper>>, max_rows: usize) -> Self {
        Self {
            sources,
            rules: Vec::new(),
            max_rows,
        }
    }

    /// Kinds participating in the join, in order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// Appends a rule.
    #[must_use]
    pub fn add_rule(mut self, rule: QueryRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// `Kind.field = value`.
    #[must_use]
    pub fn equals(self, field: &str, value: impl Into<Value>) -> Self {
        self.add_rule(QueryRule::equals(field, value))
    }

    /// `left = right` between fields of two kinds.
    #[must_use]
    pub fn join_on(self, left: &str, right: &str) -> Self {
        self.add_rule(QueryRule::join(left, right))
    }

    /// Starts an alternative.
    #[must_use]
    pub fn or(self) -> Self {
        self.add_rule(QueryRule::or())
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

    /// At most `n` rows.
    #[must_use]
    pub fn limit(self, n: usize) -> Self {
        self.add_rule(QueryRule::limit(n))
    }

    /// Skip the first `n` rows.
    #[must_use]
    pub fn offset(self, n: usize) -> Self {
        self.add_rule(QueryRule::offset(n))
    }

    /// The rules collected so far.
    pub fn rules(&self) -> &[QueryRule] {
        &self.rules
    }

    /// Runs the join.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRule` for a field not of the form `Kind.field` with a
    /// participating kind, `InvalidField` for a field outside that kind's
    /// schema, and `InvalidOperation` when an intermediate product would
    /// exceed the configured row limit.
    pub fn find(&self) -> CoreResult<Vec<Row>> {
        Ok(eval::apply_modifiers(self.product()?, &self.rules))
    }

    /// Counts correlated rows, ignoring limit and offset.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.product()?.len())
    }

    /// Filtered product of all sources, before sorting and paging.
    fn product(&self) -> CoreResult<Vec<Row>> {
        self.check_fields()?;
        let has_or = self.rules.iter().any(|r| matches!(r, QueryRule::Or));

        let mut joined = vec![Row::new()];
        for (i, source) in self.sources.iter().enumerate() {
            let kind = source.kind();
            let pushed = if has_or {
                Vec::new()
            } else {
                self.pushdown(kind)
            };
            let rows = source.find_rows(&pushed)?;
            tracing::trace!(%kind, pushed = pushed.len(), rows = rows.len(), "join source loaded");

            let available = &self.sources[..=i];
            let mut next = Vec::new();
            for left in &joined {
                for right in &rows {
                    let mut row = left.clone();
                    row.extend(&right.qualified(kind.name()));
                    if has_or || self.join_conditions_hold(&row, available) {
                        next.push(row);
                    }
                    if next.len() > self.max_rows {
                        return Err(CoreError::invalid_operation(format!(
                            "join exceeds {} intermediate rows",
                            self.max_rows
                        )));
                    }
                }
            }
            joined = next;
        }
        Ok(joined
            .into_iter()
            .filter(|row| eval::matches(&self.rules, row))
            .collect())
    }

    /// Top-level conditions on `kind`, unqualified.
    fn pushdown(&self, kind: EntityKind) -> Vec<QueryRule> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                QueryRule::Condition {
                    field,
                    operator,
                    value,
                } => split_field(field)
                    .filter(|(k, _)| *k == kind.name())
                    .map(|(_, f)| QueryRule::Condition {
                        field: f.to_string(),
                        operator: *operator,
                        value: value.clone(),
                    }),
                _ => None,
            })
            .collect()
    }

    /// Evaluates the join rules whose both sides are already in the product.
    fn join_conditions_hold(&self, row: &Row, available: &[Arc<dyn RowMapper>]) -> bool {
        let loaded = |field: &str| {
            split_field(field)
                .is_some_and(|(k, _)| available.iter().any(|s| s.kind().name() == k))
        };
        self.rules.iter().all(|rule| match rule {
            QueryRule::Join { left, right } if loaded(left.as_str()) && loaded(right.as_str()) => {
                eval::matches(std::slice::from_ref(rule), row)
            }
            _ => true,
        })
    }

    fn check_fields(&self) -> CoreResult<()> {
        for rule in &self.rules {
            for field in rule.referenced_fields() {
                let (kind, name) = split_field(field).ok_or_else(|| {
                    CoreError::invalid_rule(format!("join field {field} must be Kind.field"))
                })?;
                let source = self
                    .sources
                    .iter()
                    .find(|s| s.kind().name() == kind)
                    .ok_or_else(|| {
                        CoreError::invalid_rule(format!("{kind} does not take part in this join"))
                    })?;
                source.schema().check_field(name)?;
            }
        }
        Ok(())
    }
}

fn split_field(field: &str) -> Option<(&str, &str)> {
    field.split_once('.')
}

impl std::fmt::Debug for JoinQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinQuery")
            .field("kinds", &self.kinds())
            .field("rules", &self.rules)
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::Sample;
    use crate::entity::{Entity, EntitySchema};
    use crate::mapper::tests::VecMapper;
    use crate::mapper::{Mapper, TypedRows};

    #[derive(Debug, Clone, Default)]
    struct Investigation {
        id: Option<i64>,
        name: Option<String>,
    }

    const INVESTIGATION: EntitySchema =
        EntitySchema::new("Investigation", &["id", "name"], "id", &["name"]);

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

    fn sources() -> Vec<Arc<dyn RowMapper>> {
        let investigations = VecMapper::<Investigation>::new();
        let mut inv: Vec<Investigation> = ["A", "B"]
            .iter()
            .map(|n| Investigation {
                id: None,
                name: Some((*n).into()),
            })
            .collect();
        investigations.add(&mut inv).unwrap();

        let samples = VecMapper::<Sample>::new();
        let mut s = vec![
            Sample::new("A", "x"),
            Sample::new("A", "y"),
            Sample::new("B", "z"),
        ];
        samples.add(&mut s).unwrap();

        let investigations: Arc<dyn Mapper<Investigation>> = Arc::new(investigations);
        let samples: Arc<dyn Mapper<Sample>> = Arc::new(samples);
        let investigations: Arc<dyn RowMapper> = Arc::new(TypedRows::new(investigations));
        let samples: Arc<dyn RowMapper> = Arc::new(TypedRows::new(samples));
        vec![investigations, samples]
    }

    #[test]
    fn join_correlates_and_qualifies() {
        let rows = JoinQuery::new(sources(), 1000)
            .join_on("Investigation.name", "Sample.investigation")
            .equals("Investigation.name", "A")
            .sort_asc("Sample.name")
            .find()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Sample.name"), &Value::from("x"));
        assert_eq!(rows[1].get("Investigation.name"), &Value::from("A"));
    }

    #[test]
    fn join_with_or_is_evaluated_after_product() {
        let count = JoinQuery::new(sources(), 1000)
            .join_on("Investigation.name", "Sample.investigation")
            .equals("Sample.name", "x")
            .or()
            .equals("Sample.name", "z")
            .count()
            .unwrap();
        // the second alternative has no join condition: 2 investigations x 1 sample
        assert_eq!(count, 3);
    }

    #[test]
    fn row_limit_is_enforced() {
        let err = JoinQuery::new(sources(), 4).find().unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn fields_must_be_qualified_and_known() {
        let q = JoinQuery::new(sources(), 1000).equals("name", "A");
        assert!(matches!(q.find(), Err(CoreError::InvalidRule { .. })));
        let q = JoinQuery::new(sources(), 1000).equals("Other.name", "A");
        assert!(matches!(q.find(), Err(CoreError::InvalidRule { .. })));
        let q = JoinQuery::new(sources(), 1000).equals("Sample.bogus", "A");
        assert!(matches!(q.find(), Err(CoreError::InvalidField { .. })));
    }
}
