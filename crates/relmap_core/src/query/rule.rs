//! Predicate rules.

use crate::entity::Value;
use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Operators understood by query rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Field equals value. `Null` matches unset fields.
    Equals,
    /// Field differs from value.
    NotEquals,
    /// Field is one of a non-empty list of values.
    In,
    /// Field is strictly less than value.
    Less,
    /// Field is less than or equal to value.
    LessEqual,
    /// Field is strictly greater than value.
    Greater,
    /// Field is greater than or equal to value.
    GreaterEqual,
    /// Text pattern match with `%` and `_` wildcards.
    Like,
    /// Field-to-field equality across joined entity kinds.
    Join,
    /// Explicit conjunction (the default between rules).
    And,
    /// Disjunction between the rules on either side.
    Or,
    /// Parenthesised group of rules.
    Nested,
    /// Ascending sort on a field.
    SortAsc,
    /// Descending sort on a field.
    SortDesc,
    /// Maximum number of results.
    Limit,
    /// Number of results to skip.
    Offset,
}

impl Operator {
    /// Whether this operator compares a field against a value.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::NotEquals
                | Self::In
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
                | Self::Like
        )
    }

    /// Upper-case name of the operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT",
            Self::In => "IN",
            Self::Less => "LESS",
            Self::LessEqual => "LESS_EQUAL",
            Self::Greater => "GREATER",
            Self::GreaterEqual => "GREATER_EQUAL",
            Self::Like => "LIKE",
            Self::Join => "JOIN",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Nested => "NESTED",
            Self::SortAsc => "SORTASC",
            Self::SortDesc => "SORTDESC",
            Self::Limit => "LIMIT",
            Self::Offset => "OFFSET",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable unit of a query: a condition, a combinator or a result modifier.
///
/// Combinators carry no field or value; conditions always carry a field and
/// an operator. A rule sequence composes left to right with implicit AND;
/// an [`QueryRule::Or`] splits it into alternatives.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRule {
    /// `field <operator> value`.
    Condition {
        /// Field name (qualified `Kind.field` inside joins).
        field: String,
        /// Comparison operator.
        operator: Operator,
        /// Operand.
        value: Value,
    },
    /// `left = right` between two fields.
    Join {
        /// Left field.
        left: String,
        /// Right field.
        right: String,
    },
    /// Explicit AND.
    And,
    /// OR between the surrounding rules.
    Or,
    /// Parenthesised group.
    Nested(Vec<QueryRule>),
    /// Sort on a field.
    Sort {
        /// Field name.
        field: String,
        /// Descending order when true.
        descending: bool,
    },
    /// Keep at most this many results.
    Limit(usize),
    /// Skip this many results.
    Offset(usize),
}

impl QueryRule {
    /// Creates a comparison rule.
    ///
    /// Fails with `InvalidRule` when `operator` is not a comparison, or when
    /// an `IN` operand is not a non-empty list.
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> CoreResult<Self> {
        let field = field.into();
        if !operator.is_comparison() {
            return Err(CoreError::invalid_rule(format!(
                "operator {operator} cannot be applied to field {field}"
            )));
        }
        if field.is_empty() {
            return Err(CoreError::invalid_rule(format!(
                "operator {operator} requires a field name"
            )));
        }
        if operator == Operator::In {
            match value.as_list() {
                Some(items) if !items.is_empty() => {}
                Some(_) => {
                    return Err(CoreError::invalid_rule(format!(
                        "IN on field {field} requires a non-empty value list"
                    )))
                }
                None => {
                    return Err(CoreError::invalid_rule(format!(
                        "IN on field {field} requires a list, found {}",
                        value.type_name()
                    )))
                }
            }
        }
        Ok(Self::Condition {
            field,
            operator,
            value,
        })
    }

    fn condition(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Condition {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `field = value`.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::Equals, value)
    }

    /// `field != value`.
    pub fn not_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::NotEquals, value)
    }

    /// `field < value`.
    pub fn less(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::Less, value)
    }

    /// `field <= value`.
    pub fn less_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::LessEqual, value)
    }

    /// `field > value`.
    pub fn greater(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::Greater, value)
    }

    /// `field >= value`.
    pub fn greater_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, Operator::GreaterEqual, value)
    }

    /// `field LIKE pattern`.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::condition(field, Operator::Like, Value::Text(pattern.into()))
    }

    /// `field IN (values)`. An empty list is rejected with `InvalidRule`.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> CoreResult<Self> {
        Self::new(field, Operator::In, Value::List(values))
    }

    /// `left = right` across joined kinds.
    pub fn join(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::Join {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Explicit AND combinator.
    pub fn and() -> Self {
        Self::And
    }

    /// OR combinator.
    pub fn or() -> Self {
        Self::Or
    }

    /// Parenthesised group.
    pub fn nested(rules: Vec<QueryRule>) -> Self {
        Self::Nested(rules)
    }

    /// Ascending sort.
    pub fn sort_asc(field: impl Into<String>) -> Self {
        Self::Sort {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort.
    pub fn sort_desc(field: impl Into<String>) -> Self {
        Self::Sort {
            field: field.into(),
            descending: true,
        }
    }

    /// Result limit.
    pub fn limit(n: usize) -> Self {
        Self::Limit(n)
    }

    /// Result offset.
    pub fn offset(n: usize) -> Self {
        Self::Offset(n)
    }

    /// The rule's operator.
    #[must_use]
    pub fn operator(&self) -> Operator {
        match self {
            Self::Condition { operator, .. } => *operator,
            Self::Join { .. } => Operator::Join,
            Self::And => Operator::And,
            Self::Or => Operator::Or,
            Self::Nested(_) => Operator::Nested,
            Self::Sort {
                descending: false, ..
            } => Operator::SortAsc,
            Self::Sort {
                descending: true, ..
            } => Operator::SortDesc,
            Self::Limit(_) => Operator::Limit,
            Self::Offset(_) => Operator::Offset,
        }
    }

    /// The field this rule addresses, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Condition { field, .. } | Self::Sort { field, .. } => Some(field),
            Self::Join { left, .. } => Some(left),
            _ => None,
        }
    }

    /// The operand of a condition.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Condition { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Whether this rule only shapes the result (sort, limit, offset).
    #[must_use]
    pub fn is_modifier(&self) -> bool {
        matches!(self, Self::Sort { .. } | Self::Limit(_) | Self::Offset(_))
    }

    /// Every field name referenced by this rule, nested groups included.
    pub fn referenced_fields(&self) -> Vec<&str> {
        match self {
            Self::Condition { field, .. } | Self::Sort { field, .. } => vec![field.as_str()],
            Self::Join { left, right } => vec![left.as_str(), right.as_str()],
            Self::Nested(rules) => rules.iter().flat_map(Self::referenced_fields).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for QueryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition {
                field,
                operator,
                value,
            } => write!(f, "{field} {operator} '{value}'"),
            Self::Join { left, right } => write!(f, "{left} JOIN {right}"),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Nested(rules) => {
                f.write_str("(")?;
                for (i, rule) in rules.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{rule}")?;
                }
                f.write_str(")")
            }
            Self::Sort {
                field,
                descending: false,
            } => write!(f, "SORTASC {field}"),
            Self::Sort {
                field,
                descending: true,
            } => write!(f, "SORTDESC {field}"),
            Self::Limit(n) => write!(f, "LIMIT {n}"),
            Self::Offset(n) => write!(f, "OFFSET {n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_in_is_rejected() {
        let err = QueryRule::is_in("name", Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRule { .. }));
    }

    #[test]
    fn in_requires_list_operand() {
        let err = QueryRule::new("name", Operator::In, Value::from("x")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRule { .. }));
    }

    #[test]
    fn combinator_operator_cannot_be_a_condition() {
        assert!(QueryRule::new("name", Operator::Or, Value::Null).is_err());
        assert!(QueryRule::new("", Operator::Equals, Value::Null).is_err());
    }

    #[test]
    fn combinators_have_no_field_or_value() {
        let or = QueryRule::or();
        assert_eq!(or.operator(), Operator::Or);
        assert!(or.field().is_none());
        assert!(or.value().is_none());
    }

    #[test]
    fn display_is_readable() {
        let rule = QueryRule::nested(vec![
            QueryRule::equals("investigation", "A"),
            QueryRule::equals("name", "x"),
        ]);
        assert_eq!(rule.to_string(), "(investigation EQUALS 'A' name EQUALS 'x')");
    }

    #[test]
    fn referenced_fields_descend_into_groups() {
        let rule = QueryRule::nested(vec![
            QueryRule::equals("a", 1i64),
            QueryRule::or(),
            QueryRule::join("b", "c"),
        ]);
        assert_eq!(rule.referenced_fields(), vec!["a", "b", "c"]);
    }
}
