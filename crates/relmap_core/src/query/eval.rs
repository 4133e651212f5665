//! Backend-neutral rule evaluation over rows.
//!
//! AND binds tighter than OR: a rule list is split at each top-level
//! [`QueryRule::Or`] into alternatives, and a row matches when every filter
//! of at least one alternative matches. Sort, limit and offset rules never
//! filter; [`select`] applies them after filtering.

use crate::entity::{Row, Value};
use crate::query::rule::{Operator, QueryRule};
use std::cmp::Ordering;

/// Checks whether a row satisfies a rule list. An empty filter matches.
pub fn matches(rules: &[QueryRule], row: &Row) -> bool {
    let mut any_group = false;
    for group in rules.split(|r| matches!(r, QueryRule::Or)) {
        let mut filters = group
            .iter()
            .filter(|r| !r.is_modifier() && !matches!(r, QueryRule::And))
            .peekable();
        if filters.peek().is_none() {
            continue;
        }
        any_group = true;
        if filters.all(|r| rule_matches(r, row)) {
            return true;
        }
    }
    !any_group
}

/// Filters rows, then applies sort, offset and limit rules.
pub fn select(rows: impl IntoIterator<Item = Row>, rules: &[QueryRule]) -> Vec<Row> {
    let filtered = rows.into_iter().filter(|row| matches(rules, row)).collect();
    apply_modifiers(filtered, rules)
}

/// Counts matching rows. Limit and offset are ignored.
pub fn count<'a>(rows: impl IntoIterator<Item = &'a Row>, rules: &[QueryRule]) -> usize {
    rows.into_iter().filter(|row| matches(rules, row)).count()
}

/// Applies top-level sort, offset and limit rules, in that order.
pub fn apply_modifiers(mut rows: Vec<Row>, rules: &[QueryRule]) -> Vec<Row> {
    let sorts: Vec<(&str, bool)> = rules
        .iter()
        .filter_map(|r| match r {
            QueryRule::Sort { field, descending } => Some((field.as_str(), *descending)),
            _ => None,
        })
        .collect();
    if !sorts.is_empty() {
        rows.sort_by(|a, b| {
            sorts
                .iter()
                .map(|(field, descending)| {
                    let ord = sort_order(a.get(field), b.get(field));
                    if *descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    let offset = rules.iter().rev().find_map(|r| match r {
        QueryRule::Offset(n) => Some(*n),
        _ => None,
    });
    let limit = rules.iter().rev().find_map(|r| match r {
        QueryRule::Limit(n) => Some(*n),
        _ => None,
    });
    if let Some(n) = offset {
        rows = rows.into_iter().skip(n).collect();
    }
    if let Some(n) = limit {
        rows.truncate(n);
    }
    rows
}

/// Nulls sort first; incomparable values keep their relative order.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn rule_matches(rule: &QueryRule, row: &Row) -> bool {
    match rule {
        QueryRule::Condition {
            field,
            operator,
            value,
        } => condition_matches(row.get(field), *operator, value),
        QueryRule::Join { left, right } => {
            let (l, r) = (row.get(left), row.get(right));
            !l.is_null() && !r.is_null() && l.loosely_equals(r)
        }
        QueryRule::Nested(rules) => matches(rules, row),
        QueryRule::And
        | QueryRule::Or
        | QueryRule::Sort { .. }
        | QueryRule::Limit(_)
        | QueryRule::Offset(_) => true,
    }
}

fn condition_matches(field: &Value, operator: Operator, operand: &Value) -> bool {
    match operator {
        Operator::Equals => equals(field, operand),
        Operator::NotEquals => !equals(field, operand),
        Operator::In => {
            let candidates = operand.as_list().unwrap_or_default();
            match field {
                Value::List(items) => items
                    .iter()
                    .any(|item| candidates.iter().any(|c| item.loosely_equals(c))),
                other => candidates.iter().any(|c| other.loosely_equals(c)),
            }
        }
        Operator::Less => field.compare(operand) == Some(Ordering::Less),
        Operator::LessEqual => matches!(
            field.compare(operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Greater => field.compare(operand) == Some(Ordering::Greater),
        Operator::GreaterEqual => matches!(
            field.compare(operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Like => match (field.as_text(), operand.as_text()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        },
        _ => false,
    }
}

/// Equality where `Null` matches unset fields and scalars match list members.
fn equals(field: &Value, operand: &Value) -> bool {
    match (field, operand) {
        (_, Value::Null) => field.is_null(),
        (Value::List(items), scalar) if !matches!(scalar, Value::List(_)) => {
            items.iter().any(|item| item.loosely_equals(scalar))
        }
        _ => field.loosely_equals(operand),
    }
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((bp, bt)) = backtrack {
            p = bp + 1;
            t = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}
