//! Error types for relmap core.

use crate::entity::EntityKind;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Boxed error carried by backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in relmap core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No mapper is registered for an entity kind.
    ///
    /// This is a configuration error and is never silently ignored.
    #[error("no mapper registered for entity kind {kind}")]
    MapperNotFound {
        /// The entity kind that could not be resolved.
        kind: EntityKind,
    },

    /// A mapper was requested for an empty entity list.
    #[error("cannot resolve a mapper from an empty entity batch")]
    EmptyBatch,

    /// Some entities in a batch carry no value for any of the key fields.
    #[error("keys are missing: {kind}.{keys:?}")]
    MissingKey {
        /// The entity kind.
        kind: EntityKind,
        /// The key fields that were requested.
        keys: Vec<String>,
    },

    /// Entities to be added already exist in storage (or repeat within the batch).
    #[error("tried to add existing {kind} elements as new insert: {keys:?}={sample}")]
    DuplicateKey {
        /// The entity kind.
        kind: EntityKind,
        /// The key fields used for the lookup.
        keys: Vec<String>,
        /// Bounded rendering of the offending composite keys.
        sample: String,
    },

    /// Entities to be updated or removed do not exist in storage.
    #[error("tried to modify non-existing {kind} elements: {keys:?}={sample}")]
    MissingEntity {
        /// The entity kind.
        kind: EntityKind,
        /// The key fields used for the lookup.
        keys: Vec<String>,
        /// Bounded rendering of the offending composite keys.
        sample: String,
    },

    /// A database action name could not be recognised.
    #[error("unknown database action: {action}")]
    UnknownAction {
        /// The unrecognised action name.
        action: String,
    },

    /// A predicate rule was malformed.
    #[error("invalid query rule: {message}")]
    InvalidRule {
        /// Description of the problem.
        message: String,
    },

    /// A field name is not part of the entity's schema.
    #[error("unknown field {field} on entity kind {kind}")]
    InvalidField {
        /// The entity kind.
        kind: EntityKind,
        /// The offending field name.
        field: String,
    },

    /// A value could not be converted to a field's native type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The expected type.
        expected: &'static str,
        /// The type that was found.
        found: &'static str,
    },

    /// Stored entities would need a field merge but their type declares no label fields.
    #[error(
        "cannot merge {kind} entities: the type declares no label fields; \
         use MergeStrategy::KeyFields to match on the reconciliation key"
    )]
    UnconfirmedMerge {
        /// The entity kind.
        kind: EntityKind,
    },

    /// A transaction is already active on this database.
    #[error("a transaction is already active")]
    TransactionAlreadyActive,

    /// No transaction (or not this one) is active.
    #[error("transaction not active")]
    TransactionNotActive,

    /// The transaction was rolled back instead of committed.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Operation not permitted in current state or configuration.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Any backend-level failure.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
        /// The underlying backend error, if any.
        #[source]
        source: Option<BoxError>,
    },
}

impl CoreError {
    /// Creates a mapper-not-found error.
    pub fn mapper_not_found(kind: EntityKind) -> Self {
        Self::MapperNotFound { kind }
    }

    /// Creates an invalid rule error.
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRule {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates a backend error without an underlying cause.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying backend error.
    pub fn backend_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for data-policy violations (as opposed to configuration
    /// or backend failures).
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::MissingKey { .. }
                | Self::DuplicateKey { .. }
                | Self::MissingEntity { .. }
                | Self::UnconfirmedMerge { .. }
        )
    }

    /// Returns true for errors raised while validating a call, before it
    /// reaches any mapper write.
    ///
    /// These cover data-policy violations as well as malformed input such
    /// as unknown fields, rules or actions, and unresolvable mappers.
    #[must_use]
    pub fn is_rejected_before_write(&self) -> bool {
        self.is_policy_violation()
            || matches!(
                self,
                Self::MapperNotFound { .. }
                    | Self::EmptyBatch
                    | Self::UnknownAction { .. }
                    | Self::InvalidRule { .. }
                    | Self::InvalidField { .. }
                    | Self::InvalidOperation { .. }
            )
    }
}

/// Renders at most `limit` items, followed by `and N more` when truncated.
pub(crate) fn bounded_sample<I, T>(items: I, limit: usize) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let items: Vec<T> = items.into_iter().collect();
    let shown: Vec<String> = items.iter().take(limit).map(ToString::to_string).collect();
    let mut out = format!("[{}]", shown.join(", "));
    if items.len() > limit {
        out.push_str(&format!(" and {} more", items.len() - limit));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_within_limit_is_complete() {
        assert_eq!(bounded_sample(["a", "b"], 5), "[a, b]");
    }

    #[test]
    fn sample_beyond_limit_is_truncated() {
        let keys: Vec<String> = (0..8).map(|i| format!(";k{i}")).collect();
        let sample = bounded_sample(&keys, 5);
        assert_eq!(sample, "[;k0, ;k1, ;k2, ;k3, ;k4] and 3 more");
    }

    #[test]
    fn policy_violation_classification() {
        let err = CoreError::MissingKey {
            kind: EntityKind::new("Sample"),
            keys: vec!["name".into()],
        };
        assert!(err.is_policy_violation());
        assert!(!CoreError::EmptyBatch.is_policy_violation());
        assert!(!CoreError::mapper_not_found(EntityKind::new("Sample")).is_policy_violation());
    }

    #[test]
    fn validation_errors_precede_writes() {
        assert!(CoreError::invalid_operation("no key fields").is_rejected_before_write());
        assert!(CoreError::InvalidField {
            kind: EntityKind::new("Sample"),
            field: "colour".into(),
        }
        .is_rejected_before_write());
        assert!(CoreError::EmptyBatch.is_rejected_before_write());
        assert!(!CoreError::backend("disk full").is_rejected_before_write());
        assert!(!CoreError::TypeMismatch {
            expected: "integer",
            found: "text",
        }
        .is_rejected_before_write());
    }

    #[test]
    fn missing_key_message_names_kind_and_keys() {
        let err = CoreError::MissingKey {
            kind: EntityKind::new("Sample"),
            keys: vec!["investigation".into(), "name".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Sample"));
        assert!(msg.contains("investigation"));
    }
}
