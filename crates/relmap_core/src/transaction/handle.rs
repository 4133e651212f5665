use crate::error::CoreResult;
use crate::transaction::TransactionScope;
use crate::types::TransactionId;

/// An explicit transaction returned by
/// [`Database::begin_transaction`](crate::Database::begin_transaction).
///
/// Batch operations issued while the handle is live join it instead of
/// committing on their own. Dropping an unfinished handle rolls back.
#[derive(Debug)]
#[must_use = "dropping a transaction rolls it back"]
pub struct Transaction<'a> {
    scope: &'a TransactionScope,
    id: TransactionId,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(scope: &'a TransactionScope, id: TransactionId) -> Self {
        Self {
            scope,
            id,
            finished: false,
        }
    }

    /// The transaction's id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionAborted` if a nested operation failed, after the
    /// changes have been rolled back.
    pub fn commit(mut self) -> CoreResult<()> {
        self.finished = true;
        self.scope.commit(self.id)
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) -> CoreResult<()> {
        self.finished = true;
        self.scope.rollback(self.id)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(txn = %self.id, "transaction dropped without commit, rolling back");
            if let Err(err) = self.scope.rollback(self.id) {
                tracing::warn!(txn = %self.id, error = %err, "rollback on drop failed");
            }
        }
    }
}
