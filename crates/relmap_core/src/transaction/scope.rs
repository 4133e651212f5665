//! Transaction scope: one active transaction per connection.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Connection;
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
enum ScopeState {
    Idle,
    Active {
        id: TransactionId,
        /// Set when a joined operation failed; the owner can only roll back.
        rollback_only: Option<String>,
    },
}

/// Outcome of [`TransactionScope::begin_private`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateTransaction {
    /// A new transaction was started and belongs to the caller.
    Owned(TransactionId),
    /// The caller joined an already active transaction it does not own.
    Joined(TransactionId),
}

impl PrivateTransaction {
    /// The transaction's id.
    #[must_use]
    pub const fn id(self) -> TransactionId {
        match self {
            Self::Owned(id) | Self::Joined(id) => id,
        }
    }
}

/// Tracks the transaction state of one connection.
///
/// State machine: `Idle -> Active -> Idle`, through either commit or
/// rollback. Only the holder of the active [`TransactionId`] may end it.
pub struct TransactionScope {
    connection: Arc<dyn Connection>,
    state: Mutex<ScopeState>,
    next_id: AtomicU64,
}

impl TransactionScope {
    /// Creates an idle scope over a connection.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            state: Mutex::new(ScopeState::Idle),
            next_id: AtomicU64::new(1),
        }
    }

    /// The id of the active transaction, if any.
    pub fn active(&self) -> Option<TransactionId> {
        match &*self.state.lock() {
            ScopeState::Active { id, .. } => Some(*id),
            ScopeState::Idle => None,
        }
    }

    /// Checks whether a transaction is active.
    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionAlreadyActive` if one is already running.
    pub fn begin(&self) -> CoreResult<TransactionId> {
        let mut state = self.state.lock();
        if let ScopeState::Active { .. } = *state {
            return Err(CoreError::TransactionAlreadyActive);
        }
        self.connection.begin()?;
        let id = TransactionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        *state = ScopeState::Active {
            id,
            rollback_only: None,
        };
        tracing::debug!(txn = %id, "transaction started");
        Ok(id)
    }

    /// Starts a transaction unless one is active, in which case it is joined.
    pub fn begin_private(&self) -> CoreResult<PrivateTransaction> {
        if let Some(id) = self.active() {
            return Ok(PrivateTransaction::Joined(id));
        }
        self.begin().map(PrivateTransaction::Owned)
    }

    /// Commits the active transaction.
    ///
    /// A transaction marked rollback-only is rolled back instead and the call
    /// fails with `TransactionAborted`. A failed backend commit is rolled back
    /// before its error is returned.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if `id` is not the active transaction.
    pub fn commit(&self, id: TransactionId) -> CoreResult<()> {
        let rollback_only = self.finish(id)?;
        if let Some(reason) = rollback_only {
            tracing::warn!(txn = %id, %reason, "rolling back transaction marked rollback-only");
            self.connection.rollback()?;
            return Err(CoreError::transaction_aborted(reason));
        }
        if let Err(err) = self.connection.commit() {
            tracing::warn!(txn = %id, error = %err, "commit failed, rolling back");
            if let Err(rollback_err) = self.connection.rollback() {
                tracing::warn!(txn = %id, error = %rollback_err, "rollback after failed commit failed");
            }
            return Err(err);
        }
        tracing::debug!(txn = %id, "transaction committed");
        Ok(())
    }

    /// Rolls back the active transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if `id` is not the active transaction.
    pub fn rollback(&self, id: TransactionId) -> CoreResult<()> {
        self.finish(id)?;
        self.connection.rollback()?;
        tracing::debug!(txn = %id, "transaction rolled back");
        Ok(())
    }

    /// Marks the active transaction so that its owner can only roll back.
    pub fn mark_rollback_only(&self, id: TransactionId, reason: impl Into<String>) {
        if let ScopeState::Active {
            id: active,
            rollback_only,
        } = &mut *self.state.lock()
        {
            if *active == id && rollback_only.is_none() {
                *rollback_only = Some(reason.into());
            }
        }
    }

    /// Runs `f` inside a private transaction.
    ///
    /// When the call owns the transaction it commits on `Ok` and rolls back
    /// on `Err`. When it joined the caller's transaction it leaves the
    /// boundary to the caller, marking the transaction rollback-only on any
    /// failure that may follow a write. Errors rejected up front, such as
    /// policy violations or an unknown key field, leave it committable.
    pub fn run_private<T>(&self, f: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        match self.begin_private()? {
            PrivateTransaction::Owned(id) => match f() {
                Ok(value) => {
                    self.commit(id)?;
                    Ok(value)
                }
                Err(err) => {
                    tracing::debug!(txn = %id, error = %err, "rolling back private transaction");
                    if let Err(rollback_err) = self.rollback(id) {
                        tracing::warn!(txn = %id, error = %rollback_err, "rollback failed");
                    }
                    Err(err)
                }
            },
            PrivateTransaction::Joined(id) => {
                let result = f();
                if let Err(err) = &result {
                    if !err.is_rejected_before_write() {
                        self.mark_rollback_only(id, err.to_string());
                    }
                }
                result
            }
        }
    }

    /// Moves to `Idle`, returning the rollback-only reason if one was set.
    fn finish(&self, id: TransactionId) -> CoreResult<Option<String>> {
        let mut state = self.state.lock();
        match &mut *state {
            ScopeState::Active {
                id: active,
                rollback_only,
            } if *active == id => {
                let reason = rollback_only.take();
                *state = ScopeState::Idle;
                Ok(reason)
            }
            _ => Err(CoreError::TransactionNotActive),
        }
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}
