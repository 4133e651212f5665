use crate::error::CoreResult;

/// The single backend connection shared by a database and its mappers.
///
/// Implementations only need flat transactions: the scope above guarantees
/// `begin` is never called twice without an intervening `commit` or
/// `rollback`.
pub trait Connection: Send + Sync {
    /// Starts a backend transaction.
    fn begin(&self) -> CoreResult<()>;

    /// Makes the current transaction's changes permanent.
    fn commit(&self) -> CoreResult<()>;

    /// Discards the current transaction's changes.
    fn rollback(&self) -> CoreResult<()>;
}
