//! Transaction management.
//!
//! A database owns exactly one [`Connection`] and therefore at most one
//! active transaction. Batch operations use a private-transaction
//! convention: they start and own a transaction only when none is active,
//! otherwise they join the caller's and leave commit or rollback to it.

mod connection;
mod handle;
mod scope;

pub use connection::Connection;
pub use handle::Transaction;
pub use scope::{PrivateTransaction, TransactionScope};

#[cfg(test)]
pub(crate) use scope::tests::RecordingConnection;
