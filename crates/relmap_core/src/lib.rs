//! # Relmap Core
//!
//! Entity persistence and upsert-reconciliation engine for relmap.
//!
//! This crate provides:
//! - The entity contract ([`Entity`], [`EntitySchema`], [`Value`], [`Row`])
//! - Predicate rules, typed queries and joins
//! - A mapper registry keyed by entity kind
//! - A transaction scope with explicit handles and private transactions
//! - Key-based reconciliation of bulk entity lists
//! - The [`Database`] facade tying them together
//!
//! Storage itself lives behind the [`Mapper`] and [`Connection`] traits;
//! `relmap_storage` provides an in-memory implementation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod entity;
mod error;
mod mapper;
pub mod query;
mod reconcile;
mod transaction;
mod types;

pub use config::Config;
pub use database::{Database, DatabaseBuilder};
pub use entity::{Entity, EntityKind, EntitySchema, FromValue, Row, Value};
pub use error::{BoxError, CoreError, CoreResult};
pub use mapper::{Mapper, MapperRegistry, RowMapper};
pub use query::{JoinQuery, Operator, Query, QueryRule};
pub use reconcile::{DatabaseAction, MergeStrategy, ReconcileReport};
pub use transaction::{Connection, PrivateTransaction, Transaction, TransactionScope};
pub use types::TransactionId;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
