//! # Relmap Testkit
//!
//! Test utilities for relmap.
//!
//! This crate provides:
//! - Sample entity types and pre-wired test databases
//! - A failure-injecting, call-counting mapper wrapper
//! - Property-based test generators using proptest
//! - A reference model of reconciliation outcomes
//!
//! ## Usage
//!
//! ```rust
//! use relmap_testkit::prelude::*;
//!
//! with_test_db(|db| {
//!     let mut batch = vec![Sample::new("A", "x")];
//!     db.reconcile(&mut batch, DatabaseAction::Add, &SAMPLE_KEYS).unwrap();
//!     assert!(batch[0].id.is_some());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use relmap_core::{Database, DatabaseAction};
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
