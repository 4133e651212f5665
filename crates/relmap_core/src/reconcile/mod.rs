//! Bulk reconciliation of candidate entities against stored rows.
//!
//! Given a batch, the key fields and a [`DatabaseAction`], reconciliation
//! looks up which candidates already exist, merges candidate values into
//! the stored entities when the action updates, and dispatches each class
//! to add, update or remove. Policy checks run before any write, so a
//! rejected batch leaves storage untouched.

mod action;
mod engine;
mod key;
mod lookup;
mod merge;

pub use action::DatabaseAction;
pub use engine::ReconcileReport;
pub use merge::MergeStrategy;

pub(crate) use engine::Reconciler;
