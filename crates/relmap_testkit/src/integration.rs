//! Cross-crate integration test helpers.
//!
//! [`SampleModel`] is a plain in-memory model of what reconciling `Sample`
//! batches by `(investigation, name)` should leave in storage. Property
//! tests apply the same batches to a real database and to the model and
//! compare the outcomes.

use crate::fixtures::Sample;
use relmap_core::{CoreError, CoreResult, Database, DatabaseAction};
use std::collections::{BTreeMap, BTreeSet};

/// Key fields used by the model.
pub const SAMPLE_KEYS: [&str; 2] = ["investigation", "name"];

type Key = (Option<String>, Option<String>);

/// Expected outcome classes of a rejected reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The batch repeats a key or meets stored keys under `Add`.
    DuplicateKey,
    /// The batch names keys that are not stored.
    MissingEntity,
}

impl Rejection {
    /// Whether `err` is the error this rejection predicts.
    pub fn matches(self, err: &CoreError) -> bool {
        matches!(
            (self, err),
            (Self::DuplicateKey, CoreError::DuplicateKey { .. })
                | (Self::MissingEntity, CoreError::MissingEntity { .. })
        )
    }
}

/// Model of stored samples: key to measurement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleModel {
    rows: BTreeMap<Key, Option<i64>>,
}

impl SampleModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a batch and returns the expected affected count.
    ///
    /// A rejected batch leaves the model unchanged.
    pub fn apply(&mut self, batch: &[Sample], action: DatabaseAction) -> Result<usize, Rejection> {
        if batch.is_empty() {
            return Ok(0);
        }
        let keys: Vec<Key> = batch.iter().map(key_of).collect();
        let distinct: BTreeSet<&Key> = keys.iter().collect();
        if action.is_add() && distinct.len() != keys.len() {
            return Err(Rejection::DuplicateKey);
        }
        let existing: BTreeSet<&Key> = distinct
            .iter()
            .copied()
            .filter(|k| self.rows.contains_key(*k))
            .collect();
        let new: Vec<&Key> = keys.iter().filter(|k| !existing.contains(k)).collect();

        match action {
            DatabaseAction::Add if !existing.is_empty() => return Err(Rejection::DuplicateKey),
            DatabaseAction::Update | DatabaseAction::Remove if !new.is_empty() => {
                return Err(Rejection::MissingEntity)
            }
            _ => {}
        }

        let mut affected = 0;
        if action.merges_existing() {
            for (key, sample) in keys.iter().zip(batch) {
                if let (Some(extra), Some(stored)) = (sample.extra, self.rows.get_mut(key)) {
                    *stored = Some(extra);
                }
            }
            affected += existing.len();
        }
        if matches!(
            action,
            DatabaseAction::Remove | DatabaseAction::RemoveIgnoreMissing
        ) {
            for key in &existing {
                self.rows.remove(*key);
            }
            affected += existing.len();
        }
        if action.is_add() {
            for (key, sample) in keys.iter().zip(batch) {
                if !existing.contains(key) {
                    self.rows.insert(key.clone(), sample.extra);
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    /// Number of modelled rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the model is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reads the stored samples of `db` into a model.
    ///
    /// # Errors
    ///
    /// Returns any error of the underlying find.
    pub fn read(db: &Database) -> CoreResult<Self> {
        let rows = db
            .find::<Sample>(&[])?
            .iter()
            .map(|s| (key_of(s), s.extra))
            .collect();
        Ok(Self { rows })
    }
}

fn key_of(sample: &Sample) -> Key {
    (sample.investigation.clone(), sample.name.clone())
}

/// Reconciles `batch` on a copy so the caller's batch keeps its unsaved state.
///
/// # Errors
///
/// Returns any reconciliation error.
pub fn reconcile_copy(
    db: &Database,
    batch: &[Sample],
    action: DatabaseAction,
) -> CoreResult<usize> {
    let mut copy = batch.to_vec();
    db.reconcile(&mut copy, action, &SAMPLE_KEYS)
}
