//! Classification of candidates into new and existing entities, and the
//! dispatch of each class to the mapper operation the action calls for.

use crate::config::Config;
use crate::entity::Entity;
use crate::error::{bounded_sample, CoreError, CoreResult};
use crate::mapper::{add_batched, remove_batched, update_batched, Mapper};
use crate::reconcile::key::{CompositeKey, KeyIndex};
use crate::reconcile::merge::{merge_into, MergeStrategy};
use crate::reconcile::{lookup, DatabaseAction};

/// Per-class counts of one reconciliation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entities inserted.
    pub added: usize,
    /// Stored entities updated.
    pub updated: usize,
    /// Stored entities deleted.
    pub removed: usize,
    /// Candidates the action chose to ignore.
    pub skipped: usize,
}

impl ReconcileReport {
    /// Total rows affected.
    #[must_use]
    pub const fn affected(&self) -> usize {
        self.added + self.updated + self.removed
    }
}

/// Candidates split by whether their key is already stored.
struct Partition<E> {
    /// Stored entities matching a candidate key.
    existing: Vec<E>,
    /// Candidate positions with no stored counterpart, in input order.
    new: Vec<usize>,
    /// Composite keys of the new candidates, for error messages.
    new_keys: Vec<String>,
}

pub(crate) struct Reconciler<'a, E: Entity> {
    mapper: &'a dyn Mapper<E>,
    config: &'a Config,
    strategy: MergeStrategy,
}

impl<'a, E: Entity> Reconciler<'a, E> {
    pub(crate) fn new(mapper: &'a dyn Mapper<E>, config: &'a Config, strategy: MergeStrategy) -> Self {
        Self {
            mapper,
            config,
            strategy,
        }
    }

    /// Reconciles `entities` against storage. Identities assigned to inserted
    /// entities are written back into the slice.
    ///
    /// Does not manage transactions; the caller wraps the call.
    pub(crate) fn run(
        &self,
        entities: &mut [E],
        action: DatabaseAction,
        key_fields: &[&str],
    ) -> CoreResult<ReconcileReport> {
        if entities.is_empty() {
            return Ok(ReconcileReport::default());
        }
        let schema = E::schema();
        if key_fields.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "reconciling {} requires at least one key field",
                schema.kind()
            )));
        }
        for field in key_fields {
            schema.check_field(field)?;
        }

        let partition = self.partition(entities, action, key_fields)?;
        let Partition {
            mut existing,
            new,
            new_keys,
        } = partition;
        tracing::debug!(
            kind = %schema.kind(),
            %action,
            candidates = entities.len(),
            existing = existing.len(),
            new = new.len(),
            "partitioned candidates"
        );

        if action.merges_existing() && !existing.is_empty() {
            let merged = merge_into(self.strategy, &mut existing, entities, key_fields)?;
            tracing::debug!(kind = %schema.kind(), merged, "merged candidate fields");
        }

        let mut report = ReconcileReport::default();
        match action {
            DatabaseAction::Add => {
                if !existing.is_empty() {
                    return Err(self.duplicate_error(&existing, key_fields));
                }
                report.added = self.add_new(entities, &new)?;
            }
            DatabaseAction::AddIgnoreExisting => {
                report.skipped = entities.len() - new.len();
                report.added = self.add_new(entities, &new)?;
            }
            DatabaseAction::AddUpdateExisting => {
                report.added = self.add_new(entities, &new)?;
                report.updated = update_batched(self.mapper, &existing, self.config.batch_size)?;
            }
            DatabaseAction::Update => {
                if !new.is_empty() {
                    return Err(self.missing_error(&new_keys, key_fields));
                }
                report.updated = update_batched(self.mapper, &existing, self.config.batch_size)?;
            }
            DatabaseAction::UpdateIgnoreMissing => {
                report.skipped = new.len();
                report.updated = update_batched(self.mapper, &existing, self.config.batch_size)?;
            }
            DatabaseAction::Remove => {
                if !new.is_empty() {
                    return Err(self.missing_error(&new_keys, key_fields));
                }
                report.removed = remove_batched(self.mapper, &existing, self.config.batch_size)?;
            }
            DatabaseAction::RemoveIgnoreMissing => {
                report.skipped = new.len();
                report.removed = remove_batched(self.mapper, &existing, self.config.batch_size)?;
            }
        }
        tracing::info!(
            kind = %schema.kind(),
            %action,
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            skipped = report.skipped,
            "reconciled"
        );
        Ok(report)
    }

    fn partition(
        &self,
        entities: &[E],
        action: DatabaseAction,
        key_fields: &[&str],
    ) -> CoreResult<Partition<E>> {
        let schema = E::schema();
        let keys: Vec<CompositeKey> = entities
            .iter()
            .map(|e| CompositeKey::of(e, key_fields))
            .collect();

        if keys.iter().any(CompositeKey::is_keyless) {
            let fresh_ids = action.is_add()
                && key_fields.len() == 1
                && key_fields[0] == schema.id_field();
            if !fresh_ids {
                return Err(CoreError::MissingKey {
                    kind: schema.kind(),
                    keys: owned(key_fields),
                });
            }
            tracing::debug!(kind = %schema.kind(), "identities omitted, treating batch as new");
            return Ok(Partition {
                existing: Vec::new(),
                new: (0..entities.len()).collect(),
                new_keys: keys.iter().map(|k| k.text().to_string()).collect(),
            });
        }

        let mut index = KeyIndex::default();
        let mut repeated = Vec::new();
        for (position, key) in keys.into_iter().enumerate() {
            let text = key.text().to_string();
            if !index.insert(key, position) {
                repeated.push(text);
            }
        }
        if action.is_add() && !repeated.is_empty() {
            return Err(CoreError::DuplicateKey {
                kind: schema.kind(),
                keys: owned(key_fields),
                sample: bounded_sample(&repeated, self.config.error_sample_size),
            });
        }

        let unique: Vec<&CompositeKey> = index.keys().collect();
        tracing::trace!(kind = %schema.kind(), distinct = index.len(), "built key index");
        let existing = lookup::find_existing(self.mapper, key_fields, &unique, self.config.batch_size)?;
        for stored in &existing {
            let key = CompositeKey::of(stored, key_fields);
            if !index.mark_matched(key.text()) {
                tracing::debug!(kind = %schema.kind(), key = %key, "lookup returned a row outside the candidate keys");
            }
        }

        Ok(Partition {
            existing,
            new_keys: index.unmatched_keys().map(|k| k.text().to_string()).collect(),
            new: index.unmatched_positions(),
        })
    }

    /// Inserts the candidates at `positions`, writing assigned identities back.
    fn add_new(&self, entities: &mut [E], positions: &[usize]) -> CoreResult<usize> {
        if positions.is_empty() {
            return Ok(0);
        }
        if positions.len() == entities.len() {
            return add_batched(self.mapper, entities, self.config.batch_size);
        }
        let mut fresh: Vec<E> = positions.iter().map(|&i| entities[i].clone()).collect();
        let added = add_batched(self.mapper, &mut fresh, self.config.batch_size)?;
        for (&i, entity) in positions.iter().zip(fresh) {
            entities[i] = entity;
        }
        Ok(added)
    }

    fn duplicate_error(&self, existing: &[E], key_fields: &[&str]) -> CoreError {
        let keys = existing.iter().map(|e| CompositeKey::of(e, key_fields));
        CoreError::DuplicateKey {
            kind: E::kind(),
            keys: owned(key_fields),
            sample: bounded_sample(keys, self.config.error_sample_size),
        }
    }

    fn missing_error(&self, new_keys: &[String], key_fields: &[&str]) -> CoreError {
        CoreError::MissingEntity {
            kind: E::kind(),
            keys: owned(key_fields),
            sample: bounded_sample(new_keys, self.config.error_sample_size),
        }
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| (*f).to_string()).collect()
}
