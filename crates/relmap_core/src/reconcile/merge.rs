//! Field merge of candidates into their stored counterparts.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::reconcile::key::CompositeKey;

/// How a stored entity finds the candidates whose values it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Match candidates whose label fields equal the stored entity's.
    ///
    /// Entity types without label fields cannot be merged this way;
    /// reconciliation fails with `UnconfirmedMerge` instead.
    #[default]
    LabelFields,
    /// Match candidates by the reconciliation key itself. The caller
    /// confirms that key identity is sufficient.
    KeyFields,
}

/// Copies every set field of each matching candidate into the stored
/// entities. Unset candidate fields and the identity field are left alone.
pub(crate) fn merge_into<E: Entity>(
    strategy: MergeStrategy,
    stored: &mut [E],
    candidates: &[E],
    key_fields: &[&str],
) -> CoreResult<usize> {
    let schema = E::schema();
    if strategy == MergeStrategy::LabelFields && schema.label_fields().is_empty() {
        return Err(CoreError::UnconfirmedMerge {
            kind: schema.kind(),
        });
    }

    let candidate_keys: Vec<CompositeKey> = match strategy {
        MergeStrategy::KeyFields => candidates
            .iter()
            .map(|c| CompositeKey::of(c, key_fields))
            .collect(),
        MergeStrategy::LabelFields => Vec::new(),
    };

    let mut merged = 0;
    for target in stored.iter_mut() {
        let target_key = match strategy {
            MergeStrategy::KeyFields => Some(CompositeKey::of(target, key_fields)),
            MergeStrategy::LabelFields => None,
        };
        for (i, candidate) in candidates.iter().enumerate() {
            let is_match = match &target_key {
                Some(key) => candidate_keys[i].text() == key.text(),
                None => schema
                    .label_fields()
                    .iter()
                    .all(|f| target.get(f).loosely_equals(&candidate.get(f))),
            };
            if is_match {
                copy_set_fields(candidate, target)?;
                merged += 1;
            }
        }
    }
    Ok(merged)
}

fn copy_set_fields<E: Entity>(from: &E, to: &mut E) -> CoreResult<()> {
    let id_field = E::schema().id_field();
    for field in E::schema().fields() {
        if *field == id_field {
            continue;
        }
        let value = from.get(field);
        if !value.is_null() {
            to.set(field, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::Sample;
    use crate::entity::{EntitySchema, Value};

    #[derive(Debug, Clone, Default)]
    struct Tag {
        id: Option<i64>,
        code: Option<String>,
        note: Option<String>,
    }

    const TAG: EntitySchema = EntitySchema::new("Tag", &["id", "code", "note"], "id", &[]);

    impl Entity for Tag {
        fn schema() -> &'static EntitySchema {
            &TAG
        }

        fn get(&self, field: &str) -> Value {
            match field {
                "id" => self.id.into(),
                "code" => self.code.clone().into(),
                "note" => self.note.clone().into(),
                _ => Value::Null,
            }
        }

        fn set(&mut self, field: &str, value: Value) -> CoreResult<()> {
            match field {
                "id" => self.id = value.into_typed()?,
                "code" => self.code = value.into_typed()?,
                "note" => self.note = value.into_typed()?,
                _ => return Err(Self::unknown_field(field)),
            }
            Ok(())
        }
    }

    fn tag(code: &str, note: Option<&str>) -> Tag {
        Tag {
            id: None,
            code: Some(code.into()),
            note: note.map(Into::into),
        }
    }

    #[test]
    fn label_match_copies_set_fields_only() {
        let mut stored = vec![Sample {
            id: Some(1),
            extra: Some(9),
            ..Sample::new("A", "x")
        }];
        let candidates = vec![
            Sample {
                extra: Some(1),
                ..Sample::new("A", "x")
            },
            Sample {
                extra: Some(2),
                ..Sample::new("A", "y")
            },
        ];
        let n = merge_into(
            MergeStrategy::LabelFields,
            &mut stored,
            &candidates,
            &["investigation", "name"],
        )
        .unwrap();
        assert_eq!(n, 1);
        assert_eq!(stored[0].extra, Some(1));
        assert_eq!(stored[0].id, Some(1));

        // unset candidate fields leave stored values alone
        let sparse = vec![Sample::new("A", "x")];
        merge_into(MergeStrategy::LabelFields, &mut stored, &sparse, &["name"]).unwrap();
        assert_eq!(stored[0].extra, Some(1));
    }

    #[test]
    fn no_label_fields_requires_confirmation() {
        let mut stored = vec![Tag {
            id: Some(1),
            ..tag("t1", None)
        }];
        let candidates = vec![tag("t1", Some("hello"))];
        let err =
            merge_into(MergeStrategy::LabelFields, &mut stored, &candidates, &["code"]).unwrap_err();
        assert!(matches!(err, CoreError::UnconfirmedMerge { .. }));

        let n = merge_into(MergeStrategy::KeyFields, &mut stored, &candidates, &["code"]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(stored[0].note.as_deref(), Some("hello"));
        assert_eq!(stored[0].id, Some(1));
    }

    #[test]
    fn key_strategy_ignores_other_keys() {
        let mut stored = vec![Tag {
            id: Some(1),
            ..tag("t1", None)
        }];
        let candidates = vec![tag("t2", Some("other"))];
        let n = merge_into(MergeStrategy::KeyFields, &mut stored, &candidates, &["code"]).unwrap();
        assert_eq!(n, 0);
        assert!(stored[0].note.is_none());
    }
}
