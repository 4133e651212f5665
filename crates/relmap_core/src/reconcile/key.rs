//! Composite keys and the per-call key index.

use crate::entity::{Entity, Value};
use std::collections::HashMap;
use std::fmt;

const SEPARATOR: char = ';';

/// How many of the key fields carry a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyPresence {
    Complete,
    Partial,
    Absent,
}

/// The key-field values of one entity, with their combined string form.
///
/// The string form prefixes every value with `;` (so an all-null key is
/// still non-empty) and renders `Null` as the empty string. Separator and
/// escape characters inside values are escaped.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompositeKey {
    text: String,
    values: Vec<Value>,
    presence: KeyPresence,
}

impl CompositeKey {
    pub(crate) fn of<E: Entity>(entity: &E, keys: &[&str]) -> Self {
        let values: Vec<Value> = keys.iter().map(|k| entity.get(k)).collect();
        let set = values.iter().filter(|v| !v.is_null()).count();
        let presence = match set {
            0 => KeyPresence::Absent,
            n if n == values.len() => KeyPresence::Complete,
            _ => KeyPresence::Partial,
        };
        let mut text = String::new();
        for value in &values {
            text.push(SEPARATOR);
            for c in value.to_string().chars() {
                if c == SEPARATOR || c == '\\' {
                    text.push('\\');
                }
                text.push(c);
            }
        }
        Self {
            text,
            values,
            presence,
        }
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn is_keyless(&self) -> bool {
        self.presence == KeyPresence::Absent
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug)]
struct Entry {
    key: CompositeKey,
    /// Positions of the candidates sharing this key, in input order.
    members: Vec<usize>,
    matched: bool,
}

/// Distinct candidate keys in first-seen order, each with the positions of
/// the candidates that carry it. Lives for one reconciliation call.
#[derive(Debug, Default)]
pub(crate) struct KeyIndex {
    entries: Vec<Entry>,
    by_text: HashMap<String, usize>,
}

impl KeyIndex {
    /// Adds a candidate. Returns false if its key was already present.
    pub(crate) fn insert(&mut self, key: CompositeKey, position: usize) -> bool {
        if let Some(&i) = self.by_text.get(key.text()) {
            self.entries[i].members.push(position);
            return false;
        }
        self.by_text.insert(key.text().to_string(), self.entries.len());
        self.entries.push(Entry {
            key,
            members: vec![position],
            matched: false,
        });
        true
    }

    /// Distinct keys, in first-seen order.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &CompositeKey> {
        self.entries.iter().map(|e| &e.key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Marks a stored key as found. Returns false if no candidate carries it.
    pub(crate) fn mark_matched(&mut self, text: &str) -> bool {
        match self.by_text.get(text) {
            Some(&i) => {
                self.entries[i].matched = true;
                true
            }
            None => false,
        }
    }

    /// Keys that matched nothing in storage.
    pub(crate) fn unmatched_keys(&self) -> impl Iterator<Item = &CompositeKey> {
        self.entries.iter().filter(|e| !e.matched).map(|e| &e.key)
    }

    /// Candidate positions whose key matched nothing in storage, in input order.
    pub(crate) fn unmatched_positions(&self) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .entries
            .iter()
            .filter(|e| !e.matched)
            .flat_map(|e| e.members.iter().copied())
            .collect();
        positions.sort_unstable();
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::Sample;
    use proptest::prelude::*;

    #[test]
    fn key_text_prefixes_every_value() {
        let key = CompositeKey::of(&Sample::new("A", "x"), &["investigation", "name"]);
        assert_eq!(key.text(), ";A;x");
        assert_eq!(key.presence, KeyPresence::Complete);
    }

    #[test]
    fn null_values_render_empty() {
        let mut s = Sample::new("A", "x");
        s.name = None;
        let key = CompositeKey::of(&s, &["investigation", "name"]);
        assert_eq!(key.text(), ";A;");
        assert_eq!(key.presence, KeyPresence::Partial);

        let key = CompositeKey::of(&Sample::default(), &["investigation", "name"]);
        assert_eq!(key.text(), ";;");
        assert!(key.is_keyless());
    }

    #[test]
    fn separators_in_values_do_not_collide() {
        let a = CompositeKey::of(&Sample::new("A;B", "x"), &["investigation", "name"]);
        let b = CompositeKey::of(&Sample::new("A", "B;x"), &["investigation", "name"]);
        assert_ne!(a.text(), b.text());
    }

    #[test]
    fn index_groups_duplicates_and_tracks_matches() {
        let keys = ["name"];
        let mut index = KeyIndex::default();
        assert!(index.insert(CompositeKey::of(&Sample::new("A", "x"), &keys), 0));
        assert!(index.insert(CompositeKey::of(&Sample::new("A", "y"), &keys), 1));
        assert!(!index.insert(CompositeKey::of(&Sample::new("B", "x"), &keys), 2));
        assert_eq!(index.len(), 2);

        assert!(index.mark_matched(";y"));
        assert!(!index.mark_matched(";z"));
        assert_eq!(index.unmatched_positions(), vec![0, 2]);
        let unmatched: Vec<&str> = index.unmatched_keys().map(CompositeKey::text).collect();
        assert_eq!(unmatched, vec![";x"]);
    }

    proptest! {
        #[test]
        fn key_text_is_injective(
            a in ("[ab;\\\\]{0,3}", "[ab;\\\\]{0,3}"),
            b in ("[ab;\\\\]{0,3}", "[ab;\\\\]{0,3}"),
        ) {
            let keys = ["investigation", "name"];
            let ka = CompositeKey::of(&Sample::new(&a.0, &a.1), &keys);
            let kb = CompositeKey::of(&Sample::new(&b.0, &b.1), &keys);
            prop_assert_eq!(a == b, ka.text() == kb.text());
        }
    }
}
