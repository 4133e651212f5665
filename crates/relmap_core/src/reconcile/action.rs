//! Bulk write actions and their names.

use crate::error::CoreError;
use std::fmt;
use std::str::FromStr;

/// Bulk write policy applied by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseAction {
    /// Insert; fail if any entity already exists.
    Add,
    /// Insert new entities, skip existing ones.
    AddIgnoreExisting,
    /// Insert new entities and merge-update existing ones.
    AddUpdateExisting,
    /// Merge-update; fail if any entity is missing.
    Update,
    /// Merge-update existing entities, skip missing ones.
    UpdateIgnoreMissing,
    /// Delete; fail if any entity is missing.
    Remove,
    /// Delete existing entities, skip missing ones.
    RemoveIgnoreMissing,
}

impl DatabaseAction {
    /// All actions.
    pub const ALL: [DatabaseAction; 7] = [
        Self::Add,
        Self::AddIgnoreExisting,
        Self::AddUpdateExisting,
        Self::Update,
        Self::UpdateIgnoreMissing,
        Self::Remove,
        Self::RemoveIgnoreMissing,
    ];

    /// Upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::AddIgnoreExisting => "ADD_IGNORE_EXISTING",
            Self::AddUpdateExisting => "ADD_UPDATE_EXISTING",
            Self::Update => "UPDATE",
            Self::UpdateIgnoreMissing => "UPDATE_IGNORE_MISSING",
            Self::Remove => "REMOVE",
            Self::RemoveIgnoreMissing => "REMOVE_IGNORE_MISSING",
        }
    }

    /// Whether the action belongs to the add family.
    #[must_use]
    pub const fn is_add(self) -> bool {
        matches!(
            self,
            Self::Add | Self::AddIgnoreExisting | Self::AddUpdateExisting
        )
    }

    /// Whether existing entities receive candidate field values.
    #[must_use]
    pub const fn merges_existing(self) -> bool {
        matches!(
            self,
            Self::AddUpdateExisting | Self::Update | Self::UpdateIgnoreMissing
        )
    }
}

impl fmt::Display for DatabaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| CoreError::UnknownAction {
                action: s.to_string(),
            })
    }
}
