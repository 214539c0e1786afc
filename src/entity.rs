//! The record every named entity carries: identity, naming and timestamps.

use crate::error::{NixError, Result};
use crate::types::EntityId;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current time as Unix epoch seconds
pub(crate) fn now() -> i64 {
    Utc::now().timestamp()
}

/// Reject empty (or whitespace-only) names and types
pub(crate) fn check_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(NixError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Shared base of every named entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub definition: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EntityRecord {
    /// Validate name and type and stamp a fresh id and timestamps
    pub fn new(name: &str, type_name: &str) -> Result<Self> {
        check_non_empty("name", name)?;
        check_non_empty("type", type_name)?;
        let now = now();
        Ok(Self {
            id: EntityId::generate(),
            name: name.to_string(),
            type_name: type_name.to_string(),
            definition: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Refresh the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// Anything that carries an [`EntityRecord`]
pub trait HasEntity {
    fn entity(&self) -> &EntityRecord;
    fn entity_mut(&mut self) -> &mut EntityRecord;
}

impl HasEntity for EntityRecord {
    fn entity(&self) -> &EntityRecord {
        self
    }

    fn entity_mut(&mut self) -> &mut EntityRecord {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record() {
        let rec = EntityRecord::new("session 1", "recording").unwrap();
        assert_eq!(rec.name, "session 1");
        assert_eq!(rec.type_name, "recording");
        assert!(rec.definition.is_none());
        assert!(rec.created_at > 0);
        assert_eq!(rec.created_at, rec.updated_at);
    }

    #[test]
    fn test_empty_name_or_type() {
        assert!(matches!(
            EntityRecord::new("", "t"),
            Err(NixError::Validation(_))
        ));
        assert!(matches!(
            EntityRecord::new("n", "  "),
            Err(NixError::Validation(_))
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = EntityRecord::new("a", "t").unwrap();
        let b = EntityRecord::new("a", "t").unwrap();
        assert_ne!(a.id, b.id);
    }
}
