//! In-memory entity model.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::DbId;
use crate::value::Value;

static NULL: Value = Value::Null;

/// Persistence state of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Built in memory, never saved.
    New,
    /// Backed by a row.
    Persisted,
    /// The backing row was physically removed.
    Destroyed,
}

/// A row of some entity type, with dirty tracking.
///
/// [`set`](Record::set) marks the column as changed. Lifecycle writes made by
/// the deletion and recovery coordinators go through
/// [`write_silently`](Record::write_silently) and never count as edits.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    id: Option<DbId>,
    attributes: BTreeMap<String, Value>,
    state: RecordState,
    changed: BTreeSet<String>,
}

impl Record {
    /// A new, unsaved record of `entity`.
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            id: None,
            attributes: BTreeMap::new(),
            state: RecordState::New,
            changed: BTreeSet::new(),
        }
    }

    /// Rebuild a persisted record from a loaded row.
    pub fn loaded(entity: &str, id: DbId, attributes: BTreeMap<String, Value>) -> Self {
        Self {
            entity: entity.to_string(),
            id: Some(id),
            attributes,
            state: RecordState::Persisted,
            changed: BTreeSet::new(),
        }
    }

    /// Builder form of [`set`](Record::set).
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn id(&self) -> Option<DbId> {
        self.id
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Attribute value, or `Null` if unset.
    pub fn get(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&NULL)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Assign an attribute and mark it changed.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.attributes.insert(column.to_string(), value.into());
        self.changed.insert(column.to_string());
    }

    /// Assign an attribute without marking it changed.
    pub fn write_silently(&mut self, column: &str, value: Value) {
        self.attributes.insert(column.to_string(), value);
    }

    pub fn is_new(&self) -> bool {
        self.state == RecordState::New
    }

    pub fn is_persisted(&self) -> bool {
        self.state == RecordState::Persisted
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == RecordState::Destroyed
    }

    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn changed_columns(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    /// Replace the record's contents with freshly loaded storage state.
    pub fn refresh(&mut self, id: DbId, attributes: BTreeMap<String, Value>) {
        self.id = Some(id);
        self.attributes = attributes;
        self.state = RecordState::Persisted;
        self.changed.clear();
    }

    pub fn clear_changes(&mut self) {
        self.changed.clear();
    }

    pub fn mark_destroyed(&mut self) {
        self.state = RecordState::Destroyed;
        self.changed.clear();
    }
}
