//! Deletion state classification.
//!
//! Pure functions that decide whether a marker value means "deleted" and
//! which value to write on delete or recover. For boolean and string markers
//! equality against the configured deleted value is the only criterion, so a
//! non-null "not deleted" default (`'N'`, `false`, ...) is never mistaken for
//! a deletion.

use crate::paranoid::{ColumnType, ParanoidConfig};
use crate::record::Record;
use crate::types::Timestamp;
use crate::value::{normalize_timestamp, parse_timestamp, Value};

/// How a "deleted" row is recognised in storage.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletedCriterion {
    /// Any non-null marker is deleted (time columns).
    NotNull,
    /// The marker equals this value.
    Equals(Value),
}

/// The storage predicate that identifies deleted rows for `config`.
pub fn deleted_criterion(config: &ParanoidConfig) -> DeletedCriterion {
    match (config.column_type(), config.deleted_value()) {
        (ColumnType::Time, _) | (_, None) => DeletedCriterion::NotNull,
        (_, Some(value)) => DeletedCriterion::Equals(value.clone()),
    }
}

/// Returns `true` if `marker` classifies as deleted under `config`.
pub fn is_deleted(config: &ParanoidConfig, marker: &Value) -> bool {
    match config.column_type() {
        ColumnType::Time => !marker.is_null(),
        ColumnType::Boolean => marker.as_bool() == Some(true),
        ColumnType::String => match config.deleted_value() {
            Some(deleted) => marker == deleted,
            None => false,
        },
    }
}

/// Returns `true` if `record` is deleted, either logically or because it
/// was physically destroyed.
pub fn is_record_deleted(config: &ParanoidConfig, record: &Record) -> bool {
    record.is_destroyed() || is_deleted(config, record.get(config.column()))
}

/// Returns `true` only for records removed from storage by a hard delete.
pub fn is_deleted_fully(record: &Record) -> bool {
    record.is_destroyed()
}

/// Value to write when deleting at `now`.
pub fn value_for_delete(config: &ParanoidConfig, now: Timestamp) -> Value {
    match config.deleted_value() {
        Some(value) if config.column_type() != ColumnType::Time => value.clone(),
        _ => Value::Time(normalize_timestamp(now)),
    }
}

/// Value to write when recovering.
pub fn value_for_recover(config: &ParanoidConfig) -> Value {
    config.recovery_value().clone()
}

/// Coerce a raw stored marker into the column's semantic type.
///
/// SQLite has no native boolean or timestamp storage class, so booleans
/// arrive as integers and timestamps as text.
pub fn coerce_marker(config: &ParanoidConfig, raw: Value) -> Value {
    match (config.column_type(), raw) {
        (ColumnType::Boolean, Value::Integer(n)) => Value::Bool(n != 0),
        (ColumnType::Time, Value::Text(s)) => match parse_timestamp(&s) {
            Some(ts) => Value::Time(ts),
            None => Value::Text(s),
        },
        (_, other) => other,
    }
}

/// The deletion timestamp carried by a time-typed marker, if any.
pub fn deletion_time(config: &ParanoidConfig, marker: &Value) -> Option<Timestamp> {
    if config.is_time() {
        marker.as_time()
    } else {
        None
    }
}
