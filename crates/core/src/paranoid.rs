//! Per-entity-type paranoid configuration.
//!
//! A [`ParanoidConfig`] names the marker column, its semantic type and the
//! values written on delete and recover. Configurations are built once at
//! setup, checked with [`ParanoidConfig::validate`], and never mutated.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identifier::validate_identifier;
use crate::value::Value;

/// Default marker column name.
pub const DEFAULT_COLUMN: &str = "deleted_at";

/// Default recovery window for time-typed dependents, in seconds.
pub const DEFAULT_RECOVERY_WINDOW_SECS: i64 = 120;

/// Semantic type of the marker column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// The marker holds the deletion timestamp; `NULL` means active.
    Time,
    /// The marker is `true` when deleted.
    Boolean,
    /// The marker equals a configured sentinel when deleted.
    String,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Time => "time",
            ColumnType::Boolean => "boolean",
            ColumnType::String => "string",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable marker configuration for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct ParanoidConfig {
    column: String,
    column_type: ColumnType,
    /// `None` for time columns, where the value is the current timestamp.
    deleted_value: Option<Value>,
    recovery_value: Value,
    recover_dependents: bool,
    dependent_recovery_window: Duration,
    double_tap_destroys_fully: bool,
}

impl Default for ParanoidConfig {
    fn default() -> Self {
        Self::time(DEFAULT_COLUMN)
    }
}

impl ParanoidConfig {
    fn with_type(column: &str, column_type: ColumnType, deleted_value: Option<Value>) -> Self {
        Self {
            column: column.to_string(),
            column_type,
            deleted_value,
            recovery_value: Value::Null,
            recover_dependents: true,
            dependent_recovery_window: Duration::seconds(DEFAULT_RECOVERY_WINDOW_SECS),
            double_tap_destroys_fully: false,
        }
    }

    /// A timestamp marker: `NULL` while active, deletion time once deleted.
    pub fn time(column: &str) -> Self {
        Self::with_type(column, ColumnType::Time, None)
    }

    /// A boolean marker: `true` once deleted, `NULL` while active.
    ///
    /// Use [`not_nullable`](Self::not_nullable) for columns that default to
    /// `false` instead.
    pub fn boolean(column: &str) -> Self {
        Self::with_type(column, ColumnType::Boolean, Some(Value::Bool(true)))
    }

    /// A string marker holding `deleted_value` once deleted.
    pub fn string(column: &str, deleted_value: &str) -> Self {
        Self::with_type(
            column,
            ColumnType::String,
            Some(Value::Text(deleted_value.to_string())),
        )
    }

    /// Boolean columns only: recover to `false` rather than `NULL`.
    pub fn not_nullable(mut self) -> Self {
        if self.column_type == ColumnType::Boolean {
            self.recovery_value = Value::Bool(false);
        }
        self
    }

    /// Override the value written on recover.
    pub fn recover_to(mut self, value: impl Into<Value>) -> Self {
        self.recovery_value = value.into();
        self
    }

    /// Whether `recover` cascades into dependents when the caller does not say.
    pub fn recover_dependents(mut self, recursive: bool) -> Self {
        self.recover_dependents = recursive;
        self
    }

    /// Default window used when recovering time-typed dependents.
    pub fn dependent_recovery_window(mut self, window: Duration) -> Self {
        self.dependent_recovery_window = window;
        self
    }

    /// When set, destroying an already soft-deleted record removes it physically.
    pub fn double_tap_destroys_fully(mut self, enabled: bool) -> Self {
        self.double_tap_destroys_fully = enabled;
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn deleted_value(&self) -> Option<&Value> {
        self.deleted_value.as_ref()
    }

    pub fn recovery_value(&self) -> &Value {
        &self.recovery_value
    }

    pub fn recursive_recovery_default(&self) -> bool {
        self.recover_dependents
    }

    pub fn recovery_window_default(&self) -> Duration {
        self.dependent_recovery_window
    }

    pub fn double_tap(&self) -> bool {
        self.double_tap_destroys_fully
    }

    pub fn is_time(&self) -> bool {
        self.column_type == ColumnType::Time
    }

    /// Check internal consistency. The recovery value must never be
    /// classified as deleted.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_identifier(&self.column)?;

        if self.dependent_recovery_window < Duration::zero() {
            return Err(CoreError::InvalidConfig(format!(
                "recovery window for '{}' must not be negative",
                self.column
            )));
        }

        match self.column_type {
            ColumnType::Time => {
                if !self.recovery_value.is_null() {
                    return Err(CoreError::InvalidConfig(format!(
                        "time marker '{}' must recover to NULL",
                        self.column
                    )));
                }
            }
            ColumnType::Boolean => {
                if self.deleted_value != Some(Value::Bool(true)) {
                    return Err(CoreError::InvalidConfig(format!(
                        "boolean marker '{}' must be deleted with true",
                        self.column
                    )));
                }
                if !matches!(self.recovery_value, Value::Null | Value::Bool(false)) {
                    return Err(CoreError::InvalidConfig(format!(
                        "boolean marker '{}' must recover to NULL or false",
                        self.column
                    )));
                }
            }
            ColumnType::String => {
                let deleted = match &self.deleted_value {
                    Some(Value::Text(s)) if !s.is_empty() => s,
                    _ => {
                        return Err(CoreError::InvalidConfig(format!(
                            "string marker '{}' needs a non-empty deleted value",
                            self.column
                        )))
                    }
                };
                match &self.recovery_value {
                    Value::Null => {}
                    Value::Text(r) if r != deleted => {}
                    _ => {
                        return Err(CoreError::InvalidConfig(format!(
                            "string marker '{}' must recover to NULL or a value other than '{deleted}'",
                            self.column
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults_match_time_marker() {
        let config = ParanoidConfig::default();
        assert_eq!(config.column(), "deleted_at");
        assert_eq!(config.column_type(), ColumnType::Time);
        assert!(config.recursive_recovery_default());
        assert_eq!(config.recovery_window_default(), Duration::minutes(2));
        assert!(!config.double_tap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_not_nullable_boolean_recovers_to_false() {
        let config = ParanoidConfig::boolean("is_deleted").not_nullable();
        assert_eq!(config.recovery_value(), &Value::Bool(false));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_not_nullable_ignored_for_other_types() {
        let config = ParanoidConfig::time("deleted_at").not_nullable();
        assert!(config.recovery_value().is_null());
    }

    #[test]
    fn test_string_recovery_must_differ_from_deleted_value() {
        let config = ParanoidConfig::string("deleted", "dead").recover_to("dead");
        assert_matches!(config.validate(), Err(CoreError::InvalidConfig(_)));

        let config = ParanoidConfig::string("deleted", "dead").recover_to("alive");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_string_needs_non_empty_sentinel() {
        let config = ParanoidConfig::string("deleted", "");
        assert_matches!(config.validate(), Err(CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_time_recovery_value_must_be_null() {
        let config = ParanoidConfig::time("deleted_at").recover_to("never");
        assert_matches!(config.validate(), Err(CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_negative_window_rejected() {
        let config = ParanoidConfig::time("deleted_at").dependent_recovery_window(Duration::seconds(-1));
        assert_matches!(config.validate(), Err(CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_column_name_rejected() {
        let config = ParanoidConfig::time("deleted at");
        assert_matches!(config.validate(), Err(CoreError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_column_type_display() {
        assert_eq!(ColumnType::Time.to_string(), "time");
        assert_eq!(ColumnType::Boolean.to_string(), "boolean");
        assert_eq!(ColumnType::String.to_string(), "string");
    }
}
