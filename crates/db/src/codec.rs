//! Conversion between [`Value`]s and SQLite binds / rows.

use std::collections::BTreeMap;

use paranoid_core::classifier::coerce_marker;
use paranoid_core::error::CoreError;
use paranoid_core::paranoid::ParanoidConfig;
use paranoid_core::record::Record;
use paranoid_core::schema::EntityDef;
use paranoid_core::value::{format_timestamp, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::ParanoidResult;

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind one value. Timestamps are bound in their fixed-width text form.
pub(crate) fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(n) => query.bind(*n),
        Value::Real(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bool(b) => query.bind(*b),
        Value::Time(ts) => query.bind(format_timestamp(ts)),
        Value::Blob(bytes) => query.bind(bytes.clone()),
    }
}

pub(crate) fn bind_all<'q>(mut query: SqliteQuery<'q>, values: &[Value]) -> SqliteQuery<'q> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

/// Shape needed to turn a row into a [`Record`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowShape<'a> {
    pub entity: &'a str,
    pub primary_key: &'a str,
    pub paranoid: Option<&'a ParanoidConfig>,
}

impl<'a> RowShape<'a> {
    pub(crate) fn of(def: &'a EntityDef) -> Self {
        Self {
            entity: def.name(),
            primary_key: def.primary_key_column(),
            paranoid: def.paranoid_config(),
        }
    }
}

pub(crate) fn decode_row(shape: RowShape<'_>, row: &SqliteRow) -> ParanoidResult<Record> {
    let mut attributes = BTreeMap::new();
    for (idx, column) in row.columns().iter().enumerate() {
        attributes.insert(column.name().to_string(), decode_column(row, idx)?);
    }

    if let Some(config) = shape.paranoid {
        if let Some(raw) = attributes.remove(config.column()) {
            attributes.insert(config.column().to_string(), coerce_marker(config, raw));
        }
    }

    let id = attributes
        .get(shape.primary_key)
        .and_then(Value::as_id)
        .ok_or_else(|| {
            CoreError::Internal(format!(
                "{} row has no integer primary key '{}'",
                shape.entity, shape.primary_key
            ))
        })?;

    Ok(Record::loaded(shape.entity, id, attributes))
}

/// Decode by runtime storage class; SQLite columns are dynamically typed.
fn decode_column(row: &SqliteRow, idx: usize) -> Result<Value, sqlx::Error> {
    let type_name = {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_ascii_uppercase()
    };

    let value = match type_name.as_str() {
        "INTEGER" => Value::Integer(row.try_get::<i64, _>(idx)?),
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "REAL" | "NUMERIC" => Value::Real(row.try_get::<f64, _>(idx)?),
        "BLOB" => Value::Blob(row.try_get::<Vec<u8>, _>(idx)?),
        _ => Value::Text(row.try_get::<String, _>(idx)?),
    };
    Ok(value)
}
