//! Scope filter: composable, visibility-aware queries over one entity type.
//!
//! A [`Scope`] starts out showing active rows only for paranoid entity types.
//! [`with_deleted`](Scope::with_deleted) and [`only_deleted`](Scope::only_deleted)
//! are the explicit escape hatches, and the time-window filters are only
//! available when the marker column is a timestamp.

use chrono::Duration;
use paranoid_core::association::TargetLink;
use paranoid_core::classifier::{deleted_criterion, DeletedCriterion};
use paranoid_core::error::CoreError;
use paranoid_core::identifier::validate_identifier;
use paranoid_core::paranoid::ParanoidConfig;
use paranoid_core::record::Record;
use paranoid_core::schema::EntityDef;
use paranoid_core::types::{DbId, Timestamp};
use paranoid_core::value::Value;
use paranoid_core::window::window_bounds;
use sqlx::{Row, SqliteConnection};

use crate::codec::{bind_all, decode_row, RowShape};
use crate::error::ParanoidResult;

/// Which rows a scope sees with respect to the deletion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Active,
    WithDeleted,
    OnlyDeleted,
}

/// A column predicate composed into a scope with `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    NotEq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
}

impl Predicate {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq(column.to_string(), value.into())
    }

    pub fn not_eq(column: &str, value: impl Into<Value>) -> Self {
        Predicate::NotEq(column.to_string(), value.into())
    }

    pub fn is_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    fn render(&self, table: &str, sql: &mut Vec<String>, binds: &mut Vec<Value>) -> Result<(), CoreError> {
        match self {
            Predicate::Eq(col, Value::Null) | Predicate::IsNull(col) => {
                validate_identifier(col)?;
                sql.push(format!("{table}.{col} IS NULL"));
            }
            Predicate::NotEq(col, Value::Null) | Predicate::NotNull(col) => {
                validate_identifier(col)?;
                sql.push(format!("{table}.{col} IS NOT NULL"));
            }
            Predicate::Eq(col, value) => {
                validate_identifier(col)?;
                sql.push(format!("{table}.{col} = ?"));
                binds.push(value.clone());
            }
            Predicate::NotEq(col, value) => {
                validate_identifier(col)?;
                sql.push(format!("({table}.{col} IS NULL OR {table}.{col} <> ?)"));
                binds.push(value.clone());
            }
            Predicate::In(col, values) => {
                validate_identifier(col)?;
                if values.is_empty() {
                    sql.push("0 = 1".to_string());
                } else {
                    let marks = vec!["?"; values.len()].join(", ");
                    sql.push(format!("{table}.{col} IN ({marks})"));
                    binds.extend(values.iter().cloned());
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum MarkerFilter {
    Before(Timestamp),
    After(Timestamp),
    Between(Timestamp, Timestamp),
}

#[derive(Debug, Clone)]
pub struct Scope {
    entity: String,
    table: String,
    primary_key: String,
    paranoid: Option<ParanoidConfig>,
    visibility: Visibility,
    predicates: Vec<Predicate>,
    marker_filters: Vec<MarkerFilter>,
    order: Vec<(String, bool)>,
    limit: Option<i64>,
}

impl Scope {
    /// The default scope for `def`: active rows only if paranoid, all rows
    /// otherwise.
    pub fn for_entity(def: &EntityDef) -> Self {
        Self {
            entity: def.name().to_string(),
            table: def.table_name().to_string(),
            primary_key: def.primary_key_column().to_string(),
            paranoid: def.paranoid_config().cloned(),
            visibility: if def.is_paranoid() {
                Visibility::Active
            } else {
                Visibility::WithDeleted
            },
            predicates: Vec::new(),
            marker_filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn require_paranoid(&self) -> Result<&ParanoidConfig, CoreError> {
        self.paranoid.as_ref().ok_or_else(|| CoreError::NotParanoid {
            entity: self.entity.clone(),
        })
    }

    fn require_time(&self, operation: &'static str) -> Result<(), CoreError> {
        let config = self.require_paranoid()?;
        if config.is_time() {
            Ok(())
        } else {
            Err(CoreError::Unsupported {
                entity: self.entity.clone(),
                operation,
                column_type: config.column_type().to_string(),
            })
        }
    }

    /// Include soft-deleted rows.
    pub fn with_deleted(mut self) -> Result<Self, CoreError> {
        self.require_paranoid()?;
        self.visibility = Visibility::WithDeleted;
        Ok(self)
    }

    /// Restrict to soft-deleted rows.
    pub fn only_deleted(mut self) -> Result<Self, CoreError> {
        self.require_paranoid()?;
        self.visibility = Visibility::OnlyDeleted;
        Ok(self)
    }

    /// Rows deleted strictly before `at`.
    pub fn deleted_before(mut self, at: Timestamp) -> Result<Self, CoreError> {
        self.require_time("deleted_before")?;
        self.visibility = Visibility::OnlyDeleted;
        self.marker_filters.push(MarkerFilter::Before(at));
        Ok(self)
    }

    /// Rows deleted strictly after `at`.
    pub fn deleted_after(mut self, at: Timestamp) -> Result<Self, CoreError> {
        self.require_time("deleted_after")?;
        self.visibility = Visibility::OnlyDeleted;
        self.marker_filters.push(MarkerFilter::After(at));
        Ok(self)
    }

    /// Rows deleted within `[reference - window, reference]`.
    pub fn deleted_inside_window(
        mut self,
        reference: Timestamp,
        window: Duration,
    ) -> Result<Self, CoreError> {
        self.require_time("deleted_inside_window")?;
        let (start, end) = window_bounds(reference, window);
        self.visibility = Visibility::OnlyDeleted;
        self.marker_filters.push(MarkerFilter::Between(start, end));
        Ok(self)
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Predicate::eq(column, value))
    }

    pub fn where_id(self, id: DbId) -> Self {
        let pk = self.primary_key.clone();
        self.where_eq(&pk, id)
    }

    pub fn where_ids(self, ids: &[DbId]) -> Self {
        let pk = self.primary_key.clone();
        self.filter(Predicate::is_in(&pk, ids.iter().copied()))
    }

    /// Narrow to the targets an association link points at.
    pub fn linked(self, link: &TargetLink) -> Self {
        match link {
            TargetLink::PrimaryKey(id) => self.where_id(*id),
            TargetLink::ForeignKey {
                column,
                id,
                type_filter,
            } => {
                let scope = self.where_eq(column, *id);
                match type_filter {
                    Some((type_column, entity)) => scope.where_eq(type_column, entity.as_str()),
                    None => scope,
                }
            }
        }
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order.push((column.to_string(), false));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order.push((column.to_string(), true));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the `WHERE` body and its binds. Empty when unfiltered.
    pub fn where_clause(&self) -> Result<(String, Vec<Value>), CoreError> {
        let mut sql = Vec::new();
        let mut binds = Vec::new();
        let table = &self.table;

        if let Some(config) = &self.paranoid {
            let col = format!("{table}.{}", config.column());
            match (self.visibility, deleted_criterion(config)) {
                (Visibility::WithDeleted, _) => {}
                (Visibility::Active, DeletedCriterion::NotNull) => {
                    sql.push(format!("{col} IS NULL"));
                }
                (Visibility::Active, DeletedCriterion::Equals(value)) => {
                    sql.push(format!("({col} IS NULL OR {col} <> ?)"));
                    binds.push(value);
                }
                (Visibility::OnlyDeleted, DeletedCriterion::NotNull) => {
                    sql.push(format!("{col} IS NOT NULL"));
                }
                (Visibility::OnlyDeleted, DeletedCriterion::Equals(value)) => {
                    sql.push(format!("{col} = ?"));
                    binds.push(value);
                }
            }

            for filter in &self.marker_filters {
                match filter {
                    MarkerFilter::Before(at) => {
                        sql.push(format!("{col} < ?"));
                        binds.push(Value::Time(*at));
                    }
                    MarkerFilter::After(at) => {
                        sql.push(format!("{col} > ?"));
                        binds.push(Value::Time(*at));
                    }
                    MarkerFilter::Between(start, end) => {
                        sql.push(format!("{col} >= ? AND {col} <= ?"));
                        binds.push(Value::Time(*start));
                        binds.push(Value::Time(*end));
                    }
                }
            }
        }

        for predicate in &self.predicates {
            predicate.render(table, &mut sql, &mut binds)?;
        }

        Ok((sql.join(" AND "), binds))
    }

    fn tail(&self) -> Result<String, CoreError> {
        let mut tail = String::new();
        let order = if self.order.is_empty() {
            vec![(self.primary_key.clone(), false)]
        } else {
            self.order.clone()
        };
        let mut parts = Vec::with_capacity(order.len());
        for (col, desc) in &order {
            validate_identifier(col)?;
            parts.push(format!("{}.{col}{}", self.table, if *desc { " DESC" } else { "" }));
        }
        tail.push_str(&format!(" ORDER BY {}", parts.join(", ")));
        if let Some(limit) = self.limit {
            tail.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(tail)
    }

    pub fn to_select_sql(&self) -> Result<(String, Vec<Value>), CoreError> {
        let (clause, binds) = self.where_clause()?;
        let mut sql = format!("SELECT * FROM {}", self.table);
        if !clause.is_empty() {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        sql.push_str(&self.tail()?);
        Ok((sql, binds))
    }

    pub fn to_count_sql(&self) -> Result<(String, Vec<Value>), CoreError> {
        let (clause, binds) = self.where_clause()?;
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        if !clause.is_empty() {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        Ok((sql, binds))
    }

    fn shape(&self) -> RowShape<'_> {
        RowShape {
            entity: &self.entity,
            primary_key: &self.primary_key,
            paranoid: self.paranoid.as_ref(),
        }
    }

    pub async fn fetch_all(&self, conn: &mut SqliteConnection) -> ParanoidResult<Vec<Record>> {
        let (sql, binds) = self.to_select_sql()?;
        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(|row| decode_row(self.shape(), row)).collect()
    }

    pub async fn first(&self, conn: &mut SqliteConnection) -> ParanoidResult<Option<Record>> {
        let mut records = self.clone().limit(1).fetch_all(conn).await?;
        Ok(records.pop())
    }

    pub async fn count(&self, conn: &mut SqliteConnection) -> ParanoidResult<i64> {
        let (sql, binds) = self.to_count_sql()?;
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    pub async fn exists(&self, conn: &mut SqliteConnection) -> ParanoidResult<bool> {
        Ok(self.count(conn).await? > 0)
    }

    /// Physically delete every row the scope matches, without hooks.
    pub(crate) async fn delete_rows(&self, conn: &mut SqliteConnection) -> ParanoidResult<u64> {
        let (clause, binds) = self.where_clause()?;
        let mut sql = format!("DELETE FROM {}", self.table);
        if !clause.is_empty() {
            sql.push_str(&format!(" WHERE {clause}"));
        }
        let result = bind_all(sqlx::query(&sql), &binds)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn ids(&self, conn: &mut SqliteConnection) -> ParanoidResult<Vec<DbId>> {
        Ok(self
            .fetch_all(conn)
            .await?
            .iter()
            .filter_map(Record::id)
            .collect())
    }
}
