//! Storage collaborator: insert, save, reload and find, plus the raw row
//! writes the coordinators build on.

use paranoid_core::classifier::{is_deleted, is_record_deleted};
use paranoid_core::error::CoreError;
use paranoid_core::identifier::validate_identifier;
use paranoid_core::outcome::Outcome;
use paranoid_core::paranoid::ParanoidConfig;
use paranoid_core::record::Record;
use paranoid_core::schema::EntityDef;
use paranoid_core::types::DbId;
use paranoid_core::value::Value;
use sqlx::{Connection, SqliteConnection};

use crate::codec::{bind_all, bind_value, decode_row, RowShape};
use crate::counter_cache::{CounterCacheAdjuster, CounterTransition};
use crate::error::{ParanoidError, ParanoidResult};
use crate::paranoia::Paranoia;
use crate::scope::Scope;

impl Paranoia {
    /// Insert a new record. Validation failures and unique violations come
    /// back as [`Outcome::Rejected`].
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<Outcome> {
        self.insert_with(conn, record, false).await
    }

    pub async fn insert_strict(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<()> {
        self.insert_with(conn, record, true).await.map(|_| ())
    }

    async fn insert_with(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
        raise: bool,
    ) -> ParanoidResult<Outcome> {
        let def = self.schema.entity(record.entity())?;
        if !record.is_new() {
            return refuse(record, raise, "record is already persisted");
        }

        let mut tx = conn.begin().await?;
        let result = self.insert_row(&mut *tx, def, record, raise).await;
        match result {
            Ok(Outcome::Applied) => {
                tx.commit().await?;
                Ok(Outcome::Applied)
            }
            other => {
                tx.rollback().await?;
                other
            }
        }
    }

    async fn insert_row(
        &self,
        conn: &mut SqliteConnection,
        def: &EntityDef,
        record: &mut Record,
        raise: bool,
    ) -> ParanoidResult<Outcome> {
        if let Some(outcome) = self.check_valid(record, raise)? {
            return Ok(outcome);
        }

        let mut columns = Vec::new();
        let mut values = Vec::new();
        for (column, value) in record.attributes() {
            if column == def.primary_key_column() && value.is_null() {
                continue;
            }
            validate_identifier(column)?;
            columns.push(column.as_str());
            values.push(value.clone());
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", def.table_name())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                def.table_name(),
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };

        let row = match bind_all(sqlx::query(&sql), &values)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(row) => row,
            Err(err) => return unique_violation_or(record, raise, err.into()),
        };
        *record = decode_row(RowShape::of(def), &row)?;

        let active = match def.paranoid_config() {
            Some(config) => !is_deleted(config, record.get(config.column())),
            None => true,
        };
        CounterCacheAdjuster::apply(conn, &self.schema, record, CounterTransition::Create { active })
            .await?;

        tracing::debug!(entity = def.name(), id = ?record.id(), "Inserted");
        Ok(Outcome::Applied)
    }

    /// Persist changed columns, or insert if the record is new.
    ///
    /// A record that is deleted in memory cannot be saved; recover it first.
    pub async fn save(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<Outcome> {
        self.save_with(conn, record, false).await
    }

    pub async fn save_strict(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<()> {
        self.save_with(conn, record, true).await.map(|_| ())
    }

    async fn save_with(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
        raise: bool,
    ) -> ParanoidResult<Outcome> {
        let def = self.schema.entity(record.entity())?;
        if record.is_destroyed() {
            return refuse(record, raise, "record was destroyed");
        }
        if let Some(config) = def.paranoid_config() {
            if is_record_deleted(config, record) {
                return refuse(record, raise, "cannot save a deleted record");
            }
        }
        if record.is_new() {
            return self.insert_with(conn, record, raise).await;
        }
        self.persist(conn, def, record, None, raise).await
    }

    /// Replace `record` with the current stored row, deleted or not.
    pub async fn reload(&self, conn: &mut SqliteConnection, record: &mut Record) -> ParanoidResult<()> {
        let def = self.schema.entity(record.entity())?;
        let id = record.id().ok_or_else(|| {
            CoreError::Validation(format!("cannot reload an unsaved {}", def.name()))
        })?;
        let scope = unscoped(def)?;
        match scope.where_id(id).first(conn).await? {
            Some(fresh) => {
                *record = fresh;
                Ok(())
            }
            None => Err(not_found(def, id)),
        }
    }

    /// Find an active row by id.
    pub async fn find(
        &self,
        conn: &mut SqliteConnection,
        entity: &str,
        id: DbId,
    ) -> ParanoidResult<Record> {
        let def = self.schema.entity(entity)?;
        Scope::for_entity(def)
            .where_id(id)
            .first(conn)
            .await?
            .ok_or_else(|| not_found(def, id))
    }

    /// Find a row by id whether or not it is soft-deleted.
    pub async fn find_with_deleted(
        &self,
        conn: &mut SqliteConnection,
        entity: &str,
        id: DbId,
    ) -> ParanoidResult<Record> {
        let (def, _) = self.schema.paranoid(entity)?;
        Scope::for_entity(def)
            .with_deleted()?
            .where_id(id)
            .first(conn)
            .await?
            .ok_or_else(|| not_found(def, id))
    }

    /// Write changed columns. Runs `Validate` hooks first.
    ///
    /// With a `marker_guard` the marker column is written too, and only if
    /// the row still matches the guard scope.
    pub(crate) async fn persist(
        &self,
        conn: &mut SqliteConnection,
        def: &EntityDef,
        record: &mut Record,
        marker_guard: Option<&Scope>,
        raise: bool,
    ) -> ParanoidResult<Outcome> {
        if let Some(outcome) = self.check_valid(record, raise)? {
            return Ok(outcome);
        }
        let id = record
            .id()
            .ok_or_else(|| CoreError::Internal(format!("{} record has no primary key", def.name())))?;

        let mut columns: Vec<String> = record
            .changed_columns()
            .filter(|column| *column != def.primary_key_column())
            .map(str::to_string)
            .collect();
        if marker_guard.is_some() {
            if let Some(config) = def.paranoid_config() {
                if !columns.iter().any(|c| c == config.column()) {
                    columns.push(config.column().to_string());
                }
            }
        }
        if columns.is_empty() {
            return Ok(Outcome::Applied);
        }

        let mut assignments = Vec::with_capacity(columns.len());
        for column in &columns {
            validate_identifier(column)?;
            assignments.push(format!("{column} = ?"));
        }
        let (clause, guard_binds) = match marker_guard {
            Some(scope) => scope.where_clause()?,
            None => (
                format!("{} = ?", def.primary_key_column()),
                vec![Value::Integer(id)],
            ),
        };
        let sql = format!(
            "UPDATE {} SET {} WHERE {clause}",
            def.table_name(),
            assignments.join(", "),
        );

        let mut query = sqlx::query(&sql);
        for column in &columns {
            query = bind_value(query, record.get(column));
        }
        match bind_all(query, &guard_binds).execute(&mut *conn).await {
            Ok(result) if result.rows_affected() == 0 => refuse(
                record,
                raise,
                format!("{} {id} no longer exists or changed state", def.name()),
            ),
            Ok(_) => {
                record.clear_changes();
                Ok(Outcome::Applied)
            }
            Err(err) => unique_violation_or(record, raise, err.into()),
        }
    }

    /// `Some(outcome)` when validation refuses the record and `raise` is off.
    fn check_valid(&self, record: &Record, raise: bool) -> ParanoidResult<Option<Outcome>> {
        let messages = self.hooks.validate(record);
        if messages.is_empty() {
            return Ok(None);
        }
        if raise {
            return Err(ParanoidError::RecordInvalid {
                entity: record.entity().to_string(),
                messages,
            });
        }
        Ok(Some(Outcome::rejected(messages.join(", "))))
    }
}

/// Write the marker column of the single row `guard` narrows to, bypassing
/// validation and dirty tracking. Returns the number of rows touched, which
/// is zero when the row is gone or no longer matches `guard`.
pub(crate) async fn write_marker(
    conn: &mut SqliteConnection,
    def: &EntityDef,
    config: &ParanoidConfig,
    guard: &Scope,
    value: &Value,
) -> ParanoidResult<u64> {
    let (clause, binds) = guard.where_clause()?;
    let sql = format!(
        "UPDATE {} SET {} = ? WHERE {clause}",
        def.table_name(),
        config.column(),
    );
    let query = bind_value(sqlx::query(&sql), value);
    let result = bind_all(query, &binds).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// The stored row with `id`, deleted or not. `None` once it is removed.
pub(crate) async fn load_row(
    conn: &mut SqliteConnection,
    def: &EntityDef,
    id: DbId,
) -> ParanoidResult<Option<Record>> {
    unscoped(def)?.where_id(id).first(conn).await
}

/// Physically remove one row. Returns the number of rows removed.
pub(crate) async fn remove_row(
    conn: &mut SqliteConnection,
    def: &EntityDef,
    id: DbId,
) -> ParanoidResult<u64> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        def.table_name(),
        def.primary_key_column()
    );
    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

fn unscoped(def: &EntityDef) -> Result<Scope, CoreError> {
    let scope = Scope::for_entity(def);
    if def.is_paranoid() {
        scope.with_deleted()
    } else {
        Ok(scope)
    }
}

fn not_found(def: &EntityDef, id: DbId) -> ParanoidError {
    CoreError::NotFound {
        entity: def.name().to_string(),
        id,
    }
    .into()
}

pub(crate) fn refuse(
    record: &Record,
    raise: bool,
    reason: impl Into<String>,
) -> ParanoidResult<Outcome> {
    let reason = reason.into();
    if raise {
        return Err(ParanoidError::RecordNotSaved {
            entity: record.entity().to_string(),
            reason,
        });
    }
    Ok(Outcome::rejected(reason))
}

/// Unique violations are a rejection for non-raising calls; everything else
/// propagates.
fn unique_violation_or(record: &Record, raise: bool, err: ParanoidError) -> ParanoidResult<Outcome> {
    if err.is_unique_violation() && !raise {
        tracing::debug!(entity = record.entity(), error = %err, "Unique violation");
        return Ok(Outcome::rejected(err.to_string()));
    }
    Err(err)
}
