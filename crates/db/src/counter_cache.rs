//! Counter cache adjuster.
//!
//! Soft delete and recover neither create nor remove rows, so owners' cached
//! counts would go stale without an explicit adjustment. Physical creation
//! and removal go through here too since this crate is also the storage
//! collaborator.

use paranoid_core::association::{Association, TargetLink};
use paranoid_core::record::Record;
use paranoid_core::schema::Schema;
use sqlx::SqliteConnection;

use crate::error::ParanoidResult;

/// A lifecycle change of a record that may move its owners' counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterTransition {
    Create { active: bool },
    SoftDelete,
    Recover,
    HardDelete { was_active: bool },
}

impl CounterTransition {
    /// Counter delta for a cache that does or does not count deleted rows.
    pub fn delta(self, counts_deleted: bool) -> i64 {
        use CounterTransition::*;
        match (self, counts_deleted) {
            (Create { .. }, true) => 1,
            (Create { active }, false) => i64::from(active),
            (SoftDelete | Recover, true) => 0,
            (SoftDelete, false) => -1,
            (Recover, false) => 1,
            (HardDelete { .. }, true) => -1,
            (HardDelete { was_active }, false) => -i64::from(was_active),
        }
    }
}

pub struct CounterCacheAdjuster;

impl CounterCacheAdjuster {
    /// Add `delta` to the counter column on the owner `assoc` points at.
    ///
    /// Returns `false` when there is nothing to adjust: no counter cache, an
    /// unset foreign key, or an owner row that no longer exists.
    pub async fn adjust(
        conn: &mut SqliteConnection,
        schema: &Schema,
        record: &Record,
        assoc: &Association,
        delta: i64,
    ) -> ParanoidResult<bool> {
        let Some(counter) = assoc.counter() else {
            return Ok(false);
        };
        let Some(TargetLink::PrimaryKey(owner_id)) = assoc.link(record) else {
            return Ok(false);
        };
        let Some(owner) = assoc.resolve_target(record, schema)? else {
            return Ok(false);
        };

        let sql = format!(
            "UPDATE {table} SET {col} = COALESCE({col}, 0) + ? WHERE {pk} = ?",
            table = owner.table_name(),
            col = counter.column,
            pk = owner.primary_key_column(),
        );
        let result = sqlx::query(&sql)
            .bind(delta)
            .bind(owner_id)
            .execute(&mut *conn)
            .await?;

        tracing::debug!(
            owner = owner.name(),
            owner_id,
            column = %counter.column,
            delta,
            "Counter cache adjusted"
        );
        Ok(result.rows_affected() > 0)
    }

    /// Apply `transition` to every counter cache declared on `record`'s type.
    pub async fn apply(
        conn: &mut SqliteConnection,
        schema: &Schema,
        record: &Record,
        transition: CounterTransition,
    ) -> ParanoidResult<()> {
        let def = schema.entity(record.entity())?;
        for assoc in def.counter_cached() {
            let Some(counter) = assoc.counter() else {
                continue;
            };
            let delta = transition.delta(counter.counts_deleted);
            if delta != 0 {
                Self::adjust(conn, schema, record, assoc, delta).await?;
            }
        }
        Ok(())
    }
}
