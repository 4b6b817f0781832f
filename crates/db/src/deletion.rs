//! Deletion coordinator: soft delete, hard delete and their batch forms.

use futures::future::BoxFuture;
use paranoid_core::classifier::{is_deleted, is_record_deleted, value_for_delete};
use paranoid_core::error::CoreError;
use paranoid_core::hooks::LifecycleEvent;
use paranoid_core::outcome::Outcome;
use paranoid_core::record::Record;
use paranoid_core::schema::EntityDef;
use paranoid_core::types::DbId;
use sqlx::{Connection, SqliteConnection};

use crate::cascade::{CascadeContext, Walk};
use crate::counter_cache::{CounterCacheAdjuster, CounterTransition};
use crate::error::{ParanoidError, ParanoidResult};
use crate::paranoia::Paranoia;
use crate::persistence::{load_row, remove_row, write_marker};
use crate::scope::{Scope, Visibility};

/// Which parts of a soft delete run for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeleteMode {
    pub cascade: bool,
    pub hooks: bool,
}

impl DeleteMode {
    pub const DESTROY: Self = Self {
        cascade: true,
        hooks: true,
    };
    pub const DELETE: Self = Self {
        cascade: false,
        hooks: true,
    };
    /// Bulk forms: marker and counters only.
    pub const SILENT: Self = Self {
        cascade: false,
        hooks: false,
    };
}

impl Paranoia {
    /// Soft delete `record` without cascading. Hooks still run.
    ///
    /// Returns [`Outcome::Unchanged`] if the record is already deleted.
    pub async fn delete(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<Outcome> {
        self.soft_delete(conn, record, DeleteMode::DELETE).await
    }

    pub async fn delete_strict(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<()> {
        let outcome = self.delete(conn, record).await?;
        require_destroyed(record, outcome)
    }

    /// Soft delete `record` and cascade into its `dependent` associations.
    ///
    /// With double tap enabled, destroying an already soft-deleted record
    /// removes it physically.
    pub async fn destroy(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<Outcome> {
        self.soft_delete(conn, record, DeleteMode::DESTROY).await
    }

    pub async fn destroy_strict(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<()> {
        let outcome = self.destroy(conn, record).await?;
        require_destroyed(record, outcome)
    }

    /// Physically remove `record`, running destroy hooks and the full
    /// destroy cascade.
    pub async fn destroy_fully(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<()> {
        self.schema.paranoid(record.entity())?;
        let outcome = self.hard_delete(conn, record).await?;
        require_destroyed(record, outcome)
    }

    async fn soft_delete(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
        mode: DeleteMode,
    ) -> ParanoidResult<Outcome> {
        let (_, config) = self.schema.paranoid(record.entity())?;

        if record.is_destroyed() {
            return Ok(Outcome::Unchanged);
        }

        if is_deleted(config, record.get(config.column())) {
            if mode.cascade && config.double_tap() && record.is_persisted() {
                tracing::debug!(entity = record.entity(), id = ?record.id(), "Double tap, destroying fully");
                return self.hard_delete(conn, record).await;
            }
            tracing::debug!(entity = record.entity(), id = ?record.id(), "Already deleted");
            return Ok(Outcome::Unchanged);
        }

        let now = self.now();

        if record.is_new() {
            record.write_silently(config.column(), value_for_delete(config, now));
            return Ok(Outcome::Applied);
        }

        let nested = conn.is_in_transaction();
        let mut tx = conn.begin().await?;
        let mut ctx = CascadeContext::new(now).inside_transaction(nested);
        ctx.visit(record);
        let result = self.soft_delete_record(&mut *tx, record, mode, &mut ctx).await;
        self.finish(tx, result, ctx).await
    }

    async fn hard_delete(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
    ) -> ParanoidResult<Outcome> {
        if record.is_destroyed() {
            return Ok(Outcome::Unchanged);
        }
        if record.is_new() {
            record.mark_destroyed();
            return Ok(Outcome::Applied);
        }

        let nested = conn.is_in_transaction();
        let mut tx = conn.begin().await?;
        let mut ctx = CascadeContext::new(self.now()).inside_transaction(nested);
        ctx.visit(record);
        let result = self.hard_delete_record(&mut *tx, record, &mut ctx).await;
        self.finish(tx, result, ctx).await
    }

    /// Soft delete one persisted record inside an open transaction.
    ///
    /// The stored row decides: a row already deleted in storage is left
    /// alone and `record` is brought in step with it. Otherwise the order is
    /// `before_destroy`, cascade, marker write, counter caches,
    /// `after_destroy`. `after_commit` hooks are deferred to `ctx`.
    pub(crate) fn soft_delete_record<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        record: &'a mut Record,
        mode: DeleteMode,
        ctx: &'a mut CascadeContext,
    ) -> BoxFuture<'a, ParanoidResult<Outcome>> {
        Box::pin(async move {
            let def = self.schema.entity(record.entity())?;
            let config = def.require_paranoid()?;
            let id = persisted_id(record)?;

            let Some(stored) = load_row(conn, def, id).await? else {
                return Ok(Outcome::rejected(format!(
                    "{} {id} no longer exists",
                    def.name()
                )));
            };
            if is_record_deleted(config, &stored) {
                record.write_silently(config.column(), stored.get(config.column()).clone());
                tracing::debug!(entity = def.name(), id, "Already deleted in storage");
                return Ok(Outcome::Unchanged);
            }

            if mode.hooks {
                if let Err(err) = self.hooks.run(LifecycleEvent::BeforeDestroy, record) {
                    tracing::debug!(entity = def.name(), id, error = %err, "Destroy halted by hook");
                    return Ok(Outcome::rejected(err.to_string()));
                }
            }

            if mode.cascade {
                let outcome = self.walk(conn, record, Walk::SoftDelete, ctx).await?;
                if !outcome.succeeded() {
                    return Ok(outcome);
                }
            }

            let value = value_for_delete(config, ctx.now);
            let guard = Scope::for_entity(def).where_id(id);
            if write_marker(conn, def, config, &guard, &value).await? == 0 {
                tracing::debug!(entity = def.name(), id, "Deleted concurrently, nothing written");
                return Ok(Outcome::Unchanged);
            }
            record.write_silently(config.column(), value);

            CounterCacheAdjuster::apply(conn, &self.schema, record, CounterTransition::SoftDelete)
                .await?;

            if mode.hooks {
                self.hooks.run(LifecycleEvent::AfterDestroy, record)?;
                self.defer_after_commit(ctx, LifecycleEvent::AfterCommitDestroy, record);
            }

            tracing::info!(entity = def.name(), id, cascade = mode.cascade, "Soft deleted");
            Ok(Outcome::Applied)
        })
    }

    /// Physically remove one persisted record inside an open transaction.
    pub(crate) fn hard_delete_record<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        record: &'a mut Record,
        ctx: &'a mut CascadeContext,
    ) -> BoxFuture<'a, ParanoidResult<Outcome>> {
        Box::pin(async move {
            let def = self.schema.entity(record.entity())?;
            let id = persisted_id(record)?;

            if let Err(err) = self.hooks.run(LifecycleEvent::BeforeDestroy, record) {
                tracing::debug!(entity = def.name(), id, error = %err, "Destroy halted by hook");
                return Ok(Outcome::rejected(err.to_string()));
            }

            let outcome = self.walk(conn, record, Walk::HardDelete, ctx).await?;
            if !outcome.succeeded() {
                return Ok(outcome);
            }

            let Some(stored) = load_row(conn, def, id).await? else {
                return Ok(Outcome::rejected(format!(
                    "{} {id} no longer exists",
                    def.name()
                )));
            };
            let was_active = match def.paranoid_config() {
                Some(config) => !is_record_deleted(config, &stored),
                None => true,
            };
            CounterCacheAdjuster::apply(
                conn,
                &self.schema,
                record,
                CounterTransition::HardDelete { was_active },
            )
            .await?;

            if remove_row(conn, def, id).await? == 0 {
                return Ok(Outcome::rejected(format!(
                    "{} {id} no longer exists",
                    def.name()
                )));
            }
            record.mark_destroyed();

            self.hooks.run(LifecycleEvent::AfterDestroy, record)?;
            self.defer_after_commit(ctx, LifecycleEvent::AfterCommitDestroy, record);

            tracing::info!(entity = def.name(), id, "Destroyed fully");
            Ok(Outcome::Applied)
        })
    }

    // -- batch forms --------------------------------------------------------

    /// Soft delete the row with `id` without hooks or cascade.
    pub async fn delete_by_id(
        &self,
        conn: &mut SqliteConnection,
        entity: &str,
        id: DbId,
    ) -> ParanoidResult<Record> {
        let mut records = self.delete_by_ids(conn, entity, &[id]).await?;
        records.pop().ok_or_else(|| not_found(entity, id))
    }

    /// Soft delete each row in `ids`, in order, in one transaction.
    pub async fn delete_by_ids(
        &self,
        conn: &mut SqliteConnection,
        entity: &str,
        ids: &[DbId],
    ) -> ParanoidResult<Vec<Record>> {
        self.delete_each(conn, entity, ids, DeleteMode::SILENT).await
    }

    /// Destroy the row with `id`, running hooks and the cascade.
    pub async fn destroy_by_id(
        &self,
        conn: &mut SqliteConnection,
        entity: &str,
        id: DbId,
    ) -> ParanoidResult<Record> {
        let mut records = self.destroy_by_ids(conn, entity, &[id]).await?;
        records.pop().ok_or_else(|| not_found(entity, id))
    }

    /// Destroy each row in `ids`, in order, in one transaction. A rejected
    /// record aborts the whole batch.
    pub async fn destroy_by_ids(
        &self,
        conn: &mut SqliteConnection,
        entity: &str,
        ids: &[DbId],
    ) -> ParanoidResult<Vec<Record>> {
        self.delete_each(conn, entity, ids, DeleteMode::DESTROY).await
    }

    async fn delete_each(
        &self,
        conn: &mut SqliteConnection,
        entity: &str,
        ids: &[DbId],
        mode: DeleteMode,
    ) -> ParanoidResult<Vec<Record>> {
        let (def, _) = self.schema.paranoid(entity)?;

        let nested = conn.is_in_transaction();
        let mut tx = conn.begin().await?;
        let mut ctx = CascadeContext::new(self.now()).inside_transaction(nested);
        let result = self.delete_loaded(&mut *tx, def, ids, mode, &mut ctx).await;
        self.settle(tx, result, ctx).await
    }

    async fn delete_loaded(
        &self,
        conn: &mut SqliteConnection,
        def: &EntityDef,
        ids: &[DbId],
        mode: DeleteMode,
        ctx: &mut CascadeContext,
    ) -> ParanoidResult<Vec<Record>> {
        let config = def.require_paranoid()?;
        let mut records = Vec::with_capacity(ids.len());

        for &id in ids {
            let mut record = Scope::for_entity(def)
                .with_deleted()?
                .where_id(id)
                .first(conn)
                .await?
                .ok_or_else(|| not_found(def.name(), id))?;

            if ctx.visit(&record) && !is_record_deleted(config, &record) {
                let outcome = self.soft_delete_record(conn, &mut record, mode, ctx).await?;
                require_destroyed(&record, outcome)?;
            }
            records.push(record);
        }

        tracing::info!(entity = def.name(), count = records.len(), "Batch soft delete");
        Ok(records)
    }

    /// Soft delete every active row in `scope` without hooks or cascade.
    /// Counter caches are kept in step. Returns the number of rows marked.
    pub async fn delete_all(&self, conn: &mut SqliteConnection, scope: Scope) -> ParanoidResult<u64> {
        let (_, config) = self.schema.paranoid(scope.entity())?;

        let nested = conn.is_in_transaction();
        let mut tx = conn.begin().await?;
        let mut ctx = CascadeContext::new(self.now()).inside_transaction(nested);
        let result: ParanoidResult<u64> = async {
            let mut marked = 0;
            for mut record in scope.fetch_all(&mut *tx).await? {
                if is_record_deleted(config, &record) || !ctx.visit(&record) {
                    continue;
                }
                let outcome = self
                    .soft_delete_record(&mut *tx, &mut record, DeleteMode::SILENT, &mut ctx)
                    .await?;
                require_destroyed(&record, outcome)?;
                marked += 1;
            }
            Ok(marked)
        }
        .await;

        if let Ok(marked) = &result {
            tracing::info!(entity = scope.entity(), count = marked, "Bulk soft delete");
        }
        self.settle(tx, result, ctx).await
    }

    /// Physically remove every row in `scope` without hooks. An active-only
    /// scope is widened to include soft-deleted rows. Returns the number of
    /// rows removed.
    pub async fn delete_all_fully(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
    ) -> ParanoidResult<u64> {
        let (def, config) = self.schema.paranoid(scope.entity())?;
        let scope = if scope.visibility() == Visibility::Active {
            scope.with_deleted()?
        } else {
            scope
        };

        let nested = conn.is_in_transaction();
        let mut tx = conn.begin().await?;
        let ctx = CascadeContext::new(self.now()).inside_transaction(nested);
        let result: ParanoidResult<u64> = async {
            let mut removed = 0;
            for record in scope.fetch_all(&mut *tx).await? {
                let id = persisted_id(&record)?;
                let was_active = !is_deleted(config, record.get(config.column()));
                CounterCacheAdjuster::apply(
                    &mut *tx,
                    &self.schema,
                    &record,
                    CounterTransition::HardDelete { was_active },
                )
                .await?;
                removed += remove_row(&mut *tx, def, id).await?;
            }
            Ok(removed)
        }
        .await;

        if let Ok(removed) = &result {
            tracing::info!(entity = def.name(), count = removed, "Bulk hard delete");
        }
        self.settle(tx, result, ctx).await
    }
}

fn persisted_id(record: &Record) -> Result<DbId, CoreError> {
    record.id().ok_or_else(|| {
        CoreError::Internal(format!("{} record has no primary key", record.entity()))
    })
}

fn not_found(entity: &str, id: DbId) -> ParanoidError {
    CoreError::NotFound {
        entity: entity.to_string(),
        id,
    }
    .into()
}

fn require_destroyed(record: &Record, outcome: Outcome) -> ParanoidResult<()> {
    match outcome {
        Outcome::Rejected { reason } => Err(ParanoidError::RecordNotDestroyed {
            entity: record.entity().to_string(),
            reason,
        }),
        Outcome::Applied | Outcome::Unchanged => Ok(()),
    }
}
