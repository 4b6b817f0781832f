//! Recovery coordinator.

use chrono::Duration;
use futures::future::BoxFuture;
use paranoid_core::classifier::{is_deleted, is_record_deleted, value_for_recover};
use paranoid_core::error::CoreError;
use paranoid_core::hooks::LifecycleEvent;
use paranoid_core::outcome::Outcome;
use paranoid_core::paranoid::ParanoidConfig;
use paranoid_core::record::Record;
use sqlx::{Connection, SqliteConnection};

use crate::cascade::{CascadeContext, Walk};
use crate::counter_cache::{CounterCacheAdjuster, CounterTransition};
use crate::error::{ParanoidError, ParanoidResult};
use crate::paranoia::Paranoia;
use crate::persistence::{load_row, refuse};
use crate::scope::Scope;

/// Per-call recovery options. Unset fields fall back to the entity's
/// [`ParanoidConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverOptions {
    pub recursive: Option<bool>,
    pub recovery_window: Option<Duration>,
    pub raise_on_failure: bool,
}

impl RecoverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = Some(recursive);
        self
    }

    pub fn recovery_window(mut self, window: Duration) -> Self {
        self.recovery_window = Some(window);
        self
    }

    pub fn raise_on_failure(mut self, raise: bool) -> Self {
        self.raise_on_failure = raise;
        self
    }

    pub(crate) fn plan(&self, config: &ParanoidConfig) -> RecoveryPlan {
        RecoveryPlan {
            recursive: self
                .recursive
                .unwrap_or_else(|| config.recursive_recovery_default()),
            window: self
                .recovery_window
                .unwrap_or_else(|| config.recovery_window_default()),
            raise: self.raise_on_failure,
        }
    }
}

/// Options resolved once at the top of a recover call and passed unchanged
/// down the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecoveryPlan {
    pub recursive: bool,
    pub window: Duration,
    pub raise: bool,
}

impl Paranoia {
    /// Recover a soft-deleted record, and its dependents when recursive.
    ///
    /// Returns [`Outcome::Unchanged`] without running any hook if the record
    /// is not deleted.
    pub async fn recover(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
        options: RecoverOptions,
    ) -> ParanoidResult<Outcome> {
        let (_, config) = self.schema.paranoid(record.entity())?;
        let plan = options.plan(config);

        if record.is_destroyed() {
            return refuse(record, plan.raise, "record was destroyed");
        }
        if !is_deleted(config, record.get(config.column())) {
            tracing::debug!(entity = record.entity(), id = ?record.id(), "Not deleted, nothing to recover");
            return Ok(Outcome::Unchanged);
        }

        if record.is_new() {
            record.write_silently(config.column(), value_for_recover(config));
            return Ok(Outcome::Applied);
        }

        let nested = conn.is_in_transaction();
        let mut tx = conn.begin().await?;
        let mut ctx = CascadeContext::new(self.now()).inside_transaction(nested);
        ctx.visit(record);
        let result = self.recover_record(&mut *tx, record, plan, &mut ctx).await;
        self.finish(tx, result, ctx).await
    }

    /// [`recover`](Self::recover) with `raise_on_failure` forced on.
    pub async fn recover_strict(
        &self,
        conn: &mut SqliteConnection,
        record: &mut Record,
        options: RecoverOptions,
    ) -> ParanoidResult<()> {
        let outcome = self
            .recover(conn, record, options.raise_on_failure(true))
            .await?;
        match outcome {
            Outcome::Rejected { reason } => Err(ParanoidError::RecordNotSaved {
                entity: record.entity().to_string(),
                reason,
            }),
            Outcome::Applied | Outcome::Unchanged => Ok(()),
        }
    }

    /// Recover one deleted record inside an open transaction.
    ///
    /// A row already active in storage is left alone and `record` is
    /// brought in step with it. Otherwise the order is `before_recover`,
    /// cascade, guarded persist of the cleared marker, counter caches,
    /// `after_recover`.
    pub(crate) fn recover_record<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        record: &'a mut Record,
        plan: RecoveryPlan,
        ctx: &'a mut CascadeContext,
    ) -> BoxFuture<'a, ParanoidResult<Outcome>> {
        Box::pin(async move {
            let def = self.schema.entity(record.entity())?;
            let config = def.require_paranoid()?;
            let id = record.id().ok_or_else(|| {
                CoreError::Internal(format!("{} record has no primary key", def.name()))
            })?;

            let Some(stored) = load_row(conn, def, id).await? else {
                let reason = format!("{} {id} no longer exists", def.name());
                return refuse(record, plan.raise, reason);
            };
            if !is_record_deleted(config, &stored) {
                record.write_silently(config.column(), stored.get(config.column()).clone());
                tracing::debug!(entity = def.name(), id, "Already active in storage");
                return Ok(Outcome::Unchanged);
            }

            if let Err(err) = self.hooks.run(LifecycleEvent::BeforeRecover, record) {
                tracing::debug!(entity = def.name(), id, error = %err, "Recover halted by hook");
                return refuse(record, plan.raise, err.to_string());
            }

            if plan.recursive {
                let outcome = self
                    .walk(conn, record, Walk::Recover(plan), ctx)
                    .await?;
                if !outcome.succeeded() {
                    return Ok(outcome);
                }
            }

            record.write_silently(config.column(), value_for_recover(config));
            let guard = Scope::for_entity(def).only_deleted()?.where_id(id);
            let outcome = self.persist(conn, def, record, Some(&guard), plan.raise).await?;
            if !outcome.succeeded() {
                return Ok(outcome);
            }

            CounterCacheAdjuster::apply(conn, &self.schema, record, CounterTransition::Recover)
                .await?;

            self.hooks.run(LifecycleEvent::AfterRecover, record)?;
            self.defer_after_commit(ctx, LifecycleEvent::AfterCommitRecover, record);

            tracing::info!(
                entity = def.name(),
                id,
                recursive = plan.recursive,
                "Recovered"
            );
            Ok(Outcome::Applied)
        })
    }
}
