//! The `Paranoia` facade: schema, hooks and clock shared by every operation.
//!
//! Lifecycle operations are split across `deletion`, `recovery` and
//! `persistence`, each adding an `impl Paranoia` block. This module holds the
//! capability checks, scope accessors and the transaction finishing logic
//! they share.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use futures::future::BoxFuture;
use paranoid_core::classifier::{is_deleted_fully, is_record_deleted};
use paranoid_core::clock::{Clock, SystemClock};
use paranoid_core::error::CoreError;
use paranoid_core::hooks::{HookRegistry, LifecycleEvent};
use paranoid_core::outcome::Outcome;
use paranoid_core::record::Record;
use paranoid_core::schema::Schema;
use paranoid_core::types::Timestamp;
use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};

use crate::cascade::CascadeContext;
use crate::error::ParanoidResult;
use crate::scope::{Predicate, Scope};

#[derive(Clone)]
pub struct Paranoia {
    pub(crate) schema: Arc<Schema>,
    pub(crate) hooks: Arc<HookRegistry>,
    clock: Arc<dyn Clock>,
    /// After-commit hooks held for the transaction opened by
    /// [`Paranoia::transaction`].
    pending: Option<Arc<Mutex<Vec<(LifecycleEvent, Record)>>>>,
}

impl fmt::Debug for Paranoia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paranoia")
            .field("schema", &self.schema)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Paranoia {
    pub fn new(schema: Schema, hooks: HookRegistry) -> Self {
        Self {
            schema: Arc::new(schema),
            hooks: Arc::new(hooks),
            clock: Arc::new(SystemClock),
            pending: None,
        }
    }

    /// Replace the time source used to stamp deletions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn is_paranoid(&self, entity: &str) -> bool {
        self.schema.is_paranoid(entity)
    }

    // -- scopes -------------------------------------------------------------

    /// Default scope: active rows only for paranoid types.
    pub fn all(&self, entity: &str) -> Result<Scope, CoreError> {
        Ok(Scope::for_entity(self.schema.entity(entity)?))
    }

    pub fn with_deleted(&self, entity: &str) -> Result<Scope, CoreError> {
        let (def, _) = self.schema.paranoid(entity)?;
        Scope::for_entity(def).with_deleted()
    }

    pub fn only_deleted(&self, entity: &str) -> Result<Scope, CoreError> {
        let (def, _) = self.schema.paranoid(entity)?;
        Scope::for_entity(def).only_deleted()
    }

    pub fn deleted_before(&self, entity: &str, at: Timestamp) -> Result<Scope, CoreError> {
        let (def, _) = self.schema.paranoid(entity)?;
        Scope::for_entity(def).deleted_before(at)
    }

    pub fn deleted_after(&self, entity: &str, at: Timestamp) -> Result<Scope, CoreError> {
        let (def, _) = self.schema.paranoid(entity)?;
        Scope::for_entity(def).deleted_after(at)
    }

    pub fn deleted_inside_window(
        &self,
        entity: &str,
        reference: Timestamp,
        window: Duration,
    ) -> Result<Scope, CoreError> {
        let (def, _) = self.schema.paranoid(entity)?;
        Scope::for_entity(def).deleted_inside_window(reference, window)
    }

    /// Count every row of `entity`, deleted or not, optionally narrowed by
    /// `predicate`.
    pub async fn count_with_deleted(
        &self,
        conn: &mut SqliteConnection,
        entity: &str,
        predicate: Option<Predicate>,
    ) -> ParanoidResult<i64> {
        let mut scope = self.with_deleted(entity)?;
        if let Some(predicate) = predicate {
            scope = scope.filter(predicate);
        }
        scope.count(conn).await
    }

    // -- predicates ---------------------------------------------------------

    /// Whether `record` is soft-deleted (or was physically destroyed).
    pub fn is_deleted(&self, record: &Record) -> Result<bool, CoreError> {
        let (_, config) = self.schema.paranoid(record.entity())?;
        Ok(is_record_deleted(config, record))
    }

    /// Whether `record` was removed from storage by a hard delete.
    pub fn is_deleted_fully(&self, record: &Record) -> Result<bool, CoreError> {
        self.schema.paranoid(record.entity())?;
        Ok(is_deleted_fully(record))
    }

    // -- transactions -------------------------------------------------------

    /// Run `work` in one transaction on `conn`, committing when it returns
    /// `Ok`.
    ///
    /// Operations called on the `Paranoia` handed to `work` hold their
    /// after-commit hooks until this transaction commits. They never fire if
    /// it rolls back.
    ///
    /// ```ignore
    /// paranoia
    ///     .transaction(&mut conn, move |paranoia, conn| {
    ///         Box::pin(async move { paranoia.destroy(conn, &mut record).await })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(
        &self,
        conn: &mut SqliteConnection,
        work: F,
    ) -> ParanoidResult<T>
    where
        F: for<'c> FnOnce(
            &'c Paranoia,
            &'c mut SqliteConnection,
        ) -> BoxFuture<'c, ParanoidResult<T>>,
    {
        let scoped = Paranoia {
            pending: Some(Arc::default()),
            ..self.clone()
        };
        let nested = conn.is_in_transaction();
        let mut tx = conn.begin().await?;
        let result = work(&scoped, &mut *tx).await;

        let mut ctx = CascadeContext::new(self.now()).inside_transaction(nested);
        for (event, record) in scoped.take_pending() {
            ctx.defer(event, record);
        }
        self.settle(tx, result, ctx).await
    }

    /// Commit on [`Outcome::Applied`], roll back otherwise, then fire the
    /// deferred after-commit hooks.
    pub(crate) async fn finish(
        &self,
        tx: Transaction<'_, Sqlite>,
        result: ParanoidResult<Outcome>,
        ctx: CascadeContext,
    ) -> ParanoidResult<Outcome> {
        match result {
            Ok(Outcome::Applied) => {
                tx.commit().await?;
                self.run_after_commit(ctx);
                Ok(Outcome::Applied)
            }
            Ok(outcome) => {
                tx.rollback().await?;
                Ok(outcome)
            }
            Err(err) => {
                rollback_quietly(tx).await;
                Err(err)
            }
        }
    }

    /// Commit on `Ok`, roll back on `Err`.
    pub(crate) async fn settle<T>(
        &self,
        tx: Transaction<'_, Sqlite>,
        result: ParanoidResult<T>,
        ctx: CascadeContext,
    ) -> ParanoidResult<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                self.run_after_commit(ctx);
                Ok(value)
            }
            Err(err) => {
                rollback_quietly(tx).await;
                Err(err)
            }
        }
    }

    /// Fire the hooks deferred in `ctx`. When the caller owns the enclosing
    /// transaction they are held for [`Paranoia::transaction`] instead, or
    /// dropped if there is none.
    fn run_after_commit(&self, ctx: CascadeContext) {
        let nested = ctx.is_nested();
        let deferred = ctx.into_deferred();
        if nested {
            self.hold_after_commit(deferred);
            return;
        }
        for (event, record) in deferred {
            if let Err(err) = self.hooks.run(event, &record) {
                tracing::warn!(
                    entity = record.entity(),
                    id = ?record.id(),
                    event = %event,
                    error = %err,
                    "After-commit hook failed"
                );
            }
        }
    }

    fn hold_after_commit(&self, deferred: Vec<(LifecycleEvent, Record)>) {
        if deferred.is_empty() {
            return;
        }
        match &self.pending {
            Some(pending) => pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(deferred),
            None => tracing::warn!(
                count = deferred.len(),
                "Connection already inside a caller transaction, after-commit hooks dropped"
            ),
        }
    }

    fn take_pending(&self) -> Vec<(LifecycleEvent, Record)> {
        match &self.pending {
            Some(pending) => {
                let mut held = pending.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *held)
            }
            None => Vec::new(),
        }
    }

    pub(crate) fn defer_after_commit(
        &self,
        ctx: &mut CascadeContext,
        event: LifecycleEvent,
        record: &Record,
    ) {
        if self.hooks.has_hooks(record.entity(), event) {
            ctx.defer(event, record.clone());
        }
    }
}

async fn rollback_quietly(tx: Transaction<'_, Sqlite>) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!(error = %err, "Rollback failed");
    }
}
