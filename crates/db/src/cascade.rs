//! Cascade walker: propagates a delete, hard delete or recover across
//! dependent associations.
//!
//! Every node reached during one top-level call is recorded in the
//! [`CascadeContext`]. A node seen before is skipped, so a cyclic association
//! graph terminates whatever the scope state of its members.

use std::collections::HashSet;

use futures::future::BoxFuture;
use paranoid_core::association::{Association, Dependent, TargetLink};
use paranoid_core::classifier::deletion_time;
use paranoid_core::hooks::LifecycleEvent;
use paranoid_core::outcome::Outcome;
use paranoid_core::record::Record;
use paranoid_core::schema::EntityDef;
use paranoid_core::types::{DbId, Timestamp};
use sqlx::SqliteConnection;

use crate::deletion::DeleteMode;
use crate::error::ParanoidResult;
use crate::paranoia::Paranoia;
use crate::recovery::RecoveryPlan;
use crate::scope::Scope;

/// Per-call state threaded through a cascade.
#[derive(Debug)]
pub(crate) struct CascadeContext {
    /// The single clock reading used for every marker written in this call.
    pub now: Timestamp,
    visited: HashSet<(String, DbId)>,
    deferred: Vec<(LifecycleEvent, Record)>,
    nested: bool,
}

impl CascadeContext {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now,
            visited: HashSet::new(),
            deferred: Vec::new(),
            nested: false,
        }
    }

    /// Mark the call as running inside a transaction the caller owns. Its
    /// own commit is then only a savepoint release.
    pub fn inside_transaction(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Record a visit. Returns `false` if `record` was already visited.
    pub fn visit(&mut self, record: &Record) -> bool {
        match record.id() {
            Some(id) => self.visited.insert((record.entity().to_string(), id)),
            None => true,
        }
    }

    pub fn defer(&mut self, event: LifecycleEvent, record: Record) {
        self.deferred.push((event, record));
    }

    pub fn into_deferred(self) -> Vec<(LifecycleEvent, Record)> {
        self.deferred
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Walk {
    SoftDelete,
    HardDelete,
    Recover(RecoveryPlan),
}

impl Walk {
    fn as_str(self) -> &'static str {
        match self {
            Walk::SoftDelete => "soft_delete",
            Walk::HardDelete => "hard_delete",
            Walk::Recover(_) => "recover",
        }
    }
}

impl Paranoia {
    /// Walk the dependent associations of `record` in declaration order.
    ///
    /// Stops at the first dependent that is rejected and returns its outcome.
    pub(crate) fn walk<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        record: &'a Record,
        walk: Walk,
        ctx: &'a mut CascadeContext,
    ) -> BoxFuture<'a, ParanoidResult<Outcome>> {
        Box::pin(async move {
            let def = self.schema.entity(record.entity())?;

            for assoc in def.associations() {
                let eligible = match walk {
                    Walk::Recover(_) => assoc.is_recoverable(),
                    Walk::SoftDelete | Walk::HardDelete => assoc.cascades_on_delete(),
                };
                if !eligible {
                    continue;
                }

                let Some(target) = assoc.resolve_target(record, &self.schema)? else {
                    tracing::debug!(
                        entity = record.entity(),
                        association = assoc.name(),
                        "Polymorphic target unset, skipping"
                    );
                    continue;
                };
                let Some(link) = assoc.link(record) else {
                    continue;
                };

                tracing::debug!(
                    entity = record.entity(),
                    id = ?record.id(),
                    association = assoc.name(),
                    target = target.name(),
                    direction = walk.as_str(),
                    "Cascading"
                );

                let outcome = match walk {
                    Walk::SoftDelete => {
                        self.cascade_soft_delete(conn, assoc, target, &link, ctx)
                            .await?
                    }
                    Walk::HardDelete => {
                        self.cascade_hard_delete(conn, assoc, target, &link, ctx)
                            .await?
                    }
                    Walk::Recover(plan) => {
                        self.cascade_recover(conn, record, target, &link, plan, ctx)
                            .await?
                    }
                };
                if !outcome.succeeded() {
                    return Ok(outcome);
                }
            }

            Ok(Outcome::Applied)
        })
    }

    async fn cascade_soft_delete(
        &self,
        conn: &mut SqliteConnection,
        assoc: &Association,
        target: &EntityDef,
        link: &TargetLink,
        ctx: &mut CascadeContext,
    ) -> ParanoidResult<Outcome> {
        let scope = Scope::for_entity(target).linked(link);

        if !target.is_paranoid() {
            // Ordinary dependent behaviour for targets without a marker.
            return match assoc.dependent_behavior() {
                Dependent::Destroy => self.hard_delete_each(conn, &scope, ctx).await,
                Dependent::DeleteAll => {
                    let removed = scope.delete_rows(conn).await?;
                    tracing::debug!(target = target.name(), count = removed, "Bulk removed dependents");
                    Ok(Outcome::Applied)
                }
                Dependent::None => Ok(Outcome::Applied),
            };
        }

        let mode = match assoc.dependent_behavior() {
            Dependent::Destroy => DeleteMode::DESTROY,
            Dependent::DeleteAll => DeleteMode::SILENT,
            Dependent::None => return Ok(Outcome::Applied),
        };

        for mut child in scope.fetch_all(conn).await? {
            if !ctx.visit(&child) {
                log_cycle_cut(&child);
                continue;
            }
            let outcome = self
                .soft_delete_record(conn, &mut child, mode, ctx)
                .await?;
            if !outcome.succeeded() {
                return Ok(outcome);
            }
        }
        Ok(Outcome::Applied)
    }

    async fn cascade_hard_delete(
        &self,
        conn: &mut SqliteConnection,
        assoc: &Association,
        target: &EntityDef,
        link: &TargetLink,
        ctx: &mut CascadeContext,
    ) -> ParanoidResult<Outcome> {
        let mut scope = Scope::for_entity(target).linked(link);
        if target.is_paranoid() {
            scope = scope.with_deleted()?;
        }

        match assoc.dependent_behavior() {
            Dependent::Destroy => self.hard_delete_each(conn, &scope, ctx).await,
            Dependent::DeleteAll => {
                let removed = scope.delete_rows(conn).await?;
                tracing::debug!(target = target.name(), count = removed, "Bulk removed dependents");
                Ok(Outcome::Applied)
            }
            Dependent::None => Ok(Outcome::Applied),
        }
    }

    async fn hard_delete_each(
        &self,
        conn: &mut SqliteConnection,
        scope: &Scope,
        ctx: &mut CascadeContext,
    ) -> ParanoidResult<Outcome> {
        for mut child in scope.fetch_all(conn).await? {
            if !ctx.visit(&child) {
                log_cycle_cut(&child);
                continue;
            }
            let outcome = self.hard_delete_record(conn, &mut child, ctx).await?;
            if !outcome.succeeded() {
                return Ok(outcome);
            }
        }
        Ok(Outcome::Applied)
    }

    async fn cascade_recover(
        &self,
        conn: &mut SqliteConnection,
        parent: &Record,
        target: &EntityDef,
        link: &TargetLink,
        plan: RecoveryPlan,
        ctx: &mut CascadeContext,
    ) -> ParanoidResult<Outcome> {
        let Some(target_config) = target.paranoid_config() else {
            tracing::debug!(target = target.name(), "Target is not paranoid, skipping recovery");
            return Ok(Outcome::Applied);
        };

        let mut scope = Scope::for_entity(target).only_deleted()?.linked(link);

        let parent_config = self.schema.entity(parent.entity())?.paranoid_config();
        if let Some(parent_config) = parent_config {
            if parent_config.is_time() && target_config.is_time() {
                if let Some(deleted_at) =
                    deletion_time(parent_config, parent.get(parent_config.column()))
                {
                    scope = scope.deleted_inside_window(deleted_at, plan.window)?;
                }
            }
        }

        for mut child in scope.fetch_all(conn).await? {
            if !ctx.visit(&child) {
                log_cycle_cut(&child);
                continue;
            }
            let outcome = self.recover_record(conn, &mut child, plan, ctx).await?;
            if !outcome.succeeded() {
                return Ok(outcome);
            }
        }
        Ok(Outcome::Applied)
    }
}

fn log_cycle_cut(record: &Record) {
    tracing::debug!(
        entity = record.entity(),
        id = ?record.id(),
        "Already visited in this cascade, skipping"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn test_visit_is_keyed_by_entity_and_id() {
        let mut ctx = CascadeContext::new(Utc::now());
        let a = Record::loaded("A", 1, BTreeMap::new());
        let b = Record::loaded("B", 1, BTreeMap::new());

        assert!(ctx.visit(&a));
        assert!(ctx.visit(&b));
        assert!(!ctx.visit(&a), "second visit must be refused");
    }

    #[test]
    fn test_unsaved_records_are_never_deduplicated() {
        let mut ctx = CascadeContext::new(Utc::now());
        let fresh = Record::new("A");
        assert!(ctx.visit(&fresh));
        assert!(ctx.visit(&fresh));
    }
}
