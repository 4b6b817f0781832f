//! Lifecycle hook registration.
//!
//! Hooks are kept as ordered lists per (entity, event) and invoked
//! synchronously in registration order. A failing `Before*` hook halts the
//! operation; `Validate` hooks collect every message before reporting.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CoreError;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleEvent {
    Validate,
    BeforeDestroy,
    AfterDestroy,
    AfterCommitDestroy,
    BeforeRecover,
    AfterRecover,
    AfterCommitRecover,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::Validate => "validate",
            LifecycleEvent::BeforeDestroy => "before_destroy",
            LifecycleEvent::AfterDestroy => "after_destroy",
            LifecycleEvent::AfterCommitDestroy => "after_commit_destroy",
            LifecycleEvent::BeforeRecover => "before_recover",
            LifecycleEvent::AfterRecover => "after_recover",
            LifecycleEvent::AfterCommitRecover => "after_commit_recover",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Hook = Arc<dyn Fn(&Record) -> Result<(), CoreError> + Send + Sync>;

/// Ordered hook lists keyed by entity name and lifecycle event.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<(String, LifecycleEvent), Vec<Hook>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self
            .hooks
            .iter()
            .map(|((entity, event), list)| format!("{entity}.{event}({})", list.len()))
            .collect();
        keys.sort();
        f.debug_struct("HookRegistry").field("hooks", &keys).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` to the list for (`entity`, `event`).
    pub fn register<F>(&mut self, entity: &str, event: LifecycleEvent, hook: F)
    where
        F: Fn(&Record) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.hooks
            .entry((entity.to_string(), event))
            .or_default()
            .push(Arc::new(hook));
    }

    /// Builder form of [`register`](Self::register).
    pub fn on<F>(mut self, entity: &str, event: LifecycleEvent, hook: F) -> Self
    where
        F: Fn(&Record) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.register(entity, event, hook);
        self
    }

    pub fn has_hooks(&self, entity: &str, event: LifecycleEvent) -> bool {
        self.hooks
            .get(&(entity.to_string(), event))
            .is_some_and(|list| !list.is_empty())
    }

    /// Run the hooks for `event` on `record`, stopping at the first failure.
    pub fn run(&self, event: LifecycleEvent, record: &Record) -> Result<(), CoreError> {
        let Some(list) = self.hooks.get(&(record.entity().to_string(), event)) else {
            return Ok(());
        };
        for hook in list {
            hook(record)?;
        }
        Ok(())
    }

    /// Run every `Validate` hook and collect the failure messages.
    pub fn validate(&self, record: &Record) -> Vec<String> {
        let Some(list) = self
            .hooks
            .get(&(record.entity().to_string(), LifecycleEvent::Validate))
        else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|hook| hook(record).err())
            .map(|err| match err {
                CoreError::Validation(msg) => msg,
                other => other.to_string(),
            })
            .collect()
    }
}
