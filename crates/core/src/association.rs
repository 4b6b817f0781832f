//! Association declarations and per-instance target resolution.
//!
//! An [`Association`] links an entity type to a target type. The target is
//! resolved per record through a [`TargetResolver`]: static associations
//! name their target directly, polymorphic `belongs_to` associations read
//! the target entity name from a discriminator column on the record.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identifier::validate_identifier;
use crate::record::Record;
use crate::schema::{EntityDef, Schema};
use crate::types::DbId;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// The foreign key lives on this record.
    BelongsTo,
    /// The foreign key lives on a single target row.
    HasOne,
    /// The foreign key lives on many target rows.
    HasMany,
}

/// What happens to targets when the owning record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependent {
    /// Targets are left alone.
    None,
    /// Each target is destroyed individually, with hooks and its own cascade.
    Destroy,
    /// Targets are removed in bulk without hooks.
    DeleteAll,
}

/// Maps a record to the concrete entity type on the other side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetResolver {
    Static(String),
    /// The target entity name is stored in `type_column` on the record.
    Polymorphic { type_column: String },
}

/// A denormalised count kept on the owner of a `belongs_to` association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterCache {
    pub column: String,
    /// When set, the cache counts soft-deleted rows too and only changes on
    /// physical creation and removal.
    pub counts_deleted: bool,
}

/// How to find the target rows of an association for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetLink {
    /// The single target whose primary key is `id`.
    PrimaryKey(DbId),
    /// Every target whose `column` equals `id`, optionally narrowed by a
    /// polymorphic type column.
    ForeignKey {
        column: String,
        id: DbId,
        type_filter: Option<(String, String)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    name: String,
    kind: AssociationKind,
    target: TargetResolver,
    foreign_key: String,
    /// For `has_*` on the inverse side of a polymorphic `belongs_to`.
    as_type_column: Option<String>,
    dependent: Dependent,
    recoverable: Option<bool>,
    counter_cache: Option<CounterCache>,
}

impl Association {
    fn build(name: &str, kind: AssociationKind, target: TargetResolver, foreign_key: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            target,
            foreign_key: foreign_key.to_string(),
            as_type_column: None,
            dependent: Dependent::None,
            recoverable: None,
            counter_cache: None,
        }
    }

    pub fn belongs_to(name: &str, target: &str, foreign_key: &str) -> Self {
        Self::build(
            name,
            AssociationKind::BelongsTo,
            TargetResolver::Static(target.to_string()),
            foreign_key,
        )
    }

    /// A `belongs_to` whose target type is read from `type_column`.
    pub fn belongs_to_polymorphic(name: &str, type_column: &str, foreign_key: &str) -> Self {
        Self::build(
            name,
            AssociationKind::BelongsTo,
            TargetResolver::Polymorphic {
                type_column: type_column.to_string(),
            },
            foreign_key,
        )
    }

    pub fn has_one(name: &str, target: &str, foreign_key: &str) -> Self {
        Self::build(
            name,
            AssociationKind::HasOne,
            TargetResolver::Static(target.to_string()),
            foreign_key,
        )
    }

    pub fn has_many(name: &str, target: &str, foreign_key: &str) -> Self {
        Self::build(
            name,
            AssociationKind::HasMany,
            TargetResolver::Static(target.to_string()),
            foreign_key,
        )
    }

    /// Narrow a `has_*` association to targets whose `type_column` names
    /// the owning entity.
    pub fn as_polymorphic(mut self, type_column: &str) -> Self {
        self.as_type_column = Some(type_column.to_string());
        self
    }

    pub fn dependent(mut self, dependent: Dependent) -> Self {
        self.dependent = dependent;
        self
    }

    /// Exclude this association from recovery cascades.
    pub fn skip_recovery(mut self) -> Self {
        self.recoverable = Some(false);
        self
    }

    /// Keep a count of active rows in `column` on the owner.
    pub fn counter_cache(mut self, column: &str) -> Self {
        self.counter_cache = Some(CounterCache {
            column: column.to_string(),
            counts_deleted: false,
        });
        self
    }

    /// Keep a count of all rows, deleted or not, in `column` on the owner.
    pub fn counter_cache_counting_deleted(mut self, column: &str) -> Self {
        self.counter_cache = Some(CounterCache {
            column: column.to_string(),
            counts_deleted: true,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    pub fn target(&self) -> &TargetResolver {
        &self.target
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn dependent_behavior(&self) -> Dependent {
        self.dependent
    }

    pub fn counter(&self) -> Option<&CounterCache> {
        self.counter_cache.as_ref()
    }

    /// Cascades on the delete path.
    pub fn cascades_on_delete(&self) -> bool {
        self.dependent != Dependent::None
    }

    /// Candidate for the recovery cascade. Defaults to any dependent
    /// association unless [`skip_recovery`](Self::skip_recovery) was set.
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
            .unwrap_or(self.dependent != Dependent::None)
    }

    /// Resolve the target entity for `record`.
    ///
    /// Returns `Ok(None)` when a polymorphic discriminator is unset.
    pub fn resolve_target<'s>(
        &self,
        record: &Record,
        schema: &'s Schema,
    ) -> Result<Option<&'s EntityDef>, CoreError> {
        match &self.target {
            TargetResolver::Static(entity) => schema.entity(entity).map(Some),
            TargetResolver::Polymorphic { type_column } => match record.get(type_column) {
                Value::Null => Ok(None),
                Value::Text(entity) => schema.entity(entity).map(Some),
                other => Err(CoreError::Validation(format!(
                    "{}.{type_column} must name an entity type, got {other:?}",
                    record.entity()
                ))),
            },
        }
    }

    /// How to find this association's targets for `record`.
    ///
    /// Returns `None` when the link is unset: a null foreign key on a
    /// `belongs_to`, or an unsaved owner on a `has_*`.
    pub fn link(&self, record: &Record) -> Option<TargetLink> {
        match self.kind {
            AssociationKind::BelongsTo => record
                .get(&self.foreign_key)
                .as_id()
                .map(TargetLink::PrimaryKey),
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let id = record.id()?;
                Some(TargetLink::ForeignKey {
                    column: self.foreign_key.clone(),
                    id,
                    type_filter: self
                        .as_type_column
                        .as_ref()
                        .map(|col| (col.clone(), record.entity().to_string())),
                })
            }
        }
    }

    pub(crate) fn validate(&self, owner: &str) -> Result<(), CoreError> {
        validate_identifier(&self.foreign_key)?;
        if let TargetResolver::Polymorphic { type_column } = &self.target {
            validate_identifier(type_column)?;
        }
        if let Some(col) = &self.as_type_column {
            validate_identifier(col)?;
            if self.kind == AssociationKind::BelongsTo {
                return Err(CoreError::InvalidConfig(format!(
                    "{owner}.{}: as_polymorphic applies to has_one/has_many only",
                    self.name
                )));
            }
        }
        if let Some(counter) = &self.counter_cache {
            validate_identifier(&counter.column)?;
            if self.kind != AssociationKind::BelongsTo {
                return Err(CoreError::InvalidConfig(format!(
                    "{owner}.{}: counter caches are declared on belongs_to",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
