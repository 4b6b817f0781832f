//! Entity type registry and capability checks.
//!
//! A [`Schema`] is built once at startup from [`EntityDef`]s and shared
//! read-only afterwards. Paranoid-only operations go through
//! [`Schema::paranoid`], which fails with [`CoreError::NotParanoid`] for
//! entity types that were not configured for logical deletion.

use std::collections::BTreeMap;

use crate::association::{Association, AssociationKind, TargetResolver};
use crate::error::CoreError;
use crate::identifier::validate_identifier;
use crate::paranoid::ParanoidConfig;

/// Declaration of one entity type.
#[derive(Debug, Clone)]
pub struct EntityDef {
    name: String,
    table: String,
    primary_key: String,
    paranoid: Option<ParanoidConfig>,
    associations: Vec<Association>,
}

impl EntityDef {
    /// A non-paranoid entity stored in a table of the same name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: name.to_string(),
            primary_key: "id".to_string(),
            paranoid: None,
            associations: Vec::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = column.to_string();
        self
    }

    /// Enable logical deletion with `config`.
    pub fn paranoid(mut self, config: ParanoidConfig) -> Self {
        self.paranoid = Some(config);
        self
    }

    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn primary_key_column(&self) -> &str {
        &self.primary_key
    }

    pub fn paranoid_config(&self) -> Option<&ParanoidConfig> {
        self.paranoid.as_ref()
    }

    pub fn is_paranoid(&self) -> bool {
        self.paranoid.is_some()
    }

    /// The paranoid configuration, or [`CoreError::NotParanoid`].
    pub fn require_paranoid(&self) -> Result<&ParanoidConfig, CoreError> {
        self.paranoid.as_ref().ok_or_else(|| CoreError::NotParanoid {
            entity: self.name.clone(),
        })
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub fn association_named(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name() == name)
    }

    /// `belongs_to` associations that carry a counter cache.
    pub fn counter_cached(&self) -> impl Iterator<Item = &Association> {
        self.associations
            .iter()
            .filter(|a| a.kind() == AssociationKind::BelongsTo && a.counter().is_some())
    }

    /// The fully qualified marker column, e.g. `widgets.deleted_at`.
    pub fn marker_reference(&self) -> Option<String> {
        self.paranoid
            .as_ref()
            .map(|config| format!("{}.{}", self.table, config.column()))
    }
}

/// Immutable registry of entity types.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: BTreeMap<String, EntityDef>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn entity(&self, name: &str) -> Result<&EntityDef, CoreError> {
        self.entities
            .get(name)
            .ok_or_else(|| CoreError::UnknownEntity(name.to_string()))
    }

    /// Returns `true` if `name` is a known, paranoid entity type.
    pub fn is_paranoid(&self, name: &str) -> bool {
        self.entities.get(name).is_some_and(EntityDef::is_paranoid)
    }

    /// Capability check for paranoid-only operations.
    pub fn paranoid(&self, name: &str) -> Result<(&EntityDef, &ParanoidConfig), CoreError> {
        let def = self.entity(name)?;
        let config = def.require_paranoid()?;
        Ok((def, config))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.values()
    }
}

/// Collects entity definitions and validates them as a whole.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entities: Vec<EntityDef>,
}

impl SchemaBuilder {
    pub fn entity(mut self, def: EntityDef) -> Self {
        self.entities.push(def);
        self
    }

    pub fn build(self) -> Result<Schema, CoreError> {
        let mut entities = BTreeMap::new();
        for def in self.entities {
            validate_identifier(&def.name)?;
            validate_identifier(&def.table)?;
            validate_identifier(&def.primary_key)?;
            if let Some(config) = &def.paranoid {
                config.validate()?;
            }
            for assoc in &def.associations {
                assoc.validate(&def.name)?;
            }
            if entities.contains_key(&def.name) {
                return Err(CoreError::InvalidConfig(format!(
                    "entity '{}' declared twice",
                    def.name
                )));
            }
            entities.insert(def.name.clone(), def);
        }

        for def in entities.values() {
            for assoc in def.associations() {
                if let TargetResolver::Static(target) = assoc.target() {
                    if !entities.contains_key(target) {
                        return Err(CoreError::InvalidConfig(format!(
                            "{}.{} targets unknown entity '{target}'",
                            def.name,
                            assoc.name()
                        )));
                    }
                }
            }
        }

        tracing::debug!(
            entities = entities.len(),
            paranoid = entities.values().filter(|d| d.is_paranoid()).count(),
            "Schema built"
        );
        Ok(Schema { entities })
    }
}
