//! Model declarations: attribute fields, associations, storage names
use crate::error::{Error, Result};
use crate::record::{APPROVED_VERSION_ID, CURRENT_APPROVED_VERSION_ID};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Bool,
    Int,
    Text,
    Timestamp,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl AssociationKind {
    /// Whether the association points at owned child rows. BelongsTo points
    /// upward and never participates in draft trees.
    pub fn is_structural(self) -> bool {
        !matches!(self, AssociationKind::BelongsTo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDef {
    pub name: String,
    pub kind: AssociationKind,
    pub target: String,
    /// Field on the child side holding the parent id.
    pub foreign_key: String,
}

/// Declares one model: its storage name, attribute fields and associations.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub model: String,
    pub storage: String,
    pub fields: BTreeMap<String, AttrKind>,
    pub associations: Vec<AssociationDef>,
    /// Schema-level draft target list, set by `creates_drafts_for`. Overrides
    /// the computed default when no per-registration list is given.
    pub explicit_targets: Option<Vec<String>>,
}

impl ModelSchema {
    pub fn new(model: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            storage: storage.into(),
            fields: BTreeMap::new(),
            associations: Vec::new(),
            explicit_targets: None,
        }
    }
    pub fn field(mut self, name: impl Into<String>, kind: AttrKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }
    pub fn belongs_to(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.association(name, AssociationKind::BelongsTo, target, foreign_key)
    }
    pub fn has_one(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.association(name, AssociationKind::HasOne, target, foreign_key)
    }
    pub fn has_many(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.association(name, AssociationKind::HasMany, target, foreign_key)
    }
    pub fn many_to_many(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.association(name, AssociationKind::ManyToMany, target, foreign_key)
    }
    fn association(mut self, name: &str, kind: AssociationKind, target: &str, fk: &str) -> Self {
        self.associations.push(AssociationDef {
            name: name.to_string(),
            kind,
            target: target.to_string(),
            foreign_key: fk.to_string(),
        });
        self
    }
    /// Pin the associations drafted alongside this model, independent of any
    /// registration call. Mirrors passing an explicit association list.
    pub fn creates_drafts_for<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicit_targets = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn association_named(&self, name: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|a| a.name == name)
    }
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
    pub fn tracks_approved_version(&self) -> bool {
        self.has_field(APPROVED_VERSION_ID)
    }
    pub fn tracks_version_history(&self) -> bool {
        self.has_field(CURRENT_APPROVED_VERSION_ID)
    }
}

/// All declared models plus which storages are actually migrated. Built once
/// at startup and handed to the registry.
#[derive(Debug, Default, Clone)]
pub struct SchemaCatalog {
    models: BTreeMap<String, ModelSchema>,
    pending_storages: BTreeSet<String>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }
    /// Register a model declaration. A repeated name replaces the earlier one.
    pub fn declare(mut self, schema: ModelSchema) -> Self {
        self.models.insert(schema.model.clone(), schema);
        self
    }
    /// Flag a storage as declared but not yet migrated. Draft target
    /// resolution drops associations pointing into pending storages.
    pub fn storage_pending(mut self, storage: &str) -> Self {
        self.pending_storages.insert(storage.to_string());
        self
    }

    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }
    pub fn require_model(&self, name: &str) -> Result<&ModelSchema> {
        self.models
            .get(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }
    pub fn storage_ready(&self, model: &str) -> bool {
        match self.models.get(model) {
            Some(schema) => !self.pending_storages.contains(&schema.storage),
            None => false,
        }
    }
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}
