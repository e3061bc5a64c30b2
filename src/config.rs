//! Per-type approval configuration and the registry that owns it
use crate::error::{Error, Result};
use crate::record::{
    APPROVED_VERSION_ID, CREATED_AT, CURRENT_APPROVED_VERSION_ID, ID_FIELD, Record,
};
use crate::schema::{AssociationDef, ModelSchema, SchemaCatalog};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Callback run against a freshly built draft or a record about to be saved
/// during publish.
pub type DraftHook = Arc<dyn Fn(&mut Record) + Send + Sync>;
/// Predicate deciding whether a live record's changes go through the draft
/// workflow at all.
pub type ApprovalGate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Options accepted by [`Registry::requires_approval`]. A default-constructed
/// value means: draft all structural associations, nullify nothing, approve
/// every attribute except `created_at`, keep previous versions editable.
#[derive(Clone)]
pub struct ApprovalOptions {
    associations: Vec<String>,
    nullify: Vec<String>,
    approvable_attributes: Option<Vec<String>>,
    allow_previous_versions_to_be_changed: bool,
    after_create_draft: Option<DraftHook>,
    before_publish_draft: Option<DraftHook>,
    changes_require_approval: Option<ApprovalGate>,
}

impl Default for ApprovalOptions {
    fn default() -> Self {
        Self {
            associations: Vec::new(),
            nullify: Vec::new(),
            approvable_attributes: None,
            allow_previous_versions_to_be_changed: true,
            after_create_draft: None,
            before_publish_draft: None,
            changes_require_approval: None,
        }
    }
}

impl ApprovalOptions {
    pub fn new() -> Self {
        Self::default()
    }
    /// Restrict drafting to these associations instead of the computed
    /// defaults. Names must exist on the model.
    pub fn associations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.associations = names.into_iter().map(Into::into).collect();
        self
    }
    /// Attributes reset to `Null` on every new draft of this type.
    pub fn nullify<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nullify = names.into_iter().map(Into::into).collect();
        self
    }
    /// Attributes copied onto the live record at publish time, replacing the
    /// default of every attribute except `created_at`.
    pub fn approvable_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.approvable_attributes = Some(names.into_iter().map(Into::into).collect());
        self
    }
    pub fn allow_previous_versions_to_be_changed(mut self, allow: bool) -> Self {
        self.allow_previous_versions_to_be_changed = allow;
        self
    }
    pub fn after_create_draft(
        mut self,
        hook: impl Fn(&mut Record) + Send + Sync + 'static,
    ) -> Self {
        self.after_create_draft = Some(Arc::new(hook));
        self
    }
    pub fn before_publish_draft(
        mut self,
        hook: impl Fn(&mut Record) + Send + Sync + 'static,
    ) -> Self {
        self.before_publish_draft = Some(Arc::new(hook));
        self
    }
    pub fn changes_require_approval(
        mut self,
        gate: impl Fn(&Record) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.changes_require_approval = Some(Arc::new(gate));
        self
    }
}

/// What the tracking fields of a model allow, computed once at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub tracks_approved_version: bool,
    pub tracks_history: bool,
}

/// Immutable per-model configuration produced by registration.
#[derive(Clone)]
pub struct TypeConfig {
    pub model: String,
    pub capabilities: Capabilities,
    /// Associations cloned into drafts and merged back at publish, in
    /// declaration order. Already filtered for storage availability.
    pub draft_targets: Vec<AssociationDef>,
    pub nullify: Vec<String>,
    approvable_attributes: Option<Vec<String>>,
    pub allow_previous_versions_to_be_changed: bool,
    pub after_create_draft: Option<DraftHook>,
    pub before_publish_draft: Option<DraftHook>,
    pub changes_require_approval: Option<ApprovalGate>,
}

impl TypeConfig {
    /// Attributes that publish copies from the draft onto the live record.
    /// Identity and tracking fields never qualify, nor do nullified ones.
    pub fn usable_approvable_attributes(&self, schema: &ModelSchema) -> Vec<String> {
        let base: Vec<String> = match &self.approvable_attributes {
            Some(list) => list.clone(),
            None => schema
                .fields
                .keys()
                .filter(|f| f.as_str() != CREATED_AT)
                .cloned()
                .collect(),
        };
        base.into_iter()
            .filter(|a| !self.nullify.contains(a))
            .filter(|a| {
                let a = a.as_str();
                a != APPROVED_VERSION_ID && a != CURRENT_APPROVED_VERSION_ID && a != ID_FIELD
            })
            .collect()
    }

    /// Whether edits to this live record must go through a draft. Defaults to
    /// true when no gate is configured.
    pub fn requires_approval_for(&self, live: &Record) -> bool {
        match &self.changes_require_approval {
            Some(gate) => gate(live),
            None => true,
        }
    }
}

/// Startup-time registry of every approval-managed model. Built mutably once,
/// then shared read-only behind an `Arc` for the lifetime of the process.
pub struct Registry {
    catalog: SchemaCatalog,
    configs: BTreeMap<String, TypeConfig>,
}

impl Registry {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            catalog,
            configs: BTreeMap::new(),
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Register a model for the draft/approval workflow and sweep its draft
    /// target graph, configuring every reachable child type with defaults.
    /// Children registered earlier keep their own configuration.
    pub fn requires_approval(&mut self, model: &str, options: ApprovalOptions) -> Result<()> {
        if self.configs.contains_key(model) {
            return Err(Error::configuration(
                model,
                format!("Cannot call requires_approval multiple times for {model}"),
            ));
        }
        let schema = self.catalog.require_model(model)?;
        if !schema.tracks_approved_version() {
            return Err(Error::ApprovedVersionId {
                model: model.to_string(),
            });
        }
        let mut path = Vec::new();
        self.configure_type(model, options, &mut path)?;
        tracing::debug!(model, "registered for approval");
        Ok(())
    }

    fn configure_type(
        &mut self,
        model: &str,
        options: ApprovalOptions,
        path: &mut Vec<String>,
    ) -> Result<()> {
        if path.iter().any(|seen| seen == model) {
            let chain = path.join(" -> ");
            return Err(Error::configuration(
                model,
                format!("draft target cycle detected ({chain} -> {model})"),
            ));
        }
        // A type configured by an earlier registration keeps its own options.
        if self.configs.contains_key(model) {
            return Ok(());
        }
        let schema = self.catalog.require_model(model)?.clone();
        validate_attribute_names(&schema, &options)?;
        let draft_targets = self.resolve_targets(&schema, &options)?;

        path.push(model.to_string());
        for assoc in &draft_targets {
            self.configure_type(&assoc.target, ApprovalOptions::new(), path)?;
        }
        path.pop();

        let config = TypeConfig {
            model: model.to_string(),
            capabilities: Capabilities {
                tracks_approved_version: schema.tracks_approved_version(),
                tracks_history: schema.tracks_version_history(),
            },
            draft_targets,
            nullify: options.nullify,
            approvable_attributes: options.approvable_attributes,
            allow_previous_versions_to_be_changed: options.allow_previous_versions_to_be_changed,
            after_create_draft: options.after_create_draft,
            before_publish_draft: options.before_publish_draft,
            changes_require_approval: options.changes_require_approval,
        };
        self.configs.insert(model.to_string(), config);
        Ok(())
    }

    fn resolve_targets(
        &self,
        schema: &ModelSchema,
        options: &ApprovalOptions,
    ) -> Result<Vec<AssociationDef>> {
        let explicit = if options.associations.is_empty() {
            schema.explicit_targets.as_deref()
        } else {
            Some(options.associations.as_slice())
        };
        let candidates = match explicit {
            Some(names) => {
                let mut out = Vec::with_capacity(names.len());
                for name in names {
                    let assoc = schema.association_named(name).ok_or_else(|| {
                        Error::configuration(
                            &schema.model,
                            format!(
                                "{} requires_approval includes invalid association ({name})",
                                schema.model
                            ),
                        )
                    })?;
                    out.push(assoc.clone());
                }
                out
            }
            None => default_targets(schema),
        };

        let mut resolved = Vec::with_capacity(candidates.len());
        for assoc in candidates {
            if self.catalog.model(&assoc.target).is_none() {
                return Err(Error::configuration(
                    &schema.model,
                    format!(
                        "association {} targets undeclared model {}",
                        assoc.name, assoc.target
                    ),
                ));
            }
            // Declared targets whose storage has not been migrated yet are
            // dropped, so registration keeps working mid-migration.
            if !self.catalog.storage_ready(&assoc.target) {
                tracing::debug!(
                    model = %schema.model,
                    association = %assoc.name,
                    "dropping draft target, storage not ready"
                );
                continue;
            }
            resolved.push(assoc);
        }
        Ok(resolved)
    }

    pub fn config_for(&self, model: &str) -> Option<&TypeConfig> {
        self.configs.get(model)
    }

    pub(crate) fn require_config(&self, model: &str) -> Result<&TypeConfig> {
        self.configs.get(model).ok_or_else(|| {
            Error::configuration(model, "not registered for approval; call requires_approval")
        })
    }

    /// Whether records of this model can have drafts at all.
    pub fn is_draftable(&self, model: &str) -> Result<bool> {
        Ok(self.catalog.require_model(model)?.tracks_approved_version())
    }

    /// Whether records of this model retain previously approved versions.
    pub fn tracks_history(&self, model: &str) -> Result<bool> {
        Ok(self.catalog.require_model(model)?.tracks_version_history())
    }

    pub(crate) fn ensure_draftable(&self, model: &str) -> Result<()> {
        if self.is_draftable(model)? {
            Ok(())
        } else {
            Err(Error::ApprovedVersionId {
                model: model.to_string(),
            })
        }
    }

    pub(crate) fn ensure_tracks_history(&self, model: &str) -> Result<()> {
        if self.tracks_history(model)? {
            Ok(())
        } else {
            Err(Error::HistoryTracking {
                model: model.to_string(),
            })
        }
    }

    /// Names of the associations drafted alongside this model: the registered
    /// configuration when present, otherwise what a default registration
    /// would produce.
    pub fn resolve_draft_targets(&self, model: &str) -> Result<Vec<String>> {
        if let Some(config) = self.config_for(model) {
            return Ok(config
                .draft_targets
                .iter()
                .map(|a| a.name.clone())
                .collect());
        }
        let schema = self.catalog.require_model(model)?.clone();
        let targets = self.resolve_targets(&schema, &ApprovalOptions::new())?;
        Ok(targets.into_iter().map(|a| a.name).collect())
    }
}

/// Structural associations minus the engine-managed names and minus
/// self-references, in declaration order.
fn default_targets(schema: &ModelSchema) -> Vec<AssociationDef> {
    schema
        .associations
        .iter()
        .filter(|a| a.kind.is_structural())
        .filter(|a| a.name != "draft" && a.name != "approved_version")
        .filter(|a| a.target != schema.model)
        .cloned()
        .collect()
}

fn validate_attribute_names(schema: &ModelSchema, options: &ApprovalOptions) -> Result<()> {
    for name in &options.nullify {
        if !schema.has_field(name) {
            return Err(Error::configuration(
                &schema.model,
                format!("nullify includes unknown attribute ({name})"),
            ));
        }
    }
    if let Some(attrs) = &options.approvable_attributes {
        for name in attrs {
            if !schema.has_field(name) {
                return Err(Error::configuration(
                    &schema.model,
                    format!("approvable_attributes includes unknown attribute ({name})"),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttrKind;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .declare(
                ModelSchema::new("Product", "products")
                    .field("name", AttrKind::Text)
                    .field("sku", AttrKind::Text)
                    .field("brand_id", AttrKind::Id)
                    .field("related_product_id", AttrKind::Id)
                    .field("approved_version_id", AttrKind::Id)
                    .has_many("variants", "Variant", "product_id")
                    .has_many("reviews", "Review", "product_id")
                    .has_many("gallery_images", "GalleryImage", "product_id")
                    .has_one("datasheet", "Datasheet", "product_id")
                    .belongs_to("brand", "Brand", "brand_id")
                    .has_many("related_products", "Product", "related_product_id"),
            )
            .declare(
                ModelSchema::new("Variant", "variants")
                    .field("label", AttrKind::Text)
                    .field("product_id", AttrKind::Id)
                    .field("approved_version_id", AttrKind::Id)
                    .belongs_to("product", "Product", "product_id"),
            )
            .declare(
                ModelSchema::new("Review", "reviews")
                    .field("body", AttrKind::Text)
                    .field("product_id", AttrKind::Id)
                    .belongs_to("product", "Product", "product_id"),
            )
            .declare(
                ModelSchema::new("GalleryImage", "gallery_images")
                    .field("caption", AttrKind::Text)
                    .field("product_id", AttrKind::Id)
                    .belongs_to("product", "Product", "product_id"),
            )
            .declare(
                ModelSchema::new("Datasheet", "datasheets")
                    .field("title", AttrKind::Text)
                    .field("product_id", AttrKind::Id)
                    .field("approved_version_id", AttrKind::Id)
                    .belongs_to("product", "Product", "product_id"),
            )
            .declare(ModelSchema::new("Brand", "brands").field("name", AttrKind::Text))
            .storage_pending("gallery_images")
    }

    #[test]
    fn default_targets_skip_belongs_to_and_self_references() {
        let registry = Registry::new(catalog());
        let targets = registry.resolve_draft_targets("Product").unwrap();
        // gallery_images is declared but its storage is pending
        assert_eq!(targets, vec!["variants", "reviews", "datasheet"]);
    }

    #[test]
    fn explicit_associations_replace_defaults() {
        let mut registry = Registry::new(catalog());
        registry
            .requires_approval(
                "Product",
                ApprovalOptions::new().associations(["variants", "datasheet"]),
            )
            .unwrap();
        let targets = registry.resolve_draft_targets("Product").unwrap();
        assert_eq!(targets, vec!["variants", "datasheet"]);
    }

    #[test]
    fn unknown_explicit_association_is_a_configuration_error() {
        let mut registry = Registry::new(catalog());
        let err = registry
            .requires_approval("Product", ApprovalOptions::new().associations(["widgets"]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("invalid association (widgets)"));
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = Registry::new(catalog());
        registry
            .requires_approval("Product", ApprovalOptions::new().associations(["variants"]))
            .unwrap();
        let err = registry
            .requires_approval("Product", ApprovalOptions::new())
            .unwrap_err();
        assert!(err.to_string().contains("multiple times"));
    }

    #[test]
    fn registering_a_model_without_tracking_field_fails() {
        let mut registry = Registry::new(catalog());
        let err = registry
            .requires_approval("Review", ApprovalOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::ApprovedVersionId { .. }));
    }

    #[test]
    fn sweep_keeps_earlier_child_registration() {
        let mut registry = Registry::new(catalog());
        registry
            .requires_approval("Variant", ApprovalOptions::new().nullify(["label"]))
            .unwrap();
        registry
            .requires_approval(
                "Product",
                ApprovalOptions::new().associations(["variants", "datasheet"]),
            )
            .unwrap();
        let variant = registry.config_for("Variant").unwrap();
        assert_eq!(variant.nullify, vec!["label"]);
    }

    #[test]
    fn cyclic_draft_targets_are_rejected() {
        let looping = SchemaCatalog::new()
            .declare(
                ModelSchema::new("Page", "pages")
                    .field("approved_version_id", AttrKind::Id)
                    .field("section_id", AttrKind::Id)
                    .has_many("sections", "Section", "page_id"),
            )
            .declare(
                ModelSchema::new("Section", "sections")
                    .field("page_id", AttrKind::Id)
                    .has_many("pages", "Page", "section_id"),
            );
        let mut registry = Registry::new(looping);
        let err = registry
            .requires_approval("Page", ApprovalOptions::new())
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn approvable_attributes_exclude_tracking_and_nullified_fields() {
        let mut registry = Registry::new(catalog());
        registry
            .requires_approval(
                "Product",
                ApprovalOptions::new()
                    .associations(["variants"])
                    .nullify(["sku"]),
            )
            .unwrap();
        let config = registry.config_for("Product").unwrap();
        let schema = registry.catalog().model("Product").unwrap();
        let usable = config.usable_approvable_attributes(schema);
        assert!(usable.contains(&"name".to_string()));
        assert!(usable.contains(&"brand_id".to_string()));
        assert!(!usable.contains(&"sku".to_string()));
        assert!(!usable.contains(&"approved_version_id".to_string()));
    }
}
