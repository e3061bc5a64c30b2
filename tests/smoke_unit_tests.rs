//! Smoke Screen Unit tests for draft approval system components
//!
//! These test are unit tests that span the codebase, testing behavior in
//! isolation from integration scenarios. These are intended as smoke-screen
//! and generally test the happy-path.
//!
#![allow(unused_imports)]

use chrono::{Datelike, Timelike, Utc};
use draft_approval::{
    ApprovalOptions, AttrValue, Error, Record, Registry, TimeStamp,
    diff::{AttrDelta, ClassInfo, DiffNode, DraftStatus},
    schema::{AssociationKind, AttrKind, ModelSchema, SchemaCatalog},
};
use std::collections::BTreeMap;

// RECORD MODULE TESTS
#[cfg(test)]
mod record_tests {
    use super::*;

    /// Test that TimeStamp::new() creates a timestamp close to current time
    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let now = Utc::now();

        let diff = (now - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1); // Should be within 1 second
    }

    /// Test that TimeStamp can be created with specific date/time values
    #[test]
    fn timestamp_new_with_creates_specific_time() {
        let ts = TimeStamp::new_with(2024, 6, 15, 10, 30, 0);
        let dt = ts.to_datetime_utc();

        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 6);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
    }

    /// Test that TimeStamp CBOR encoding/decoding round-trips correctly
    #[test]
    fn timestamp_cbor_roundtrip() {
        let original = TimeStamp::new();

        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: TimeStamp<Utc> = minicbor::decode(&encoded).unwrap();

        assert_eq!(original, decoded);
    }

    /// Test that attribute values convert from plain Rust values
    #[test]
    fn attr_value_conversions() {
        assert_eq!(AttrValue::from("alpine"), AttrValue::Text("alpine".into()));
        assert_eq!(AttrValue::from(12), AttrValue::Int(12));
        assert_eq!(AttrValue::from(12u64), AttrValue::Id(12));
        assert_eq!(AttrValue::from(true), AttrValue::Bool(true));
        assert_eq!(AttrValue::id(None), AttrValue::Null);
        assert_eq!(AttrValue::id(Some(9)), AttrValue::Id(9));
    }

    /// Test the typed accessors on AttrValue
    #[test]
    fn attr_value_accessors() {
        assert_eq!(AttrValue::Text("alpine".into()).as_text(), Some("alpine"));
        assert_eq!(AttrValue::Int(5).as_int(), Some(5));
        assert_eq!(AttrValue::Id(5).as_id(), Some(5));
        assert_eq!(AttrValue::Int(5).as_id(), None);
        assert!(AttrValue::Null.is_null());
        assert!(!AttrValue::Bool(false).is_null());
    }

    /// Test AttrValue enum ordering, including the timestamp variant
    #[test]
    fn attr_value_ordering() {
        assert!(AttrValue::Null < AttrValue::Bool(false));
        assert!(AttrValue::Int(1) < AttrValue::Int(2));
        assert_eq!(AttrValue::Int(1), AttrValue::Int(1));

        let earlier = TimeStamp::new_with(2024, 1, 1, 0, 0, 0);
        let later = TimeStamp::new_with(2024, 6, 15, 10, 30, 0);
        assert!(earlier < later);
        assert!(AttrValue::from(earlier) < AttrValue::from(later));
    }

    /// Test that a record reports draft and historic roles from its
    /// tracking attributes
    #[test]
    fn record_role_predicates() {
        let mut record = Record::new(4, "Variant");
        assert!(!record.is_draft_record());
        assert!(!record.is_historic_record());

        record.set_approved_version_id(Some(2));
        assert!(record.is_draft_record());

        record.set_approved_version_id(None);
        record.set_current_approved_version_id(Some(2));
        assert!(!record.is_draft_record());
        assert!(record.is_historic_record());
    }

    /// Test that Record CBOR encoding/decoding round-trips correctly
    #[test]
    fn record_cbor_roundtrip() {
        let mut record = Record::new(11, "Variant");
        record.set("label", "forest green");
        record.set("position", 3);
        record.set("archived", false);
        record.set("created_at", TimeStamp::new_with(2024, 6, 15, 10, 30, 0));
        record.set_approved_version_id(Some(7));

        let encoded = minicbor::to_vec(record.clone()).unwrap();
        let decoded: Record = minicbor::decode(&encoded).unwrap();

        assert_eq!(record, decoded);
    }
}

// SCHEMA MODULE TESTS
#[cfg(test)]
mod schema_tests {
    use super::*;

    /// Test that capability flags come straight from the declared fields
    #[test]
    fn tracking_fields_drive_capabilities() {
        let plain = ModelSchema::new("Review", "reviews").field("body", AttrKind::Text);
        assert!(!plain.tracks_approved_version());
        assert!(!plain.tracks_version_history());

        let draftable = ModelSchema::new("Product", "products")
            .field("approved_version_id", AttrKind::Id);
        assert!(draftable.tracks_approved_version());
        assert!(!draftable.tracks_version_history());

        let versioned = ModelSchema::new("Variant", "variants")
            .field("approved_version_id", AttrKind::Id)
            .field("current_approved_version_id", AttrKind::Id);
        assert!(versioned.tracks_approved_version());
        assert!(versioned.tracks_version_history());
    }

    /// Test that associations can be looked up by name
    #[test]
    fn association_lookup_by_name() {
        let schema = ModelSchema::new("Product", "products")
            .has_many("variants", "Variant", "product_id")
            .belongs_to("brand", "Brand", "brand_id");

        let variants = schema.association_named("variants").unwrap();
        assert_eq!(variants.target, "Variant");
        assert_eq!(variants.foreign_key, "product_id");
        assert!(schema.association_named("widgets").is_none());
    }

    /// Test which association kinds count as structural
    #[test]
    fn structural_association_kinds() {
        assert!(AssociationKind::HasOne.is_structural());
        assert!(AssociationKind::HasMany.is_structural());
        assert!(AssociationKind::ManyToMany.is_structural());
        assert!(!AssociationKind::BelongsTo.is_structural());
    }

    /// Test that pending storages are reported as not ready
    #[test]
    fn pending_storage_is_not_ready() {
        let catalog = SchemaCatalog::new()
            .declare(ModelSchema::new("Product", "products").field("name", AttrKind::Text))
            .declare(
                ModelSchema::new("GalleryImage", "gallery_images")
                    .field("caption", AttrKind::Text),
            )
            .storage_pending("gallery_images");

        assert!(catalog.storage_ready("Product"));
        assert!(!catalog.storage_ready("GalleryImage"));
    }
}

// CONFIG MODULE TESTS
#[cfg(test)]
mod config_tests {
    use super::*;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .declare(
                ModelSchema::new("Product", "products")
                    .field("name", AttrKind::Text)
                    .field("sku", AttrKind::Text)
                    .field("created_at", AttrKind::Timestamp)
                    .field("updated_at", AttrKind::Timestamp)
                    .field("approved_version_id", AttrKind::Id)
                    .has_many("variants", "Variant", "product_id"),
            )
            .declare(
                ModelSchema::new("Variant", "variants")
                    .field("label", AttrKind::Text)
                    .field("product_id", AttrKind::Id)
                    .field("approved_version_id", AttrKind::Id)
                    .belongs_to("product", "Product", "product_id"),
            )
    }

    /// Test that a default registration approves everything except
    /// created_at and the tracking fields
    #[test]
    fn default_approvable_attributes() {
        let mut registry = Registry::new(catalog());
        registry
            .requires_approval("Product", ApprovalOptions::new())
            .unwrap();

        let config = registry.config_for("Product").unwrap();
        let schema = registry.catalog().model("Product").unwrap();
        let usable = config.usable_approvable_attributes(schema);

        assert_eq!(usable, vec!["name", "sku", "updated_at"]);
    }

    /// Test that the sweep registers draft target types with defaults
    #[test]
    fn sweep_configures_child_types() {
        let mut registry = Registry::new(catalog());
        registry
            .requires_approval("Product", ApprovalOptions::new())
            .unwrap();

        let variant = registry.config_for("Variant").unwrap();
        assert!(variant.capabilities.tracks_approved_version);
        assert!(variant.draft_targets.is_empty());
    }

    /// Test that records require approval by default, and that a gate
    /// takes over when configured
    #[test]
    fn approval_gate_defaults_to_true() {
        let mut registry = Registry::new(catalog());
        registry
            .requires_approval(
                "Product",
                ApprovalOptions::new().changes_require_approval(|live: &Record| {
                    live.get("sku").as_text() != Some("frozen")
                }),
            )
            .unwrap();
        let config = registry.config_for("Product").unwrap();

        let mut open = Record::new(1, "Product");
        open.set("sku", "TP-40");
        assert!(config.requires_approval_for(&open));

        let mut frozen = Record::new(2, "Product");
        frozen.set("sku", "frozen");
        assert!(!config.requires_approval_for(&frozen));
    }

    /// Test that draft targets can be previewed for unregistered models
    #[test]
    fn target_preview_without_registration() {
        let registry = Registry::new(catalog());
        let targets = registry.resolve_draft_targets("Product").unwrap();
        assert_eq!(targets, vec!["variants"]);
    }
}

// DIFF MODULE TESTS
#[cfg(test)]
mod diff_tests {
    use super::*;

    fn node(status: DraftStatus) -> DiffNode {
        DiffNode {
            draft_status: status,
            attributes: BTreeMap::new(),
            associations: BTreeMap::new(),
            class_info: ClassInfo {
                model: "Variant".to_string(),
                storage: "variants".to_string(),
            },
        }
    }

    /// Test that the identifier delta never counts as a change
    #[test]
    fn changed_keys_skip_the_identifier() {
        let mut diff = node(DraftStatus::Unchanged);
        diff.attributes.insert(
            "id".to_string(),
            AttrDelta {
                live: AttrValue::Id(1),
                draft: AttrValue::Id(2),
            },
        );
        diff.attributes.insert(
            "label".to_string(),
            AttrDelta {
                live: AttrValue::from("forest green"),
                draft: AttrValue::from("moss green"),
            },
        );

        assert_eq!(diff.changed_keys(), vec!["label"]);
    }

    /// Test that association names show up in changed_keys when any
    /// nested entry changed
    #[test]
    fn changed_keys_include_changed_associations() {
        let mut diff = node(DraftStatus::Changed);
        diff.associations
            .insert("options".to_string(), vec![node(DraftStatus::Unchanged)]);
        diff.associations
            .insert("variants".to_string(), vec![node(DraftStatus::Added)]);

        assert_eq!(diff.changed_keys(), vec!["variants"]);
    }

    /// Test has_changes against each status
    #[test]
    fn has_changes_reflects_status() {
        assert!(!node(DraftStatus::Unchanged).has_changes());
        assert!(node(DraftStatus::Changed).has_changes());
        assert!(node(DraftStatus::Added).has_changes());
        assert!(node(DraftStatus::Deleted).has_changes());
    }

    /// Test that missing associations read as empty slices
    #[test]
    fn missing_association_reads_empty() {
        let diff = node(DraftStatus::Unchanged);
        assert!(diff.association("variants").is_empty());
    }
}

// ERROR MODULE TESTS
#[cfg(test)]
mod error_tests {
    use super::*;

    /// Test that the draftability error names the missing field
    #[test]
    fn approved_version_error_names_the_field() {
        let err = Error::ApprovedVersionId {
            model: "Review".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Review"));
        assert!(message.contains("approved_version_id"));
    }

    /// Test that draft creation failures carry their cause
    #[test]
    fn draft_creation_error_wraps_the_cause() {
        let cause = Error::UnknownRecord {
            model: "Product".to_string(),
            id: 4,
        };
        let err = Error::DraftCreation(Box::new(cause));
        assert!(err.to_string().contains("draft failed to be created"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
