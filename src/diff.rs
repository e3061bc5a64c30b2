//! Structural diffing of live records against their drafts
use crate::config::{Registry, TypeConfig};
use crate::error::Result;
use crate::record::{APPROVED_VERSION_ID, AttrValue, ID_FIELD, Record, UPDATED_AT};
use crate::schema::{AssociationDef, ModelSchema};
use crate::store::RecordStore;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum DraftStatus {
    #[n(0)]
    Unchanged,
    #[n(1)]
    Changed,
    #[n(2)]
    Added,
    #[n(3)]
    Deleted,
}

/// Both sides of one attribute. `Null` stands in for a missing side.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AttrDelta {
    #[n(0)]
    pub live: AttrValue,
    #[n(1)]
    pub draft: AttrValue,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ClassInfo {
    #[n(0)]
    pub model: String,
    #[n(1)]
    pub storage: String,
}

/// One node of the recursive change report. Mirrors the shape of the live
/// association tree.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct DiffNode {
    #[n(0)]
    pub draft_status: DraftStatus,
    #[n(1)]
    pub attributes: BTreeMap<String, AttrDelta>,
    #[n(2)]
    pub associations: BTreeMap<String, Vec<DiffNode>>,
    #[n(3)]
    pub class_info: ClassInfo,
}

impl DiffNode {
    pub fn has_changes(&self) -> bool {
        self.draft_status != DraftStatus::Unchanged
    }

    /// Attribute and association names that actually differ. The identifier
    /// never counts as a difference.
    pub fn changed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .attributes
            .iter()
            .filter(|(name, delta)| name.as_str() != ID_FIELD && delta.live != delta.draft)
            .map(|(name, _)| name.clone())
            .collect();
        for (name, nodes) in &self.associations {
            if nodes.iter().any(|n| n.draft_status != DraftStatus::Unchanged) {
                keys.push(name.clone());
            }
        }
        keys
    }

    pub fn association(&self, name: &str) -> &[DiffNode] {
        self.associations
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    include_associations: bool,
    include_all_attributes: bool,
}

impl DiffOptions {
    pub fn new() -> Self {
        Self::default()
    }
    /// Recurse into child associations, down the whole draft tree.
    pub fn include_associations(mut self, include: bool) -> Self {
        self.include_associations = include;
        self
    }
    /// Report every relevant attribute and child, unchanged ones included.
    pub fn include_all_attributes(mut self, include: bool) -> Self {
        self.include_all_attributes = include;
        self
    }
}

pub(crate) struct DraftDiffer<'a> {
    pub store: &'a RecordStore,
    pub registry: &'a Registry,
}

impl DraftDiffer<'_> {
    /// Compare a live record against its draft. Read-only: a record without
    /// a draft reports an empty, unchanged node rather than creating one.
    pub fn draft_diff(&self, live: &Record, options: DiffOptions) -> Result<DiffNode> {
        self.registry.ensure_draftable(&live.model)?;
        self.registry.require_config(&live.model)?;
        let schema = self.registry.catalog().require_model(&live.model)?;

        match self.store.draft_of(&live.model, live.id)? {
            Some(draft) => self.node(live, Some(live), Some(&draft), None, options),
            None => Ok(DiffNode {
                draft_status: DraftStatus::Unchanged,
                attributes: BTreeMap::new(),
                associations: BTreeMap::new(),
                class_info: ClassInfo {
                    model: live.model.clone(),
                    storage: schema.storage.clone(),
                },
            }),
        }
    }

    /// Build the diff node for one record. `anchor` is whichever side exists
    /// and carries the model name. `parent_foreign_key` is set when recursing
    /// into a child collection, and is how deletions reveal themselves: a
    /// draft side whose parent key is gone means the row leaves the tree on
    /// publish.
    fn node(
        &self,
        anchor: &Record,
        live: Option<&Record>,
        draft: Option<&Record>,
        parent_foreign_key: Option<&str>,
        options: DiffOptions,
    ) -> Result<DiffNode> {
        let config = self.registry.require_config(&anchor.model)?;
        let schema = self.registry.catalog().require_model(&anchor.model)?;

        let mut attributes = BTreeMap::new();
        for name in relevant_attributes(config, schema, parent_foreign_key) {
            let live_value = attribute_of(live, &name);
            let draft_value = attribute_of(draft, &name);
            if options.include_all_attributes || live_value != draft_value {
                attributes.insert(
                    name,
                    AttrDelta {
                        live: live_value,
                        draft: draft_value,
                    },
                );
            }
        }

        let mut forced_status = None;
        if live.is_none() {
            forced_status = Some(DraftStatus::Added);
        } else if let Some(fk) = parent_foreign_key {
            if draft.and_then(|d| d.id_attr(fk)).is_none() {
                forced_status = Some(DraftStatus::Deleted);
            }
        }

        let mut associations = BTreeMap::new();
        if options.include_associations {
            for assoc in &config.draft_targets {
                if !self.registry.is_draftable(&assoc.target)? {
                    continue;
                }
                let entries = self.association_entries(assoc, live, draft, options)?;
                if options.include_all_attributes || !entries.is_empty() {
                    associations.insert(assoc.name.clone(), entries);
                }
            }
        }

        let draft_status =
            forced_status.unwrap_or_else(|| derive_status(&attributes, &associations));

        Ok(DiffNode {
            draft_status,
            attributes,
            associations,
            class_info: ClassInfo {
                model: anchor.model.clone(),
                storage: schema.storage.clone(),
            },
        })
    }

    fn association_entries(
        &self,
        assoc: &AssociationDef,
        live: Option<&Record>,
        draft: Option<&Record>,
        options: DiffOptions,
    ) -> Result<Vec<DiffNode>> {
        let live_children = match live {
            Some(l) => self
                .store
                .live_children_of(&assoc.target, &assoc.foreign_key, l.id)?,
            None => Vec::new(),
        };
        let draft_children = match draft {
            Some(d) => self
                .store
                .children_of(&assoc.target, &assoc.foreign_key, d.id)?,
            None => Vec::new(),
        };

        let mut entries = Vec::new();
        for live_child in &live_children {
            let child_draft = self.store.draft_of(&assoc.target, live_child.id)?;
            let mut node = self.node(
                live_child,
                Some(live_child),
                child_draft.as_ref(),
                Some(&assoc.foreign_key),
                options,
            )?;
            // no draft child pointing back at this row means publish drops it
            let referenced = draft_children
                .iter()
                .any(|dc| dc.approved_version_id() == Some(live_child.id));
            if !referenced {
                node.draft_status = DraftStatus::Deleted;
            }
            if options.include_all_attributes || node.draft_status != DraftStatus::Unchanged {
                entries.push(node);
            }
        }
        for draft_child in &draft_children {
            if draft_child.approved_version_id().is_some() {
                continue;
            }
            let node = self.node(draft_child, None, Some(draft_child), None, options)?;
            entries.push(node);
        }
        Ok(entries)
    }
}

fn attribute_of(record: Option<&Record>, name: &str) -> AttrValue {
    match record {
        Some(r) if name == ID_FIELD => AttrValue::Id(r.id),
        Some(r) => r.get(name).clone(),
        None => AttrValue::Null,
    }
}

/// Usable approvable attributes plus identifier, minus `updated_at`, the
/// draft marker, and the foreign key back to the parent when recursing.
fn relevant_attributes(
    config: &TypeConfig,
    schema: &ModelSchema,
    parent_foreign_key: Option<&str>,
) -> Vec<String> {
    let mut attrs = config.usable_approvable_attributes(schema);
    attrs.push(ID_FIELD.to_string());
    attrs.retain(|a| {
        let a = a.as_str();
        a != UPDATED_AT && a != APPROVED_VERSION_ID && Some(a) != parent_foreign_key
    });
    attrs.sort();
    attrs.dedup();
    attrs
}

/// Changed when any non-identity attribute or nested entry differs.
fn derive_status(
    attributes: &BTreeMap<String, AttrDelta>,
    associations: &BTreeMap<String, Vec<DiffNode>>,
) -> DraftStatus {
    let attrs_changed = attributes
        .iter()
        .any(|(name, delta)| name.as_str() != ID_FIELD && delta.live != delta.draft);
    let assocs_changed = associations
        .values()
        .flatten()
        .any(|n| n.draft_status != DraftStatus::Unchanged);
    if attrs_changed || assocs_changed {
        DraftStatus::Changed
    } else {
        DraftStatus::Unchanged
    }
}
