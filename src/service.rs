//! Service layer API for draft approval operations
use crate::config::Registry;
use crate::diff::{DiffNode, DiffOptions, DraftDiffer};
use crate::draft::DraftCloner;
use crate::error::{Error, Result};
use crate::history::VersionHistory;
use crate::publish::{DraftPublisher, delete_subtree};
use crate::record::{AttrValue, CREATED_AT, Record, RecordId, TimeStamp, UPDATED_AT};
use crate::store::RecordStore;
use sled::Db;
use std::sync::Arc;

/// The one entry point consumers hold. Wraps the store and the registry and
/// routes every lifecycle operation through them.
pub struct ApprovalService {
    store: RecordStore,
    registry: Arc<Registry>,
}

impl ApprovalService {
    pub fn new(instance: Arc<Db>, registry: Arc<Registry>) -> Self {
        Self {
            store: RecordStore::new(instance),
            registry,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn cloner(&self) -> DraftCloner<'_> {
        DraftCloner {
            store: &self.store,
            registry: &self.registry,
        }
    }

    fn publisher(&self) -> DraftPublisher<'_> {
        DraftPublisher {
            store: &self.store,
            registry: &self.registry,
        }
    }

    fn differ(&self) -> DraftDiffer<'_> {
        DraftDiffer {
            store: &self.store,
            registry: &self.registry,
        }
    }

    fn versions(&self) -> VersionHistory<'_> {
        VersionHistory {
            store: &self.store,
            registry: &self.registry,
        }
    }

    /// Create and persist a live record. Every declared field starts out
    /// `Null` unless given; timestamps are filled in when declared.
    pub fn create_record<I, S, V>(&self, model: &str, attributes: I) -> Result<Record>
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<AttrValue>,
    {
        let schema = self.registry.catalog().require_model(model)?;
        let mut record = Record::new(self.store.next_id()?, model);
        for name in schema.fields.keys() {
            record.set(name.as_str(), AttrValue::Null);
        }
        if schema.has_field(CREATED_AT) {
            record.set(CREATED_AT, TimeStamp::new());
        }
        if schema.has_field(UPDATED_AT) {
            record.set(UPDATED_AT, TimeStamp::new());
        }
        for (name, value) in attributes {
            let name = name.into();
            if !schema.has_field(&name) {
                return Err(Error::configuration(
                    model,
                    format!("unknown attribute ({name})"),
                ));
            }
            record.set(name, value);
        }
        self.store.insert(&record)?;
        Ok(record)
    }

    pub fn get(&self, model: &str, id: RecordId) -> Result<Record> {
        self.store.require(model, id)
    }

    /// Persist attribute changes, touching `updated_at` when declared.
    /// Returns false without writing when the record is a previous version
    /// and its type forbids editing history.
    pub fn save(&self, record: &mut Record) -> Result<bool> {
        if record.is_historic_record() {
            if let Some(config) = self.registry.config_for(&record.model) {
                if !config.allow_previous_versions_to_be_changed {
                    tracing::debug!(
                        model = %record.model,
                        id = record.id,
                        "save rejected, previous versions are immutable"
                    );
                    return Ok(false);
                }
            }
        }
        let schema = self.registry.catalog().require_model(&record.model)?;
        if schema.has_field(UPDATED_AT) {
            record.set(UPDATED_AT, TimeStamp::new());
        }
        self.store.insert(record)?;
        Ok(true)
    }

    pub fn delete(&self, model: &str, id: RecordId) -> Result<()> {
        self.store.remove(model, id)
    }

    /// Records that are neither drafts nor previous versions.
    pub fn live_records(&self, model: &str) -> Result<Vec<Record>> {
        self.store.live_records(model)
    }

    pub fn draft_records(&self, model: &str) -> Result<Vec<Record>> {
        self.store.draft_records(model)
    }

    /// Whether this record is a draft. Errors for types that never declared
    /// draft tracking.
    pub fn is_draft(&self, record: &Record) -> Result<bool> {
        self.registry.ensure_draftable(&record.model)?;
        Ok(record.is_draft_record())
    }

    /// Whether a draft currently exists for this record.
    pub fn has_draft(&self, record: &Record) -> Result<bool> {
        self.registry.ensure_draftable(&record.model)?;
        Ok(self.store.draft_of(&record.model, record.id)?.is_some())
    }

    /// The live side of any record: a draft resolves to its source, a live
    /// record to itself. The row is re-read from the store, so a stale copy
    /// in the caller's hands resolves to current state.
    pub fn get_approved_version(&self, record: &Record) -> Result<Record> {
        self.registry.ensure_draftable(&record.model)?;
        let id = record.approved_version_id().unwrap_or(record.id);
        self.store.require(&record.model, id)
    }

    /// The draft of this record's live version, created on first access.
    pub fn get_or_create_draft(&self, record: &Record) -> Result<Record> {
        let live = self.get_approved_version(record)?;
        self.cloner().get_or_create_draft(&live)
    }

    /// The record to edit: the record itself when it already is a draft,
    /// otherwise its draft, created if missing.
    pub fn editable_version(&self, record: &Record) -> Result<Record> {
        if self.is_draft(record)? {
            Ok(record.clone())
        } else {
            self.get_or_create_draft(record)
        }
    }

    /// Merge the draft back onto the live record, swapping child rows for
    /// the draft's and retaining a previous version when the type tracks
    /// history. A no-op returning the live record unchanged when no draft
    /// exists or the type's approval gate reports no approval needed.
    pub fn publish_draft(&self, record: &Record) -> Result<Record> {
        let live = self.get_approved_version(record)?;
        self.publisher().publish_draft(&live)
    }

    /// Drop the draft tree without publishing. Returns whether one existed.
    pub fn discard_draft(&self, record: &Record) -> Result<bool> {
        let live = self.get_approved_version(record)?;
        let drafts = self.store.drafts_of(&live.model, live.id)?;
        if drafts.is_empty() {
            return Ok(false);
        }
        let mut batch = self.store.batch();
        for draft in &drafts {
            delete_subtree(&self.store, &self.registry, draft, &mut batch)?;
        }
        self.store.apply(batch)?;
        tracing::debug!(model = %live.model, id = live.id, "draft discarded");
        Ok(true)
    }

    /// Structural diff of the live record against its draft.
    pub fn draft_diff(&self, record: &Record, options: DiffOptions) -> Result<DiffNode> {
        let live = self.get_approved_version(record)?;
        self.differ().draft_diff(&live, options)
    }

    pub fn is_previous_version(&self, record: &Record) -> Result<bool> {
        self.versions().is_previous_version(record)
    }

    pub fn previous_version(&self, record: &Record) -> Result<Option<Record>> {
        self.versions().previous_version(record)
    }

    /// Retained snapshots, most recent first.
    pub fn previous_versions(&self, record: &Record) -> Result<Vec<Record>> {
        self.versions().previous_versions(record)
    }

    /// Promote a previous version back to being the live state. Returns
    /// `None` when the record is not a previous version.
    pub fn make_current(&self, record: &Record) -> Result<Option<Record>> {
        let current = self.store.require(&record.model, record.id)?;
        self.versions().make_current(&current)
    }
}
