//! Previously-approved version chain
use crate::config::Registry;
use crate::error::{Error, Result};
use crate::publish::delete_subtree;
use crate::record::{APPROVED_VERSION_ID, Record, TimeStamp, UPDATED_AT};
use crate::store::RecordStore;

/// Copy the live record's current state into a new historic row. Timestamps
/// are carried over untouched, so the snapshot reads exactly as it did live.
pub(crate) fn snapshot_of(store: &RecordStore, live: &Record) -> Result<Record> {
    let id = store.next_id()?;
    let mut snapshot = Record {
        id,
        model: live.model.clone(),
        attributes: live.attributes.clone(),
    };
    snapshot.set_current_approved_version_id(Some(live.id));
    if snapshot.attributes.contains_key(APPROVED_VERSION_ID) {
        snapshot.set_approved_version_id(None);
    }
    Ok(snapshot)
}

pub(crate) struct VersionHistory<'a> {
    pub store: &'a RecordStore,
    pub registry: &'a Registry,
}

impl VersionHistory<'_> {
    /// Retained snapshots of this record, most recent first. Empty when
    /// asked of a draft or of a historic row itself.
    pub fn previous_versions(&self, record: &Record) -> Result<Vec<Record>> {
        self.registry.ensure_tracks_history(&record.model)?;
        self.store.previous_versions_of(&record.model, record.id)
    }

    pub fn previous_version(&self, record: &Record) -> Result<Option<Record>> {
        Ok(self.previous_versions(record)?.into_iter().next())
    }

    pub fn is_previous_version(&self, record: &Record) -> Result<bool> {
        self.registry.ensure_tracks_history(&record.model)?;
        Ok(record.is_historic_record())
    }

    /// Promote a historic snapshot back to being the live state. The current
    /// live attributes are retained as a new chain entry first, and any open
    /// draft is discarded since it no longer reflects what it was cloned
    /// from. Returns `None` when the record is not a previous version.
    pub fn make_current(&self, historic: &Record) -> Result<Option<Record>> {
        self.registry.ensure_tracks_history(&historic.model)?;
        let config = self.registry.require_config(&historic.model)?;
        let schema = self.registry.catalog().require_model(&historic.model)?;

        let Some(live_id) = historic.current_approved_version_id() else {
            return Ok(None);
        };
        let live = self.store.require(&historic.model, live_id)?;

        let mut batch = self.store.batch();
        let snapshot =
            snapshot_of(self.store, &live).map_err(|e| Error::HistoricVersionCreation(Box::new(e)))?;
        batch
            .put(&snapshot)
            .map_err(|e| Error::HistoricVersionCreation(Box::new(e)))?;

        let mut updated = live.clone();
        for name in config.usable_approvable_attributes(schema) {
            updated.set(name.as_str(), historic.get(&name).clone());
        }
        if schema.has_field(UPDATED_AT) {
            updated.set(UPDATED_AT, TimeStamp::new());
        }
        batch.put(&updated)?;

        for stale in self.store.drafts_of(&historic.model, live_id)? {
            delete_subtree(self.store, self.registry, &stale, &mut batch)?;
        }

        self.store.apply(batch)?;
        tracing::info!(
            model = %historic.model,
            live_id,
            historic_id = historic.id,
            "previous version promoted"
        );
        self.store.require(&historic.model, live_id).map(Some)
    }
}
