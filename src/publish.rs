//! Publishing: merge an approved draft back onto its live tree
use crate::config::Registry;
use crate::error::{Error, Result};
use crate::history;
use crate::record::{AttrValue, Record, RecordId, TimeStamp, UPDATED_AT};
use crate::store::{RecordStore, StoreBatch};

pub(crate) struct DraftPublisher<'a> {
    pub store: &'a RecordStore,
    pub registry: &'a Registry,
}

impl DraftPublisher<'_> {
    /// Merge the draft of `live` back onto it: attributes, then children,
    /// then retire the draft. Everything lands in one atomic batch. Without
    /// a draft, or when the approval gate waves the record through, this is
    /// a no-op returning `live` unchanged.
    pub fn publish_draft(&self, live: &Record) -> Result<Record> {
        self.registry.ensure_draftable(&live.model)?;
        let config = self.registry.require_config(&live.model)?;
        let schema = self.registry.catalog().require_model(&live.model)?;

        let Some(draft) = self.store.draft_of(&live.model, live.id)? else {
            tracing::debug!(model = %live.model, id = live.id, "nothing to publish");
            return Ok(live.clone());
        };
        if !config.requires_approval_for(live) {
            tracing::debug!(model = %live.model, id = live.id, "approval not required, publish skipped");
            return Ok(live.clone());
        }

        let mut batch = self.store.batch();

        // snapshot the pre-publish state before it is overwritten
        if config.capabilities.tracks_history {
            let snapshot = history::snapshot_of(self.store, live)
                .map_err(|e| Error::HistoricVersionCreation(Box::new(e)))?;
            batch
                .put(&snapshot)
                .map_err(|e| Error::HistoricVersionCreation(Box::new(e)))?;
        }

        let mut updated = live.clone();
        for name in config.usable_approvable_attributes(schema) {
            updated.set(name.as_str(), draft.get(&name).clone());
        }
        if let Some(hook) = &config.before_publish_draft {
            hook(&mut updated);
        }
        if schema.has_field(UPDATED_AT) {
            updated.set(UPDATED_AT, TimeStamp::new());
        }
        batch.put(&updated)?;

        // swap each child collection: drop the live rows, adopt the draft's
        for assoc in &config.draft_targets {
            for stale in self
                .store
                .children_of(&assoc.target, &assoc.foreign_key, live.id)?
            {
                delete_subtree(self.store, self.registry, &stale, &mut batch)?;
            }
            for child in self
                .store
                .children_of(&assoc.target, &assoc.foreign_key, draft.id)?
            {
                self.adopt_child(child, &assoc.foreign_key, live.id, &mut batch)?;
            }
        }

        // retire the published draft; duplicates from racing creations are
        // removed whole
        for dup in self.store.drafts_of(&live.model, live.id)? {
            if dup.id == draft.id {
                batch.remove(&live.model, dup.id);
            } else {
                tracing::warn!(
                    model = %live.model,
                    live_id = live.id,
                    draft_id = dup.id,
                    "removing duplicate draft"
                );
                delete_subtree(self.store, self.registry, &dup, &mut batch)?;
            }
        }

        self.store.apply(batch)?;
        tracing::info!(model = %live.model, id = live.id, "draft published");
        self.store.require(&live.model, live.id)
    }

    /// Re-point one draft child at the live parent and clear draft markers
    /// down its subtree, so the adopted rows read as live.
    fn adopt_child(
        &self,
        mut child: Record,
        foreign_key: &str,
        live_parent_id: RecordId,
        batch: &mut StoreBatch,
    ) -> Result<()> {
        let config = self.registry.require_config(&child.model)?;
        let schema = self.registry.catalog().require_model(&child.model)?;

        child.set(foreign_key, AttrValue::Id(live_parent_id));
        if config.capabilities.tracks_approved_version {
            child.set_approved_version_id(None);
        }
        if schema.has_field(UPDATED_AT) {
            child.set(UPDATED_AT, TimeStamp::new());
        }
        batch.put(&child)?;
        self.clear_draft_markers(&child, batch)
    }

    fn clear_draft_markers(&self, record: &Record, batch: &mut StoreBatch) -> Result<()> {
        let config = self.registry.require_config(&record.model)?;
        for assoc in &config.draft_targets {
            for mut child in self
                .store
                .children_of(&assoc.target, &assoc.foreign_key, record.id)?
            {
                if child.approved_version_id().is_some() {
                    child.set_approved_version_id(None);
                    batch.put(&child)?;
                }
                self.clear_draft_markers(&child, batch)?;
            }
        }
        Ok(())
    }
}

/// Queue removal of a record and, depth-first, every child reachable through
/// its draft targets.
pub(crate) fn delete_subtree(
    store: &RecordStore,
    registry: &Registry,
    record: &Record,
    batch: &mut StoreBatch,
) -> Result<()> {
    let config = registry.require_config(&record.model)?;
    batch.remove(&record.model, record.id);
    for assoc in &config.draft_targets {
        for child in store.children_of(&assoc.target, &assoc.foreign_key, record.id)? {
            delete_subtree(store, registry, &child, batch)?;
        }
    }
    Ok(())
}
