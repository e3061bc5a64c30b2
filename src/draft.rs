//! Draft creation: deep clone of a live record through its draft targets
use crate::config::Registry;
use crate::error::{Error, Result};
use crate::record::{AttrValue, CREATED_AT, Record, TimeStamp, UPDATED_AT};
use crate::store::RecordStore;

pub(crate) struct DraftCloner<'a> {
    pub store: &'a RecordStore,
    pub registry: &'a Registry,
}

impl DraftCloner<'_> {
    /// The existing draft of a live record, or a freshly cloned one. The
    /// whole clone tree is written in a single atomic batch.
    pub fn get_or_create_draft(&self, live: &Record) -> Result<Record> {
        self.registry.ensure_draftable(&live.model)?;
        let config = self.registry.require_config(&live.model)?;

        if let Some(existing) = self.store.draft_of(&live.model, live.id)? {
            return Ok(existing);
        }

        let mut clones = Vec::new();
        let root_ix = self
            .clone_tree(live, &mut clones)
            .map_err(|e| Error::DraftCreation(Box::new(e)))?;

        if let Some(hook) = &config.after_create_draft {
            hook(&mut clones[root_ix]);
        }

        let mut batch = self.store.batch();
        for clone in &clones {
            batch
                .put(clone)
                .map_err(|e| Error::DraftCreation(Box::new(e)))?;
        }
        self.store
            .apply(batch)
            .map_err(|e| Error::DraftCreation(Box::new(e)))?;

        tracing::debug!(
            model = %live.model,
            live_id = live.id,
            draft_id = clones[root_ix].id,
            records = clones.len(),
            "draft created"
        );
        Ok(clones.swap_remove(root_ix))
    }

    /// Clone one record and, depth-first, every child reachable through its
    /// draft targets. Returns the index of the record's clone in `out`.
    fn clone_tree(&self, source: &Record, out: &mut Vec<Record>) -> Result<usize> {
        let config = self.registry.require_config(&source.model)?;
        let schema = self.registry.catalog().require_model(&source.model)?;

        let id = self.store.next_id()?;
        let mut clone = Record {
            id,
            model: source.model.clone(),
            attributes: source.attributes.clone(),
        };
        for name in &config.nullify {
            clone.set(name.as_str(), AttrValue::Null);
        }
        if config.capabilities.tracks_approved_version {
            clone.set_approved_version_id(Some(source.id));
        }
        // a clone is a new row, never a previous version
        if config.capabilities.tracks_history {
            clone.set_current_approved_version_id(None);
        }
        if schema.has_field(CREATED_AT) {
            clone.set(CREATED_AT, TimeStamp::new());
        }
        if schema.has_field(UPDATED_AT) {
            clone.set(UPDATED_AT, TimeStamp::new());
        }

        let root_ix = out.len();
        out.push(clone);

        for assoc in &config.draft_targets {
            let children =
                self.store
                    .live_children_of(&assoc.target, &assoc.foreign_key, source.id)?;
            for child in children {
                let child_ix = self.clone_tree(&child, out)?;
                out[child_ix].set(assoc.foreign_key.as_str(), AttrValue::Id(id));
            }
        }
        Ok(root_ix)
    }
}
