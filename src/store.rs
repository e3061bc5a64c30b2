//! Sled-backed record repository
use crate::error::{Error, Result};
use crate::record::{Record, RecordId};
use sled::{Batch, Db};
use std::sync::Arc;

/// Key layout is `{model}/{id:020}`, so a prefix scan over one model yields
/// records in ascending id order.
fn record_key(model: &str, id: RecordId) -> Vec<u8> {
    format!("{model}/{id:020}").into_bytes()
}

fn model_prefix(model: &str) -> Vec<u8> {
    format!("{model}/").into_bytes()
}

fn decode_record(bytes: &[u8]) -> Result<Record> {
    minicbor::decode(bytes).map_err(Error::from)
}

pub struct RecordStore {
    instance: Arc<Db>,
}

impl RecordStore {
    pub fn new(instance: Arc<Db>) -> Self {
        Self { instance }
    }

    /// Allocate the next record id, monotonic per database.
    pub fn next_id(&self) -> Result<RecordId> {
        Ok(self.instance.generate_id()?)
    }

    pub fn insert(&self, record: &Record) -> Result<()> {
        self.instance.insert(
            record_key(&record.model, record.id),
            minicbor::to_vec(record)?,
        )?;
        Ok(())
    }

    pub fn get(&self, model: &str, id: RecordId) -> Result<Option<Record>> {
        match self.instance.get(record_key(model, id))? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require(&self, model: &str, id: RecordId) -> Result<Record> {
        self.get(model, id)?.ok_or_else(|| Error::UnknownRecord {
            model: model.to_string(),
            id,
        })
    }

    pub fn remove(&self, model: &str, id: RecordId) -> Result<()> {
        self.instance.remove(record_key(model, id))?;
        Ok(())
    }

    /// All records of one model in ascending id order.
    pub fn scan(&self, model: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for entry in self.instance.scan_prefix(model_prefix(model)) {
            let (_, bytes) = entry?;
            records.push(decode_record(&bytes)?);
        }
        Ok(records)
    }

    pub fn find_where(
        &self,
        model: &str,
        mut predicate: impl FnMut(&Record) -> bool,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for entry in self.instance.scan_prefix(model_prefix(model)) {
            let (_, bytes) = entry?;
            let record = decode_record(&bytes)?;
            if predicate(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn count(&self, model: &str) -> Result<usize> {
        Ok(self.scan(model)?.len())
    }

    /// Records that are neither drafts nor retained previous versions.
    pub fn live_records(&self, model: &str) -> Result<Vec<Record>> {
        self.find_where(model, |r| !r.is_draft_record() && !r.is_historic_record())
    }

    pub fn draft_records(&self, model: &str) -> Result<Vec<Record>> {
        self.find_where(model, |r| r.is_draft_record())
    }

    /// The draft of a live record, if one exists. With more than one present
    /// the oldest wins; publish cleans the others up.
    pub fn draft_of(&self, model: &str, live_id: RecordId) -> Result<Option<Record>> {
        Ok(self
            .find_where(model, |r| r.approved_version_id() == Some(live_id))?
            .into_iter()
            .next())
    }

    pub fn drafts_of(&self, model: &str, live_id: RecordId) -> Result<Vec<Record>> {
        self.find_where(model, |r| r.approved_version_id() == Some(live_id))
    }

    /// Child rows whose foreign key points at the given parent.
    pub fn children_of(
        &self,
        child_model: &str,
        foreign_key: &str,
        parent_id: RecordId,
    ) -> Result<Vec<Record>> {
        self.find_where(child_model, |r| r.id_attr(foreign_key) == Some(parent_id))
    }

    /// Like [`children_of`](Self::children_of), but skips rows that are
    /// themselves drafts. Used when walking the live side of a tree, where a
    /// directly created child draft would otherwise leak in.
    pub fn live_children_of(
        &self,
        child_model: &str,
        foreign_key: &str,
        parent_id: RecordId,
    ) -> Result<Vec<Record>> {
        self.find_where(child_model, |r| {
            r.id_attr(foreign_key) == Some(parent_id) && !r.is_draft_record()
        })
    }

    /// Retained previous versions of a live record, most recent first.
    pub fn previous_versions_of(&self, model: &str, live_id: RecordId) -> Result<Vec<Record>> {
        let mut versions =
            self.find_where(model, |r| r.current_approved_version_id() == Some(live_id))?;
        versions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(versions)
    }

    pub fn batch(&self) -> StoreBatch {
        StoreBatch::default()
    }

    /// Apply every queued write atomically.
    pub fn apply(&self, batch: StoreBatch) -> Result<()> {
        tracing::trace!(puts = batch.puts, removes = batch.removes, "applying batch");
        self.instance.apply_batch(batch.inner)?;
        Ok(())
    }
}

/// Buffered writes applied in one atomic step.
#[derive(Default)]
pub struct StoreBatch {
    inner: Batch,
    puts: usize,
    removes: usize,
}

impl StoreBatch {
    pub fn put(&mut self, record: &Record) -> Result<()> {
        self.inner.insert(
            record_key(&record.model, record.id),
            minicbor::to_vec(record)?,
        );
        self.puts += 1;
        Ok(())
    }

    pub fn remove(&mut self, model: &str, id: RecordId) {
        self.inner.remove(record_key(model, id));
        self.removes += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.puts == 0 && self.removes == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AttrValue;

    fn open_store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        (dir, RecordStore::new(Arc::new(db)))
    }

    #[test]
    fn insert_get_remove_roundtrip() {
        let (_dir, store) = open_store();
        let mut record = Record::new(store.next_id().unwrap(), "Product");
        record.set("name", "Trailhead Pack");

        store.insert(&record).unwrap();
        assert_eq!(store.get("Product", record.id).unwrap(), Some(record.clone()));

        store.remove("Product", record.id).unwrap();
        assert_eq!(store.get("Product", record.id).unwrap(), None);
        assert!(matches!(
            store.require("Product", record.id),
            Err(Error::UnknownRecord { .. })
        ));
    }

    #[test]
    fn scan_is_scoped_to_one_model_and_ordered_by_id() {
        let (_dir, store) = open_store();
        for label in ["small", "medium", "large"] {
            let mut v = Record::new(store.next_id().unwrap(), "Variant");
            v.set("label", label);
            store.insert(&v).unwrap();
        }
        let mut other = Record::new(store.next_id().unwrap(), "Product");
        other.set("name", "decoy");
        store.insert(&other).unwrap();

        let variants = store.scan("Variant").unwrap();
        assert_eq!(variants.len(), 3);
        let ids: Vec<_> = variants.iter().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn children_scopes_respect_draft_rows() {
        let (_dir, store) = open_store();
        let parent_id = store.next_id().unwrap();

        let mut child = Record::new(store.next_id().unwrap(), "Variant");
        child.set("product_id", AttrValue::Id(parent_id));
        store.insert(&child).unwrap();

        let mut stray_draft = Record::new(store.next_id().unwrap(), "Variant");
        stray_draft.set("product_id", AttrValue::Id(parent_id));
        stray_draft.set_approved_version_id(Some(child.id));
        store.insert(&stray_draft).unwrap();

        let all = store.children_of("Variant", "product_id", parent_id).unwrap();
        assert_eq!(all.len(), 2);
        let live = store
            .live_children_of("Variant", "product_id", parent_id)
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, child.id);
    }

    #[test]
    fn batch_applies_all_writes_at_once() {
        let (_dir, store) = open_store();
        let doomed = Record::new(store.next_id().unwrap(), "Product");
        store.insert(&doomed).unwrap();

        let mut batch = store.batch();
        assert!(batch.is_empty());
        let kept = Record::new(store.next_id().unwrap(), "Product");
        batch.put(&kept).unwrap();
        batch.remove("Product", doomed.id);
        assert!(!batch.is_empty());
        store.apply(batch).unwrap();

        assert_eq!(store.get("Product", doomed.id).unwrap(), None);
        assert_eq!(store.get("Product", kept.id).unwrap(), Some(kept));
    }

    #[test]
    fn previous_versions_come_back_most_recent_first() {
        let (_dir, store) = open_store();
        let live_id = store.next_id().unwrap();
        for _ in 0..3 {
            let mut snap = Record::new(store.next_id().unwrap(), "Variant");
            snap.set_current_approved_version_id(Some(live_id));
            store.insert(&snap).unwrap();
        }
        let versions = store.previous_versions_of("Variant", live_id).unwrap();
        assert_eq!(versions.len(), 3);
        assert!(versions[0].id > versions[1].id && versions[1].id > versions[2].id);
    }
}
