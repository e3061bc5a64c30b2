//! Core record value types
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Identifier allocated by the store, monotonic per database.
pub type RecordId = u64;

pub const ID_FIELD: &str = "id";
pub const APPROVED_VERSION_ID: &str = "approved_version_id";
pub const CURRENT_APPROVED_VERSION_ID: &str = "current_approved_version_id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

// Deriving the ordering traits would require `T: Ord`, which the chrono
// zone types do not implement. Timestamps order by their instant.
impl<T: TimeZone + Eq> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone + Eq> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// One attribute slot on a record. Absent and `Null` are treated alike.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, minicbor::Encode, minicbor::Decode)]
pub enum AttrValue {
    #[n(0)]
    Null,
    #[n(1)]
    Bool(#[n(0)] bool),
    #[n(2)]
    Int(#[n(0)] i64),
    #[n(3)]
    Text(#[n(0)] String),
    #[n(4)]
    Timestamp(#[n(0)] TimeStamp<Utc>),
    #[n(5)]
    Id(#[n(0)] RecordId),
}

impl AttrValue {
    /// Wrap an optional foreign key, mapping `None` to `Null`.
    pub fn id(value: Option<RecordId>) -> Self {
        match value {
            Some(id) => AttrValue::Id(id),
            None => AttrValue::Null,
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
    pub fn as_id(&self) -> Option<RecordId> {
        match self {
            AttrValue::Id(id) => Some(*id),
            _ => None,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}
impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value.into())
    }
}
impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}
// u64 is the id type, so bare u64 values become foreign keys
impl From<RecordId> for AttrValue {
    fn from(value: RecordId) -> Self {
        AttrValue::Id(value)
    }
}
impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}
impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}
impl From<TimeStamp<Utc>> for AttrValue {
    fn from(value: TimeStamp<Utc>) -> Self {
        AttrValue::Timestamp(value)
    }
}

/// A persisted row: model name, id, and a full attribute map.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct Record {
    #[n(0)]
    pub id: RecordId,
    #[n(1)]
    pub model: String,
    #[n(2)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Record {
    pub fn new(id: RecordId, model: impl Into<String>) -> Self {
        Self {
            id,
            model: model.into(),
            attributes: BTreeMap::new(),
        }
    }
    pub fn get(&self, name: &str) -> &AttrValue {
        self.attributes.get(name).unwrap_or(&AttrValue::Null)
    }
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(name.into(), value.into());
    }
    /// Read an attribute as a foreign key, treating `Null` as absent.
    pub fn id_attr(&self, name: &str) -> Option<RecordId> {
        self.get(name).as_id()
    }
    pub fn set_id_attr(&mut self, name: &str, value: Option<RecordId>) {
        self.set(name, AttrValue::id(value));
    }

    pub fn approved_version_id(&self) -> Option<RecordId> {
        self.id_attr(APPROVED_VERSION_ID)
    }
    pub fn set_approved_version_id(&mut self, value: Option<RecordId>) {
        self.set_id_attr(APPROVED_VERSION_ID, value);
    }
    pub fn current_approved_version_id(&self) -> Option<RecordId> {
        self.id_attr(CURRENT_APPROVED_VERSION_ID)
    }
    pub fn set_current_approved_version_id(&mut self, value: Option<RecordId>) {
        self.set_id_attr(CURRENT_APPROVED_VERSION_ID, value);
    }

    /// True when this row is a draft of some live record. Only meaningful
    /// for models that carry the approved_version_id field.
    pub fn is_draft_record(&self) -> bool {
        self.approved_version_id().is_some()
    }
    /// True when this row is a retained previously-approved version.
    pub fn is_historic_record(&self) -> bool {
        self.current_approved_version_id().is_some()
    }
}
