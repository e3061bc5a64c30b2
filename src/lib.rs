//! Draft/approval versioning for hierarchical records.
//!
//! A live record and its nested children can each have an editable draft
//! copy. Publishing a draft merges its attributes and children back onto the
//! live tree, optionally retaining the pre-publish state as a previous
//! version. Records are schemaful attribute maps persisted in sled; which
//! models participate, which associations are cloned along, and which
//! attributes survive publish is declared once at startup on a [`Registry`].

pub mod config;
pub mod diff;
mod draft;
pub mod error;
mod history;
mod publish;
pub mod record;
pub mod schema;
pub mod service;
pub mod store;

pub use config::{ApprovalOptions, Registry};
pub use error::{Error, Result};
pub use record::{AttrValue, Record, RecordId, TimeStamp};
pub use service::ApprovalService;
