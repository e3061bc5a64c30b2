use crate::record::RecordId;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{model}: {message}")]
    Configuration { model: String, message: String },
    #[error(
        "{model} doesn't have an approved_version_id field, so you cannot access its draft or \
         approved versions. Add a field approved_version_id (Id) to enable this tracking."
    )]
    ApprovedVersionId { model: String },
    #[error(
        "{model} doesn't have a current_approved_version_id field, so it keeps no previously \
         approved versions. Add a field current_approved_version_id (Id) to enable this tracking."
    )]
    HistoryTracking { model: String },
    #[error("no model named {0} is declared in the schema catalog")]
    UnknownModel(String),
    #[error("no {model} record with id {id}")]
    UnknownRecord { model: String, id: RecordId },
    #[error("the draft failed to be created: {0}")]
    DraftCreation(#[source] Box<Error>),
    #[error("could not create previously-approved version: {0}")]
    HistoricVersionCreation(#[source] Box<Error>),
    #[error("store: {0}")]
    Store(#[from] sled::Error),
    #[error("codec: {0}")]
    Codec(String),
}

impl Error {
    pub(crate) fn configuration(model: &str, message: impl Into<String>) -> Self {
        Error::Configuration {
            model: model.to_string(),
            message: message.into(),
        }
    }
}

impl From<minicbor::decode::Error> for Error {
    fn from(err: minicbor::decode::Error) -> Self {
        Error::Codec(err.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for Error {
    fn from(err: minicbor::encode::Error<E>) -> Self {
        Error::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
