use thiserror::Error;

use crate::admission_review::GroupVersionResource;

pub type Result<T> = std::result::Result<T, AdmissionError>;

/// The incoming payload cannot be turned into the structure we expect.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("malformed admission review: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("admission request does not carry an object")]
    MissingObject,

    #[error("resource {actual} does not match the expected resource {expected}")]
    KindMismatch {
        expected: GroupVersionResource,
        actual: GroupVersionResource,
    },
}

/// A business rule rejected the reviewed object. The message is shown
/// to the user who submitted the resource.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PolicyError {
    message: String,
}

impl PolicyError {
    pub fn new(message: impl Into<String>) -> Self {
        PolicyError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("could not deserialize {resource} object: {source}")]
    ObjectDecode {
        resource: GroupVersionResource,
        #[source]
        source: DecodeError,
    },

    #[error("{0}")]
    Internal(String),
}
