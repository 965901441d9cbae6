use std::path::PathBuf;

use thiserror::Error;

use crate::model::Attribute;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("malformed scene: {0}")]
    MalformedScene(String),

    #[error("invalid viewpoint `{0}` (expected front, back, left_side or right_side)")]
    InvalidViewpoint(String),

    #[error("invalid attribute `{0}` (expected shape, size, material or color)")]
    InvalidAttribute(String),

    #[error("`{value}` is not a known {attribute}")]
    InvalidAttributeValue { attribute: Attribute, value: String },

    #[error("invalid direction `{0}`")]
    InvalidDirection(String),

    #[error("invalid transformation: {0}")]
    InvalidTransformation(String),

    #[error("scene json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to access `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SceneError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        SceneError::MalformedScene(message.into())
    }
}
