use scenequest_scene::SceneError;
use scenequest_templates::TemplateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("cannot bind `{transformation}`: {message}")]
    InvalidTransformation {
        transformation: String,
        message: String,
    },

    #[error("invalid value `{value}` for `{key}`")]
    InvalidBinding { key: String, value: String },

    #[error("`{category}` question is missing `{key}`")]
    MissingBinding { category: String, key: String },

    #[error("`{descriptor}` matches {matches} objects")]
    AmbiguousReference { descriptor: String, matches: usize },

    #[error("no object matches `{0}`")]
    NoSuchObject(String),

    #[error("unsupported question category `{0}`")]
    UnsupportedCategory(String),
}

impl EvalError {
    pub(crate) fn invalid_binding(key: &str, value: &str) -> Self {
        EvalError::InvalidBinding {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
