use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template syntax error in `{template}`: {message}")]
    TemplateSyntax { template: String, message: String },

    #[error("template `{template_id}` uses placeholder `{placeholder}` with no declared values")]
    UndeclaredPlaceholder {
        template_id: String,
        placeholder: String,
    },

    #[error("duplicate template id `{0}`")]
    DuplicateTemplateId(String),

    #[error("invalid value set for `{placeholder}` of `{transformation}`: {message}")]
    InvalidValueSet {
        transformation: String,
        placeholder: String,
        message: String,
    },

    #[error("no template matches `{0}`")]
    NoMatch(String),

    #[error("ambiguous placeholder capture in `{template_id}`: {message}")]
    AmbiguousPlaceholder {
        template_id: String,
        message: String,
    },

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("template json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template table: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TemplateError {
    pub(crate) fn syntax(template: &str, message: impl Into<String>) -> Self {
        TemplateError::TemplateSyntax {
            template: template.to_string(),
            message: message.into(),
        }
    }
}
