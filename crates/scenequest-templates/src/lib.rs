//! Scenequest question templates
//!
//! Question templates are strings with `{placeholder}` slots, grouped by the
//! scene edit they describe and by the kind of question they ask. This crate
//! holds:
//!
//! - `grammar`: the placeholder grammar every template is parsed into,
//! - `registry`: the template registry and its JSON / CSV sources,
//! - `generator`: exhaustive enumeration of rendered questions,
//! - `matcher`: compilation of templates into matchers that recover a
//!   template and its bindings from free text.
//!
//! Generated questions are accepted by the matcher built from the same
//! registry, and the bindings it recovers are the bindings that rendered them.

pub mod error;
pub mod generator;
pub mod grammar;
pub mod matcher;
pub mod registry;

pub use error::TemplateError;
pub use generator::{Bindings, GenerateOptions, QuestionGenerator, QuestionRecord};
pub use grammar::{PlaceholderName, TemplateGrammar, Token};
pub use matcher::{
    CompiledTemplate, LexiconEntry, ParsedQuestion, PlaceholderLexicon, TemplateMatcher,
    UNRESOLVED_CAPTURE,
};
pub use registry::{
    QuestionTemplate, TemplateDocument, TemplateRegistry, TemplateRow, TransformationTemplates,
    ValueSet,
};
