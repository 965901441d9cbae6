//! Template registry.
//!
//! Two source forms are accepted:
//!
//! - the template document: `QUESTION_TEMPLATES` (transformation →
//!   `question_types` → category → template strings) next to
//!   `TRANSFORM_PLACEHOLDER_VALUES` (transformation → placeholder → values);
//! - the tabular form: one CSV row per template with an explicit id, an
//!   authoring template and a matching template, combined with the value sets
//!   of a template document.
//!
//! Construction checks that every placeholder a template renders has a
//! declared value set and that template ids are unique.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TemplateError;
use crate::grammar::TemplateGrammar;

const BUILTIN_TEMPLATES: &str = include_str!("../data/templates.json");

/// Placeholder name → closed list of rendered values.
pub type ValueSet = BTreeMap<String, Vec<String>>;

// ============================================================================
// Source documents
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateDocument {
    #[serde(rename = "QUESTION_TEMPLATES", default)]
    pub question_templates: IndexMap<String, TransformationTemplates>,
    #[serde(rename = "TRANSFORM_PLACEHOLDER_VALUES", default)]
    pub placeholder_values: IndexMap<String, IndexMap<String, Vec<Value>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformationTemplates {
    pub question_types: IndexMap<String, Vec<String>>,
}

impl TemplateDocument {
    pub fn from_json_str(text: &str) -> Result<Self, TemplateError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, TemplateError> {
        let text = read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Value sets with every literal rendered as question text. Numbers keep
    /// their JSON spelling (`2`, `0.5`).
    pub fn value_sets(&self) -> Result<IndexMap<String, ValueSet>, TemplateError> {
        let mut out = IndexMap::new();
        for (transformation, placeholders) in &self.placeholder_values {
            let mut set = ValueSet::new();
            for (placeholder, values) in placeholders {
                let rendered = values
                    .iter()
                    .map(|value| match value {
                        Value::String(s) => Ok(s.clone()),
                        Value::Number(n) => Ok(n.to_string()),
                        Value::Bool(b) => Ok(b.to_string()),
                        other => Err(TemplateError::InvalidValueSet {
                            transformation: transformation.clone(),
                            placeholder: placeholder.clone(),
                            message: format!("unsupported value {other}"),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                set.insert(placeholder.clone(), rendered);
            }
            out.insert(transformation.clone(), set);
        }
        Ok(out)
    }
}

/// One row of the tabular registry form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRow {
    #[serde(rename = "Transformation_Type")]
    pub transformation_type: String,
    #[serde(rename = "Question_Category")]
    pub question_category: String,
    #[serde(rename = "Template_ID")]
    pub template_id: String,
    #[serde(rename = "Original_Question_Template")]
    pub original_template: String,
    #[serde(rename = "Updated_Question_Template")]
    pub updated_template: String,
}

// ============================================================================
// Templates
// ============================================================================

/// A registered question template.
///
/// `original` is what the generator renders; `updated` is what the matcher
/// compiles. Templates loaded from the document form use the same string for
/// both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionTemplate {
    transformation_type: String,
    question_category: String,
    template_id: String,
    original: TemplateGrammar,
    updated: TemplateGrammar,
}

impl QuestionTemplate {
    pub fn new(
        transformation_type: impl Into<String>,
        question_category: impl Into<String>,
        template_id: impl Into<String>,
        original_template: &str,
        updated_template: &str,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            transformation_type: transformation_type.into(),
            question_category: question_category.into(),
            template_id: template_id.into(),
            original: TemplateGrammar::parse(original_template)?,
            updated: TemplateGrammar::parse(updated_template)?,
        })
    }

    pub fn from_row(row: &TemplateRow) -> Result<Self, TemplateError> {
        Self::new(
            row.transformation_type.trim(),
            row.question_category.trim(),
            row.template_id.trim(),
            &row.original_template,
            &row.updated_template,
        )
    }

    pub fn transformation_type(&self) -> &str {
        &self.transformation_type
    }

    pub fn question_category(&self) -> &str {
        &self.question_category
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn original_template(&self) -> &str {
        self.original.source()
    }

    pub fn updated_template(&self) -> &str {
        self.updated.source()
    }

    /// Grammar used for rendering questions.
    pub fn original(&self) -> &TemplateGrammar {
        &self.original
    }

    /// Grammar used for matching questions.
    pub fn updated(&self) -> &TemplateGrammar {
        &self.updated
    }

    pub fn to_row(&self) -> TemplateRow {
        TemplateRow {
            transformation_type: self.transformation_type.clone(),
            question_category: self.question_category.clone(),
            template_id: self.template_id.clone(),
            original_template: self.original_template().to_string(),
            updated_template: self.updated_template().to_string(),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<QuestionTemplate>,
    by_id: HashMap<String, usize>,
    value_sets: IndexMap<String, ValueSet>,
}

impl TemplateRegistry {
    /// Templates keep the given order; it is the order the matcher tries them
    /// in.
    pub fn new(
        templates: Vec<QuestionTemplate>,
        value_sets: IndexMap<String, ValueSet>,
    ) -> Result<Self, TemplateError> {
        let mut by_id = HashMap::with_capacity(templates.len());
        for (position, template) in templates.iter().enumerate() {
            if by_id.insert(template.template_id.clone(), position).is_some() {
                return Err(TemplateError::DuplicateTemplateId(template.template_id.clone()));
            }
            let declared = value_sets.get(&template.transformation_type);
            for name in template.original.placeholder_names() {
                if !declared.is_some_and(|set| set.contains_key(name)) {
                    return Err(TemplateError::UndeclaredPlaceholder {
                        template_id: template.template_id.clone(),
                        placeholder: name.to_string(),
                    });
                }
            }
        }
        tracing::debug!(
            templates = templates.len(),
            transformations = value_sets.len(),
            "template registry loaded"
        );
        Ok(Self {
            templates,
            by_id,
            value_sets,
        })
    }

    /// Builds a registry from the document form. Template ids are
    /// `<transformation>/<category>/<n>` with `n` counting from 1.
    pub fn from_document(document: &TemplateDocument) -> Result<Self, TemplateError> {
        let mut templates = Vec::new();
        for (transformation, entry) in &document.question_templates {
            for (category, strings) in &entry.question_types {
                for (n, text) in strings.iter().enumerate() {
                    let id = format!("{transformation}/{category}/{}", n + 1);
                    templates.push(QuestionTemplate::new(
                        transformation.as_str(),
                        category.as_str(),
                        id,
                        text,
                        text,
                    )?);
                }
            }
        }
        Self::new(templates, document.value_sets()?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, TemplateError> {
        Self::from_document(&TemplateDocument::from_json_str(text)?)
    }

    pub fn from_json_value(value: Value) -> Result<Self, TemplateError> {
        Self::from_document(&serde_json::from_value(value)?)
    }

    pub fn from_json_path(path: &Path) -> Result<Self, TemplateError> {
        Self::from_document(&TemplateDocument::from_path(path)?)
    }

    /// Reads the tabular form. Value sets come from `values`; its
    /// `QUESTION_TEMPLATES` part is ignored.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        values: &TemplateDocument,
    ) -> Result<Self, TemplateError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
        let mut templates = Vec::new();
        for row in csv.deserialize::<TemplateRow>() {
            templates.push(QuestionTemplate::from_row(&row?)?);
        }
        Self::new(templates, values.value_sets()?)
    }

    pub fn from_csv_path(path: &Path, values: &TemplateDocument) -> Result<Self, TemplateError> {
        let file = fs::File::open(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(file, values)
    }

    /// The registry embedded in the crate.
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::from_json_str(BUILTIN_TEMPLATES)
    }

    /// Writes the registry in tabular form.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), TemplateError> {
        let mut csv = csv::Writer::from_writer(writer);
        for template in &self.templates {
            csv.serialize(template.to_row())?;
        }
        csv.flush().map_err(|source| TemplateError::Io {
            path: "<csv output>".into(),
            source,
        })
    }

    pub fn templates(&self) -> &[QuestionTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, template_id: &str) -> Option<&QuestionTemplate> {
        self.by_id.get(template_id).map(|&i| &self.templates[i])
    }

    pub fn by_transformation<'a>(
        &'a self,
        transformation: &'a str,
    ) -> impl Iterator<Item = &'a QuestionTemplate> + 'a {
        self.templates
            .iter()
            .filter(move |t| t.transformation_type == transformation)
    }

    pub fn by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a QuestionTemplate> + 'a {
        self.templates
            .iter()
            .filter(move |t| t.question_category == category)
    }

    /// Transformation names in first-registration order.
    pub fn transformations(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for template in &self.templates {
            if !seen.contains(&template.transformation_type.as_str()) {
                seen.push(template.transformation_type.as_str());
            }
        }
        seen
    }

    /// Declared value sets of a transformation, if any.
    pub fn value_set(&self, transformation: &str) -> Option<&ValueSet> {
        self.value_sets.get(transformation)
    }
}

fn read_to_string(path: &Path) -> Result<String, TemplateError> {
    fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })
}
