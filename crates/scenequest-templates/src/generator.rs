//! Combinatorial question generator.
//!
//! Bindings are enumerated as a Cartesian product over placeholder names in
//! sorted order, the last name varying fastest, so the same registry always
//! yields the same sequence.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::registry::{QuestionTemplate, TemplateRegistry};

/// One rendered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub transformation: String,
    pub question_type: String,
    pub template_id: String,
    pub template: String,
    pub placeholders: BTreeMap<String, String>,
    pub question: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Stop after this many records.
    pub max_questions: Option<usize>,
    /// Only these transformations; empty means all.
    pub transformations: Vec<String>,
}

impl GenerateOptions {
    fn selects(&self, transformation: &str) -> bool {
        self.transformations.is_empty() || self.transformations.iter().any(|t| t == transformation)
    }
}

// ============================================================================
// Binding enumeration
// ============================================================================

/// Lazy Cartesian product of named value lists.
#[derive(Debug, Clone)]
pub struct Bindings<'a> {
    names: Vec<&'a str>,
    values: Vec<&'a [String]>,
    cursor: Option<Vec<usize>>,
}

impl<'a> Bindings<'a> {
    /// `axes` must be sorted by name.
    fn new(axes: Vec<(&'a str, &'a [String])>) -> Self {
        let (names, values): (Vec<_>, Vec<_>) = axes.into_iter().unzip();
        let cursor = values
            .iter()
            .all(|v| !v.is_empty())
            .then(|| vec![0; names.len()]);
        Self {
            names,
            values,
            cursor,
        }
    }

    fn advance(&mut self) {
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };
        for axis in (0..cursor.len()).rev() {
            cursor[axis] += 1;
            if cursor[axis] < self.values[axis].len() {
                return;
            }
            cursor[axis] = 0;
        }
        self.cursor = None;
    }
}

impl Iterator for Bindings<'_> {
    type Item = BTreeMap<String, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_ref()?;
        let binding = self
            .names
            .iter()
            .zip(&self.values)
            .zip(cursor)
            .map(|((name, values), &i)| (name.to_string(), values[i].clone()))
            .collect();
        self.advance();
        Some(binding)
    }
}

// ============================================================================
// Generator
// ============================================================================

pub struct QuestionGenerator<'r> {
    registry: &'r TemplateRegistry,
}

impl<'r> QuestionGenerator<'r> {
    pub fn new(registry: &'r TemplateRegistry) -> Self {
        Self { registry }
    }

    /// Size of the full binding product of `transformation`. One for a
    /// transformation without declared value sets. Saturates at `u128::MAX`.
    pub fn enumeration_size(&self, transformation: &str) -> u128 {
        self.registry
            .value_set(transformation)
            .map(|set| product(set.values().map(Vec::len)))
            .unwrap_or(1)
    }

    /// Every binding of every declared placeholder of `transformation`.
    pub fn bindings(&self, transformation: &str) -> Bindings<'r> {
        let axes = self
            .registry
            .value_set(transformation)
            .map(|set| {
                set.iter()
                    .map(|(name, values)| (name.as_str(), values.as_slice()))
                    .collect()
            })
            .unwrap_or_default();
        Bindings::new(axes)
    }

    /// Bindings restricted to the placeholders `template` renders.
    fn template_bindings<'t>(&'t self, template: &'t QuestionTemplate) -> Bindings<'t> {
        let declared = self.registry.value_set(template.transformation_type());
        let axes = template
            .original()
            .placeholder_names()
            .into_iter()
            .map(|name| {
                let values = declared
                    .and_then(|set| set.get(name))
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                (name, values)
            })
            .collect();
        Bindings::new(axes)
    }

    /// Every record of `transformation`, template by template in registry
    /// order.
    ///
    /// Each template is rendered only over the placeholders it names, so a
    /// question appears once per template rather than once per binding of the
    /// transformation's full value product.
    pub fn records<'a>(&'a self, transformation: &'a str) -> impl Iterator<Item = QuestionRecord> + 'a {
        self.registry
            .by_transformation(transformation)
            .flat_map(move |template| {
                self.template_bindings(template).filter_map(move |placeholders| {
                    let question = template.original().render(&placeholders)?;
                    Some(QuestionRecord {
                        transformation: template.transformation_type().to_string(),
                        question_type: template.question_category().to_string(),
                        template_id: template.template_id().to_string(),
                        template: template.original_template().to_string(),
                        placeholders,
                        question,
                    })
                })
            })
    }

    /// Number of records [`QuestionGenerator::records`] yields.
    pub fn record_count(&self, transformation: &str) -> u128 {
        let declared = self.registry.value_set(transformation);
        self.registry
            .by_transformation(transformation)
            .map(|template| {
                product(template.original().placeholder_names().into_iter().map(|name| {
                    declared
                        .and_then(|set| set.get(name))
                        .map(Vec::len)
                        .unwrap_or(0)
                }))
            })
            .fold(0u128, u128::saturating_add)
    }

    fn selected(&self, options: &GenerateOptions) -> Vec<&'r str> {
        self.registry
            .transformations()
            .into_iter()
            .filter(|t| options.selects(t))
            .collect()
    }

    pub fn generate(&self, options: &GenerateOptions) -> Vec<QuestionRecord> {
        let records = self
            .selected(options)
            .into_iter()
            .flat_map(|t| self.records(t));
        let out: Vec<QuestionRecord> = match options.max_questions {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        };
        tracing::debug!(records = out.len(), "generated question records");
        out
    }

    /// Same output as [`QuestionGenerator::generate`], with transformations
    /// enumerated on the rayon pool.
    pub fn generate_parallel(&self, options: &GenerateOptions) -> Vec<QuestionRecord> {
        let limit = options.max_questions.unwrap_or(usize::MAX);
        let per_transformation: Vec<Vec<QuestionRecord>> = self
            .selected(options)
            .into_par_iter()
            .map(|t| self.records(t).take(limit).collect())
            .collect();
        let out: Vec<QuestionRecord> = per_transformation.into_iter().flatten().take(limit).collect();
        tracing::debug!(records = out.len(), "generated question records in parallel");
        out
    }
}

fn product(sizes: impl Iterator<Item = usize>) -> u128 {
    sizes.fold(1u128, |acc, n| acc.saturating_mul(n as u128))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> TemplateRegistry {
        TemplateRegistry::from_json_value(json!({
            "QUESTION_TEMPLATES": {
                "Delete": {"question_types": {
                    "counting": [
                        "Delete all {color} objects. How many {shape} objects remain?",
                        "Delete all {color} objects. How many objects remain?"
                    ]
                }},
                "Mirror_Reflect": {"question_types": {
                    "ordering": ["Mirror the scene. Which object is leftmost?"]
                }}
            },
            "TRANSFORM_PLACEHOLDER_VALUES": {
                "Delete": {"color": ["red", "blue"], "shape": ["cube", "sphere", "cylinder"], "size": ["small", "large"]}
            }
        }))
        .unwrap()
    }

    #[test]
    fn bindings_follow_sorted_odometer_order() {
        let registry = registry();
        let generator = QuestionGenerator::new(&registry);
        let all: Vec<_> = generator.bindings("Delete").collect();
        assert_eq!(generator.enumeration_size("Delete"), 12);
        assert_eq!(all.len(), 12);
        assert_eq!(all[0]["color"], "red");
        assert_eq!(all[0]["shape"], "cube");
        assert_eq!(all[0]["size"], "small");
        assert_eq!(all[1]["size"], "large");
        assert_eq!(all[2]["shape"], "sphere");
        assert_eq!(all[6]["color"], "blue");
    }

    #[test]
    fn transformation_without_value_sets_has_one_empty_binding() {
        let registry = registry();
        let generator = QuestionGenerator::new(&registry);
        assert_eq!(generator.enumeration_size("Mirror_Reflect"), 1);
        let bindings: Vec<_> = generator.bindings("Mirror_Reflect").collect();
        assert_eq!(bindings, vec![BTreeMap::new()]);
        let records: Vec<_> = generator.records("Mirror_Reflect").collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "Mirror the scene. Which object is leftmost?");
    }

    #[test]
    fn records_keep_only_the_template_placeholders() {
        let registry = registry();
        let generator = QuestionGenerator::new(&registry);
        let records: Vec<_> = generator.records("Delete").collect();
        assert_eq!(records.len(), 6 + 2);
        assert_eq!(generator.record_count("Delete"), 8);
        assert_eq!(records[0].question, "Delete all red objects. How many cube objects remain?");
        assert_eq!(records[0].placeholders.len(), 2);
        assert_eq!(records[6].template_id, "Delete/counting/2");
        assert_eq!(records[6].placeholders.keys().collect::<Vec<_>>(), vec!["color"]);
    }

    #[test]
    fn options_filter_and_limit() {
        let registry = registry();
        let generator = QuestionGenerator::new(&registry);
        let only_mirror = generator.generate(&GenerateOptions {
            transformations: vec!["Mirror_Reflect".to_string()],
            ..GenerateOptions::default()
        });
        assert_eq!(only_mirror.len(), 1);

        let limited = generator.generate(&GenerateOptions {
            max_questions: Some(3),
            ..GenerateOptions::default()
        });
        assert_eq!(limited.len(), 3);
    }

    #[test]
    fn parallel_generation_matches_sequential_order() {
        let registry = TemplateRegistry::builtin().unwrap();
        let generator = QuestionGenerator::new(&registry);
        let options = GenerateOptions::default();
        assert_eq!(generator.generate_parallel(&options), generator.generate(&options));

        let limited = GenerateOptions {
            max_questions: Some(50),
            ..GenerateOptions::default()
        };
        assert_eq!(generator.generate_parallel(&limited), generator.generate(&limited));
    }
}
