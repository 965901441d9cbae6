//! Query evaluation: bind a question's edit, apply it, answer the question
//! against the edited scene.
//!
//! Evaluation runs in three stages:
//!
//! 1. **Bind**: the edit clause of the template (placeholders before the first
//!    sentence break) becomes a [`Transformation`], see [`crate::bind`].
//! 2. **Apply**: the transformation engine produces the edited scene plus an
//!    [`IndexRemap`] from base indices to edited indices.
//! 3. **Answer**: the question clause is answered by category. Object
//!    descriptors resolve against the base scene and are followed through the
//!    remap, so "the red cube" keeps naming the same object after a recolor.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use scenequest_scene::{
    Attribute, AttributeFilter, Direction, EngineConfig, IndexRemap, Scene, Selector,
    Transformation, Transformer, Vec3,
};
use scenequest_templates::QuestionTemplate;

use crate::bind::{attribute, bind_transformation, relation_direction, Bindings};
use crate::descriptor::DescriptorParser;
use crate::error::EvalError;

// ============================================================================
// Categories and answers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Counting,
    Existence,
    SpatialRelational,
    AttributeIdentification,
    Conditional,
    Ordering,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 6] = [
        QuestionCategory::Counting,
        QuestionCategory::Existence,
        QuestionCategory::SpatialRelational,
        QuestionCategory::AttributeIdentification,
        QuestionCategory::Conditional,
        QuestionCategory::Ordering,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionCategory::Counting => "counting",
            QuestionCategory::Existence => "existence",
            QuestionCategory::SpatialRelational => "spatial_relational",
            QuestionCategory::AttributeIdentification => "attribute_identification",
            QuestionCategory::Conditional => "conditional",
            QuestionCategory::Ordering => "ordering",
        }
    }

    pub fn from_label(label: &str) -> Result<Self, EvalError> {
        let normalized = label.trim().to_ascii_lowercase().replace(' ', "_");
        QuestionCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| EvalError::UnsupportedCategory(label.to_string()))
    }
}

impl fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionCategory {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionCategory::from_label(s)
    }
}

/// An object of the edited scene named in an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub index: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    Count { value: usize },
    Boolean { value: bool },
    Objects { objects: Vec<ObjectRef> },
    Value { value: String },
}

impl Answer {
    fn objects(scene: &Scene, indices: impl IntoIterator<Item = usize>) -> Self {
        let objects = indices
            .into_iter()
            .filter_map(|index| {
                scene
                    .describe(index)
                    .map(|description| ObjectRef { index, description })
            })
            .collect();
        Answer::Objects { objects }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Count { value } => write!(f, "{value}"),
            Answer::Boolean { value } => f.write_str(if *value { "yes" } else { "no" }),
            Answer::Objects { objects } if objects.is_empty() => f.write_str("none"),
            Answer::Objects { objects } => {
                let names: Vec<&str> = objects.iter().map(|o| o.description.as_str()).collect();
                f.write_str(&names.join(", "))
            }
            Answer::Value { value } => f.write_str(value),
        }
    }
}

// ============================================================================
// Evaluator
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct QueryEvaluator {
    transformer: Transformer,
}

impl QueryEvaluator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            transformer: Transformer::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.transformer.config()
    }

    /// The edit a question's edit clause asks for, if any.
    pub fn bind(
        &self,
        scene: &Scene,
        transformation_type: &str,
        edit: &Bindings,
    ) -> Result<Option<Transformation>, EvalError> {
        bind_transformation(transformation_type, edit, scene, self.config())
    }

    /// Evaluates `template` with `bindings` (as recovered by the matcher)
    /// against `scene`. Bindings are split between the edit and the question
    /// by the template's clause structure; a key used in both clauses is
    /// visible to both.
    pub fn evaluate(
        &self,
        scene: &Scene,
        template: &QuestionTemplate,
        bindings: &Bindings,
    ) -> Result<Answer, EvalError> {
        let grammar = template.updated();
        let (edit_keys, question_keys) = (grammar.edit_keys(), grammar.question_keys());
        let select = |keys: &std::collections::BTreeSet<&str>| -> Bindings {
            bindings
                .iter()
                .filter(|(k, _)| keys.contains(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        self.evaluate_clauses(
            scene,
            template.transformation_type(),
            template.question_category(),
            &select(&edit_keys),
            &select(&question_keys),
        )
    }

    /// Evaluates an already split question.
    pub fn evaluate_clauses(
        &self,
        scene: &Scene,
        transformation_type: &str,
        category: &str,
        edit: &Bindings,
        question: &Bindings,
    ) -> Result<Answer, EvalError> {
        let category = QuestionCategory::from_label(category)?;
        let transformation = self.bind(scene, transformation_type, edit)?;
        let (edited, remap) = match &transformation {
            Some(transformation) => self.transformer.apply_tracked(scene, transformation)?,
            None => (scene.clone(), IndexRemap::identity(scene.len())),
        };

        let context = Context {
            base: scene,
            edited: &edited,
            remap: &remap,
            parser: DescriptorParser::new(&self.config().vocabulary, scene),
            epsilon: self.config().epsilon,
            category,
        };
        let answer = match category {
            QuestionCategory::Counting => context.counting(question)?,
            QuestionCategory::Existence => context.existence(question)?,
            QuestionCategory::SpatialRelational => context.spatial(question)?,
            QuestionCategory::AttributeIdentification => context.attribute_identification(question)?,
            QuestionCategory::Ordering => context.ordering(question)?,
            QuestionCategory::Conditional => context.conditional(&self.transformer, question)?,
        };

        tracing::debug!(
            transformation = transformation_type,
            category = %category,
            answer = %answer,
            "evaluated question"
        );
        Ok(answer)
    }
}

// ============================================================================
// Answer stage
// ============================================================================

struct Context<'a> {
    base: &'a Scene,
    edited: &'a Scene,
    remap: &'a IndexRemap,
    parser: DescriptorParser<'a>,
    epsilon: f64,
    category: QuestionCategory,
}

impl Context<'_> {
    fn missing(&self, key: &str) -> EvalError {
        EvalError::MissingBinding {
            category: self.category.to_string(),
            key: key.to_string(),
        }
    }

    /// Index in the edited scene of the object `text` names in the base scene.
    fn reference(&self, text: &str) -> Result<usize, EvalError> {
        let base_index = self.parser.resolve(self.base, text)?;
        self.remap
            .get(base_index)
            .ok_or_else(|| EvalError::NoSuchObject(text.to_string()))
    }

    /// `relation` + `reference_object`, when both are bound.
    fn relation(&self, question: &Bindings) -> Result<Option<(Direction, usize)>, EvalError> {
        match (question.get("relation"), question.get("reference_object")) {
            (Some(relation), Some(reference)) => {
                Ok(Some((relation_direction(relation)?, self.reference(reference)?)))
            }
            _ => Ok(None),
        }
    }

    fn counting(&self, question: &Bindings) -> Result<Answer, EvalError> {
        let value = match self.relation(question)? {
            Some((direction, anchor)) => objects_in_direction(self.edited, direction, anchor, self.epsilon).len(),
            None => self.edited.count(&attribute_filter(question)),
        };
        Ok(Answer::Count { value })
    }

    fn existence(&self, question: &Bindings) -> Result<Answer, EvalError> {
        let filter = match (attribute(question, "attribute")?, question.get("value")) {
            (Some(attr), Some(value)) => AttributeFilter::from([(attr, value.trim().to_ascii_lowercase())]),
            _ => attribute_filter(question),
        };
        Ok(Answer::Boolean {
            value: self.edited.count(&filter) > 0,
        })
    }

    fn spatial(&self, question: &Bindings) -> Result<Answer, EvalError> {
        if let (Some(term), Some(reference)) = (question.get("spatial_term"), question.get("reference_object")) {
            let direction = relation_direction(term)?;
            let anchor = self.reference(reference)?;
            let found = objects_in_direction(self.edited, direction, anchor, self.epsilon);
            return Ok(Answer::objects(self.edited, found));
        }
        if let (Some(first), Some(second)) = (question.get("object1"), question.get("object2")) {
            let (a, b) = (self.reference(first)?, self.reference(second)?);
            return Ok(Answer::objects(self.edited, between(self.edited, a, b)));
        }
        let reference = question
            .get("reference_object")
            .ok_or_else(|| self.missing("reference_object"))?;
        let anchor = self.reference(reference)?;
        let others: Vec<usize> = (0..self.edited.len()).filter(|&i| i != anchor).collect();
        Ok(Answer::objects(self.edited, nearest(self.edited, anchor, &others)))
    }

    fn attribute_identification(&self, question: &Bindings) -> Result<Answer, EvalError> {
        let attr = attribute(question, "attribute")?.ok_or_else(|| self.missing("attribute"))?;
        let target = if let Some(descriptor) = question.get("unique_descriptor") {
            self.reference(descriptor)?
        } else if let Some((direction, anchor)) = self.relation(question)? {
            let candidates = objects_in_direction(self.edited, direction, anchor, self.epsilon);
            nearest(self.edited, anchor, &candidates).ok_or_else(|| {
                let relation = question.get("relation").map(String::as_str).unwrap_or_default();
                let reference = question.get("reference_object").map(String::as_str).unwrap_or_default();
                EvalError::NoSuchObject(format!("object {relation} {reference}"))
            })?
        } else {
            return Err(self.missing("unique_descriptor"));
        };
        let object = self
            .edited
            .object(target)
            .ok_or_else(|| EvalError::NoSuchObject(format!("object #{target}")))?;
        Ok(Answer::Value {
            value: attr.get(object).to_string(),
        })
    }

    fn ordering(&self, question: &Bindings) -> Result<Answer, EvalError> {
        let side = question.get("extreme_side").ok_or_else(|| self.missing("extreme_side"))?;
        let attr = attribute(question, "attribute")?.ok_or_else(|| self.missing("attribute"))?;
        let right = self.edited.direction(Direction::Right);
        let mut order: Vec<usize> = (0..self.edited.len()).collect();
        // Stable sort keeps index order among equal projections.
        order.sort_by(|&a, &b| {
            let (pa, pb) = (project(self.edited, a, right), project(self.edited, b, right));
            pa.partial_cmp(&pb).unwrap_or(Ordering::Equal)
        });
        let pick = match side.trim().to_ascii_lowercase().as_str() {
            "leftmost" => order.first(),
            "rightmost" => order.last(),
            _ => return Err(EvalError::invalid_binding("extreme_side", side)),
        };
        let index = *pick.ok_or_else(|| EvalError::NoSuchObject(format!("{side} object")))?;
        let value = self
            .edited
            .object(index)
            .map(|object| attr.get(object).to_string())
            .ok_or_else(|| EvalError::NoSuchObject(format!("{side} object")))?;
        Ok(Answer::Value { value })
    }

    /// Applies the hypothetical deletion the question describes to the edited
    /// scene, then counts.
    fn conditional(&self, transformer: &Transformer, question: &Bindings) -> Result<Answer, EvalError> {
        let selector = if let Some(color) = question.get("delete_color") {
            Selector::attribute(Attribute::Color, color.as_str())
        } else if let (Some(attr), Some(value)) =
            (attribute(question, "delete_attribute")?, question.get("delete_value"))
        {
            Selector::attribute(attr, value.as_str())
        } else if let Some((direction, anchor)) = self.relation(question)? {
            Selector::Indices {
                indices: objects_in_direction(self.edited, direction, anchor, self.epsilon),
            }
        } else {
            return Err(self.missing("delete_color"));
        };
        let hypothetical = transformer.apply(self.edited, &Transformation::Delete { selector })?;
        let filter = match (attribute(question, "check_attribute")?, question.get("check_value")) {
            (Some(attr), Some(value)) => AttributeFilter::from([(attr, value.trim().to_ascii_lowercase())]),
            _ => attribute_filter(question),
        };
        Ok(Answer::Count {
            value: hypothetical.count(&filter),
        })
    }
}

// ============================================================================
// Geometry helpers
// ============================================================================

/// Attribute filter from the `color`/`shape`/`size`/`material` keys of a
/// question. `new_color` and `new_shape` stand in when the plain key is
/// absent, since they name the value an edit just introduced.
fn attribute_filter(question: &Bindings) -> AttributeFilter {
    const KEYS: [(Attribute, &[&str]); 4] = [
        (Attribute::Color, &["color", "new_color"]),
        (Attribute::Shape, &["shape", "new_shape"]),
        (Attribute::Size, &["size", "new_size"]),
        (Attribute::Material, &["material"]),
    ];
    let mut filter = AttributeFilter::new();
    for (attr, keys) in KEYS {
        if let Some(value) = keys.iter().find_map(|k| question.get(*k)) {
            filter.insert(attr, value.trim().to_ascii_lowercase());
        }
    }
    filter
}

fn project(scene: &Scene, index: usize, axis: Vec3) -> f64 {
    scene
        .object(index)
        .map(|o| o.coords.iter().zip(axis).map(|(c, a)| c * a).sum::<f64>())
        .unwrap_or(0.0)
}

/// Objects in `direction` from `anchor`. Horizontal directions read the
/// relationship table; vertical ones are projected with the same epsilon.
fn objects_in_direction(scene: &Scene, direction: Direction, anchor: usize, epsilon: f64) -> Vec<usize> {
    if !direction.is_vertical() {
        return scene.related(direction, anchor).to_vec();
    }
    let axis = scene.direction(direction);
    let origin = project(scene, anchor, axis);
    (0..scene.len())
        .filter(|&i| i != anchor && project(scene, i, axis) - origin > epsilon)
        .collect()
}

/// Objects strictly between `a` and `b` along the left-right axis.
fn between(scene: &Scene, a: usize, b: usize) -> Vec<usize> {
    let right = scene.direction(Direction::Right);
    let (pa, pb) = (project(scene, a, right), project(scene, b, right));
    let (low, high) = if pa <= pb { (pa, pb) } else { (pb, pa) };
    (0..scene.len())
        .filter(|&i| i != a && i != b)
        .filter(|&i| {
            let p = project(scene, i, right);
            low < p && p < high
        })
        .collect()
}

/// The candidate closest to `anchor`; the lowest index wins ties.
fn nearest(scene: &Scene, anchor: usize, candidates: &[usize]) -> Option<usize> {
    let origin = scene.object(anchor)?.coords;
    let distance = |i: usize| {
        scene
            .object(i)
            .map(|object| {
                object
                    .coords
                    .iter()
                    .zip(origin)
                    .map(|(c, o)| (c - o).powi(2))
                    .sum::<f64>()
            })
            .unwrap_or(f64::INFINITY)
    };
    candidates.iter().copied().fold(None, |best: Option<usize>, i| match best {
        Some(b) if distance(b) <= distance(i) => Some(b),
        _ => Some(i),
    })
}
