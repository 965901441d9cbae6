//! Closed attribute vocabularies and engine configuration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{Attribute, Object};
use crate::relationships::DEFAULT_EPSILON;

/// The attribute values the engine accepts in edit requests and recognizes in
/// object descriptors.
///
/// `sizes` is ordered from smallest to largest; scaling walks this ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub colors: Vec<String>,
    pub shapes: Vec<String>,
    pub sizes: Vec<String>,
    pub materials: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        fn owned(values: &[&str]) -> Vec<String> {
            values.iter().map(|v| v.to_string()).collect()
        }
        Self {
            colors: owned(&[
                "gray", "red", "blue", "green", "brown", "purple", "cyan", "yellow",
            ]),
            shapes: owned(&["cube", "sphere", "cylinder", "pyramid"]),
            sizes: owned(&["small", "medium", "large", "very large"]),
            materials: owned(&["rubber", "metal"]),
        }
    }
}

impl Vocabulary {
    pub fn values(&self, attribute: Attribute) -> &[String] {
        match attribute {
            Attribute::Color => &self.colors,
            Attribute::Shape => &self.shapes,
            Attribute::Size => &self.sizes,
            Attribute::Material => &self.materials,
        }
    }

    pub fn contains(&self, attribute: Attribute, value: &str) -> bool {
        let value = value.trim();
        self.values(attribute)
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value))
    }

    /// The attribute a vocabulary word belongs to. Colors are checked first,
    /// then shapes, sizes and materials.
    pub fn classify(&self, word: &str) -> Option<Attribute> {
        [
            Attribute::Color,
            Attribute::Shape,
            Attribute::Size,
            Attribute::Material,
        ]
        .into_iter()
        .find(|&attribute| self.contains(attribute, word))
    }

    /// Position of `size` on the size ladder.
    pub fn size_rank(&self, size: &str) -> Option<usize> {
        let size = size.trim();
        self.sizes.iter().position(|s| s.eq_ignore_ascii_case(size))
    }
}

/// The attribute values actually present in one scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneVocabulary {
    values: BTreeMap<Attribute, BTreeSet<String>>,
}

impl SceneVocabulary {
    pub fn from_objects(objects: &[Object]) -> Self {
        let mut values: BTreeMap<Attribute, BTreeSet<String>> = BTreeMap::new();
        for object in objects {
            for attribute in Attribute::ALL {
                let value = attribute.get(object);
                if !value.is_empty() {
                    values
                        .entry(attribute)
                        .or_default()
                        .insert(value.to_string());
                }
            }
        }
        Self { values }
    }

    pub fn values(&self, attribute: Attribute) -> impl Iterator<Item = &str> {
        self.values
            .get(&attribute)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn contains(&self, attribute: Attribute, value: &str) -> bool {
        let value = value.trim();
        self.values(attribute).any(|v| v.eq_ignore_ascii_case(value))
    }
}

/// Engine-wide settings shared by the transformation engine and the
/// evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum projection for two objects to be directionally related.
    pub epsilon: f64,
    pub vocabulary: Vocabulary,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            vocabulary: Vocabulary::default(),
        }
    }
}
