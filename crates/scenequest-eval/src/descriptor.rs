//! Object descriptors.
//!
//! A descriptor such as `"the large red cube"` is read word by word against
//! the closed attribute vocabularies. Words that belong to no vocabulary
//! (articles, typos, unknown adjectives) are dropped, so a descriptor can end
//! up matching more objects than its author meant. Resolution therefore
//! insists on exactly one match and reports anything else. A descriptor that
//! names two values for one attribute ("the red blue cube") is ambiguous.

use std::collections::BTreeSet;

use scenequest_scene::{Attribute, AttributeFilter, Scene, SceneVocabulary, Vocabulary};

use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
    pub filter: AttributeFilter,
    /// Words that contributed nothing to the filter.
    pub dropped: Vec<String>,
    /// Later words naming a second value for an attribute already in the
    /// filter. The filter keeps the first.
    pub conflicts: Vec<(Attribute, String)>,
}

impl Descriptor {
    fn assign(&mut self, attribute: Attribute, value: String) {
        match self.filter.get(&attribute) {
            None => {
                self.filter.insert(attribute, value);
            }
            Some(existing) if *existing != value => self.conflicts.push((attribute, value)),
            Some(_) => {}
        }
    }
}

/// Reads descriptors against a configured vocabulary and the values present
/// in one scene.
#[derive(Debug, Clone)]
pub struct DescriptorParser<'v> {
    vocabulary: &'v Vocabulary,
    scene: SceneVocabulary,
}

impl<'v> DescriptorParser<'v> {
    pub fn new(vocabulary: &'v Vocabulary, scene: &Scene) -> Self {
        Self {
            vocabulary,
            scene: scene.vocabulary(),
        }
    }

    fn classify(&self, phrase: &str) -> Option<Attribute> {
        self.vocabulary.classify(phrase).or_else(|| {
            Attribute::ALL
                .into_iter()
                .find(|&attribute| self.scene.contains(attribute, phrase))
        })
    }

    pub fn parse(&self, text: &str) -> Descriptor {
        let words: Vec<String> = text.split_whitespace().map(str::to_ascii_lowercase).collect();
        let mut descriptor = Descriptor::default();
        let mut i = 0;
        while i < words.len() {
            // Two-word values such as "very large" take precedence.
            if let Some(pair) = words.get(i + 1).map(|next| format!("{} {next}", words[i])) {
                if let Some(attribute) = self.classify(&pair) {
                    descriptor.assign(attribute, pair);
                    i += 2;
                    continue;
                }
            }
            match self.classify(&words[i]) {
                Some(attribute) => descriptor.assign(attribute, words[i].clone()),
                None => descriptor.dropped.push(words[i].clone()),
            }
            i += 1;
        }
        let ignored: Vec<&str> = descriptor
            .dropped
            .iter()
            .map(String::as_str)
            .filter(|w| !matches!(*w, "the" | "a" | "an"))
            .collect();
        if !ignored.is_empty() {
            tracing::debug!(descriptor = text, ignored = ?ignored, "descriptor words outside the vocabulary were dropped");
        }
        if !descriptor.conflicts.is_empty() {
            tracing::debug!(descriptor = text, conflicts = ?descriptor.conflicts, "descriptor names an attribute twice");
        }
        descriptor
    }

    /// Index of the one object of `scene` matching `text`.
    pub fn resolve(&self, scene: &Scene, text: &str) -> Result<usize, EvalError> {
        let descriptor = self.parse(text);
        if !descriptor.conflicts.is_empty() {
            let mut readings: BTreeSet<usize> = scene.find(&descriptor.filter).into_iter().collect();
            for (attribute, value) in &descriptor.conflicts {
                let mut filter = descriptor.filter.clone();
                filter.insert(*attribute, value.clone());
                readings.extend(scene.find(&filter));
            }
            return Err(EvalError::AmbiguousReference {
                descriptor: text.to_string(),
                matches: readings.len(),
            });
        }
        let matches = scene.find(&descriptor.filter);
        match matches.as_slice() {
            [index] => Ok(*index),
            [] => Err(EvalError::NoSuchObject(text.to_string())),
            _ => Err(EvalError::AmbiguousReference {
                descriptor: text.to_string(),
                matches: matches.len(),
            }),
        }
    }
}
