//! Template compiler and free-text matcher.
//!
//! Each template compiles to one anchored, case-insensitive regex with exactly
//! one capture group per placeholder occurrence. Literal text is escaped;
//! placeholders become an alternation drawn from the [`PlaceholderLexicon`]
//! or, when the lexicon has nothing for them, a run of non-terminator
//! characters.
//!
//! Parsing tries templates in registration order and the first match wins.
//! Two templates that accept the same text are resolved by that order alone;
//! there is no semantic ranking.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use scenequest_scene::{Attribute, Direction, EngineConfig, Scene, SceneVocabulary, Viewpoint};

use crate::error::TemplateError;
use crate::grammar::{PlaceholderName, Token};
use crate::registry::{QuestionTemplate, TemplateRegistry};

/// Capture used for placeholders the lexicon does not know.
pub const UNRESOLVED_CAPTURE: &str = "([^.?]+)";

const NUMBER_FRAGMENT: &str = r"-?[0-9]+(?:\.[0-9]+)?";

// ============================================================================
// Lexicon
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexiconEntry {
    /// A closed set of literal phrases.
    Alternatives(Vec<String>),
    /// An object descriptor: `the` followed by one or more vocabulary words.
    Descriptor,
    /// A raw regex fragment. It must not contain capture groups.
    Pattern(String),
}

/// What each placeholder may match, keyed by canonical placeholder key.
#[derive(Debug, Clone)]
pub struct PlaceholderLexicon {
    entries: HashMap<String, LexiconEntry>,
    descriptor_words: Vec<String>,
}

impl PlaceholderLexicon {
    /// The standard lexicon for a scene: attribute placeholders accept the
    /// configured vocabulary plus whatever values the scene actually holds.
    pub fn new(config: &EngineConfig, scene: &SceneVocabulary) -> Self {
        let known = |attribute: Attribute| -> Vec<String> {
            let mut values: Vec<String> = config.vocabulary.values(attribute).to_vec();
            values.extend(scene.values(attribute).map(str::to_string));
            values
        };
        let colors = known(Attribute::Color);
        let shapes = known(Attribute::Shape);
        let sizes = known(Attribute::Size);
        let materials = known(Attribute::Material);
        let all_values: Vec<String> = [&colors, &shapes, &sizes, &materials]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        let mut lexicon = Self {
            entries: HashMap::new(),
            descriptor_words: all_values.clone(),
        };
        let owned = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

        for key in ["color", "new_color", "delete_color"] {
            lexicon.insert(key, LexiconEntry::Alternatives(colors.clone()));
        }
        for key in ["shape", "new_shape"] {
            lexicon.insert(key, LexiconEntry::Alternatives(shapes.clone()));
        }
        for key in ["size", "new_size", "size_large"] {
            lexicon.insert(key, LexiconEntry::Alternatives(sizes.clone()));
        }
        lexicon.insert("material", LexiconEntry::Alternatives(materials));
        for key in ["value", "target_value", "delete_value", "check_value"] {
            lexicon.insert(key, LexiconEntry::Alternatives(all_values.clone()));
        }
        let attribute_names: Vec<String> = Attribute::ALL.iter().map(|a| a.as_str().to_string()).collect();
        for key in [
            "attribute",
            "target_attribute",
            "new_attribute",
            "delete_attribute",
            "check_attribute",
        ] {
            lexicon.insert(key, LexiconEntry::Alternatives(attribute_names.clone()));
        }
        lexicon.insert(
            "spatial_term",
            LexiconEntry::Alternatives(
                Direction::CARDINAL.iter().map(|d| d.as_str().to_string()).collect(),
            ),
        );
        lexicon.insert(
            "relation",
            LexiconEntry::Alternatives(owned(&[
                "to the left of",
                "to the right of",
                "in front of",
                "behind",
            ])),
        );
        lexicon.insert(
            "view_direction",
            LexiconEntry::Alternatives(
                Viewpoint::ALL.iter().map(|v| v.as_str().to_string()).collect(),
            ),
        );
        lexicon.insert(
            "extreme_side",
            LexiconEntry::Alternatives(owned(&["leftmost", "rightmost"])),
        );
        lexicon.insert("mirror_axis", LexiconEntry::Alternatives(owned(&["x", "y", "center"])));
        for key in ["reference_object", "unique_descriptor", "object1", "object2"] {
            lexicon.insert(key, LexiconEntry::Descriptor);
        }
        for key in ["angle", "distance", "x_shift", "y_shift", "scale_factor"] {
            lexicon.insert(key, LexiconEntry::Pattern(NUMBER_FRAGMENT.to_string()));
        }
        lexicon
    }

    /// Lexicon for matching questions about `scene`.
    pub fn for_scene(config: &EngineConfig, scene: &Scene) -> Self {
        Self::new(config, &scene.vocabulary())
    }

    fn insert(&mut self, key: &str, entry: LexiconEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn with_entry(mut self, key: impl Into<String>, entry: LexiconEntry) -> Self {
        self.entries.insert(key.into(), entry);
        self
    }

    /// The capturing pattern for one placeholder occurrence.
    fn capture_for(&self, template_id: &str, name: &PlaceholderName) -> Result<String, TemplateError> {
        if name.has_alternatives() {
            let mut union = Vec::new();
            for alternative in name.alternatives() {
                match self.entries.get(alternative) {
                    Some(LexiconEntry::Alternatives(values)) => union.extend(values.iter().cloned()),
                    _ => {
                        union.clear();
                        break;
                    }
                }
            }
            if !union.is_empty() {
                return Ok(alternation(&union));
            }
        }

        match self.entries.get(name.key()) {
            Some(LexiconEntry::Alternatives(values)) if !values.is_empty() => Ok(alternation(values)),
            Some(LexiconEntry::Alternatives(_)) | None => Ok(UNRESOLVED_CAPTURE.to_string()),
            Some(LexiconEntry::Descriptor) => Ok(format!(
                "(the(?: {})+)",
                alternation_body(&self.descriptor_words)
            )),
            Some(LexiconEntry::Pattern(fragment)) => {
                let groups = Regex::new(fragment)?.captures_len() - 1;
                if groups > 0 {
                    return Err(TemplateError::AmbiguousPlaceholder {
                        template_id: template_id.to_string(),
                        message: format!(
                            "pattern for `{}` declares {groups} capture group(s) of its own",
                            name.raw()
                        ),
                    });
                }
                Ok(format!("((?:{fragment}))"))
            }
        }
    }
}

/// `(?:a|b|c)` with longest phrases first, escaped, case-insensitively
/// deduplicated.
fn alternation_body(values: &[String]) -> String {
    let mut sorted: Vec<&str> = values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).collect();
    sorted.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
    });
    sorted.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    let escaped: Vec<String> = sorted.into_iter().map(regex::escape).collect();
    format!("(?:{})", escaped.join("|"))
}

fn alternation(values: &[String]) -> String {
    format!("({})", alternation_body(values))
}

// ============================================================================
// Compiled templates
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    template_id: String,
    regex: Regex,
    keys: Vec<String>,
}

impl CompiledTemplate {
    pub fn compile(template: &QuestionTemplate, lexicon: &PlaceholderLexicon) -> Result<Self, TemplateError> {
        let mut pattern = String::from("(?i)^");
        let mut keys = Vec::new();
        for token in template.updated().tokens() {
            match token {
                Token::Literal(text) => pattern.push_str(&regex::escape(text)),
                Token::Placeholder(name) => {
                    pattern.push_str(&lexicon.capture_for(template.template_id(), name)?);
                    keys.push(name.key().to_string());
                }
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)?;
        let groups = regex.captures_len() - 1;
        if groups != keys.len() {
            return Err(TemplateError::AmbiguousPlaceholder {
                template_id: template.template_id().to_string(),
                message: format!("{groups} capture groups for {} placeholders", keys.len()),
            });
        }
        Ok(Self {
            template_id: template.template_id().to_string(),
            regex,
            keys,
        })
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Canonical keys in capture order, repeats included.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.extract(text).is_some()
    }

    /// Bindings recovered from `text`. A placeholder that occurs more than
    /// once must capture the same phrase every time.
    pub fn extract(&self, text: &str) -> Option<BTreeMap<String, String>> {
        let captures = self.regex.captures(text.trim())?;
        let mut bindings: BTreeMap<String, String> = BTreeMap::new();
        for (key, group) in self.keys.iter().zip(captures.iter().skip(1)) {
            let value = group?.as_str().trim().to_string();
            match bindings.get(key) {
                Some(previous) if !value.eq_ignore_ascii_case(previous) => return None,
                Some(_) => {}
                None => {
                    bindings.insert(key.clone(), value);
                }
            }
        }
        Some(bindings)
    }
}

// ============================================================================
// Matcher
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuestion<'r> {
    pub template: &'r QuestionTemplate,
    /// Canonical placeholder key → captured phrase.
    pub bindings: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct TemplateMatcher<'r> {
    registry: &'r TemplateRegistry,
    compiled: Vec<CompiledTemplate>,
}

impl<'r> TemplateMatcher<'r> {
    /// Compiles every template of `registry` once against `lexicon`.
    pub fn new(registry: &'r TemplateRegistry, lexicon: &PlaceholderLexicon) -> Result<Self, TemplateError> {
        let compiled = registry
            .templates()
            .iter()
            .map(|template| CompiledTemplate::compile(template, lexicon))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(templates = compiled.len(), "compiled template matchers");
        Ok(Self { registry, compiled })
    }

    pub fn compiled(&self) -> &[CompiledTemplate] {
        &self.compiled
    }

    /// The first registered template accepting `text`.
    pub fn find(&self, text: &str) -> Option<&'r QuestionTemplate> {
        self.parse(text).ok().map(|parsed| parsed.template)
    }

    pub fn parse(&self, text: &str) -> Result<ParsedQuestion<'r>, TemplateError> {
        for (template, compiled) in self.registry.templates().iter().zip(&self.compiled) {
            if let Some(bindings) = compiled.extract(text) {
                tracing::debug!(template_id = template.template_id(), "question matched template");
                return Ok(ParsedQuestion { template, bindings });
            }
        }
        Err(TemplateError::NoMatch(text.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    use crate::registry::ValueSet;

    fn lexicon() -> PlaceholderLexicon {
        PlaceholderLexicon::new(&EngineConfig::default(), &SceneVocabulary::default())
    }

    fn single(template: &str) -> TemplateRegistry {
        let template = QuestionTemplate::new("Delete", "counting", "t", template, template).unwrap();
        let values: ValueSet = template
            .original()
            .placeholder_names()
            .into_iter()
            .map(|name| (name.to_string(), vec!["x".to_string()]))
            .collect();
        TemplateRegistry::new(vec![template], IndexMap::from([("Delete".to_string(), values)])).unwrap()
    }

    #[test]
    fn recovers_bindings_case_insensitively() {
        let registry = single("Change all {color} objects to {new_color}. How many {color} objects remain?");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        let parsed = matcher
            .parse("change all Gray objects to yellow. How many gray objects remain?")
            .unwrap();
        assert_eq!(parsed.template.template_id(), "t");
        assert_eq!(parsed.bindings["color"], "Gray");
        assert_eq!(parsed.bindings["new_color"], "yellow");
    }

    #[test]
    fn repeated_placeholders_must_agree() {
        let registry = single("Change all {color} objects to {new_color}. How many {color} objects remain?");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        assert!(matches!(
            matcher.parse("Change all red objects to blue. How many green objects remain?"),
            Err(TemplateError::NoMatch(_))
        ));
    }

    #[test]
    fn vocabulary_alternations_prefer_longest_phrase() {
        let registry = single("Are there any {size} {color} objects left?");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        let parsed = matcher.parse("Are there any very large red objects left?").unwrap();
        assert_eq!(parsed.bindings["size"], "very large");
        assert!(matcher.find("Are there any enormous red objects left?").is_none());
    }

    #[test]
    fn scene_values_extend_the_vocabulary() {
        let objects = vec![scenequest_scene::Object::new("torus", "small", "glass", "teal", [0.0; 3])];
        let scene = Scene::from_objects(objects, Direction::axis_aligned_frame(), 0.2).unwrap();
        let lexicon = PlaceholderLexicon::for_scene(&EngineConfig::default(), &scene);
        let registry = single("How many {color} {shape} objects are there?");
        let matcher = TemplateMatcher::new(&registry, &lexicon).unwrap();
        let parsed = matcher.parse("How many teal torus objects are there?").unwrap();
        assert_eq!(parsed.bindings["shape"], "torus");
    }

    #[test]
    fn descriptors_and_relations_split_cleanly() {
        let registry = single("How many objects are {relation} {reference_object} now?");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        let parsed = matcher
            .parse("How many objects are to the left of the large red cube now?")
            .unwrap();
        assert_eq!(parsed.bindings["relation"], "to the left of");
        assert_eq!(parsed.bindings["reference_object"], "the large red cube");
    }

    #[test]
    fn unresolved_placeholders_stop_at_sentence_delimiters() {
        let registry = single("Rotate by {angle} degrees {direction}. Which object is {extreme_side}?");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        let parsed = matcher
            .parse("Rotate by 90 degrees counter clockwise. Which object is leftmost?")
            .unwrap();
        assert_eq!(parsed.bindings["direction"], "counter clockwise");
        assert_eq!(parsed.bindings["angle"], "90");
        assert_eq!(matcher.compiled()[0].keys().len(), 3);
    }

    #[test]
    fn decimal_numbers_match_numeric_placeholders() {
        let registry = single("Scale the scene by {scale_factor}. How many objects?");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        let parsed = matcher.parse("Scale the scene by 0.5. How many objects?").unwrap();
        assert_eq!(parsed.bindings["scale_factor"], "0.5");
    }

    #[test]
    fn slash_names_resolve_to_first_alternative() {
        let registry = single("Which {color/size/shape} does it have?");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        let parsed = matcher.parse("Which cube does it have?").unwrap();
        assert_eq!(parsed.bindings.keys().collect::<Vec<_>>(), vec!["color"]);
        assert_eq!(parsed.bindings["color"], "cube");
    }

    #[test]
    fn literal_text_is_escaped() {
        let registry = single("Move the {shape} object(s) {distance} units up.");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        assert!(matcher.find("Move the cube object(s) 2 units up.").is_some());
        assert!(matcher.find("Move the cube objects 2 units up.").is_none());
    }

    #[test]
    fn capturing_custom_fragment_is_ambiguous() {
        let registry = single("Is the {code} valid?");
        let lexicon = lexicon().with_entry("code", LexiconEntry::Pattern("([a-z]+)-([0-9]+)".to_string()));
        let err = TemplateMatcher::new(&registry, &lexicon).unwrap_err();
        assert!(matches!(err, TemplateError::AmbiguousPlaceholder { .. }), "{err}");

        let lexicon = lexicon.with_entry("code", LexiconEntry::Pattern("[a-z]+-[0-9]+".to_string()));
        let matcher = TemplateMatcher::new(&registry, &lexicon).unwrap();
        assert_eq!(matcher.parse("Is the ab-12 valid?").unwrap().bindings["code"], "ab-12");
    }

    /// Two templates with the same literal text and different unresolved
    /// placeholders both accept the question; the first registered wins.
    #[test]
    fn first_registered_template_wins() {
        let registry = TemplateRegistry::from_json_str(
            &json!({
                "QUESTION_TEMPLATES": {"Delete": {"question_types": {
                    "counting": ["Delete the {thing}. How many remain?"],
                    "existence": ["Delete the {item}. How many remain?"]
                }}},
                "TRANSFORM_PLACEHOLDER_VALUES": {"Delete": {"thing": ["lamp"], "item": ["lamp"]}}
            })
            .to_string(),
        )
        .unwrap();
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        let text = "Delete the lamp. How many remain?";
        assert!(matcher.compiled().iter().all(|c| c.is_match(text)));

        let parsed = matcher.parse(text).unwrap();
        assert_eq!(parsed.template.template_id(), "Delete/counting/1");
        assert_eq!(parsed.bindings["thing"], "lamp");
    }

    #[test]
    fn unmatched_text_is_reported() {
        let registry = single("How many {color} objects?");
        let matcher = TemplateMatcher::new(&registry, &lexicon()).unwrap();
        assert!(matches!(
            matcher.parse("What is the meaning of life?"),
            Err(TemplateError::NoMatch(text)) if text == "What is the meaning of life?"
        ));
    }
}
