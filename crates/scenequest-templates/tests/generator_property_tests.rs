use std::collections::BTreeMap;

use indexmap::IndexMap;
use proptest::prelude::*;
use scenequest_scene::{EngineConfig, SceneVocabulary};
use scenequest_templates::{
    PlaceholderLexicon, QuestionGenerator, QuestionTemplate, TemplateMatcher, TemplateRegistry,
    ValueSet,
};

const NAMES: &[&str] = &["alpha", "beta", "gamma", "delta"];

/// Value sets of 1..=3 values for a prefix of `NAMES`, plus one template per
/// non-empty subset mask.
fn synthetic() -> impl Strategy<Value = (ValueSet, Vec<u8>)> {
    (1usize..=4)
        .prop_flat_map(|n| {
            (
                proptest::collection::vec(1usize..=3, n),
                proptest::collection::vec(0u8..16, 1..4),
            )
        })
        .prop_map(|(sizes, masks)| {
            let set: ValueSet = sizes
                .iter()
                .enumerate()
                .map(|(i, &size)| {
                    let values = (0..size).map(|v| format!("{}{v}", NAMES[i])).collect();
                    (NAMES[i].to_string(), values)
                })
                .collect();
            let width = sizes.len();
            let masks = masks.into_iter().map(|m| m & ((1u8 << width) - 1)).collect();
            (set, masks)
        })
}

fn registry_for(set: &ValueSet, masks: &[u8]) -> TemplateRegistry {
    let templates = masks
        .iter()
        .enumerate()
        .map(|(t, mask)| {
            let mut text = format!("Question {t}");
            for (i, name) in set.keys().enumerate() {
                if mask & (1 << i) != 0 {
                    text.push_str(&format!(" with {{{name}}}"));
                }
            }
            text.push('?');
            QuestionTemplate::new("Synthetic", "counting", format!("s/{t}"), &text, &text)
                .expect("template")
        })
        .collect();
    TemplateRegistry::new(templates, IndexMap::from([("Synthetic".to_string(), set.clone())]))
        .expect("registry")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn enumeration_yields_the_full_product((set, masks) in synthetic()) {
        let registry = registry_for(&set, &masks);
        let generator = QuestionGenerator::new(&registry);

        let expected: u128 = set.values().map(|v| v.len() as u128).product();
        prop_assert_eq!(generator.enumeration_size("Synthetic"), expected);

        let bindings: Vec<BTreeMap<String, String>> = generator.bindings("Synthetic").collect();
        prop_assert_eq!(bindings.len() as u128, expected);
        let mut distinct = bindings.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(distinct.len(), bindings.len());

        let records: Vec<_> = generator.records("Synthetic").collect();
        prop_assert_eq!(records.len() as u128, generator.record_count("Synthetic"));
        prop_assert!(records.len() as u128 <= expected * masks.len() as u128);
    }

    #[test]
    fn records_project_the_full_product_in_order((set, masks) in synthetic()) {
        let registry = registry_for(&set, &masks);
        let generator = QuestionGenerator::new(&registry);

        for template in registry.templates() {
            let names = template.original().placeholder_names();
            let mut projected: Vec<BTreeMap<String, String>> = Vec::new();
            for binding in generator.bindings("Synthetic") {
                let kept: BTreeMap<String, String> = binding
                    .into_iter()
                    .filter(|(k, _)| names.contains(k.as_str()))
                    .collect();
                if !projected.contains(&kept) {
                    projected.push(kept);
                }
            }
            let rendered: Vec<BTreeMap<String, String>> = generator
                .records("Synthetic")
                .filter(|r| r.template_id == template.template_id())
                .map(|r| r.placeholders)
                .collect();
            prop_assert_eq!(rendered, projected);
        }
    }
}

fn builtin_matcher_fixture() -> TemplateRegistry {
    TemplateRegistry::builtin().expect("builtin registry")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn generated_questions_parse_back_to_their_bindings(pick in any::<prop::sample::Index>()) {
        let registry = builtin_matcher_fixture();
        let generator = QuestionGenerator::new(&registry);
        let records = generator.generate(&Default::default());
        let record = &records[pick.index(records.len())];

        let lexicon = PlaceholderLexicon::new(&EngineConfig::default(), &SceneVocabulary::default());
        let matcher = TemplateMatcher::new(&registry, &lexicon).expect("compile");
        let parsed = matcher.parse(&record.question).expect("generated question parses");

        prop_assert_eq!(parsed.template.template_id(), record.template_id.as_str());
        prop_assert_eq!(&parsed.bindings, &record.placeholders);
    }
}

#[test]
fn every_builtin_question_parses_back() {
    let registry = builtin_matcher_fixture();
    let generator = QuestionGenerator::new(&registry);
    let lexicon = PlaceholderLexicon::new(&EngineConfig::default(), &SceneVocabulary::default());
    let matcher = TemplateMatcher::new(&registry, &lexicon).expect("compile");

    let records = generator.generate(&Default::default());
    assert!(!records.is_empty());
    for record in &records {
        let parsed = matcher
            .parse(&record.question)
            .unwrap_or_else(|err| panic!("{}: {err}", record.question));
        assert_eq!(parsed.template.template_id(), record.template_id, "{}", record.question);
        assert_eq!(parsed.bindings, record.placeholders, "{}", record.question);
    }
}
