use std::collections::BTreeMap;

use proptest::prelude::*;
use scenequest_eval::{Answer, Bindings, QueryEvaluator};
use scenequest_scene::{Attribute, AttributeFilter, Direction, Object, Scene};

const COLORS: &[&str] = &["red", "blue", "green", "yellow"];
const SHAPES: &[&str] = &["cube", "sphere", "cylinder"];

fn object() -> impl Strategy<Value = Object> {
    (
        prop::sample::select(COLORS),
        prop::sample::select(SHAPES),
        prop::sample::select(&["small", "large"][..]),
        -16i32..16,
        -16i32..16,
    )
        .prop_map(|(color, shape, size, x, y)| {
            Object::new(shape, size, "rubber", color, [x as f64 / 4.0, y as f64 / 4.0, 0.35])
        })
}

fn scene() -> impl Strategy<Value = Scene> {
    proptest::collection::vec(object(), 1..10).prop_map(|objects| {
        Scene::from_objects(objects, Direction::axis_aligned_frame(), 0.2).expect("scene")
    })
}

fn bindings(pairs: &[(&str, &str)]) -> Bindings {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn delete_counting_matches_a_direct_filter(
        scene in scene(),
        deleted in prop::sample::select(COLORS),
        color in prop::sample::select(COLORS),
        shape in prop::sample::select(SHAPES),
    ) {
        let answer = QueryEvaluator::default()
            .evaluate_clauses(
                &scene,
                "Delete",
                "counting",
                &bindings(&[("attribute", "color"), ("value", deleted)]),
                &bindings(&[("color", color), ("shape", shape)]),
            )
            .unwrap();
        let expected = scene
            .objects()
            .iter()
            .filter(|o| o.color != deleted && o.color == color && o.shape == shape)
            .count();
        prop_assert_eq!(answer, Answer::Count { value: expected });
    }

    #[test]
    fn existence_agrees_with_counting(
        scene in scene(),
        from in prop::sample::select(COLORS),
        to in prop::sample::select(COLORS),
        probe in prop::sample::select(COLORS),
    ) {
        let evaluator = QueryEvaluator::default();
        let edit = bindings(&[("color", from), ("new_color", to)]);
        let count = evaluator
            .evaluate_clauses(&scene, "Change_Attribute", "counting", &edit, &bindings(&[("color", probe)]))
            .unwrap();
        let exists = evaluator
            .evaluate_clauses(
                &scene,
                "Change_Attribute",
                "existence",
                &edit,
                &bindings(&[("attribute", "color"), ("value", probe)]),
            )
            .unwrap();
        let Answer::Count { value } = count else {
            panic!("counting answers with a count");
        };
        prop_assert_eq!(exists, Answer::Boolean { value: value > 0 });
        if from != to {
            prop_assert!(from != probe || value == 0);
        }
    }

    #[test]
    fn evaluation_leaves_the_scene_untouched(scene in scene(), angle in prop::sample::select(&["90", "180", "270"][..])) {
        let before = scene.clone();
        let _ = QueryEvaluator::default().evaluate_clauses(
            &scene,
            "Rotate",
            "ordering",
            &bindings(&[("angle", angle), ("direction", "clockwise")]),
            &bindings(&[("extreme_side", "rightmost"), ("attribute", "shape")]),
        );
        prop_assert_eq!(scene, before);
    }

    #[test]
    fn swap_attributes_preserves_the_multiset_of_counts(scene in scene()) {
        let evaluator = QueryEvaluator::default();
        let before: BTreeMap<&str, usize> = COLORS
            .iter()
            .map(|c| (*c, scene.count(&AttributeFilter::from([(Attribute::Color, c.to_string())]))))
            .collect();
        let mut before_counts: Vec<usize> = before.values().copied().collect();
        let mut after_counts = Vec::new();
        for color in COLORS {
            let answer = evaluator
                .evaluate_clauses(
                    &scene,
                    "Swap_Attributes",
                    "counting",
                    &bindings(&[("attribute", "color")]),
                    &bindings(&[("color", color)]),
                )
                .unwrap();
            let Answer::Count { value } = answer else {
                panic!("counting answers with a count");
            };
            after_counts.push(value);
        }
        before_counts.sort_unstable();
        after_counts.sort_unstable();
        prop_assert_eq!(before_counts, after_counts);
    }
}
