//! Pure scene edits.
//!
//! [`Transformer::apply`] takes `&Scene` and returns a new scene; the input is
//! never touched. Selecting zero objects is a valid no-op. Malformed requests
//! (unknown vocabulary values, out-of-range indices, non-positive scale
//! factors) fail before any work is done, so callers can tell "nothing
//! matched" apart from "bad request".
//!
//! Every edit that moves or removes objects ends with a full relationship
//! recomputation. Viewpoint changes relabel the table and the frame together
//! instead, which keeps the table derivable from coordinates and directions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::model::{dot, Attribute, Direction, Object, Scene, Vec3};
use crate::relationships::compute_relationships;
use crate::vocabulary::EngineConfig;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewpoint {
    Front,
    Back,
    LeftSide,
    RightSide,
}

impl Viewpoint {
    pub const ALL: [Viewpoint; 4] = [
        Viewpoint::Front,
        Viewpoint::Back,
        Viewpoint::LeftSide,
        Viewpoint::RightSide,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Viewpoint::Front => "front",
            Viewpoint::Back => "back",
            Viewpoint::LeftSide => "left_side",
            Viewpoint::RightSide => "right_side",
        }
    }

    /// Where a horizontal direction of the default view ends up when the scene
    /// is seen from this viewpoint. Vertical directions are unaffected.
    pub fn relabel(self, direction: Direction) -> Direction {
        use Direction::*;
        match (self, direction) {
            (_, Above | Below) | (Viewpoint::Front, _) => direction,
            (Viewpoint::Back, d) => d.opposite(),
            (Viewpoint::LeftSide, Left) => Behind,
            (Viewpoint::LeftSide, Right) => Front,
            (Viewpoint::LeftSide, Front) => Left,
            (Viewpoint::LeftSide, Behind) => Right,
            (Viewpoint::RightSide, Left) => Front,
            (Viewpoint::RightSide, Right) => Behind,
            (Viewpoint::RightSide, Front) => Right,
            (Viewpoint::RightSide, Behind) => Left,
        }
    }
}

impl fmt::Display for Viewpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Viewpoint {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Viewpoint::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SceneError::InvalidViewpoint(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorAxis {
    /// Reflect across the x axis (negates y).
    X,
    /// Reflect across the y axis (negates x).
    Y,
    /// Point reflection through the origin.
    Center,
}

impl FromStr for MirrorAxis {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(MirrorAxis::X),
            "y" => Ok(MirrorAxis::Y),
            "center" | "centre" => Ok(MirrorAxis::Center),
            _ => Err(SceneError::InvalidTransformation(format!(
                "unknown mirror axis `{s}`"
            ))),
        }
    }
}

/// Which objects an edit applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selector {
    All,
    Attribute { attribute: Attribute, value: String },
    Indices { indices: Vec<usize> },
}

impl Selector {
    pub fn attribute(attribute: Attribute, value: impl Into<String>) -> Self {
        Selector::Attribute {
            attribute,
            value: value.into(),
        }
    }

    pub fn matches(&self, index: usize, object: &Object) -> bool {
        match self {
            Selector::All => true,
            Selector::Attribute { attribute, value } => attribute.matches(object, value),
            Selector::Indices { indices } => indices.contains(&index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformation {
    Delete {
        selector: Selector,
    },
    ChangeAttribute {
        target_attribute: Attribute,
        target_value: String,
        new_attribute: Attribute,
        new_value: String,
    },
    ChangeViewpoint {
        viewpoint: Viewpoint,
    },
    Move {
        selector: Selector,
        offset: Vec3,
    },
    /// Counterclockwise seen from above; negative degrees turn clockwise.
    Rotate {
        degrees: f64,
    },
    Scale {
        factor: f64,
    },
    Mirror {
        axis: MirrorAxis,
    },
    SwapPositions {
        first: Selector,
        second: Selector,
    },
    SwapAttributes {
        attribute: Attribute,
        first_value: String,
        second_value: String,
    },
}

impl Transformation {
    pub fn name(&self) -> &'static str {
        match self {
            Transformation::Delete { .. } => "delete",
            Transformation::ChangeAttribute { .. } => "change_attribute",
            Transformation::ChangeViewpoint { .. } => "change_viewpoint",
            Transformation::Move { .. } => "move",
            Transformation::Rotate { .. } => "rotate",
            Transformation::Scale { .. } => "scale",
            Transformation::Mirror { .. } => "mirror",
            Transformation::SwapPositions { .. } => "swap_positions",
            Transformation::SwapAttributes { .. } => "swap_attributes",
        }
    }
}

// ============================================================================
// Index tracking
// ============================================================================

/// Maps object indices of an input scene to indices of the edited scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRemap {
    forward: Vec<Option<usize>>,
}

impl IndexRemap {
    pub fn identity(len: usize) -> Self {
        Self {
            forward: (0..len).map(Some).collect(),
        }
    }

    fn from_retained(keep: &[bool]) -> Self {
        let mut next = 0usize;
        let forward = keep
            .iter()
            .map(|&kept| {
                kept.then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        Self { forward }
    }

    /// New index of `old`, or `None` when the edit removed it.
    pub fn get(&self, old: usize) -> Option<usize> {
        self.forward.get(old).copied().flatten()
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Transformer {
    config: EngineConfig,
}

impl Transformer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn apply(&self, scene: &Scene, transformation: &Transformation) -> Result<Scene, SceneError> {
        self.apply_tracked(scene, transformation).map(|(next, _)| next)
    }

    /// Like [`Transformer::apply`], also reporting where each input object
    /// ended up.
    pub fn apply_tracked(
        &self,
        scene: &Scene,
        transformation: &Transformation,
    ) -> Result<(Scene, IndexRemap), SceneError> {
        self.validate(scene, transformation)?;

        let mut next = scene.clone();
        let mut remap = IndexRemap::identity(scene.len());
        let mut recompute = true;

        match transformation {
            Transformation::Delete { selector } => {
                let keep: Vec<bool> = scene
                    .objects()
                    .iter()
                    .enumerate()
                    .map(|(i, object)| !selector.matches(i, object))
                    .collect();
                remap = IndexRemap::from_retained(&keep);
                let kept = scene
                    .objects()
                    .iter()
                    .zip(&keep)
                    .filter(|(_, &kept)| kept)
                    .map(|(object, _)| object.clone())
                    .collect();
                next.set_objects(kept);
            }
            Transformation::ChangeAttribute {
                target_attribute,
                target_value,
                new_attribute,
                new_value,
            } => {
                for object in next.objects_mut() {
                    if target_attribute.matches(object, target_value) {
                        new_attribute.set(object, new_value.trim());
                    }
                }
            }
            Transformation::ChangeViewpoint { viewpoint } => {
                let directions: BTreeMap<Direction, Vec3> = scene
                    .directions()
                    .iter()
                    .map(|(d, v)| (viewpoint.relabel(*d), *v))
                    .collect();
                next.set_directions(directions);
                next.set_relationships(scene.relationships().relabel(|d| viewpoint.relabel(d)));
                recompute = false;
            }
            Transformation::Move { selector, offset } => {
                for (i, object) in next.objects_mut().iter_mut().enumerate() {
                    if selector.matches(i, object) {
                        for k in 0..3 {
                            object.coords[k] += offset[k];
                        }
                    }
                }
            }
            Transformation::Rotate { degrees } => {
                let axis = unit(scene.direction(Direction::Above)).ok_or_else(|| {
                    SceneError::InvalidTransformation("scene has no vertical axis".to_string())
                })?;
                for object in next.objects_mut() {
                    object.coords = rotate_about(object.coords, axis, degrees.to_radians());
                    object.rotation = (object.rotation + degrees).rem_euclid(360.0);
                }
            }
            Transformation::Scale { factor } => {
                let steps = factor.log2().round() as i64;
                let sizes = &self.config.vocabulary.sizes;
                for object in next.objects_mut() {
                    for c in object.coords.iter_mut() {
                        *c *= factor;
                    }
                    if let Some(rank) = self.config.vocabulary.size_rank(&object.size) {
                        let top = sizes.len() as i64 - 1;
                        let shifted = (rank as i64 + steps).clamp(0, top) as usize;
                        object.size = sizes[shifted].clone();
                    }
                }
            }
            Transformation::Mirror { axis } => {
                for object in next.objects_mut() {
                    match axis {
                        MirrorAxis::X => {
                            object.coords[1] = -object.coords[1];
                            object.rotation = (-object.rotation).rem_euclid(360.0);
                        }
                        MirrorAxis::Y => {
                            object.coords[0] = -object.coords[0];
                            object.rotation = (-object.rotation).rem_euclid(360.0);
                        }
                        MirrorAxis::Center => {
                            object.coords[0] = -object.coords[0];
                            object.coords[1] = -object.coords[1];
                            object.rotation = (object.rotation + 180.0).rem_euclid(360.0);
                        }
                    }
                }
            }
            Transformation::SwapPositions { first, second } => {
                let objects = scene.objects();
                let group = |this: &Selector, other: &Selector| -> Vec<usize> {
                    objects
                        .iter()
                        .enumerate()
                        .filter(|&(i, o)| this.matches(i, o) && !other.matches(i, o))
                        .map(|(i, _)| i)
                        .collect()
                };
                let (a, b) = (group(first, second), group(second, first));
                let placed = next.objects_mut();
                for (&i, &j) in a.iter().zip(&b) {
                    placed[i].coords = objects[j].coords;
                    placed[i].pixel_coords = objects[j].pixel_coords.clone();
                    placed[j].coords = objects[i].coords;
                    placed[j].pixel_coords = objects[i].pixel_coords.clone();
                }
            }
            Transformation::SwapAttributes {
                attribute,
                first_value,
                second_value,
            } => {
                for object in next.objects_mut() {
                    if attribute.matches(object, first_value) {
                        attribute.set(object, second_value.trim());
                    } else if attribute.matches(object, second_value) {
                        attribute.set(object, first_value.trim());
                    }
                }
            }
        }

        if recompute {
            let table = compute_relationships(next.objects(), next.directions(), self.config.epsilon);
            next.set_relationships(table);
        }

        tracing::debug!(
            transformation = transformation.name(),
            objects_before = scene.len(),
            objects_after = next.len(),
            "applied scene transformation"
        );
        Ok((next, remap))
    }

    /// Rejects requests that name values outside the vocabulary, indices
    /// outside the scene, or non-finite geometry.
    pub fn validate(&self, scene: &Scene, transformation: &Transformation) -> Result<(), SceneError> {
        match transformation {
            Transformation::Delete { selector } => self.validate_selector(scene, selector),
            Transformation::ChangeAttribute {
                target_attribute,
                target_value,
                new_attribute,
                new_value,
            } => {
                self.validate_value(scene, *target_attribute, target_value)?;
                self.validate_value(scene, *new_attribute, new_value)
            }
            Transformation::ChangeViewpoint { .. } => Ok(()),
            Transformation::Move { selector, offset } => {
                if offset.iter().any(|c| !c.is_finite()) {
                    return Err(SceneError::InvalidTransformation(
                        "move offset must be finite".to_string(),
                    ));
                }
                self.validate_selector(scene, selector)
            }
            Transformation::Rotate { degrees } => {
                if degrees.is_finite() {
                    Ok(())
                } else {
                    Err(SceneError::InvalidTransformation(
                        "rotation angle must be finite".to_string(),
                    ))
                }
            }
            Transformation::Scale { factor } => {
                if factor.is_finite() && *factor > 0.0 {
                    Ok(())
                } else {
                    Err(SceneError::InvalidTransformation(format!(
                        "scale factor must be positive, got {factor}"
                    )))
                }
            }
            Transformation::Mirror { .. } => Ok(()),
            Transformation::SwapPositions { first, second } => {
                self.validate_selector(scene, first)?;
                self.validate_selector(scene, second)
            }
            Transformation::SwapAttributes {
                attribute,
                first_value,
                second_value,
            } => {
                self.validate_value(scene, *attribute, first_value)?;
                self.validate_value(scene, *attribute, second_value)
            }
        }
    }

    fn validate_selector(&self, scene: &Scene, selector: &Selector) -> Result<(), SceneError> {
        match selector {
            Selector::All => Ok(()),
            Selector::Attribute { attribute, value } => self.validate_value(scene, *attribute, value),
            Selector::Indices { indices } => match indices.iter().find(|&&i| i >= scene.len()) {
                Some(bad) => Err(SceneError::InvalidTransformation(format!(
                    "object index {bad} is out of range for {} objects",
                    scene.len()
                ))),
                None => Ok(()),
            },
        }
    }

    fn validate_value(&self, scene: &Scene, attribute: Attribute, value: &str) -> Result<(), SceneError> {
        if self.config.vocabulary.contains(attribute, value)
            || scene.vocabulary().contains(attribute, value)
        {
            Ok(())
        } else {
            Err(SceneError::InvalidAttributeValue {
                attribute,
                value: value.to_string(),
            })
        }
    }

    // ------------------------------------------------------------------------
    // Named operations
    // ------------------------------------------------------------------------

    pub fn delete(&self, scene: &Scene, attribute: &str, value: &str) -> Result<Scene, SceneError> {
        let attribute = Attribute::from_str(attribute)?;
        self.apply(
            scene,
            &Transformation::Delete {
                selector: Selector::attribute(attribute, value),
            },
        )
    }

    pub fn change_attribute(
        &self,
        scene: &Scene,
        target_attribute: &str,
        target_value: &str,
        new_attribute: &str,
        new_value: &str,
    ) -> Result<Scene, SceneError> {
        self.apply(
            scene,
            &Transformation::ChangeAttribute {
                target_attribute: Attribute::from_str(target_attribute)?,
                target_value: target_value.to_string(),
                new_attribute: Attribute::from_str(new_attribute)?,
                new_value: new_value.to_string(),
            },
        )
    }

    pub fn change_viewpoint(&self, scene: &Scene, viewpoint: &str) -> Result<Scene, SceneError> {
        self.apply(
            scene,
            &Transformation::ChangeViewpoint {
                viewpoint: Viewpoint::from_str(viewpoint)?,
            },
        )
    }
}

fn unit(v: Vec3) -> Option<Vec3> {
    let norm = dot(&v, &v).sqrt();
    (norm > f64::EPSILON).then(|| [v[0] / norm, v[1] / norm, v[2] / norm])
}

/// Rodrigues rotation of `v` about the unit axis `k`.
fn rotate_about(v: Vec3, k: Vec3, radians: f64) -> Vec3 {
    let (sin, cos) = radians.sin_cos();
    let cross = [
        k[1] * v[2] - k[2] * v[1],
        k[2] * v[0] - k[0] * v[2],
        k[0] * v[1] - k[1] * v[0],
    ];
    let along = dot(&k, &v) * (1.0 - cos);
    [
        v[0] * cos + cross[0] * sin + k[0] * along,
        v[1] * cos + cross[1] * sin + k[1] * along,
        v[2] * cos + cross[2] * sin + k[2] * along,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scene(objects: Vec<Object>) -> Scene {
        Scene::from_objects(objects, Direction::axis_aligned_frame(), 0.2).expect("scene")
    }

    fn three_objects() -> Scene {
        scene(vec![
            Object::new("cube", "large", "rubber", "red", [-2.0, 0.0, 0.7]),
            Object::new("cylinder", "small", "metal", "blue", [0.0, 0.0, 0.35]),
            Object::new("cube", "small", "metal", "blue", [2.0, 0.0, 0.35]),
        ])
    }

    fn blue(attribute: Attribute, value: &str) -> BTreeMap<Attribute, String> {
        BTreeMap::from([(Attribute::Color, "blue".to_string()), (attribute, value.to_string())])
    }

    #[test]
    fn delete_reindexes_and_recomputes() {
        let base = three_objects();
        let (next, remap) = Transformer::default()
            .apply_tracked(
                &base,
                &Transformation::Delete {
                    selector: Selector::attribute(Attribute::Color, "red"),
                },
            )
            .unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next.count(&blue(Attribute::Shape, "cylinder")), 1);
        assert_eq!(remap.get(0), None);
        assert_eq!(remap.get(2), Some(1));
        assert_eq!(next.related(Direction::Right, 0), &[1]);
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn zero_matches_is_a_no_op_but_unknown_values_fail() {
        let base = three_objects();
        let engine = Transformer::default();
        let same = engine.delete(&base, "color", "purple").unwrap();
        assert_eq!(same, base);

        assert!(matches!(
            engine.delete(&base, "color", "plaid"),
            Err(SceneError::InvalidAttributeValue { .. })
        ));
        assert!(matches!(
            engine.delete(&base, "texture", "red"),
            Err(SceneError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn change_attribute_touches_only_matches() {
        let base = three_objects();
        let next = Transformer::default()
            .change_attribute(&base, "color", "blue", "color", "yellow")
            .unwrap();
        let colors: Vec<&str> = next.objects().iter().map(|o| o.color.as_str()).collect();
        assert_eq!(colors, vec!["red", "yellow", "yellow"]);
        assert_eq!(next.relationships(), base.relationships());
    }

    #[test]
    fn viewpoint_back_swaps_left_and_right() {
        let base = three_objects();
        let next = Transformer::default().change_viewpoint(&base, "back").unwrap();
        assert_eq!(next.related(Direction::Left, 0), base.related(Direction::Right, 0));
        assert_eq!(next.related(Direction::Right, 2), base.related(Direction::Left, 2));
        assert_eq!(next.direction(Direction::Left), base.direction(Direction::Right));

        let recomputed = compute_relationships(next.objects(), next.directions(), 0.2);
        assert_eq!(&recomputed, next.relationships());
    }

    #[test]
    fn unknown_viewpoint_is_rejected() {
        let base = three_objects();
        assert!(matches!(
            Transformer::default().change_viewpoint(&base, "top_down"),
            Err(SceneError::InvalidViewpoint(_))
        ));
    }

    #[test]
    fn side_viewpoints_rotate_the_labels() {
        for viewpoint in [Viewpoint::LeftSide, Viewpoint::RightSide] {
            let mut seen: Vec<Direction> = Direction::CARDINAL
                .iter()
                .map(|d| viewpoint.relabel(*d))
                .collect();
            seen.sort();
            let mut cardinal = Direction::CARDINAL.to_vec();
            cardinal.sort();
            assert_eq!(seen, cardinal);
            for d in Direction::CARDINAL {
                assert_eq!(viewpoint.relabel(d.opposite()), viewpoint.relabel(d).opposite());
            }
        }
        assert_eq!(Viewpoint::RightSide.relabel(Direction::Front), Direction::Right);
    }

    #[test]
    fn rotate_quarter_turn_counterclockwise() {
        let base = three_objects();
        let next = Transformer::default()
            .apply(&base, &Transformation::Rotate { degrees: 90.0 })
            .unwrap();
        let moved = next.objects()[2].coords;
        assert_relative_eq!(moved[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(moved[1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(moved[2], 0.35, epsilon = 1e-9);
        assert_relative_eq!(next.objects()[2].rotation, 90.0);
        assert_eq!(next.related(Direction::Behind, 1), &[2]);
    }

    #[test]
    fn scale_doubles_coordinates_and_steps_size() {
        let base = three_objects();
        let next = Transformer::default()
            .apply(&base, &Transformation::Scale { factor: 2.0 })
            .unwrap();
        assert_relative_eq!(next.objects()[0].coords[0], -4.0);
        assert_eq!(next.objects()[0].size, "very large");
        assert_eq!(next.objects()[1].size, "medium");

        assert!(matches!(
            Transformer::default().apply(&base, &Transformation::Scale { factor: 0.0 }),
            Err(SceneError::InvalidTransformation(_))
        ));
    }

    #[test]
    fn mirror_across_y_axis_flips_left_and_right() {
        let base = three_objects();
        let next = Transformer::default()
            .apply(&base, &Transformation::Mirror { axis: MirrorAxis::Y })
            .unwrap();
        assert_eq!(next.related(Direction::Right, 0), &[] as &[usize]);
        assert_eq!(next.related(Direction::Left, 0), &[1, 2]);
    }

    #[test]
    fn swap_positions_pairs_groups_in_order() {
        let base = three_objects();
        let next = Transformer::default()
            .apply(
                &base,
                &Transformation::SwapPositions {
                    first: Selector::attribute(Attribute::Color, "red"),
                    second: Selector::attribute(Attribute::Shape, "cylinder"),
                },
            )
            .unwrap();
        assert_eq!(next.objects()[0].coords, base.objects()[1].coords);
        assert_eq!(next.objects()[1].coords, base.objects()[0].coords);
        assert_eq!(next.objects()[2].coords, base.objects()[2].coords);
    }

    #[test]
    fn swap_attributes_exchanges_values() {
        let base = three_objects();
        let next = Transformer::default()
            .apply(
                &base,
                &Transformation::SwapAttributes {
                    attribute: Attribute::Size,
                    first_value: "large".to_string(),
                    second_value: "small".to_string(),
                },
            )
            .unwrap();
        let sizes: Vec<&str> = next.objects().iter().map(|o| o.size.as_str()).collect();
        assert_eq!(sizes, vec!["small", "large", "large"]);
    }

    #[test]
    fn out_of_range_index_selector_is_rejected() {
        let base = three_objects();
        let request = Transformation::Move {
            selector: Selector::Indices { indices: vec![7] },
            offset: [1.0, 0.0, 0.0],
        };
        assert!(matches!(
            Transformer::default().apply(&base, &request),
            Err(SceneError::InvalidTransformation(_))
        ));
    }

    #[test]
    fn transformation_requests_deserialize_from_json() {
        let request: Transformation = serde_json::from_str(
            r#"{"kind":"move","selector":{"type":"attribute","attribute":"shape","value":"cube"},"offset":[0.0,1.0,0.0]}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Transformation::Move {
                selector: Selector::attribute(Attribute::Shape, "cube"),
                offset: [0.0, 1.0, 0.0],
            }
        );
    }
}
