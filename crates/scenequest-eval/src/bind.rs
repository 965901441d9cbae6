//! Bind stage: turns the edit clause of a parsed question into a
//! [`Transformation`].
//!
//! Transformation types are the registry labels (`Delete`, `Change_Attribute`,
//! `Change Viewpoint`, ...). Labels compare case-insensitively with spaces and
//! underscores treated alike.

use std::collections::BTreeMap;
use std::str::FromStr;

use scenequest_scene::{
    Attribute, Direction, EngineConfig, MirrorAxis, Scene, Selector, Transformation, Viewpoint,
};

use crate::descriptor::DescriptorParser;
use crate::error::EvalError;

pub type Bindings = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformationKind {
    Delete,
    ChangeAttribute,
    ChangeViewpoint,
    Move,
    Rotate,
    Scale,
    MirrorReflect,
    SwapPositions,
    SwapAttributes,
}

impl TransformationKind {
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(' ', "_");
        Some(match normalized.as_str() {
            "delete" => TransformationKind::Delete,
            "change_attribute" => TransformationKind::ChangeAttribute,
            "change_viewpoint" => TransformationKind::ChangeViewpoint,
            "move" => TransformationKind::Move,
            "rotate" => TransformationKind::Rotate,
            "scale" => TransformationKind::Scale,
            "mirror_reflect" | "mirror" => TransformationKind::MirrorReflect,
            "swap_positions" => TransformationKind::SwapPositions,
            "swap_attributes" => TransformationKind::SwapAttributes,
            _ => return None,
        })
    }
}

/// Maps a relation phrase (`"to the left of"`, `"behind"`, ...) to the
/// direction it names.
pub fn relation_direction(phrase: &str) -> Result<Direction, EvalError> {
    let normalized = phrase.trim().to_ascii_lowercase();
    let core = normalized
        .strip_prefix("to the ")
        .unwrap_or(&normalized)
        .trim_end_matches(" of")
        .trim();
    match core {
        "in front" => Ok(Direction::Front),
        "above" | "up" => Ok(Direction::Above),
        "below" | "down" => Ok(Direction::Below),
        other => Direction::from_str(other).map_err(|_| EvalError::invalid_binding("relation", phrase)),
    }
}

pub(crate) fn number(bindings: &Bindings, key: &str) -> Result<Option<f64>, EvalError> {
    bindings
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| EvalError::invalid_binding(key, raw))
        })
        .transpose()
}

pub(crate) fn attribute(bindings: &Bindings, key: &str) -> Result<Option<Attribute>, EvalError> {
    bindings
        .get(key)
        .map(|raw| Attribute::from_str(raw).map_err(EvalError::from))
        .transpose()
}

/// Builds the edit described by `edit`, or `None` when the clause asks for no
/// edit (including unrecognized transformation types).
pub fn bind_transformation(
    transformation_type: &str,
    edit: &Bindings,
    scene: &Scene,
    config: &EngineConfig,
) -> Result<Option<Transformation>, EvalError> {
    let Some(kind) = TransformationKind::from_label(transformation_type) else {
        tracing::warn!(
            transformation = transformation_type,
            "unrecognized transformation type; evaluating against the unedited scene"
        );
        return Ok(None);
    };
    let invalid = |message: &str| EvalError::InvalidTransformation {
        transformation: transformation_type.to_string(),
        message: message.to_string(),
    };
    let get = |key: &str| edit.get(key).map(String::as_str);
    let selector = |attribute: Attribute, value: &str| Selector::attribute(attribute, value);

    let bound = match kind {
        TransformationKind::Delete => {
            if let (Some(attr), Some(value)) = (attribute(edit, "attribute")?, get("value")) {
                Some(Transformation::Delete {
                    selector: selector(attr, value),
                })
            } else if let (Some(relation), Some(reference)) = (get("relation"), get("reference_object")) {
                let direction = relation_direction(relation)?;
                let anchor = DescriptorParser::new(&config.vocabulary, scene).resolve(scene, reference)?;
                Some(Transformation::Delete {
                    selector: Selector::Indices {
                        indices: scene.related(direction, anchor).to_vec(),
                    },
                })
            } else {
                get("color").map(|color| Transformation::Delete {
                    selector: selector(Attribute::Color, color),
                })
            }
        }
        TransformationKind::ChangeAttribute => {
            let explicit = (
                attribute(edit, "target_attribute")?,
                get("target_value"),
                attribute(edit, "new_attribute")?,
                get("new_value"),
            );
            let change = |target_attribute, target_value: &str, new_attribute, new_value: &str| {
                Transformation::ChangeAttribute {
                    target_attribute,
                    target_value: target_value.to_string(),
                    new_attribute,
                    new_value: new_value.to_string(),
                }
            };
            match explicit {
                (Some(ta), Some(tv), Some(na), Some(nv)) => Some(change(ta, tv, na, nv)),
                _ => match (get("color"), get("new_color"), get("size"), get("new_shape")) {
                    (Some(color), Some(new_color), _, _) => {
                        Some(change(Attribute::Color, color, Attribute::Color, new_color))
                    }
                    (_, _, Some(size), Some(new_shape)) => {
                        Some(change(Attribute::Size, size, Attribute::Shape, new_shape))
                    }
                    _ => return Err(invalid("no target and new value to change")),
                },
            }
        }
        TransformationKind::ChangeViewpoint => {
            let view = get("view_direction").ok_or_else(|| invalid("missing `view_direction`"))?;
            Some(Transformation::ChangeViewpoint {
                viewpoint: Viewpoint::from_str(view)?,
            })
        }
        TransformationKind::Move => {
            if let (Some(shape), Some(distance), Some(direction)) =
                (get("shape"), number(edit, "distance")?, get("direction"))
            {
                let direction = relation_direction(direction)
                    .map_err(|_| EvalError::invalid_binding("direction", direction))?;
                let unit = scene.direction(direction);
                Some(Transformation::Move {
                    selector: selector(Attribute::Shape, shape),
                    offset: [unit[0] * distance, unit[1] * distance, unit[2] * distance],
                })
            } else if let (Some(color), Some(dx), Some(dy)) =
                (get("color"), number(edit, "x_shift")?, number(edit, "y_shift")?)
            {
                Some(Transformation::Move {
                    selector: selector(Attribute::Color, color),
                    offset: [dx, dy, 0.0],
                })
            } else {
                return Err(invalid("no objects and offset to move"));
            }
        }
        TransformationKind::Rotate => {
            let angle = number(edit, "angle")?.ok_or_else(|| invalid("missing `angle`"))?;
            let sense = get("direction").unwrap_or("counterclockwise");
            let degrees = match sense.trim().to_ascii_lowercase().replace(|c: char| c == '-' || c == ' ', "").as_str() {
                "clockwise" | "cw" => -angle,
                "counterclockwise" | "anticlockwise" | "ccw" => angle,
                _ => return Err(EvalError::invalid_binding("direction", sense)),
            };
            Some(Transformation::Rotate { degrees })
        }
        TransformationKind::Scale => {
            if let Some(factor) = number(edit, "scale_factor")? {
                Some(Transformation::Scale { factor })
            } else if let (Some(color), Some(size)) = (get("color"), get("size_large")) {
                Some(Transformation::ChangeAttribute {
                    target_attribute: Attribute::Color,
                    target_value: color.to_string(),
                    new_attribute: Attribute::Size,
                    new_value: size.to_string(),
                })
            } else {
                return Err(invalid("no scale factor or enlargement"));
            }
        }
        TransformationKind::MirrorReflect => {
            let axis = match get("mirror_axis") {
                Some(axis) => MirrorAxis::from_str(axis)?,
                None => MirrorAxis::Center,
            };
            Some(Transformation::Mirror { axis })
        }
        TransformationKind::SwapPositions => match (get("color"), get("shape")) {
            (Some(color), Some(shape)) => Some(Transformation::SwapPositions {
                first: selector(Attribute::Color, color),
                second: selector(Attribute::Shape, shape),
            }),
            _ => return Err(invalid("needs a color group and a shape group")),
        },
        TransformationKind::SwapAttributes => {
            let attr = attribute(edit, "attribute")?.ok_or_else(|| invalid("missing `attribute`"))?;
            frequency_extremes(scene, attr).map(|(most, least)| Transformation::SwapAttributes {
                attribute: attr,
                first_value: most,
                second_value: least,
            })
        }
    };

    tracing::debug!(
        transformation = transformation_type,
        edit = bound.as_ref().map(Transformation::name).unwrap_or("none"),
        "bound scene edit"
    );
    Ok(bound)
}

/// The most and least frequent values of `attribute`, ties broken
/// alphabetically. `None` when the scene holds fewer than two distinct values.
fn frequency_extremes(scene: &Scene, attribute: Attribute) -> Option<(String, String)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for object in scene.objects() {
        *counts.entry(attribute.get(object).to_ascii_lowercase()).or_default() += 1;
    }
    if counts.len() < 2 {
        return None;
    }
    // BTreeMap iteration is alphabetical, so the first extreme found wins ties.
    let mut most = None::<(&String, usize)>;
    let mut least = None::<(&String, usize)>;
    for (value, &count) in &counts {
        if most.map_or(true, |(_, best)| count > best) {
            most = Some((value, count));
        }
        if least.map_or(true, |(_, best)| count < best) {
            least = Some((value, count));
        }
    }
    let (most, least) = (most?.0.clone(), least?.0.clone());
    (most != least).then_some((most, least))
}
