//! Typed scene model and the scene-description wire format.
//!
//! The renderer emits one JSON document per image:
//!
//! ```text
//! {
//!   "objects":       [ { shape, size, material, color, 3d_coords, rotation,
//!                        pixel_coords, visible }, ... ],
//!   "directions":    { left|right|front|behind|above|below: [x, y, z] },
//!   "relationships": { left|right|front|behind: [[j, ...] per object] },
//!   "split", "image_index", "image_filename"
//! }
//! ```
//!
//! [`Scene`] is the validated, typed form of that document. Object identity is
//! positional: the index of an object in `objects` is the index used by every
//! relationship entry.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::SceneError;
use crate::relationships::{compute_relationships, RelationshipTable};
use crate::vocabulary::SceneVocabulary;

/// A point or direction in scene space.
pub type Vec3 = [f64; 3];

pub(crate) fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn sub(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Opposite directions must cancel to within this tolerance.
const FRAME_TOLERANCE: f64 = 1e-6;

// ============================================================================
// Directions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Front,
    Behind,
    Above,
    Below,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Left,
        Direction::Right,
        Direction::Front,
        Direction::Behind,
        Direction::Above,
        Direction::Below,
    ];

    /// Horizontal directions; the relationship table is keyed by these only.
    pub const CARDINAL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Front,
        Direction::Behind,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Front => "front",
            Direction::Behind => "behind",
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Front => Direction::Behind,
            Direction::Behind => Direction::Front,
            Direction::Above => Direction::Below,
            Direction::Below => Direction::Above,
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Above | Direction::Below)
    }

    /// A frame aligned with the world axes: `right = +x`, `behind = +y`,
    /// `above = +z`.
    pub fn axis_aligned_frame() -> BTreeMap<Direction, Vec3> {
        BTreeMap::from([
            (Direction::Left, [-1.0, 0.0, 0.0]),
            (Direction::Right, [1.0, 0.0, 0.0]),
            (Direction::Front, [0.0, -1.0, 0.0]),
            (Direction::Behind, [0.0, 1.0, 0.0]),
            (Direction::Above, [0.0, 0.0, 1.0]),
            (Direction::Below, [0.0, 0.0, -1.0]),
        ])
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "front" => Ok(Direction::Front),
            "behind" => Ok(Direction::Behind),
            "above" => Ok(Direction::Above),
            "below" => Ok(Direction::Below),
            _ => Err(SceneError::InvalidDirection(s.to_string())),
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// The categorical attributes an object carries.
///
/// This is the closed set of names edits and queries may select on; every
/// read or write of an attribute goes through [`Attribute::get`] /
/// [`Attribute::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Shape,
    Size,
    Material,
    Color,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Shape,
        Attribute::Size,
        Attribute::Material,
        Attribute::Color,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::Shape => "shape",
            Attribute::Size => "size",
            Attribute::Material => "material",
            Attribute::Color => "color",
        }
    }

    pub fn get(self, object: &Object) -> &str {
        match self {
            Attribute::Shape => &object.shape,
            Attribute::Size => &object.size,
            Attribute::Material => &object.material,
            Attribute::Color => &object.color,
        }
    }

    pub fn set(self, object: &mut Object, value: impl Into<String>) {
        let slot = match self {
            Attribute::Shape => &mut object.shape,
            Attribute::Size => &mut object.size,
            Attribute::Material => &mut object.material,
            Attribute::Color => &mut object.color,
        };
        *slot = value.into();
    }

    /// Case-insensitive comparison of the object's value with `value`.
    pub fn matches(self, object: &Object, value: &str) -> bool {
        self.get(object).eq_ignore_ascii_case(value.trim())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shape" => Ok(Attribute::Shape),
            "size" => Ok(Attribute::Size),
            "material" => Ok(Attribute::Material),
            "color" | "colour" => Ok(Attribute::Color),
            _ => Err(SceneError::InvalidAttribute(s.to_string())),
        }
    }
}

/// Conjunction of attribute equalities. An empty filter matches every object.
pub type AttributeFilter = BTreeMap<Attribute, String>;

// ============================================================================
// Objects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ObjectRecord", into = "ObjectRecord")]
pub struct Object {
    pub shape: String,
    pub size: String,
    pub material: String,
    pub color: String,
    /// Wire key `3d_coords`.
    pub coords: Vec3,
    /// Degrees about the vertical axis.
    pub rotation: f64,
    /// Image-space projection plus depth, kept verbatim from the renderer.
    pub pixel_coords: Vec<Number>,
    /// `None` when the renderer did not record visibility; treated as visible.
    pub visible: Option<bool>,
    /// Renderer fields this crate does not interpret.
    pub extra: Map<String, Value>,
    spelling: NumericSpelling,
}

/// Which numeric fields were written as JSON integers, so that an integral
/// value is written back the way it was read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct NumericSpelling {
    coords: [bool; 3],
    rotation: bool,
}

/// Wire form of an object, before validation.
#[derive(Serialize, Deserialize)]
struct ObjectRecord {
    shape: String,
    size: String,
    material: String,
    color: String,
    #[serde(rename = "3d_coords")]
    coords: [Value; 3],
    rotation: Value,
    #[serde(default)]
    pixel_coords: Vec<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visible: Option<bool>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Reads a finite JSON number, reporting whether it was spelled as an integer.
fn read_number(value: &Value, field: &str) -> Result<(f64, bool), SceneError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|v| (v, n.is_i64() || n.is_u64()))
            .ok_or_else(|| SceneError::malformed(format!("`{field}` is not a finite number: {n}"))),
        other => Err(SceneError::malformed(format!(
            "`{field}` must be a number, found {other}"
        ))),
    }
}

/// Largest magnitude below which every integral `f64` is an exact `i64`.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

fn write_number(value: f64, integral: bool) -> Value {
    if integral && value.fract() == 0.0 && value.abs() < EXACT_INTEGER_LIMIT {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

fn read_vector(raw: &[Value; 3], field: &str) -> Result<(Vec3, [bool; 3]), SceneError> {
    let mut vector = [0.0; 3];
    let mut integral = [false; 3];
    for (k, value) in raw.iter().enumerate() {
        (vector[k], integral[k]) = read_number(value, field)?;
    }
    Ok((vector, integral))
}

fn write_vector(vector: Vec3, integral: [bool; 3]) -> [Value; 3] {
    [0, 1, 2].map(|k| write_number(vector[k], integral[k]))
}

impl TryFrom<ObjectRecord> for Object {
    type Error = SceneError;

    fn try_from(record: ObjectRecord) -> Result<Self, Self::Error> {
        let (coords, coords_integral) = read_vector(&record.coords, "3d_coords")?;
        let (rotation, rotation_integral) = read_number(&record.rotation, "rotation")?;
        Ok(Object {
            shape: record.shape,
            size: record.size,
            material: record.material,
            color: record.color,
            coords,
            rotation,
            pixel_coords: record.pixel_coords,
            visible: record.visible,
            extra: record.extra,
            spelling: NumericSpelling {
                coords: coords_integral,
                rotation: rotation_integral,
            },
        })
    }
}

impl From<Object> for ObjectRecord {
    fn from(object: Object) -> Self {
        let spelling = object.spelling;
        ObjectRecord {
            shape: object.shape,
            size: object.size,
            material: object.material,
            color: object.color,
            coords: write_vector(object.coords, spelling.coords),
            rotation: write_number(object.rotation, spelling.rotation),
            pixel_coords: object.pixel_coords,
            visible: object.visible,
            extra: object.extra,
        }
    }
}

impl Object {
    pub fn new(
        shape: impl Into<String>,
        size: impl Into<String>,
        material: impl Into<String>,
        color: impl Into<String>,
        coords: Vec3,
    ) -> Self {
        Self {
            shape: shape.into(),
            size: size.into(),
            material: material.into(),
            color: color.into(),
            coords,
            rotation: 0.0,
            pixel_coords: Vec::new(),
            visible: Some(true),
            extra: Map::new(),
            spelling: NumericSpelling::default(),
        }
    }

    pub fn matches(&self, filter: &AttributeFilter) -> bool {
        filter
            .iter()
            .all(|(attribute, value)| attribute.matches(self, value))
    }

    /// `"the large red rubber cube"`, skipping empty attributes.
    pub fn describe(&self) -> String {
        let parts: Vec<&str> = [&self.size, &self.color, &self.material, &self.shape]
            .into_iter()
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            "unknown object".to_string()
        } else {
            format!("the {}", parts.join(" "))
        }
    }
}

// ============================================================================
// Scene
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SceneRecord", into = "SceneRecord")]
pub struct Scene {
    objects: Vec<Object>,
    directions: BTreeMap<Direction, Vec3>,
    /// Frame components that were written as JSON integers.
    direction_spelling: BTreeMap<Direction, [bool; 3]>,
    relationships: RelationshipTable,
    split: String,
    image_index: u64,
    image_filename: String,
    extra: Map<String, Value>,
}

/// Wire form of a scene, before validation.
#[derive(Serialize, Deserialize)]
struct SceneRecord {
    objects: Vec<Object>,
    directions: BTreeMap<String, [Value; 3]>,
    relationships: BTreeMap<String, Vec<Vec<usize>>>,
    split: String,
    image_index: u64,
    image_filename: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<SceneRecord> for Scene {
    type Error = SceneError;

    fn try_from(record: SceneRecord) -> Result<Self, Self::Error> {
        let mut directions = BTreeMap::new();
        let mut direction_spelling = BTreeMap::new();
        for (name, raw) in &record.directions {
            let direction = Direction::from_str(name)
                .map_err(|_| SceneError::malformed(format!("unknown direction `{name}`")))?;
            let (vector, integral) = read_vector(raw, "directions")?;
            directions.insert(direction, vector);
            direction_spelling.insert(direction, integral);
        }
        validate_frame(&directions)?;

        let count = record.objects.len();
        let mut table = BTreeMap::new();
        for (name, entries) in record.relationships {
            let direction = Direction::from_str(&name).map_err(|_| {
                SceneError::malformed(format!("unknown relationship direction `{name}`"))
            })?;
            if direction.is_vertical() {
                return Err(SceneError::malformed(format!(
                    "relationships are horizontal only, found `{name}`"
                )));
            }
            if entries.len() != count {
                return Err(SceneError::malformed(format!(
                    "relationship `{name}` has {} entries for {count} objects",
                    entries.len()
                )));
            }
            for (i, related) in entries.iter().enumerate() {
                if let Some(bad) = related.iter().find(|&&j| j >= count || j == i) {
                    return Err(SceneError::malformed(format!(
                        "relationship `{name}` of object {i} references invalid index {bad}"
                    )));
                }
            }
            table.insert(direction, entries);
        }

        Ok(Scene {
            objects: record.objects,
            directions,
            direction_spelling,
            relationships: RelationshipTable::from_map(table),
            split: record.split,
            image_index: record.image_index,
            image_filename: record.image_filename,
            extra: record.extra,
        })
    }
}

impl From<Scene> for SceneRecord {
    fn from(scene: Scene) -> Self {
        SceneRecord {
            objects: scene.objects,
            directions: scene
                .directions
                .into_iter()
                .map(|(d, v)| {
                    let integral = scene.direction_spelling.get(&d).copied().unwrap_or_default();
                    (d.as_str().to_string(), write_vector(v, integral))
                })
                .collect(),
            relationships: scene
                .relationships
                .into_map()
                .into_iter()
                .map(|(d, entries)| (d.as_str().to_string(), entries))
                .collect(),
            split: scene.split,
            image_index: scene.image_index,
            image_filename: scene.image_filename,
            extra: scene.extra,
        }
    }
}

fn validate_frame(directions: &BTreeMap<Direction, Vec3>) -> Result<(), SceneError> {
    for direction in Direction::ALL {
        let Some(vector) = directions.get(&direction) else {
            return Err(SceneError::malformed(format!(
                "direction `{direction}` is missing"
            )));
        };
        if vector.iter().any(|c| !c.is_finite()) {
            return Err(SceneError::malformed(format!(
                "direction `{direction}` is not finite"
            )));
        }
    }
    for (a, b) in [
        (Direction::Left, Direction::Right),
        (Direction::Front, Direction::Behind),
    ] {
        let (va, vb) = (directions[&a], directions[&b]);
        if (0..3).any(|k| (va[k] + vb[k]).abs() > FRAME_TOLERANCE) {
            return Err(SceneError::malformed(format!(
                "direction `{a}` is not the negation of `{b}`"
            )));
        }
    }
    Ok(())
}

impl Scene {
    /// Validates and types a raw scene description.
    pub fn from_description(raw: &Value) -> Result<Self, SceneError> {
        let record =
            SceneRecord::deserialize(raw).map_err(|err| SceneError::malformed(err.to_string()))?;
        Scene::try_from(record)
    }

    /// Inverse of [`Scene::from_description`].
    pub fn to_description(&self) -> Result<Value, SceneError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SceneError> {
        let raw: Value = serde_json::from_str(text)?;
        Self::from_description(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read_from_path(path: &Path) -> Result<Self, SceneError> {
        let text = fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), SceneError> {
        let text = self.to_json_pretty()?;
        fs::write(path, text).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds a scene from objects and a direction frame, deriving the
    /// relationship table with `epsilon`. Provenance fields start empty.
    pub fn from_objects(
        objects: Vec<Object>,
        directions: BTreeMap<Direction, Vec3>,
        epsilon: f64,
    ) -> Result<Self, SceneError> {
        validate_frame(&directions)?;
        let relationships = compute_relationships(&objects, &directions, epsilon);
        Ok(Scene {
            objects,
            directions,
            direction_spelling: BTreeMap::new(),
            relationships,
            split: String::new(),
            image_index: 0,
            image_filename: String::new(),
            extra: Map::new(),
        })
    }

    pub fn with_provenance(
        mut self,
        split: impl Into<String>,
        image_index: u64,
        image_filename: impl Into<String>,
    ) -> Self {
        self.split = split.into();
        self.image_index = image_index;
        self.image_filename = image_filename.into();
        self
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn object(&self, index: usize) -> Option<&Object> {
        self.objects.get(index)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn directions(&self) -> &BTreeMap<Direction, Vec3> {
        &self.directions
    }

    /// The frame vector for `direction`. Always present on a validated scene.
    pub fn direction(&self, direction: Direction) -> Vec3 {
        self.directions
            .get(&direction)
            .copied()
            .unwrap_or([0.0, 0.0, 0.0])
    }

    pub fn relationships(&self) -> &RelationshipTable {
        &self.relationships
    }

    /// Indices of the objects lying in `direction` from object `index`.
    pub fn related(&self, direction: Direction, index: usize) -> &[usize] {
        self.relationships.related(direction, index)
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    pub fn image_index(&self) -> u64 {
        self.image_index
    }

    pub fn image_filename(&self) -> &str {
        &self.image_filename
    }

    /// Indices of every object matching `filter`, in scene order.
    pub fn find(&self, filter: &AttributeFilter) -> Vec<usize> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, object)| object.matches(filter))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count(&self, filter: &AttributeFilter) -> usize {
        self.objects.iter().filter(|o| o.matches(filter)).count()
    }

    /// The attribute values present in this scene.
    pub fn vocabulary(&self) -> SceneVocabulary {
        SceneVocabulary::from_objects(&self.objects)
    }

    pub fn describe(&self, index: usize) -> Option<String> {
        self.objects.get(index).map(Object::describe)
    }

    pub(crate) fn objects_mut(&mut self) -> &mut Vec<Object> {
        &mut self.objects
    }

    pub(crate) fn set_objects(&mut self, objects: Vec<Object>) {
        self.objects = objects;
    }

    pub(crate) fn set_directions(&mut self, directions: BTreeMap<Direction, Vec3>) {
        self.directions = directions;
    }

    pub(crate) fn set_relationships(&mut self, relationships: RelationshipTable) {
        self.relationships = relationships;
    }
}
