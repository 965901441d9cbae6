//! Scenequest scene core
//!
//! A rendered scene arrives as a structured description (objects with
//! categorical attributes and 3D positions, a six-direction frame, and the
//! directional relationship table computed from both). This crate owns:
//!
//! - `model`: the typed [`Scene`] and [`Object`] values plus the exact
//!   description round trip,
//! - `relationships`: the projection rule that derives the relationship table,
//! - `transform`: the pure scene edits (delete, attribute change, viewpoint
//!   change, move, rotate, scale, mirror, swaps),
//! - `vocabulary`: the closed attribute vocabularies and engine configuration.
//!
//! Every edit takes `&Scene` and returns a new `Scene`; nothing here mutates a
//! scene that a caller can still observe.

pub mod error;
pub mod model;
pub mod relationships;
pub mod transform;
pub mod vocabulary;

pub use error::SceneError;
pub use model::{Attribute, AttributeFilter, Direction, Object, Scene, Vec3};
pub use relationships::{compute_relationships, RelationshipTable, DEFAULT_EPSILON};
pub use transform::{IndexRemap, MirrorAxis, Selector, Transformation, Transformer, Viewpoint};
pub use vocabulary::{EngineConfig, SceneVocabulary, Vocabulary};
