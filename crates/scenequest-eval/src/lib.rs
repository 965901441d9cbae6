//! Scenequest query evaluation
//!
//! Answers template questions about hypothetically edited scenes:
//!
//! - `descriptor`: resolving phrases like "the large red cube" to objects,
//! - `bind`: turning a question's edit clause into a scene transformation,
//! - `evaluator`: applying the edit and answering by question category,
//! - `answerer`: free text in, answer out, via the template matcher.
//!
//! Evaluation never mutates the input scene.

pub mod answerer;
pub mod bind;
pub mod descriptor;
pub mod error;
pub mod evaluator;

pub use answerer::{AnsweredQuestion, QuestionAnswerer};
pub use bind::{bind_transformation, relation_direction, Bindings, TransformationKind};
pub use descriptor::{Descriptor, DescriptorParser};
pub use error::EvalError;
pub use evaluator::{Answer, ObjectRef, QueryEvaluator, QuestionCategory};
