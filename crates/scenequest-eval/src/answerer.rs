//! Free-text question answering over one registry.

use serde::{Deserialize, Serialize};

use scenequest_scene::{EngineConfig, Scene};
use scenequest_templates::{PlaceholderLexicon, TemplateMatcher, TemplateRegistry};

use crate::bind::Bindings;
use crate::error::EvalError;
use crate::evaluator::{Answer, QueryEvaluator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub template_id: String,
    pub bindings: Bindings,
    pub answer: Answer,
}

/// Matches questions against a registry and evaluates them.
///
/// The matcher is compiled per call because the placeholder lexicon depends
/// on the attribute values present in the scene being asked about.
#[derive(Debug, Clone)]
pub struct QuestionAnswerer<'r> {
    registry: &'r TemplateRegistry,
    evaluator: QueryEvaluator,
}

impl<'r> QuestionAnswerer<'r> {
    pub fn new(registry: &'r TemplateRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            evaluator: QueryEvaluator::new(config),
        }
    }

    pub fn evaluator(&self) -> &QueryEvaluator {
        &self.evaluator
    }

    pub fn answer(&self, scene: &Scene, question: &str) -> Result<AnsweredQuestion, EvalError> {
        let lexicon = PlaceholderLexicon::for_scene(self.evaluator.config(), scene);
        let matcher = TemplateMatcher::new(self.registry, &lexicon)?;
        let parsed = matcher.parse(question)?;
        let answer = self.evaluator.evaluate(scene, parsed.template, &parsed.bindings)?;
        tracing::info!(
            template_id = parsed.template.template_id(),
            answer = %answer,
            "answered question"
        );
        Ok(AnsweredQuestion {
            template_id: parsed.template.template_id().to_string(),
            bindings: parsed.bindings,
            answer,
        })
    }
}
