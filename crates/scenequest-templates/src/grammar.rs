//! Placeholder grammar for question templates.
//!
//! A template is a run of literal text and `{name}` placeholders:
//!
//! ```text
//! template    := (literal | placeholder)*
//! placeholder := "{" name "}"
//! name        := alternative ("/" alternative)*
//! literal     := any text; "{{" and "}}" stand for single braces
//! ```
//!
//! A name with alternatives (`{color/shape/size}`) has the first alternative as
//! its canonical key. Templates are parsed once; rendering and pattern
//! compilation both walk the token list instead of rewriting substrings.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceholderName {
    raw: String,
    key: String,
}

impl PlaceholderName {
    fn new(raw: &str) -> Self {
        let key = raw.split('/').next().unwrap_or(raw).trim().to_string();
        Self {
            raw: raw.to_string(),
            key,
        }
    }

    /// The name as written between the braces.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Canonical binding key: the first `/`-separated alternative.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn alternatives(&self) -> impl Iterator<Item = &str> {
        self.raw.split('/').map(str::trim)
    }

    pub fn has_alternatives(&self) -> bool {
        self.raw.contains('/')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Placeholder(PlaceholderName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateGrammar {
    source: String,
    tokens: Vec<Token>,
}

impl TemplateGrammar {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::syntax(template, "unmatched `}`")),
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => {
                                return Err(TemplateError::syntax(template, "nested `{`"))
                            }
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(TemplateError::syntax(template, "unclosed `{`"))
                            }
                        }
                    }
                    if name.trim().is_empty() || name.split('/').any(|alt| alt.trim().is_empty()) {
                        return Err(TemplateError::syntax(template, "empty placeholder name"));
                    }
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Placeholder(PlaceholderName::new(name.trim())));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            tokens,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Placeholders in template order, repeats included.
    pub fn placeholders(&self) -> impl Iterator<Item = &PlaceholderName> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Placeholder(name) => Some(name),
            Token::Literal(_) => None,
        })
    }

    /// Distinct raw placeholder names, sorted.
    pub fn placeholder_names(&self) -> BTreeSet<&str> {
        self.placeholders().map(PlaceholderName::raw).collect()
    }

    /// Substitutes every placeholder by its raw name. `None` when a
    /// placeholder has no binding.
    pub fn render(&self, bindings: &BTreeMap<String, String>) -> Option<String> {
        let mut out = String::with_capacity(self.source.len());
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Placeholder(name) => out.push_str(bindings.get(name.raw())?),
            }
        }
        Some(out)
    }

    /// Number of leading tokens forming the edit clause: everything up to the
    /// first sentence break that is followed by more template text. Zero for
    /// single-sentence templates.
    fn edit_clause_len(&self) -> usize {
        for (i, token) in self.tokens.iter().enumerate() {
            if let Token::Literal(text) = token {
                let has_break = text
                    .find(". ")
                    .map(|at| at + 2 < text.len() || i + 1 < self.tokens.len())
                    .unwrap_or(false);
                if has_break {
                    return i;
                }
            }
        }
        0
    }

    /// Canonical keys of the placeholders describing the scene edit.
    pub fn edit_keys(&self) -> BTreeSet<&str> {
        self.clause_keys(0..self.edit_clause_len())
    }

    /// Canonical keys of the placeholders describing the question asked
    /// about the edited scene.
    pub fn question_keys(&self) -> BTreeSet<&str> {
        self.clause_keys(self.edit_clause_len()..self.tokens.len())
    }

    fn clause_keys(&self, range: std::ops::Range<usize>) -> BTreeSet<&str> {
        self.tokens[range]
            .iter()
            .filter_map(|token| match token {
                Token::Placeholder(name) => Some(name.key()),
                Token::Literal(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_and_placeholders() {
        let grammar = TemplateGrammar::parse("Delete all {color} objects. How many {shape}s?").unwrap();
        assert_eq!(
            grammar.tokens(),
            &[
                Token::Literal("Delete all ".to_string()),
                Token::Placeholder(PlaceholderName::new("color")),
                Token::Literal(" objects. How many ".to_string()),
                Token::Placeholder(PlaceholderName::new("shape")),
                Token::Literal("s?".to_string()),
            ]
        );
        assert_eq!(
            grammar.placeholder_names().into_iter().collect::<Vec<_>>(),
            vec!["color", "shape"]
        );
    }

    #[test]
    fn rejects_malformed_braces() {
        for bad in ["What {color", "What color}", "What {co{lor}}", "What {} is", "What {a/} is"] {
            assert!(
                matches!(TemplateGrammar::parse(bad), Err(TemplateError::TemplateSyntax { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn doubled_braces_are_literal() {
        let grammar = TemplateGrammar::parse("Set {{x}} to {value}").unwrap();
        let bindings = BTreeMap::from([("value".to_string(), "3".to_string())]);
        assert_eq!(grammar.render(&bindings).as_deref(), Some("Set {x} to 3"));
    }

    #[test]
    fn alternatives_resolve_to_first_name() {
        let grammar = TemplateGrammar::parse("Which {color/shape/size} is it?").unwrap();
        let name = grammar.placeholders().next().unwrap();
        assert_eq!(name.key(), "color");
        assert_eq!(name.raw(), "color/shape/size");
        assert!(name.has_alternatives());
        assert_eq!(name.alternatives().collect::<Vec<_>>(), vec!["color", "shape", "size"]);
    }

    #[test]
    fn render_requires_every_placeholder() {
        let grammar = TemplateGrammar::parse("{a} and {b}").unwrap();
        let partial = BTreeMap::from([("a".to_string(), "x".to_string())]);
        assert_eq!(grammar.render(&partial), None);
    }

    #[test]
    fn clauses_split_at_first_sentence_break() {
        let grammar = TemplateGrammar::parse(
            "Change all {color} objects to {new_color}. How many {color} objects remain?",
        )
        .unwrap();
        assert_eq!(
            grammar.edit_keys().into_iter().collect::<Vec<_>>(),
            vec!["color", "new_color"]
        );
        assert_eq!(grammar.question_keys().into_iter().collect::<Vec<_>>(), vec!["color"]);

        let single = TemplateGrammar::parse("If we delete all {delete_color} objects, how many remain?")
            .unwrap();
        assert!(single.edit_keys().is_empty());
        assert_eq!(single.question_keys().len(), 1);

        let rotate = TemplateGrammar::parse("Rotate by {angle} degrees {direction}. Which is {extreme_side}?")
            .unwrap();
        assert_eq!(
            rotate.edit_keys().into_iter().collect::<Vec<_>>(),
            vec!["angle", "direction"]
        );
    }
}
