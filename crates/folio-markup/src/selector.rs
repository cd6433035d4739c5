//! CSS-like selectors over a [`MarkupDocument`].
//!
//! The supported subset covers what content editors address in templates:
//! type selectors, the universal selector `*`, `#id`, `.class`, `[attr]` and
//! `[attr=value]` (quoted or bare), joined by descendant (whitespace) and
//! child (`>`) combinators. Selector lists, pseudo-classes and sibling
//! combinators are rejected at compile time.
//!
//! Matching runs right to left: the last compound is tested against the
//! candidate, then each combinator walks up the parent chain.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::document::{Element, MarkupDocument};
use crate::error::MarkupError;

/// How a compound relates to the compound before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeTest {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if self
            .tag
            .as_deref()
            .is_some_and(|tag| !element.tag_name().eq_ignore_ascii_case(tag))
        {
            return false;
        }
        if self
            .id
            .as_deref()
            .is_some_and(|id| element.attribute("id").map(|a| a.value_text()) != Some(id))
        {
            return false;
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        self.attributes.iter().all(|test| {
            element
                .attribute(&test.name)
                .is_some_and(|attribute| match test.value.as_deref() {
                    Some(expected) => attribute.value_text() == expected,
                    None => true,
                })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    combinator: Combinator,
    compound: Compound,
}

/// A compiled selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    steps: Vec<Step>,
}

impl Selector {
    /// Compiles selector text.
    ///
    /// # Errors
    ///
    /// Returns [`MarkupError::InvalidSelector`] for empty input or syntax
    /// outside the supported subset.
    pub fn compile(input: &str) -> Result<Self, MarkupError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MarkupError::invalid_selector(input, "selector is empty"));
        }
        let steps = SelectorParser::new(trimmed).parse()?;
        Ok(Self {
            source: trimmed.to_owned(),
            steps,
        })
    }

    /// The selector text as compiled.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Tests whether the element at `index` in `document` matches.
    #[must_use]
    pub fn matches(&self, document: &MarkupDocument, index: usize) -> bool {
        self.steps
            .len()
            .checked_sub(1)
            .is_some_and(|last| self.matches_step(document, index, last))
    }

    fn matches_step(&self, document: &MarkupDocument, index: usize, step: usize) -> bool {
        let (Some(element), Some(current)) = (document.get(index), self.steps.get(step)) else {
            return false;
        };
        if !current.compound.matches(element) {
            return false;
        }
        let Some(previous) = step.checked_sub(1) else {
            return true;
        };
        match current.combinator {
            Combinator::Child => element
                .parent_index()
                .is_some_and(|parent| self.matches_step(document, parent, previous)),
            Combinator::Descendant => {
                let mut ancestor = element.parent_index();
                while let Some(candidate) = ancestor {
                    if self.matches_step(document, candidate, previous) {
                        return true;
                    }
                    ancestor = document.get(candidate).and_then(Element::parent_index);
                }
                false
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct SelectorParser<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> SelectorParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn error(&self, message: impl Into<String>) -> MarkupError {
        MarkupError::invalid_selector(self.source, message)
    }

    fn parse(mut self) -> Result<Vec<Step>, MarkupError> {
        let mut steps = vec![Step {
            combinator: Combinator::Descendant,
            compound: self.compound()?,
        }];
        loop {
            let saw_space = self.skip_whitespace();
            let combinator = match self.chars.peek().map(|&(_, ch)| ch) {
                None => break,
                Some('>') => {
                    self.chars.next();
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(_) if saw_space => Combinator::Descendant,
                Some(ch) => return Err(self.error(format!("unsupported character '{ch}'"))),
            };
            steps.push(Step {
                combinator,
                compound: self.compound()?,
            });
        }
        Ok(steps)
    }

    fn compound(&mut self) -> Result<Compound, MarkupError> {
        let mut compound = Compound::default();
        let mut consumed = false;
        match self.chars.peek().map(|&(_, ch)| ch) {
            Some('*') => {
                self.chars.next();
                consumed = true;
            }
            Some(ch) if is_ident_char(ch) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
                consumed = true;
            }
            _ => {}
        }
        while let Some(&(_, ch)) = self.chars.peek() {
            match ch {
                '#' => {
                    self.chars.next();
                    compound.id = Some(self.ident()?);
                }
                '.' => {
                    self.chars.next();
                    compound.classes.push(self.ident()?);
                }
                '[' => {
                    self.chars.next();
                    compound.attributes.push(self.attribute_test()?);
                }
                _ => break,
            }
            consumed = true;
        }
        if consumed {
            Ok(compound)
        } else {
            let found = self
                .chars
                .peek()
                .map_or_else(|| "end of input".to_owned(), |&(_, ch)| format!("'{ch}'"));
            Err(self.error(format!("expected a type, '*', '#', '.' or '[' but found {found}")))
        }
    }

    fn ident(&mut self) -> Result<String, MarkupError> {
        let mut ident = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if !is_ident_char(ch) {
                break;
            }
            ident.push(ch);
            self.chars.next();
        }
        if ident.is_empty() {
            Err(self.error("expected a name"))
        } else {
            Ok(ident)
        }
    }

    fn attribute_test(&mut self) -> Result<AttributeTest, MarkupError> {
        self.skip_whitespace();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        let value = if self.chars.next_if(|&(_, ch)| ch == '=').is_some() {
            self.skip_whitespace();
            let value = match self.chars.peek().map(|&(_, ch)| ch) {
                Some(quote @ ('"' | '\'')) => {
                    self.chars.next();
                    self.quoted(quote)?
                }
                _ => self.ident()?,
            };
            self.skip_whitespace();
            Some(value)
        } else {
            None
        };
        if self.chars.next_if(|&(_, ch)| ch == ']').is_none() {
            return Err(self.error("expected ']' to close the attribute test"));
        }
        Ok(AttributeTest { name, value })
    }

    fn quoted(&mut self, quote: char) -> Result<String, MarkupError> {
        let mut value = String::new();
        for (_, ch) in self.chars.by_ref() {
            if ch == quote {
                return Ok(value);
            }
            value.push(ch);
        }
        Err(self.error("unterminated quoted value"))
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.chars.next_if(|&(_, ch)| ch.is_whitespace()).is_some() {
            skipped = true;
        }
        skipped
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PAGE: &str = concat!(
        "<main id=\"content\">",
        "<section class=\"hero dark\"><h1>Welcome</h1><p>Intro</p></section>",
        "<article><div><h1 data-key=\"headline\">News</h1></div></article>",
        "</main>"
    );

    fn tags_for(selector: &str) -> Vec<String> {
        let document = MarkupDocument::parse(PAGE).expect("parse");
        let compiled = Selector::compile(selector).expect("compile");
        document
            .select(&compiled)
            .into_iter()
            .map(|element| element.tag_name().to_owned())
            .collect()
    }

    #[rstest]
    #[case("h1", 2)]
    #[case("section > h1", 1)]
    #[case("main h1", 2)]
    #[case("main > h1", 0)]
    #[case(".hero", 1)]
    #[case("section.hero.dark p", 1)]
    #[case("#content", 1)]
    #[case("[data-key]", 1)]
    #[case("h1[data-key=\"headline\"]", 1)]
    #[case("h1[data-key=other]", 0)]
    #[case("article * h1", 1)]
    #[case("*", 7)]
    fn selects_expected_elements(#[case] selector: &str, #[case] count: usize) {
        assert_eq!(tags_for(selector).len(), count, "selector {selector}");
    }

    #[rstest]
    #[case("")]
    #[case("h1, h2")]
    #[case("a:hover")]
    #[case("h1 + p")]
    #[case("[data-key")]
    #[case("[title=\"open]")]
    #[case("div >")]
    fn rejects_unsupported_syntax(#[case] selector: &str) {
        let error = Selector::compile(selector).expect_err("should reject");
        assert!(matches!(error, MarkupError::InvalidSelector { .. }));
    }

    #[test]
    fn type_selectors_are_case_insensitive() {
        assert_eq!(tags_for("SECTION > H1"), ["h1"]);
    }

    #[test]
    fn displays_trimmed_source() {
        let selector = Selector::compile("  main  > h1 ").expect("compile");
        assert_eq!(selector.to_string(), "main  > h1");
    }
}
