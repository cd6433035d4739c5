//! Selector-addressed replacement of inner content and attribute values.

use folio_markup::{Element, MarkupDocument, Selector};

use super::{Applied, StrategyError, UpdateStrategy, splice};
use crate::request::{Locator, UpdateRequest};

/// Locates exactly one element with a CSS-like selector and replaces either
/// its inner content or one of its attributes.
///
/// Only the byte range of the replaced part changes; everything else in the
/// file is carried over as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectorStrategy;

impl UpdateStrategy for SelectorStrategy {
    fn name(&self) -> &'static str {
        "selector"
    }

    fn can_handle(&self, request: &UpdateRequest) -> bool {
        matches!(
            request.locator(),
            Locator::Selector { .. } | Locator::Attribute { .. }
        )
    }

    fn priority(&self) -> i32 {
        30
    }

    fn apply(&self, original: &str, request: &UpdateRequest) -> Result<Applied, StrategyError> {
        match request.locator() {
            Locator::Selector {
                selector,
                new_value,
            } => {
                let document = MarkupDocument::parse(original)?;
                let element = single(&document, selector)?;
                let range = element
                    .content_range()
                    .ok_or_else(|| StrategyError::NoInnerContent {
                        selector: selector.clone(),
                        tag: element.tag_name().to_owned(),
                    })?;
                Ok(Applied {
                    old_fragment: original.get(range.clone()).unwrap_or_default().to_owned(),
                    content: splice(original, range, new_value),
                })
            }
            Locator::Attribute {
                selector,
                attribute,
                new_value,
            } => {
                if !is_attribute_name(attribute) {
                    return Err(StrategyError::invalid(format!(
                        "`{attribute}` is not a valid attribute name"
                    )));
                }
                let document = MarkupDocument::parse(original)?;
                let element = single(&document, selector)?;
                Ok(replace_attribute(original, element, attribute, new_value))
            }
            other => Err(StrategyError::Unsupported {
                kind: other.kind().to_string(),
            }),
        }
    }
}

fn single<'d>(document: &'d MarkupDocument, selector: &str) -> Result<&'d Element, StrategyError> {
    let compiled = Selector::compile(selector)?;
    let what = || format!("selector `{selector}`");
    let matches = document.select(&compiled);
    match matches.as_slice() {
        [] => Err(StrategyError::not_found(what())),
        [element] => Ok(*element),
        several => Err(StrategyError::ambiguous(what(), several.len())),
    }
}

fn replace_attribute(original: &str, element: &Element, name: &str, new_value: &str) -> Applied {
    let Some(existing) = element.attribute(name) else {
        let point = element.attribute_insertion_point();
        let insertion = format!(" {name}=\"{}\"", escape(new_value, '"'));
        return Applied {
            content: splice(original, point..point, &insertion),
            old_fragment: String::new(),
        };
    };

    let old_fragment = existing.value_text().to_owned();
    let quoted = existing
        .value()
        .and_then(|value| Some((value.range(), value.quote()?)));
    let content = match quoted {
        Some((range, quote)) => splice(original, range, &escape(new_value, quote)),
        None => {
            let rewritten = format!("{}=\"{}\"", existing.name(), escape(new_value, '"'));
            splice(original, existing.range(), &rewritten)
        }
    };
    Applied {
        content,
        old_fragment,
    }
}

fn escape(value: &str, quote: char) -> String {
    match quote {
        '\'' => value.replace('\'', "&#39;"),
        _ => value.replace('"', "&quot;"),
    }
}

fn is_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '=' | '<'))
}
