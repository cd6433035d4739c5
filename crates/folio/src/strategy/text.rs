//! Exact substring replacement.

use super::{Applied, StrategyError, UpdateStrategy, splice};
use crate::request::{Locator, SourceHint, UpdateRequest};

/// Replaces one exact occurrence of a fragment.
///
/// A fragment occurring more than once is refused unless the request's
/// [`SourceHint`] narrows it to a single occurrence. The line hint keeps
/// only occurrences starting on that line; the occurrence ordinal then picks
/// among whatever remains.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextStrategy;

impl UpdateStrategy for TextStrategy {
    fn name(&self) -> &'static str {
        "text"
    }

    fn can_handle(&self, request: &UpdateRequest) -> bool {
        matches!(request.locator(), Locator::Text { .. })
    }

    fn priority(&self) -> i32 {
        10
    }

    fn apply(&self, original: &str, request: &UpdateRequest) -> Result<Applied, StrategyError> {
        let Locator::Text {
            old_text,
            new_text,
            hint,
        } = request.locator()
        else {
            return Err(StrategyError::invalid("text strategy needs a text locator"));
        };
        if old_text.is_empty() {
            return Err(StrategyError::invalid("text to replace is empty"));
        }

        let matches: Vec<usize> = original
            .char_indices()
            .map(|(offset, _)| offset)
            .filter(|&offset| {
                original
                    .get(offset..)
                    .is_some_and(|rest| rest.starts_with(old_text.as_str()))
            })
            .collect();
        let start = choose(original, &matches, *hint, old_text)?;
        let end = start + old_text.len();

        Ok(Applied {
            content: splice(original, start..end, new_text),
            old_fragment: old_text.clone(),
        })
    }
}

fn choose(
    original: &str,
    matches: &[usize],
    hint: SourceHint,
    old_text: &str,
) -> Result<usize, StrategyError> {
    let what = || format!("text {old_text:?}");
    match matches {
        [] => return Err(StrategyError::not_found(what())),
        [only] => return Ok(*only),
        _ => {}
    }
    if hint.is_empty() {
        return Err(StrategyError::ambiguous(what(), matches.len()));
    }

    let on_line: Vec<usize> = match hint.line {
        Some(line) => matches
            .iter()
            .copied()
            .filter(|offset| line_of(original, *offset) == line)
            .collect(),
        None => matches.to_vec(),
    };

    match hint.occurrence {
        Some(occurrence) => occurrence
            .checked_sub(1)
            .and_then(|index| on_line.get(index).copied())
            .ok_or_else(|| {
                StrategyError::not_found(format!("occurrence {occurrence} of {}", what()))
            }),
        None => match on_line.as_slice() {
            [] => Err(StrategyError::not_found(format!(
                "{} on line {}",
                what(),
                hint.line.unwrap_or_default()
            ))),
            [only] => Ok(*only),
            several => Err(StrategyError::ambiguous(what(), several.len())),
        },
    }
}

fn line_of(content: &str, offset: usize) -> u32 {
    let preceding = content.get(..offset).unwrap_or(content);
    let breaks = preceding.bytes().filter(|byte| *byte == b'\n').count();
    u32::try_from(breaks).map_or(u32::MAX, |count| count.saturating_add(1))
}
