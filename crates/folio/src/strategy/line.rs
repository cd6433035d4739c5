//! Whole-line replacement.

use super::{Applied, StrategyError, UpdateStrategy, splice};
use crate::request::{Locator, UpdateRequest};

/// Replaces the content of a one-based line, keeping its terminator.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineStrategy;

impl UpdateStrategy for LineStrategy {
    fn name(&self) -> &'static str {
        "line"
    }

    fn can_handle(&self, request: &UpdateRequest) -> bool {
        matches!(request.locator(), Locator::Line { .. })
    }

    fn priority(&self) -> i32 {
        20
    }

    fn apply(&self, original: &str, request: &UpdateRequest) -> Result<Applied, StrategyError> {
        let Locator::Line {
            line_number,
            new_line,
        } = request.locator()
        else {
            return Err(StrategyError::invalid("line strategy needs a line locator"));
        };
        if new_line.contains(['\n', '\r']) {
            return Err(StrategyError::invalid("replacement line contains a line break"));
        }

        let line_count = original.split_inclusive('\n').count();
        let out_of_range = || StrategyError::LineOutOfRange {
            line: *line_number,
            line_count,
        };
        let index = line_number.checked_sub(1).ok_or_else(out_of_range)?;

        let mut start = 0;
        for (current, line) in original.split_inclusive('\n').enumerate() {
            if current == index {
                let body = line
                    .strip_suffix("\r\n")
                    .or_else(|| line.strip_suffix('\n'))
                    .unwrap_or(line);
                let end = start + body.len();
                return Ok(Applied {
                    content: splice(original, start..end, new_line),
                    old_fragment: body.to_owned(),
                });
            }
            start += line.len();
        }
        Err(out_of_range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn apply(original: &str, line: usize, new_line: &str) -> Result<Applied, StrategyError> {
        LineStrategy.apply(
            original,
            &UpdateRequest::new("page.html", Locator::line(line, new_line)),
        )
    }

    fn ten_lines() -> String {
        (1..=10).map(|n| format!("line {n}\n")).collect()
    }

    #[test]
    fn replaces_line_eight_of_ten() {
        let original = ten_lines();
        let applied = apply(&original, 8, "<p>Updated</p>").expect("apply");

        let lines: Vec<&str> = applied.content.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines.get(7), Some(&"<p>Updated</p>"));
        assert_eq!(applied.old_fragment, "line 8");
        for (index, line) in lines.iter().enumerate().filter(|(i, _)| *i != 7) {
            assert_eq!(*line, format!("line {}", index + 1));
        }
    }

    #[test]
    fn keeps_crlf_terminators() {
        let applied = apply("a\r\nb\r\nc", 2, "B").expect("apply");
        assert_eq!(applied.content, "a\r\nB\r\nc");
    }

    #[test]
    fn last_line_without_terminator() {
        let applied = apply("a\nb", 2, "B").expect("apply");
        assert_eq!(applied.content, "a\nB");
    }

    #[rstest]
    #[case::zero(0)]
    #[case::past_end(11)]
    fn out_of_range_lines_are_rejected(#[case] line: usize) {
        let error = apply(&ten_lines(), line, "x").expect_err("out of range");
        assert_eq!(
            error,
            StrategyError::LineOutOfRange {
                line,
                line_count: 10
            }
        );
    }

    #[test]
    fn embedded_line_breaks_are_rejected() {
        let error = apply("a\nb", 1, "x\ny").expect_err("invalid");
        assert!(matches!(error, StrategyError::InvalidLocator { .. }));
    }
}
