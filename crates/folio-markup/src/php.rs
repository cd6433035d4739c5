//! Balance scanner for PHP translation array files.
//!
//! Translation files are plain `return [ 'key' => 'value', … ];` arrays. A
//! full PHP parser is out of reach, so the scanner checks the properties an
//! edit can break: bracket and parenthesis balance, string termination and
//! comment termination.

use crate::position::Cursor;
use crate::structure::StructuralIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Scans `content` and reports every imbalance found.
pub(crate) fn check(content: &str) -> Vec<StructuralIssue> {
    let mut issues = Vec::new();
    let mut open: Vec<(char, Cursor)> = Vec::new();
    let mut state = State::Code;
    let mut state_started = Cursor::start();
    let mut cursor = Cursor::start();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        let here = cursor;
        cursor.advance(ch);
        match state {
            State::Code => match ch {
                '\'' => (state, state_started) = (State::SingleQuoted, here),
                '"' => (state, state_started) = (State::DoubleQuoted, here),
                '#' => state = State::LineComment,
                '/' if chars.peek() == Some(&'/') => state = State::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    if let Some(star) = chars.next() {
                        cursor.advance(star);
                    }
                    (state, state_started) = (State::BlockComment, here);
                }
                '(' | '[' | '{' => open.push((ch, here)),
                ')' | ']' | '}' => close_bracket(ch, here, &mut open, &mut issues),
                _ => {}
            },
            State::SingleQuoted | State::DoubleQuoted => {
                let quote = if state == State::SingleQuoted { '\'' } else { '"' };
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        cursor.advance(escaped);
                    }
                } else if ch == quote {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if ch == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    if let Some(slash) = chars.next() {
                        cursor.advance(slash);
                    }
                    state = State::Code;
                }
            }
        }
    }

    match state {
        State::SingleQuoted | State::DoubleQuoted => {
            issues.push(StructuralIssue::at(
                state_started.line(),
                state_started.column(),
                "unterminated string literal",
            ));
        }
        State::BlockComment => issues.push(StructuralIssue::at(
            state_started.line(),
            state_started.column(),
            "unterminated block comment",
        )),
        State::Code | State::LineComment => {}
    }
    for (bracket, position) in open {
        issues.push(StructuralIssue::at(
            position.line(),
            position.column(),
            format!("unclosed '{bracket}'"),
        ));
    }
    issues
}

fn close_bracket(
    ch: char,
    here: Cursor,
    open: &mut Vec<(char, Cursor)>,
    issues: &mut Vec<StructuralIssue>,
) {
    let expected = match ch {
        ')' => '(',
        ']' => '[',
        _ => '{',
    };
    match open.last() {
        Some(&(top, _)) if top == expected => {
            open.pop();
        }
        Some(&(top, _)) => issues.push(StructuralIssue::at(
            here.line(),
            here.column(),
            format!("'{ch}' does not close '{top}'"),
        )),
        None => issues.push(StructuralIssue::at(
            here.line(),
            here.column(),
            format!("unexpected '{ch}'"),
        )),
    }
}
