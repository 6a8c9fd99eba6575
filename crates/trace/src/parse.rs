//! Parsing of the canonical string form.
//!
//! ```text
//! trace        := frame-seq reference?
//! frame-seq    := content? (frame content)* frame?
//! frame        := name | index
//! reference    := (":in:" | ":out:") name array-index*
//! array-index  := ":" digits
//! content      := "/"
//! ```
//!
//! Tokenizing is context free; the structural rules are left to the grammar
//! automaton, which sees the whole element sequence at once.

use std::str::FromStr;

use crate::element::Element;
use crate::key::{is_identifier_part, is_identifier_start, Index, Name};
use crate::trace::ExecutionTrace;
use crate::TraceError;

impl ExecutionTrace {
    /// Parse a trace from its canonical string form.
    ///
    /// Every failure is reported as [`TraceError::Parse`] carrying `input`
    /// and the underlying cause.
    pub fn parse(input: &str) -> Result<Self, TraceError> {
        tokenize(input)
            .and_then(Self::from_elements)
            .map_err(|source| TraceError::Parse {
                input: input.to_owned(),
                source: Box::new(source),
            })
    }
}

impl FromStr for ExecutionTrace {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn tokenize(input: &str) -> Result<Vec<Element>, TraceError> {
    let mut elements = Vec::new();
    let mut offset = 0;

    while offset < input.len() {
        let rest = &input[offset..];
        let (element, consumed) = if rest.starts_with('/') {
            (Element::Content, 1)
        } else if let Some(tail) = rest.strip_prefix(":in:") {
            let name = take_name(tail, offset, ":in:")?;
            let len = 4 + name.as_str().len();
            (Element::InPort(name), len)
        } else if let Some(tail) = rest.strip_prefix(":out:") {
            let name = take_name(tail, offset, ":out:")?;
            let len = 5 + name.as_str().len();
            (Element::OutPort(name), len)
        } else if let Some(tail) = rest.strip_prefix(':') {
            let digits = take_while(tail, |c| c.is_ascii_digit());
            if digits.is_empty() {
                return Err(syntax_error(rest, offset, 1));
            }
            (Element::ArrayIndex(Index::from_str(digits)?), 1 + digits.len())
        } else if rest.starts_with(|c: char| c.is_ascii_digit()) {
            let digits = take_while(rest, |c| c.is_ascii_digit());
            (Element::Iteration(Index::from_str(digits)?), digits.len())
        } else if rest.starts_with(is_identifier_start) {
            let ident = take_while(rest, is_identifier_part);
            (Element::Module(Name::new(ident)?), ident.len())
        } else {
            return Err(syntax_error(rest, offset, 0));
        };

        elements.push(element);
        offset += consumed;
    }

    Ok(elements)
}

/// The longest ASCII prefix of `s` whose characters satisfy `pred`.
fn take_while(s: &str, pred: impl Fn(char) -> bool) -> &str {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    &s[..end]
}

fn take_name(tail: &str, offset: usize, marker: &str) -> Result<Name, TraceError> {
    if !tail.starts_with(is_identifier_start) {
        let bad = tail.chars().next().map(String::from).unwrap_or_default();
        return Err(TraceError::Syntax {
            fragment: format!("{marker}{bad}"),
            offset,
        });
    }
    Name::new(take_while(tail, is_identifier_part))
}

/// Syntax error for the token starting at `offset`: the first `prefix` bytes
/// plus the next character.
fn syntax_error(rest: &str, offset: usize, prefix: usize) -> TraceError {
    let next = rest[prefix..].chars().next().map(String::from).unwrap_or_default();
    TraceError::Syntax {
        fragment: format!("{}{}", &rest[..prefix], next),
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cause(input: &str) -> TraceError {
        match ExecutionTrace::parse(input) {
            Err(TraceError::Parse { input: wrapped, source }) => {
                assert_eq!(wrapped, input);
                *source
            }
            other => panic!("expected parse error for '{input}', got {other:?}"),
        }
    }

    #[test]
    fn parses_every_element_kind() {
        let t = ExecutionTrace::parse("/outer/7/inner:out:list:3").unwrap();
        assert_eq!(
            t.elements(),
            &[
                Element::Content,
                Element::Module(Name::new("outer").unwrap()),
                Element::Content,
                Element::Iteration(Index::new(7)),
                Element::Content,
                Element::Module(Name::new("inner").unwrap()),
                Element::OutPort(Name::new("list").unwrap()),
                Element::ArrayIndex(Index::new(3)),
            ]
        );
    }

    #[test]
    fn empty_string_is_the_empty_trace() {
        assert!(ExecutionTrace::parse("").unwrap().is_empty());
    }

    #[test]
    fn bare_reference_and_bare_indices_parse() {
        assert_eq!(ExecutionTrace::parse(":in:x:0").unwrap().len(), 2);
        assert_eq!(ExecutionTrace::parse(":1:2:3").unwrap().len(), 3);
    }

    #[test]
    fn port_followed_by_frame_is_rejected() {
        assert_eq!(
            cause(":in:a/b"),
            TraceError::Illegal { signature: "PCF".into() }
        );
    }

    #[test]
    fn adjacent_frames_are_rejected() {
        assert!(matches!(cause("3abc"), TraceError::Illegal { .. }));
        assert!(matches!(cause("a//b"), TraceError::Illegal { .. }));
    }

    #[test]
    fn syntax_errors_carry_the_offending_fragment() {
        assert_eq!(
            cause("a:in:9"),
            TraceError::Syntax { fragment: ":in:9".into(), offset: 1 }
        );
        assert_eq!(
            cause("a:out:"),
            TraceError::Syntax { fragment: ":out:".into(), offset: 1 }
        );
        assert_eq!(
            cause("a:in:x:"),
            TraceError::Syntax { fragment: ":".into(), offset: 6 }
        );
        assert_eq!(
            cause("a-b"),
            TraceError::Syntax { fragment: "-".into(), offset: 1 }
        );
        assert_eq!(cause("loop/01"), TraceError::InvalidIndex("01".into()));
    }

    #[test]
    fn error_message_names_the_input() {
        let err = ExecutionTrace::parse(":in:a/b").unwrap_err();
        assert!(err.to_string().contains("':in:a/b'"));
    }

    #[test]
    fn from_str_delegates_to_parse() {
        let t: ExecutionTrace = "loop/3:out:last".parse().unwrap();
        assert_eq!(t.to_string(), "loop/3:out:last");
    }
}
