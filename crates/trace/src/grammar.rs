//! The structural grammar of execution traces.
//!
//! Every element maps to one symbol (`C` content, `F` frame, `P` port,
//! `#` array index) and the symbol string of a legal trace must belong to
//!
//! ```text
//! C?(FC)*(F(P#*)?)?|P#*|#+
//! ```
//!
//! [`validate`] checks membership with a single scan of the automaton below.

use crate::element::Element;
use crate::TraceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Symbol {
    Content,
    Frame,
    Port,
    ArrayIndex,
}

impl Symbol {
    fn as_char(self) -> char {
        match self {
            Symbol::Content => 'C',
            Symbol::Frame => 'F',
            Symbol::Port => 'P',
            Symbol::ArrayIndex => '#',
        }
    }
}

/// Automaton states. All of them are accepting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    AfterContent,
    AfterFrame,
    Reference,
    BareIndices,
}

impl State {
    fn step(self, symbol: Symbol) -> Option<State> {
        use Symbol::*;
        match (self, symbol) {
            (State::Start, Content) => Some(State::AfterContent),
            (State::Start, Frame) => Some(State::AfterFrame),
            (State::Start, Port) => Some(State::Reference),
            (State::Start, ArrayIndex) => Some(State::BareIndices),
            (State::AfterContent, Frame) => Some(State::AfterFrame),
            (State::AfterFrame, Content) => Some(State::AfterContent),
            (State::AfterFrame, Port) => Some(State::Reference),
            (State::Reference, ArrayIndex) => Some(State::Reference),
            (State::BareIndices, ArrayIndex) => Some(State::BareIndices),
            _ => None,
        }
    }
}

/// The symbol string of an element sequence, e.g. `"FCFP#"`.
pub fn signature(elements: &[Element]) -> String {
    elements
        .iter()
        .map(|e| e.element_type().symbol().as_char())
        .collect()
}

/// Returns whether `elements` is a legal execution trace.
pub fn is_valid(elements: &[Element]) -> bool {
    elements
        .iter()
        .try_fold(State::Start, |state, e| state.step(e.element_type().symbol()))
        .is_some()
}

/// Like [`is_valid`], failing with [`TraceError::Illegal`].
pub fn validate(elements: &[Element]) -> Result<(), TraceError> {
    if is_valid(elements) {
        Ok(())
    } else {
        Err(TraceError::Illegal {
            signature: signature(elements),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Index, Name};

    fn from_signature(sig: &str) -> Vec<Element> {
        sig.chars()
            .map(|c| match c {
                'C' => Element::Content,
                'F' => Element::Module(Name::new("m").unwrap()),
                'P' => Element::InPort(Name::new("p").unwrap()),
                '#' => Element::ArrayIndex(Index::new(0)),
                other => panic!("unknown symbol {other}"),
            })
            .collect()
    }

    #[test]
    fn accepts_every_documented_shape() {
        for sig in [
            "", "C", "F", "FC", "CF", "CFC", "FCF", "FP", "FP#", "FP##", "CFCFP#", "P", "P##",
            "#", "###",
        ] {
            assert!(is_valid(&from_signature(sig)), "expected '{sig}' to be valid");
        }
    }

    #[test]
    fn rejects_illegal_shapes() {
        for sig in ["FF", "CC", "PF", "P#F", "#P", "CP", "FPP", "F#", "#C", "FCP", "PC"] {
            assert!(!is_valid(&from_signature(sig)), "expected '{sig}' to be invalid");
        }
    }

    #[test]
    fn illegal_error_carries_signature() {
        let err = validate(&from_signature("FF")).unwrap_err();
        assert_eq!(err, TraceError::Illegal { signature: "FF".into() });
    }
}
