//! Trace elements.

use std::fmt;

use crate::grammar::Symbol;
use crate::key::{Index, Key, Name};

/// The kind of an [`Element`], in ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementType {
    Content,
    Module,
    Iteration,
    InPort,
    OutPort,
    ArrayIndex,
}

impl ElementType {
    pub(crate) fn symbol(self) -> Symbol {
        match self {
            ElementType::Content => Symbol::Content,
            ElementType::Module | ElementType::Iteration => Symbol::Frame,
            ElementType::InPort | ElementType::OutPort => Symbol::Port,
            ElementType::ArrayIndex => Symbol::ArrayIndex,
        }
    }
}

/// One step of an execution trace.
///
/// The derived ordering compares the variant (i.e. the [`ElementType`]
/// ordinal) first and the payload second.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    /// Step into the content of the enclosing module.
    Content,
    /// A child module.
    Module(Name),
    /// A loop iteration.
    Iteration(Index),
    InPort(Name),
    OutPort(Name),
    /// A position within the value referenced by the preceding elements.
    ArrayIndex(Index),
}

impl Element {
    pub fn element_type(&self) -> ElementType {
        match self {
            Element::Content => ElementType::Content,
            Element::Module(_) => ElementType::Module,
            Element::Iteration(_) => ElementType::Iteration,
            Element::InPort(_) => ElementType::InPort,
            Element::OutPort(_) => ElementType::OutPort,
            Element::ArrayIndex(_) => ElementType::ArrayIndex,
        }
    }

    pub fn key(&self) -> Key {
        match self {
            Element::Content => Key::NoKey,
            Element::Module(name) | Element::InPort(name) | Element::OutPort(name) => {
                Key::Name(name.clone())
            }
            Element::Iteration(index) | Element::ArrayIndex(index) => Key::Index(*index),
        }
    }

    /// Content, module and iteration elements make up the frames of a trace.
    pub fn is_frame(&self) -> bool {
        matches!(
            self,
            Element::Content | Element::Module(_) | Element::Iteration(_)
        )
    }

    pub fn is_port(&self) -> bool {
        matches!(self, Element::InPort(_) | Element::OutPort(_))
    }
}

/// Canonical token of the element.
impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Content => f.write_str("/"),
            Element::Module(name) => write!(f, "{name}"),
            Element::Iteration(index) => write!(f, "{index}"),
            Element::InPort(name) => write!(f, ":in:{name}"),
            Element::OutPort(name) => write!(f, ":out:{name}"),
            Element::ArrayIndex(index) => write!(f, ":{index}"),
        }
    }
}
