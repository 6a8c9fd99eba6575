//! The `ExecutionTrace` value type.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::element::{Element, ElementType};
use crate::grammar;
use crate::key::{Index, Key, Name};
use crate::TraceError;

/// An immutable, grammar-checked sequence of [`Element`]s.
///
/// A trace splits into two regions:
/// - the **frames**: the leading content/module/iteration elements, i.e. the
///   call-stack path;
/// - the **reference**: everything from the first port element on (the port
///   and trailing array indices), i.e. which value at which position.
///
/// Ordering is lexicographic over elements, so a trace always sorts before
/// every strict extension of itself.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ExecutionTrace {
    elements: Vec<Element>,
}

impl ExecutionTrace {
    /// The empty trace.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a trace from raw elements, validating the grammar.
    pub fn from_elements(elements: Vec<Element>) -> Result<Self, TraceError> {
        grammar::validate(&elements)?;
        Ok(Self { elements })
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    // -----------------------------------------------------------------------
    // Queries on the last element
    // -----------------------------------------------------------------------

    fn last(&self, what: &'static str) -> Result<&Element, TraceError> {
        self.elements.last().ok_or(TraceError::Empty(what))
    }

    /// Type of the last element.
    pub fn element_type(&self) -> Result<ElementType, TraceError> {
        self.last("type").map(Element::element_type)
    }

    /// Key of the last element.
    pub fn key(&self) -> Result<Key, TraceError> {
        self.last("key").map(Element::key)
    }

    /// Name key of the last element.
    pub fn name(&self) -> Result<&Name, TraceError> {
        match self.last("name")? {
            Element::Module(name) | Element::InPort(name) | Element::OutPort(name) => Ok(name),
            _ => Err(TraceError::KeyMismatch {
                trace: self.to_string(),
                expected: "name",
            }),
        }
    }

    /// Index key of the last element.
    pub fn index(&self) -> Result<Index, TraceError> {
        match self.last("index")? {
            Element::Iteration(index) | Element::ArrayIndex(index) => Ok(*index),
            _ => Err(TraceError::KeyMismatch {
                trace: self.to_string(),
                expected: "index",
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    fn resolve_element(&self, element: Element) -> Result<Self, TraceError> {
        let mut elements = Vec::with_capacity(self.elements.len() + 1);
        elements.extend_from_slice(&self.elements);
        elements.push(element);
        Self::from_elements(elements)
    }

    pub fn resolve_content(&self) -> Result<Self, TraceError> {
        self.resolve_element(Element::Content)
    }

    pub fn resolve_module(&self, name: Name) -> Result<Self, TraceError> {
        self.resolve_element(Element::Module(name))
    }

    pub fn resolve_iteration(&self, index: Index) -> Result<Self, TraceError> {
        self.resolve_element(Element::Iteration(index))
    }

    pub fn resolve_in_port(&self, name: Name) -> Result<Self, TraceError> {
        self.resolve_element(Element::InPort(name))
    }

    pub fn resolve_out_port(&self, name: Name) -> Result<Self, TraceError> {
        self.resolve_element(Element::OutPort(name))
    }

    pub fn resolve_array_index(&self, index: Index) -> Result<Self, TraceError> {
        self.resolve_element(Element::ArrayIndex(index))
    }

    /// Append every element of `relative`.
    ///
    /// Equivalent to folding the matching `resolve_*` call over `relative`;
    /// the concatenation is validated once.
    pub fn resolve(&self, relative: &ExecutionTrace) -> Result<Self, TraceError> {
        if relative.is_empty() {
            return Ok(self.clone());
        }
        let mut elements = Vec::with_capacity(self.len() + relative.len());
        elements.extend_from_slice(&self.elements);
        elements.extend_from_slice(&relative.elements);
        Self::from_elements(elements)
    }

    // -----------------------------------------------------------------------
    // Decomposition
    // -----------------------------------------------------------------------

    fn frames_end(&self) -> usize {
        self.elements
            .iter()
            .position(|e| !e.is_frame())
            .unwrap_or(self.elements.len())
    }

    /// The longest prefix made of content, module and iteration elements.
    pub fn frames(&self) -> Self {
        Self {
            elements: self.elements[..self.frames_end()].to_vec(),
        }
    }

    /// The port-and-array-index suffix, or the empty trace if there is no port.
    pub fn reference(&self) -> Self {
        let end = self.frames_end();
        match self.elements.get(end) {
            Some(e) if e.is_port() => Self {
                elements: self.elements[end..].to_vec(),
            },
            _ => Self::empty(),
        }
    }

    pub fn has_empty_reference(&self) -> bool {
        !self.elements.iter().any(Element::is_port)
    }

    /// Half-open slice `[begin, end)`.
    pub fn subtrace(&self, begin: usize, end: usize) -> Result<Self, TraceError> {
        if end > self.len() {
            return Err(TraceError::OutOfBounds {
                index: end,
                len: self.len(),
            });
        }
        if begin > end {
            return Err(TraceError::InvalidRange { begin, end });
        }
        Self::from_elements(self.elements[begin..end].to_vec())
    }

    pub fn starts_with(&self, prefix: &ExecutionTrace) -> bool {
        self.elements.starts_with(&prefix.elements)
    }

    /// The remainder after `prefix`, if `self` starts with it and the
    /// remainder is itself a legal trace.
    pub fn strip_prefix(&self, prefix: &ExecutionTrace) -> Option<Self> {
        let rest = self.elements.strip_prefix(prefix.elements.as_slice())?;
        Self::from_elements(rest.to_vec()).ok()
    }
}

/// Canonical string form; the exact inverse of [`ExecutionTrace::parse`].
impl fmt::Display for ExecutionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            element.fmt(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ExecutionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionTrace({:?})", self.to_string())
    }
}

impl Serialize for ExecutionTrace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExecutionTrace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
