//! Per-pass resolution context: field values committed so far, in declaration order.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    Big,
    #[default]
    Little,
}

/// Values of the fields already parsed (or already emitted) in the current pass.
///
/// A context lives for exactly one parse or build call. Lookups are linear;
/// schemas are short and insertion order is what the pass needs.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    endianness: Endianness,
    values: Vec<(String, Value)>,
}

impl ResolutionContext {
    pub fn new(endianness: Endianness) -> Self {
        ResolutionContext { endianness, values: Vec::new() }
    }

    pub fn with_capacity(endianness: Endianness, capacity: usize) -> Self {
        ResolutionContext { endianness, values: Vec::with_capacity(capacity) }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Commit a field value. Re-committing a name replaces its value in place.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the context, returning values in commit order.
    pub fn into_values(self) -> Vec<Value> {
        self.values.into_iter().map(|(_, v)| v).collect()
    }
}
