//! Messages flowing through a pipeline.
//!
//! A [`Message`] is an ordered sequence of [`Part`]s. A message with zero
//! parts is valid and is the natural "empty" value.

mod part;

pub use part::Part;

use serde::{Deserialize, Serialize};

/// An ordered sequence of message parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    parts: Vec<Part>,
}

impl Message {
    /// Creates a message with one part per raw payload.
    #[must_use]
    pub fn new<I, B>(payloads: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Self {
            parts: payloads.into_iter().map(Part::new).collect(),
        }
    }

    /// Creates a message with no parts.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a message from existing parts.
    #[must_use]
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// Returns the number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if the message has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns a part by index. Negative indexes count from the end.
    #[must_use]
    pub fn get(&self, index: isize) -> Option<&Part> {
        let len = isize::try_from(self.parts.len()).ok()?;
        let resolved = if index < 0 { len + index } else { index };
        usize::try_from(resolved)
            .ok()
            .and_then(|i| self.parts.get(i))
    }

    /// Returns a mutable part by index.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Part> {
        self.parts.get_mut(index)
    }

    /// Appends a part.
    pub fn push(&mut self, part: impl Into<Part>) {
        self.parts.push(part.into());
    }

    /// Iterates over the parts in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    /// Returns the raw content of every part.
    #[must_use]
    pub fn all_bytes(&self) -> Vec<&[u8]> {
        self.parts.iter().map(Part::get).collect()
    }

    /// Consumes the message and returns its parts.
    #[must_use]
    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }
}

impl FromIterator<Part> for Message {
    fn from_iter<T: IntoIterator<Item = Part>>(iter: T) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Message {
    type Item = Part;
    type IntoIter = std::vec::IntoIter<Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Part;
    type IntoIter = std::slice::Iter<'a, Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}
