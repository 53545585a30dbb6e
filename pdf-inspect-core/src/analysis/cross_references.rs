//! Cross references
//!
//! Index of every place an object number is mentioned: its own definition plus each
//! reference found while walking the value trees of the object list.

use crate::parser::{IndirectObject, ObjectId, PdfDictionary, PdfObject};
use std::collections::BTreeMap;
use std::fmt;

/// One mention of an object number.
///
/// `path` holds the child indices leading from the top-level object `from` to the
/// mentioning value. The definition itself has an empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CrossReference {
    pub from: ObjectId,
    pub path: Vec<usize>,
}

impl CrossReference {
    pub fn is_definition(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for CrossReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.from)?;
        for index in &self.path {
            write!(f, "/{index}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrossReferences {
    by_number: BTreeMap<i32, Vec<CrossReference>>,
}

impl CrossReferences {
    pub fn build<'a>(objects: impl IntoIterator<Item = &'a IndirectObject>) -> Self {
        let mut refs = Self::default();
        for object in objects {
            refs.add(object.id.number, object.id, Vec::new());
            let mut path = Vec::new();
            refs.walk(&object.value.object, object.id, &mut path);
        }
        refs
    }

    fn add(&mut self, number: i32, from: ObjectId, path: Vec<usize>) {
        self.by_number
            .entry(number)
            .or_default()
            .push(CrossReference { from, path });
    }

    fn walk(&mut self, value: &PdfObject, from: ObjectId, path: &mut Vec<usize>) {
        match value {
            PdfObject::Reference(target) => self.add(target.number, from, path.clone()),
            PdfObject::Array(array) => {
                for (index, item) in array.iter().enumerate() {
                    path.push(index);
                    self.walk(&item.object, from, path);
                    path.pop();
                }
            }
            PdfObject::Dictionary(dict) => self.walk_dictionary(dict, from, path),
            PdfObject::Stream(stream) => self.walk_dictionary(&stream.dict, from, path),
            _ => {}
        }
    }

    fn walk_dictionary(&mut self, dict: &PdfDictionary, from: ObjectId, path: &mut Vec<usize>) {
        for (index, (_, value)) in dict.iter().enumerate() {
            path.push(index);
            self.walk(&value.object, from, path);
            path.pop();
        }
    }

    /// Mentions of `number`, definitions first in object-list order
    pub fn get(&self, number: i32) -> &[CrossReference] {
        self.by_number.get(&number).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Objects referring to `number`, without its own definitions
    pub fn referrers(&self, number: i32) -> impl Iterator<Item = &CrossReference> {
        self.get(number).iter().filter(|r| !r.is_definition())
    }

    pub fn numbers(&self) -> impl Iterator<Item = i32> + '_ {
        self.by_number.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}
