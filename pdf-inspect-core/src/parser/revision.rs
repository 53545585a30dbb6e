//! Revisions
//!
//! One revision per `%%EOF`-terminated segment of the file. Within a revision an id is
//! unique; across revisions the later definition shadows the earlier one.

use super::encryption_handler::EncryptionState;
use super::objects::{IndirectObject, ObjectId, Span};
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Default)]
pub struct Revision {
    pub index: usize,
    objects: BTreeMap<ObjectId, IndirectObject>,
    /// First trailer found in this segment (`trailer` section or xref stream object)
    trailer: Option<ObjectId>,
    /// Value of the `startxref` pointer
    start_xref: Option<usize>,
    /// Classic `xref` tables, skipped by the scanner
    xref_sections: Vec<Span>,
    pub(crate) encryption: OnceLock<EncryptionState>,
}

impl Revision {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Add an object; a later definition of the same id replaces the earlier one
    pub fn insert(&mut self, object: IndirectObject) -> Option<IndirectObject> {
        self.objects.insert(object.id, object)
    }

    /// Add an object only if the id is not defined yet
    pub fn insert_if_absent(&mut self, object: IndirectObject) -> bool {
        match self.objects.entry(object.id) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(object);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&IndirectObject> {
        self.objects.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ObjectId) -> Option<&mut IndirectObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Objects ordered by id
    pub fn objects(&self) -> impl Iterator<Item = &IndirectObject> {
        self.objects.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.xref_sections.is_empty() && self.start_xref.is_none()
    }

    pub fn trailer(&self) -> Option<ObjectId> {
        self.trailer
    }

    /// Keep the first trailer of the segment
    pub fn set_trailer(&mut self, id: ObjectId) -> bool {
        if self.trailer.is_none() {
            self.trailer = Some(id);
            true
        } else {
            false
        }
    }

    pub fn start_xref(&self) -> Option<usize> {
        self.start_xref
    }

    pub fn set_start_xref(&mut self, offset: usize) {
        self.start_xref = Some(offset);
    }

    pub fn xref_sections(&self) -> &[Span] {
        &self.xref_sections
    }

    pub fn add_xref_section(&mut self, span: Span) {
        self.xref_sections.push(span);
    }
}
