//! Parse context
//!
//! Carries the statistics sink and the position of the value being parsed inside its
//! owning object, so anomalies can be attributed without walking parent pointers.

use super::objects::ObjectId;
use crate::analysis::{ElementRef, PdfStatistics, SuspiciousType};
use tracing::trace;

/// Default limit on nested arrays and dictionaries
pub const MAX_NESTING_DEPTH: usize = 512;

pub struct ParseContext<'a> {
    pub stats: &'a mut PdfStatistics,
    /// Top-level object being parsed; `None` for stray tokens between objects
    pub owner: Option<ObjectId>,
    /// Revision the parsed values belong to
    pub revision: usize,
    /// Start offsets of the enclosing composite values, innermost last
    parents: Vec<usize>,
    max_depth: usize,
}

impl<'a> ParseContext<'a> {
    pub fn new(stats: &'a mut PdfStatistics, owner: Option<ObjectId>, revision: usize) -> Self {
        Self {
            stats,
            owner,
            revision,
            parents: Vec::new(),
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Whether another composite may be opened at the current depth
    pub fn can_nest(&self) -> bool {
        self.parents.len() < self.max_depth
    }

    /// Enter a composite value starting at `offset`
    pub fn enter(&mut self, offset: usize) {
        self.parents.push(offset);
    }

    pub fn leave(&mut self) {
        self.parents.pop();
    }

    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    /// Drop scopes left open by an aborted parse
    pub fn truncate(&mut self, depth: usize) {
        self.parents.truncate(depth);
    }

    /// Reference to an element starting at `offset` in the current composite
    pub fn element(&self, offset: usize) -> ElementRef {
        ElementRef::new(offset, self.parents.last().copied())
    }

    /// Reference to the innermost composite itself
    pub fn current_element(&self) -> Option<ElementRef> {
        let (&offset, outer) = self.parents.split_last()?;
        Some(ElementRef::new(offset, outer.last().copied()))
    }

    pub fn report(&mut self, element: ElementRef, kind: SuspiciousType, description: impl AsRef<str>) {
        match self.owner {
            Some(owner) => {
                self.stats.add_anomaly(owner, element, kind, description);
            }
            None => trace!(%kind, "{} outside of any object", description.as_ref()),
        }
    }

    /// Report against the innermost composite, or the element at `fallback`
    pub fn report_current(&mut self, fallback: usize, kind: SuspiciousType, description: impl AsRef<str>) {
        let element = self
            .current_element()
            .unwrap_or_else(|| self.element(fallback));
        self.report(element, kind, description);
    }

    pub fn report_token(&mut self, offset: usize, token: &str, category: &str, drop_same_level: bool) {
        if let Some(owner) = self.owner {
            let element = self.element(offset);
            self.stats
                .add_token(owner, element, token, category, drop_same_level);
        }
    }
}
