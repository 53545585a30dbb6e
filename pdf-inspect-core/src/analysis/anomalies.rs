//! Anomaly sink
//!
//! Anomalies are grouped by the top-level object that owns the offending element.
//! A new anomaly is suppressed when the same category and description is already
//! recorded on the same element, its parent, one of its children or a sibling.

use crate::parser::ObjectId;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// What was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SuspiciousType {
    /// Structural violation (bad dictionary key, unclosed string...)
    Malformed,
    /// More than one filter applied to a stream
    StreamWithMultipleFilters,
    /// Name from the suspicious token list (scripts, automatic actions...)
    PotentialHarmfulToken,
    /// A stream was left undecoded
    StreamUnfiltered,
    /// The filter chain of a stream failed
    MalformedStream,
    /// Decoded content is suspicious (oversized...)
    PotentialHarmfulFile,
}

impl SuspiciousType {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            SuspiciousType::Malformed | SuspiciousType::MalformedStream => {
                NotificationType::Corruption
            }
            SuspiciousType::StreamUnfiltered => NotificationType::UnsupportedFeature,
            SuspiciousType::StreamWithMultipleFilters => NotificationType::AreaOfInterest,
            SuspiciousType::PotentialHarmfulToken | SuspiciousType::PotentialHarmfulFile => {
                NotificationType::PotentiallyHarmful
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuspiciousType::Malformed => "Malformed",
            SuspiciousType::StreamWithMultipleFilters => "StreamWithMultipleFilters",
            SuspiciousType::PotentialHarmfulToken => "PotentialHarmfulToken",
            SuspiciousType::StreamUnfiltered => "StreamUnfiltered",
            SuspiciousType::MalformedStream => "MalformedStream",
            SuspiciousType::PotentialHarmfulFile => "PotentialHarmfulFile",
        }
    }
}

impl fmt::Display for SuspiciousType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity class reported to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NotificationType {
    Corruption,
    UnsupportedFeature,
    AreaOfInterest,
    PotentiallyHarmful,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationType::Corruption => "Corruption",
            NotificationType::UnsupportedFeature => "Unsupported feature",
            NotificationType::AreaOfInterest => "Area of interest",
            NotificationType::PotentiallyHarmful => "Potentially harmful",
        };
        f.write_str(name)
    }
}

/// Location of an element inside its owning object: its start offset and the start
/// offset of the composite value that contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ElementRef {
    pub offset: usize,
    pub parent: Option<usize>,
}

impl ElementRef {
    pub fn new(offset: usize, parent: Option<usize>) -> Self {
        Self { offset, parent }
    }

    /// A top-level element (an indirect object itself)
    pub fn root(offset: usize) -> Self {
        Self::new(offset, None)
    }

    fn is_related(&self, other: &ElementRef) -> bool {
        self.offset == other.offset
            || other.parent == Some(self.offset)
            || self.parent == Some(other.offset)
            || self.parent == other.parent
    }
}

/// One recorded anomaly
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Anomaly {
    pub kind: SuspiciousType,
    pub description: String,
    pub element: ElementRef,
}

impl Anomaly {
    pub fn notification_type(&self) -> NotificationType {
        self.kind.notification_type()
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at offset {:#x}",
            self.notification_type(),
            self.description,
            self.element.offset
        )
    }
}

/// Append-only store of anomalies keyed by owning object
#[derive(Debug, Clone, Default)]
pub struct AnomalySink {
    by_owner: BTreeMap<ObjectId, Vec<Anomaly>>,
}

impl AnomalySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an anomaly unless a related one already exists.
    ///
    /// With `drop_same_level`, related anomalies are removed and the new one replaces
    /// them. Returns whether the anomaly was stored.
    pub fn add(
        &mut self,
        owner: ObjectId,
        element: ElementRef,
        kind: SuspiciousType,
        description: Option<&str>,
        drop_same_level: bool,
    ) -> bool {
        let description = Self::describe(kind, description);
        let notification = kind.notification_type();
        let entries = self.by_owner.entry(owner).or_default();

        let is_duplicate = |existing: &Anomaly| {
            existing.notification_type() == notification
                && existing.description == description
                && existing.element.is_related(&element)
        };

        if drop_same_level {
            entries.retain(|existing| !is_duplicate(existing));
        } else if entries.iter().any(is_duplicate) {
            return false;
        }

        match kind {
            SuspiciousType::PotentialHarmfulToken | SuspiciousType::StreamWithMultipleFilters => {
                debug!(%owner, %kind, "{description}");
            }
            _ => warn!(%owner, %kind, "{description}"),
        }
        entries.push(Anomaly {
            kind,
            description,
            element,
        });
        true
    }

    fn describe(kind: SuspiciousType, description: Option<&str>) -> String {
        match description {
            Some(text) if !(kind == SuspiciousType::StreamUnfiltered && text == "Encrypted") => {
                text.to_string()
            }
            _ => kind.to_string(),
        }
    }

    /// Anomalies owned by `owner`, in insertion order
    pub fn for_owner(&self, owner: ObjectId) -> &[Anomaly] {
        self.by_owner.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn owners(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.by_owner
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(owner, _)| *owner)
    }

    /// All anomalies ordered by owner
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Anomaly)> {
        self.by_owner
            .iter()
            .flat_map(|(owner, entries)| entries.iter().map(move |anomaly| (*owner, anomaly)))
    }

    pub fn len(&self) -> usize {
        self.by_owner.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, notification: NotificationType) -> usize {
        self.iter()
            .filter(|(_, anomaly)| anomaly.notification_type() == notification)
            .count()
    }
}
