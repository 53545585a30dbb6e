//! Document statistics
//!
//! Counters, encryption flags and the anomaly sink filled while parsing.

use super::anomalies::{AnomalySink, ElementRef, NotificationType, SuspiciousType};
use crate::parser::ObjectId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct PdfStatistics {
    /// Objects found by the body scan (trailers included)
    pub nb_indirect_objects: usize,
    /// Objects unpacked from object streams
    pub nb_streamed_objects: usize,
    /// Streams listed for consumers (extending object streams excluded)
    pub nb_streams: usize,
    pub nb_revisions: usize,
    pub nb_trailers: usize,
    encrypted: bool,
    password_required: bool,
    version: String,
    filters_used: BTreeSet<String>,
    tokens: BTreeMap<String, usize>,
    anomalies: AnomalySink,
}

impl PdfStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Header version (`1.4`...), empty when the header carries none
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn is_password_required(&self) -> bool {
        self.password_required
    }

    /// Flags only ever get raised: several revisions may disagree
    pub fn set_encrypted(&mut self, encrypted: bool, password_required: bool) {
        if encrypted && !self.encrypted {
            info!("Trailer defines encryption, trying to decrypt");
        }
        self.encrypted |= encrypted;
        self.password_required |= password_required;
    }

    pub fn add_filter_used(&mut self, filter: impl Into<String>) {
        self.filters_used.insert(filter.into());
    }

    pub fn filters_used(&self) -> &BTreeSet<String> {
        &self.filters_used
    }

    /// Occurrences of each suspicious token
    pub fn tokens(&self) -> &BTreeMap<String, usize> {
        &self.tokens
    }

    pub fn anomalies(&self) -> &AnomalySink {
        &self.anomalies
    }

    pub fn add_anomaly(
        &mut self,
        owner: ObjectId,
        element: ElementRef,
        kind: SuspiciousType,
        description: impl AsRef<str>,
    ) -> bool {
        self.anomalies
            .add(owner, element, kind, Some(description.as_ref()), false)
    }

    /// Record a suspicious token; the counter only moves when the anomaly is kept
    pub fn add_token(
        &mut self,
        owner: ObjectId,
        element: ElementRef,
        token: &str,
        category: &str,
        drop_same_level: bool,
    ) -> bool {
        let added = self.anomalies.add(
            owner,
            element,
            SuspiciousType::PotentialHarmfulToken,
            Some(category),
            drop_same_level,
        );
        if added {
            *self.tokens.entry(token.to_string()).or_insert(0) += 1;
        }
        added
    }

    pub fn tokens_summary(&self) -> String {
        let mut out = String::new();
        for (token, count) in &self.tokens {
            let plural = if *count > 1 { "s" } else { "" };
            let _ = write!(out, "\nToken '{token}' found {count} time{plural}");
        }
        out
    }

    pub fn corruptions_summary(&self) -> String {
        let mut out = String::new();
        for owner in self.anomalies.owners() {
            let descriptions: BTreeSet<&str> = self
                .anomalies
                .for_owner(owner)
                .iter()
                .filter(|anomaly| anomaly.notification_type() == NotificationType::Corruption)
                .map(|anomaly| anomaly.description.as_str())
                .collect();
            if !descriptions.is_empty() {
                let joined: Vec<&str> = descriptions.into_iter().collect();
                let _ = write!(out, "\n--- in {owner}: {}", joined.join(", "));
            }
        }
        if !out.is_empty() {
            out.insert_str(0, "\n\nPdf File has corruptions:");
        }
        out
    }

    pub fn anomalies_summary(&self) -> String {
        let mut out = String::new();
        for owner in self.anomalies.owners() {
            let _ = write!(out, "\n- Notifications in {owner}");
            for anomaly in self.anomalies.for_owner(owner) {
                let _ = write!(out, "\n--- {anomaly}");
            }
            out.push('\n');
        }
        out
    }

    /// Human readable overview
    pub fn description(&self) -> String {
        let mut out = String::new();
        if !self.version.is_empty() {
            let _ = writeln!(out, "PDF version: {}", self.version);
        }
        let _ = writeln!(out, "Revisions: {}", self.nb_revisions);
        let _ = writeln!(out, "Indirect objects: {}", self.nb_indirect_objects);
        let _ = writeln!(out, "Objects in object streams: {}", self.nb_streamed_objects);
        let _ = writeln!(out, "Streams: {}", self.nb_streams);
        if self.encrypted {
            let _ = writeln!(
                out,
                "Encrypted{}",
                if self.password_required {
                    " (user password required)"
                } else {
                    ""
                }
            );
        }
        if !self.filters_used.is_empty() {
            let filters: Vec<&str> = self.filters_used.iter().map(String::as_str).collect();
            let _ = writeln!(out, "Filters: {}", filters.join(", "));
        }
        out.push_str(&self.tokens_summary());
        out.push_str(&self.corruptions_summary());
        out
    }
}
