//! Document analysis
//!
//! Anomaly bookkeeping, statistics and the classification passes that run over a
//! parsed [`Document`](crate::parser::Document).

pub mod anomalies;
pub mod cross_references;
pub mod functional;
pub mod statistics;
pub mod stream_kind;

pub use anomalies::{Anomaly, AnomalySink, ElementRef, NotificationType, SuspiciousType};
pub use cross_references::{CrossReference, CrossReferences};
pub use statistics::PdfStatistics;
pub use stream_kind::StreamKind;
