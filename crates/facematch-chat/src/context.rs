//! Context corpus: registrations, recognition events and stats as retrievable documents.

use chrono::{DateTime, TimeZone};
use facematch_core::PersonId;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Snapshot of platform state the caller wants the question answered against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    #[serde(default)]
    pub registrations: Vec<Registration>,
    #[serde(default)]
    pub recent_events: Vec<RecognitionEvent>,
    #[serde(default)]
    pub stats: Option<SystemStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: PersonId,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub registered_at: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionEvent {
    pub person_name: String,
    /// Percentage as reported by the platform.
    pub confidence: f64,
    pub detected_at: String,
    #[serde(default)]
    pub is_recognized: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemStats {
    pub total_detections: u64,
    pub recognized_faces: u64,
    pub unknown_faces: u64,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Registration,
    RecognitionEvent,
    SystemStats,
}

/// One retrievable unit of text plus the metadata answer rules look at.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub kind: DocumentKind,
    pub text: String,
    pub person_id: Option<PersonId>,
    pub person_name: Option<String>,
    pub timestamp: Option<String>,
}

/// Turn a context snapshot into documents, in registrations, events, stats order.
pub fn build_documents<Tz>(context: &ChatContext, now: &DateTime<Tz>) -> Vec<Document>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut documents = Vec::with_capacity(context.registrations.len() + context.recent_events.len() + 1);

    for reg in &context.registrations {
        let text = format!(
            "Person: {}\nID: {}\nRole: {}\nDepartment: {}\nRegistered: {}\nStatus: {}",
            reg.name,
            reg.id,
            reg.role.as_deref().unwrap_or("Not specified"),
            reg.department.as_deref().unwrap_or("Not specified"),
            reg.registered_at,
            if reg.is_active { "Active" } else { "Inactive" },
        );
        documents.push(Document {
            kind: DocumentKind::Registration,
            text,
            person_id: Some(reg.id.clone()),
            person_name: Some(reg.name.clone()),
            timestamp: Some(reg.registered_at.clone()),
        });
    }

    for event in &context.recent_events {
        let text = format!(
            "Recognition Event:\nPerson: {}\nConfidence: {}%\nDetected at: {}\nStatus: {}",
            event.person_name,
            event.confidence,
            event.detected_at,
            if event.is_recognized { "Recognized" } else { "Unknown" },
        );
        documents.push(Document {
            kind: DocumentKind::RecognitionEvent,
            text,
            person_id: None,
            person_name: Some(event.person_name.clone()),
            timestamp: Some(event.detected_at.clone()),
        });
    }

    if let Some(stats) = &context.stats {
        let updated = now.to_rfc3339();
        let text = format!(
            "System Statistics:\nTotal Detections: {}\nRecognized Faces: {}\nUnknown Faces: {}\nAverage Confidence: {}%\nLast Updated: {}",
            stats.total_detections, stats.recognized_faces, stats.unknown_faces, stats.average_confidence, updated,
        );
        documents.push(Document {
            kind: DocumentKind::SystemStats,
            text,
            person_id: None,
            person_name: None,
            timestamp: Some(updated),
        });
    }

    documents
}

/// Split long documents into overlapping character windows.
///
/// Documents at or under `chunk_size` characters pass through untouched.
/// Every chunk keeps its parent's metadata.
pub fn split_documents(documents: Vec<Document>, chunk_size: usize, overlap: usize) -> Vec<Document> {
    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut out = Vec::with_capacity(documents.len());
    for doc in documents {
        let chars: Vec<char> = doc.text.chars().collect();
        if chars.len() <= chunk_size {
            out.push(doc);
            continue;
        }

        let mut start = 0;
        loop {
            let end = (start + chunk_size).min(chars.len());
            out.push(Document {
                text: chars[start..end].iter().collect(),
                ..doc.clone()
            });
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }
    out
}
