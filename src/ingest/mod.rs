//! Record normalization: loosely-keyed rows or a direct payload in,
//! validated PENDING participants out.

mod spreadsheet;

pub use spreadsheet::decode_spreadsheet;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::{NewParticipant, Participant, ParticipantStore};
use crate::error::{IngestError, InputError};
use crate::storage::generate_certificate_id;

/// One decoded row: header text paired with its cell value, in column order.
pub type RawRow = Vec<(String, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Email,
    EventName,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::EventName => "eventName",
        }
    }
}

/// Header keywords per field, checked as substrings of the lowercased header.
/// The first header (in column order) that matches any keyword wins.
pub const COLUMN_KEYWORDS: &[(Field, &[&str])] = &[
    (Field::Name, &["name", "full name", "student", "participant"]),
    (Field::Email, &["email", "mail", "id", "address"]),
    (
        Field::EventName,
        &["event", "project", "subject", "topic", "workshop"],
    ),
];

fn keywords_for(field: Field) -> &'static [&'static str] {
    COLUMN_KEYWORDS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, kws)| *kws)
        .unwrap_or(&[])
}

/// Value of the first header matching `field`, or an empty string.
pub fn find_value<'a>(row: &'a RawRow, field: Field) -> &'a str {
    let keywords = keywords_for(field);
    row.iter()
        .find(|(header, _)| {
            let header = header.to_lowercase();
            keywords.iter().any(|kw| header.contains(kw))
        })
        .map(|(_, value)| value.trim())
        .unwrap_or("")
}

/// Direct API payload for a single participant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub event_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub total_rows: usize,
    pub accepted: usize,
    pub dropped: usize,
    /// Rows actually written; duplicates skipped by the store are not counted.
    pub inserted: u64,
}

/// Hands out certificate ids that are unique within one batch.
#[derive(Default)]
struct CertificateIds {
    issued: HashSet<String>,
}

impl CertificateIds {
    fn next(&mut self) -> String {
        loop {
            let id = generate_certificate_id();
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }
}

pub fn normalize_input(input: ParticipantInput) -> Result<NewParticipant, InputError> {
    let name = input.name.trim();
    let email = input.email.trim();
    let event_name = input.event_name.trim();

    for (field, value) in [
        (Field::Name, name),
        (Field::Email, email),
        (Field::EventName, event_name),
    ] {
        if value.is_empty() {
            return Err(InputError::MissingField(field.label()));
        }
    }

    Ok(NewParticipant {
        name: name.to_string(),
        email: email.to_string(),
        event_name: event_name.to_string(),
        certificate_id: generate_certificate_id(),
    })
}

/// Map rows onto participants, dropping any row that lacks a name, email or
/// event. Certificate ids are unique across the returned records.
pub fn normalize_rows(rows: &[RawRow]) -> Vec<NewParticipant> {
    let mut ids = CertificateIds::default();

    rows.iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let name = find_value(row, Field::Name);
            let email = find_value(row, Field::Email);
            let event_name = find_value(row, Field::EventName);

            if name.is_empty() || email.is_empty() || event_name.is_empty() {
                if index == 0 {
                    let headers: Vec<&str> = row.iter().map(|(h, _)| h.as_str()).collect();
                    debug!(?headers, name, email, event_name, "first row did not map");
                }
                return None;
            }

            Some(NewParticipant {
                name: name.to_string(),
                email: email.to_string(),
                event_name: event_name.to_string(),
                certificate_id: ids.next(),
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct Normalizer {
    store: Arc<dyn ParticipantStore>,
}

impl Normalizer {
    pub fn new(store: Arc<dyn ParticipantStore>) -> Self {
        Self { store }
    }

    pub async fn ingest_one(&self, input: ParticipantInput) -> Result<Participant, IngestError> {
        let record = normalize_input(input)?;
        let participant = self.store.create(record).await?;
        info!(
            participant_id = participant.id,
            certificate_id = %participant.certificate_id,
            "participant added"
        );
        Ok(participant)
    }

    pub async fn ingest_rows(&self, rows: &[RawRow]) -> Result<IngestSummary, IngestError> {
        let records = normalize_rows(rows);
        let accepted = records.len();
        let dropped = rows.len() - accepted;

        if accepted == 0 {
            warn!(total_rows = rows.len(), "no valid participant records after filtering");
            return Err(InputError::NoValidRecords.into());
        }
        if dropped > 0 {
            warn!(dropped, "rows without name, email or event were skipped");
        }

        let inserted = self.store.create_many(records).await?;
        info!(
            total_rows = rows.len(),
            accepted, inserted, "bulk participant import finished"
        );

        Ok(IngestSummary {
            total_rows: rows.len(),
            accepted,
            dropped,
            inserted,
        })
    }

    pub async fn ingest_spreadsheet(&self, bytes: &[u8]) -> Result<IngestSummary, IngestError> {
        let rows = decode_spreadsheet(bytes)?;
        debug!(rows = rows.len(), "spreadsheet decoded");
        if rows.is_empty() {
            return Err(InputError::EmptySheet.into());
        }
        self.ingest_rows(&rows).await
    }
}
