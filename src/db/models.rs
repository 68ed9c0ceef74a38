use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantStatus {
    Pending,
    Sent,
    Failed,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    /// Transitions the delivery pipeline may perform on its own. Moving a
    /// FAILED participant back to PENDING is an explicit reset, not a
    /// transition.
    pub fn can_transition_to(&self, next: ParticipantStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sent) | (Self::Pending, Self::Failed)
        )
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub event_name: String,
    pub certificate_id: String,
    pub status: ParticipantStatus,
    pub created_at: DateTime<Utc>,
}

/// A validated record ready to be inserted with status PENDING.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipant {
    pub name: String,
    pub email: String,
    pub event_name: String,
    pub certificate_id: String,
}

#[derive(Debug, FromRow)]
pub struct ParticipantRow {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub event_name: String,
    pub certificate_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = StoreError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|reason| StoreError::CorruptRecord { id: row.id, reason })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            event_name: row.event_name,
            certificate_id: row.certificate_id,
            status,
            created_at: row.created_at,
        })
    }
}
