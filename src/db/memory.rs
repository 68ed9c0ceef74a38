//! In-memory participant store used by tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use super::{NewParticipant, Participant, ParticipantStatus, ParticipantStore};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Participant>>,
    writes: Mutex<usize>,
    broken_status_writes: Mutex<HashSet<i32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed PENDING participants named `Participant 1..=n`.
    pub fn with_pending(n: usize) -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows.lock().unwrap();
            for i in 1..=n {
                rows.push(Participant {
                    id: i as i32,
                    name: format!("Participant {i}"),
                    email: format!("p{i}@example.com"),
                    event_name: "RustConf".to_string(),
                    certificate_id: format!("CERT{i:08}"),
                    status: ParticipantStatus::Pending,
                    created_at: Utc::now() + Duration::milliseconds(i as i64),
                });
            }
        }
        store
    }

    pub fn status_of(&self, id: i32) -> Option<ParticipantStatus> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.status)
    }

    pub fn set_email(&self, id: i32, email: &str) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(p) = rows.iter_mut().find(|p| p.id == id) {
            p.email = email.to_string();
        }
    }

    pub fn snapshot(&self) -> Vec<Participant> {
        self.rows.lock().unwrap().clone()
    }

    /// Number of mutating calls that reached the store.
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    /// Make every `set_status` for `id` fail with a database error.
    pub fn break_status_writes_for(&self, id: i32) {
        self.broken_status_writes.lock().unwrap().insert(id);
    }

    fn record_write(&self) {
        *self.writes.lock().unwrap() += 1;
    }
}

#[async_trait]
impl ParticipantStore for MemoryStore {
    async fn create(&self, record: NewParticipant) -> Result<Participant, StoreError> {
        self.record_write();
        let mut rows = self.rows.lock().unwrap();
        let participant = Participant {
            id: rows.iter().map(|p| p.id).max().unwrap_or(0) + 1,
            name: record.name,
            email: record.email,
            event_name: record.event_name,
            certificate_id: record.certificate_id,
            status: ParticipantStatus::Pending,
            created_at: Utc::now(),
        };
        rows.push(participant.clone());
        Ok(participant)
    }

    async fn create_many(&self, records: Vec<NewParticipant>) -> Result<u64, StoreError> {
        self.record_write();
        let mut rows = self.rows.lock().unwrap();
        let mut inserted = 0;
        for record in records {
            if rows.iter().any(|p| p.certificate_id == record.certificate_id) {
                continue;
            }
            let id = rows.iter().map(|p| p.id).max().unwrap_or(0) + 1;
            rows.push(Participant {
                id,
                name: record.name,
                email: record.email,
                event_name: record.event_name,
                certificate_id: record.certificate_id,
                status: ParticipantStatus::Pending,
                created_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_all(&self) -> Result<Vec<Participant>, StoreError> {
        let mut rows = self.snapshot();
        rows.reverse();
        Ok(rows)
    }

    async fn list_by_status(
        &self,
        status: ParticipantStatus,
    ) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|p| p.status == status)
            .collect())
    }

    async fn get(&self, id: i32) -> Result<Option<Participant>, StoreError> {
        Ok(self.snapshot().into_iter().find(|p| p.id == id))
    }

    async fn set_status(&self, id: i32, status: ParticipantStatus) -> Result<(), StoreError> {
        self.record_write();
        if self.broken_status_writes.lock().unwrap().contains(&id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        let participant = rows
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound(id))?;
        participant.status = status;
        Ok(())
    }

    async fn reset_failed(&self, ids: Option<Vec<i32>>) -> Result<u64, StoreError> {
        self.record_write();
        let mut rows = self.rows.lock().unwrap();
        let mut reset = 0;
        for p in rows.iter_mut() {
            let selected = ids.as_ref().map_or(true, |ids| ids.contains(&p.id));
            if selected && p.status == ParticipantStatus::Failed {
                p.status = ParticipantStatus::Pending;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
