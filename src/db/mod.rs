mod models;
#[cfg(test)]
pub mod memory;

pub use models::*;

use async_trait::async_trait;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::debug;

use crate::error::StoreError;

pub type DbPool = Arc<PgPool>;

/// Postgres caps a statement at 65535 bind parameters; five per row.
const INSERT_CHUNK: usize = 1000;

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Keyed record store for participants.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    /// Insert one record with status PENDING.
    async fn create(&self, record: NewParticipant) -> Result<Participant, StoreError>;

    /// Insert many records with status PENDING, silently skipping rows that
    /// collide with an existing unique key. Returns the number inserted.
    async fn create_many(&self, records: Vec<NewParticipant>) -> Result<u64, StoreError>;

    /// All participants, newest first.
    async fn list_all(&self) -> Result<Vec<Participant>, StoreError>;

    /// Participants in the given status, oldest first.
    async fn list_by_status(&self, status: ParticipantStatus)
        -> Result<Vec<Participant>, StoreError>;

    async fn get(&self, id: i32) -> Result<Option<Participant>, StoreError>;

    /// Unconditionally set the status of one participant.
    async fn set_status(&self, id: i32, status: ParticipantStatus) -> Result<(), StoreError>;

    /// Move FAILED participants back to PENDING. `None` resets every FAILED
    /// participant; rows in any other status are never touched.
    async fn reset_failed(&self, ids: Option<Vec<i32>>) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgParticipantStore {
    pool: DbPool,
}

impl PgParticipantStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipantStore for PgParticipantStore {
    async fn create(&self, record: NewParticipant) -> Result<Participant, StoreError> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            INSERT INTO participants (name, email, event_name, certificate_id, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.event_name)
        .bind(&record.certificate_id)
        .bind(ParticipantStatus::Pending.as_str())
        .fetch_one(self.pool.as_ref())
        .await?;

        row.try_into()
    }

    async fn create_many(&self, records: Vec<NewParticipant>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO participants (name, email, event_name, certificate_id, status) ",
            );
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.name)
                    .push_bind(&record.email)
                    .push_bind(&record.event_name)
                    .push_bind(&record.certificate_id)
                    .push_bind(ParticipantStatus::Pending.as_str());
            });
            builder.push(" ON CONFLICT DO NOTHING");

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(requested = records.len(), inserted, "bulk insert finished");
        Ok(inserted)
    }

    async fn list_all(&self) -> Result<Vec<Participant>, StoreError> {
        sqlx::query_as::<_, ParticipantRow>(
            "SELECT * FROM participants ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.pool.as_ref())
        .await?
        .into_iter()
        .map(Participant::try_from)
        .collect()
    }

    async fn list_by_status(
        &self,
        status: ParticipantStatus,
    ) -> Result<Vec<Participant>, StoreError> {
        sqlx::query_as::<_, ParticipantRow>(
            "SELECT * FROM participants WHERE status = $1 ORDER BY created_at, id",
        )
        .bind(status.as_str())
        .fetch_all(self.pool.as_ref())
        .await?
        .into_iter()
        .map(Participant::try_from)
        .collect()
    }

    async fn get(&self, id: i32) -> Result<Option<Participant>, StoreError> {
        sqlx::query_as::<_, ParticipantRow>("SELECT * FROM participants WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Participant::try_from)
            .transpose()
    }

    async fn set_status(&self, id: i32, status: ParticipantStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE participants SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn reset_failed(&self, ids: Option<Vec<i32>>) -> Result<u64, StoreError> {
        let result = match ids {
            Some(ids) => {
                sqlx::query(
                    "UPDATE participants SET status = 'PENDING' \
                     WHERE status = 'FAILED' AND id = ANY($1)",
                )
                .bind(ids)
                .execute(self.pool.as_ref())
                .await?
            }
            None => {
                sqlx::query("UPDATE participants SET status = 'PENDING' WHERE status = 'FAILED'")
                    .execute(self.pool.as_ref())
                    .await?
            }
        };

        Ok(result.rows_affected())
    }
}
