//! Persistence contracts the engine is given by its host application.
//!
//! The engine never talks to a database directly; it goes through
//! [`AttemptStore`] (durable questionnaires and attempts) and
//! [`StudentDirectory`] (the roster resolver owned by user management).

pub mod memory;
pub mod postgres;

use crate::domain::model::{AnswerMap, Attempt, Questionnaire, Student, Targeting};
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The uniqueness invariant on the in-progress row fired: another call
    /// created the attempt first. The session engine resolves this by
    /// re-reading rather than surfacing it.
    #[error("conflicting in-progress attempt")]
    Conflict,

    /// Store unavailable or otherwise failing; propagated so auto-save
    /// callers can retry with backoff.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Durable storage for definitions and attempts.
///
/// Implementations must provide the invariants the engine leans on: at most
/// one in-progress attempt per (questionnaire, student), atomic full-map
/// answer upserts, and [`StoreError::Conflict`] on a raced insert.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn insert_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError>;

    async fn update_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError>;

    async fn find_questionnaire(&self, id: Uuid) -> Result<Option<Questionnaire>, StoreError>;

    async fn list_questionnaires(&self) -> Result<Vec<Questionnaire>, StoreError>;

    /// Insert a fresh attempt. Fails with [`StoreError::Conflict`] when an
    /// in-progress attempt already exists for the pair, or when the attempt
    /// number was taken by a concurrent insert.
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;

    async fn find_attempt(&self, id: Uuid) -> Result<Option<Attempt>, StoreError>;

    async fn find_in_progress(
        &self,
        questionnaire_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Attempt>, StoreError>;

    /// Total attempts (any state) for the pair; the basis for attempt
    /// numbering and the budget check.
    async fn count_attempts(
        &self,
        questionnaire_id: Uuid,
        student_id: Uuid,
    ) -> Result<u32, StoreError>;

    /// Replace the attempt's whole answer map. Last writer wins; no delta
    /// log is kept.
    async fn save_answers(&self, attempt_id: Uuid, answers: &AnswerMap) -> Result<(), StoreError>;

    async fn update_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;

    async fn list_attempts(&self, questionnaire_id: Uuid) -> Result<Vec<Attempt>, StoreError>;
}

/// Read-only view of the platform's student directory.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Resolve a targeting spec to the expected respondent roster.
    async fn resolve_roster(&self, targeting: &Targeting) -> Result<Vec<Student>, StoreError>;

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError>;
}
