//! In-memory store, used by the engine test suite and handy for local
//! experiments. Mirrors the invariants the Postgres schema enforces with
//! its unique indexes.

use crate::domain::model::{AnswerMap, Attempt, Questionnaire, Student, Targeting};
use crate::store::{AttemptStore, StoreError, StudentDirectory};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    questionnaires: HashMap<Uuid, Questionnaire>,
    attempts: HashMap<Uuid, Attempt>,
    /// (questionnaire, student) -> attempt id of the open attempt. The
    /// uniqueness check consults this before inserting.
    in_progress: HashMap<(Uuid, Uuid), Uuid>,
    students: Vec<Student>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_student(&self, student: Student) {
        self.inner.write().await.students.push(student);
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn insert_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .questionnaires
            .insert(questionnaire.id, questionnaire.clone());
        Ok(())
    }

    async fn update_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.questionnaires.contains_key(&questionnaire.id) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "questionnaire {} not found",
                questionnaire.id
            )));
        }
        inner
            .questionnaires
            .insert(questionnaire.id, questionnaire.clone());
        Ok(())
    }

    async fn find_questionnaire(&self, id: Uuid) -> Result<Option<Questionnaire>, StoreError> {
        Ok(self.inner.read().await.questionnaires.get(&id).cloned())
    }

    async fn list_questionnaires(&self) -> Result<Vec<Questionnaire>, StoreError> {
        let inner = self.inner.read().await;
        let mut all: Vec<Questionnaire> = inner.questionnaires.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let key = (attempt.questionnaire_id, attempt.student_id);

        if !attempt.is_submitted() && inner.in_progress.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        let number_taken = inner.attempts.values().any(|a| {
            a.questionnaire_id == attempt.questionnaire_id
                && a.student_id == attempt.student_id
                && a.attempt_number == attempt.attempt_number
        });
        if number_taken {
            return Err(StoreError::Conflict);
        }

        if !attempt.is_submitted() {
            inner.in_progress.insert(key, attempt.id);
        }
        inner.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn find_attempt(&self, id: Uuid) -> Result<Option<Attempt>, StoreError> {
        Ok(self.inner.read().await.attempts.get(&id).cloned())
    }

    async fn find_in_progress(
        &self,
        questionnaire_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Attempt>, StoreError> {
        let inner = self.inner.read().await;
        let id = inner.in_progress.get(&(questionnaire_id, student_id));
        Ok(id.and_then(|id| inner.attempts.get(id)).cloned())
    }

    async fn count_attempts(
        &self,
        questionnaire_id: Uuid,
        student_id: Uuid,
    ) -> Result<u32, StoreError> {
        let inner = self.inner.read().await;
        let count = inner
            .attempts
            .values()
            .filter(|a| a.questionnaire_id == questionnaire_id && a.student_id == student_id)
            .count();
        Ok(count as u32)
    }

    async fn save_answers(&self, attempt_id: Uuid, answers: &AnswerMap) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let attempt = inner.attempts.get_mut(&attempt_id).ok_or_else(|| {
            StoreError::Backend(anyhow::anyhow!("attempt {attempt_id} not found"))
        })?;
        attempt.answers = answers.clone();
        Ok(())
    }

    async fn update_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.attempts.contains_key(&attempt.id) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "attempt {} not found",
                attempt.id
            )));
        }
        let key = (attempt.questionnaire_id, attempt.student_id);
        if attempt.is_submitted() {
            inner.in_progress.remove(&key);
        } else {
            inner.in_progress.insert(key, attempt.id);
        }
        inner.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn list_attempts(&self, questionnaire_id: Uuid) -> Result<Vec<Attempt>, StoreError> {
        let inner = self.inner.read().await;
        let mut attempts: Vec<Attempt> = inner
            .attempts
            .values()
            .filter(|a| a.questionnaire_id == questionnaire_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(attempts)
    }
}

#[async_trait]
impl StudentDirectory for MemoryStore {
    async fn resolve_roster(&self, targeting: &Targeting) -> Result<Vec<Student>, StoreError> {
        let inner = self.inner.read().await;
        let roster = inner
            .students
            .iter()
            .filter(|student| match targeting {
                Targeting::LearningPaths(paths) => student
                    .learning_path
                    .as_ref()
                    .map(|p| paths.contains(p))
                    .unwrap_or(false),
                Targeting::StudentIds(ids) => ids.contains(&student.id),
            })
            .cloned()
            .collect();
        Ok(roster)
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.students.iter().find(|s| s.id == id).cloned())
    }
}
