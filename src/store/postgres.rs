//! Postgres-backed store. Questions, targeting and answer maps live in
//! JSONB columns; the uniqueness invariants live in partial/composite
//! unique indexes (see migrations/0001_init.sql).

use crate::domain::model::{AnswerMap, Attempt, Questionnaire, Student, Targeting};
use crate::store::{AttemptStore, StoreError, StudentDirectory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Postgres unique-violation code; anything else is a backend failure.
fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict;
        }
    }
    StoreError::Backend(err.into())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|err| StoreError::Backend(err.into()))
}

#[derive(FromRow)]
struct QuestionnaireRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    questions: serde_json::Value,
    targeting: Option<serde_json::Value>,
    due_date: Option<DateTime<Utc>>,
    allow_late_submission: bool,
    show_correct_answers: bool,
    max_attempts: i32,
    time_limit_minutes: Option<i32>,
    is_published: bool,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QuestionnaireRow> for Questionnaire {
    type Error = StoreError;

    fn try_from(row: QuestionnaireRow) -> Result<Self, StoreError> {
        let questions = serde_json::from_value(row.questions)
            .map_err(|err| StoreError::Backend(err.into()))?;
        let targeting: Option<Targeting> = row
            .targeting
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| StoreError::Backend(err.into()))?;
        Ok(Questionnaire {
            id: row.id,
            title: row.title,
            description: row.description,
            questions,
            targeting,
            due_date: row.due_date,
            allow_late_submission: row.allow_late_submission,
            show_correct_answers: row.show_correct_answers,
            max_attempts: row.max_attempts.max(1) as u32,
            time_limit_minutes: row.time_limit_minutes.map(|v| v.max(0) as u32),
            is_published: row.is_published,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: Uuid,
    questionnaire_id: Uuid,
    student_id: Uuid,
    attempt_number: i32,
    answers: serde_json::Value,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    time_spent_seconds: Option<i64>,
    late: bool,
    score: Option<f64>,
    max_score: Option<i64>,
    is_graded: bool,
    graded_by: Option<Uuid>,
    graded_at: Option<DateTime<Utc>>,
    feedback: Option<String>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self, StoreError> {
        let answers: AnswerMap =
            serde_json::from_value(row.answers).map_err(|err| StoreError::Backend(err.into()))?;
        Ok(Attempt {
            id: row.id,
            questionnaire_id: row.questionnaire_id,
            student_id: row.student_id,
            attempt_number: row.attempt_number,
            answers,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            time_spent_seconds: row.time_spent_seconds,
            late: row.late,
            score: row.score,
            max_score: row.max_score,
            is_graded: row.is_graded,
            graded_by: row.graded_by,
            graded_at: row.graded_at,
            feedback: row.feedback,
        })
    }
}

const QUESTIONNAIRE_COLUMNS: &str = r#"
    id,
    title,
    description,
    questions,
    targeting,
    due_date,
    allow_late_submission,
    show_correct_answers,
    max_attempts,
    time_limit_minutes,
    is_published,
    created_by,
    created_at,
    updated_at
"#;

const ATTEMPT_COLUMNS: &str = r#"
    id,
    questionnaire_id,
    student_id,
    attempt_number,
    answers,
    started_at,
    submitted_at,
    time_spent_seconds,
    late,
    score,
    max_score,
    is_graded,
    graded_by,
    graded_at,
    feedback
"#;

#[async_trait]
impl AttemptStore for PgStore {
    async fn insert_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO questionnaires (
                id, title, description, questions, targeting, due_date,
                allow_late_submission, show_correct_answers, max_attempts,
                time_limit_minutes, is_published, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(questionnaire.id)
        .bind(&questionnaire.title)
        .bind(&questionnaire.description)
        .bind(to_json(&questionnaire.questions)?)
        .bind(
            questionnaire
                .targeting
                .as_ref()
                .map(to_json)
                .transpose()?,
        )
        .bind(questionnaire.due_date)
        .bind(questionnaire.allow_late_submission)
        .bind(questionnaire.show_correct_answers)
        .bind(questionnaire.max_attempts as i32)
        .bind(questionnaire.time_limit_minutes.map(|v| v as i32))
        .bind(questionnaire.is_published)
        .bind(questionnaire.created_by)
        .bind(questionnaire.created_at)
        .bind(questionnaire.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE questionnaires
            SET title = $2,
                description = $3,
                questions = $4,
                targeting = $5,
                due_date = $6,
                allow_late_submission = $7,
                show_correct_answers = $8,
                max_attempts = $9,
                time_limit_minutes = $10,
                is_published = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(questionnaire.id)
        .bind(&questionnaire.title)
        .bind(&questionnaire.description)
        .bind(to_json(&questionnaire.questions)?)
        .bind(
            questionnaire
                .targeting
                .as_ref()
                .map(to_json)
                .transpose()?,
        )
        .bind(questionnaire.due_date)
        .bind(questionnaire.allow_late_submission)
        .bind(questionnaire.show_correct_answers)
        .bind(questionnaire.max_attempts as i32)
        .bind(questionnaire.time_limit_minutes.map(|v| v as i32))
        .bind(questionnaire.is_published)
        .bind(questionnaire.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_questionnaire(&self, id: Uuid) -> Result<Option<Questionnaire>, StoreError> {
        let row = sqlx::query_as::<_, QuestionnaireRow>(&format!(
            "SELECT {QUESTIONNAIRE_COLUMNS} FROM questionnaires WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(Questionnaire::try_from).transpose()
    }

    async fn list_questionnaires(&self) -> Result<Vec<Questionnaire>, StoreError> {
        let rows = sqlx::query_as::<_, QuestionnaireRow>(&format!(
            "SELECT {QUESTIONNAIRE_COLUMNS} FROM questionnaires ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(Questionnaire::try_from).collect()
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attempts (
                id, questionnaire_id, student_id, attempt_number, answers,
                started_at, submitted_at, time_spent_seconds, late, score,
                max_score, is_graded, graded_by, graded_at, feedback
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.questionnaire_id)
        .bind(attempt.student_id)
        .bind(attempt.attempt_number)
        .bind(to_json(&attempt.answers)?)
        .bind(attempt.started_at)
        .bind(attempt.submitted_at)
        .bind(attempt.time_spent_seconds)
        .bind(attempt.late)
        .bind(attempt.score)
        .bind(attempt.max_score)
        .bind(attempt.is_graded)
        .bind(attempt.graded_by)
        .bind(attempt.graded_at)
        .bind(&attempt.feedback)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_attempt(&self, id: Uuid) -> Result<Option<Attempt>, StoreError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(Attempt::try_from).transpose()
    }

    async fn find_in_progress(
        &self,
        questionnaire_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Attempt>, StoreError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS}
            FROM attempts
            WHERE questionnaire_id = $1
              AND student_id = $2
              AND submitted_at IS NULL
            "#
        ))
        .bind(questionnaire_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(Attempt::try_from).transpose()
    }

    async fn count_attempts(
        &self,
        questionnaire_id: Uuid,
        student_id: Uuid,
    ) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM attempts
            WHERE questionnaire_id = $1
              AND student_id = $2
            "#,
        )
        .bind(questionnaire_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(count.max(0) as u32)
    }

    async fn save_answers(&self, attempt_id: Uuid, answers: &AnswerMap) -> Result<(), StoreError> {
        sqlx::query("UPDATE attempts SET answers = $2 WHERE id = $1")
            .bind(attempt_id)
            .bind(to_json(answers)?)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE attempts
            SET answers = $2,
                submitted_at = $3,
                time_spent_seconds = $4,
                late = $5,
                score = $6,
                max_score = $7,
                is_graded = $8,
                graded_by = $9,
                graded_at = $10,
                feedback = $11
            WHERE id = $1
            "#,
        )
        .bind(attempt.id)
        .bind(to_json(&attempt.answers)?)
        .bind(attempt.submitted_at)
        .bind(attempt.time_spent_seconds)
        .bind(attempt.late)
        .bind(attempt.score)
        .bind(attempt.max_score)
        .bind(attempt.is_graded)
        .bind(attempt.graded_by)
        .bind(attempt.graded_at)
        .bind(&attempt.feedback)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_attempts(&self, questionnaire_id: Uuid) -> Result<Vec<Attempt>, StoreError> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS}
            FROM attempts
            WHERE questionnaire_id = $1
            ORDER BY started_at
            "#
        ))
        .bind(questionnaire_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(Attempt::try_from).collect()
    }
}

#[async_trait]
impl StudentDirectory for PgStore {
    async fn resolve_roster(&self, targeting: &Targeting) -> Result<Vec<Student>, StoreError> {
        let students = match targeting {
            Targeting::LearningPaths(paths) => {
                let paths: Vec<String> = paths.iter().cloned().collect();
                sqlx::query_as::<_, Student>(
                    r#"
                    SELECT id, name, email, learning_path
                    FROM students
                    WHERE learning_path = ANY($1)
                    ORDER BY name
                    "#,
                )
                .bind(paths)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?
            }
            Targeting::StudentIds(ids) => {
                let ids: Vec<Uuid> = ids.iter().copied().collect();
                sqlx::query_as::<_, Student>(
                    r#"
                    SELECT id, name, email, learning_path
                    FROM students
                    WHERE id = ANY($1)
                    ORDER BY name
                    "#,
                )
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?
            }
        };
        Ok(students)
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        let student = sqlx::query_as::<_, Student>(
            "SELECT id, name, email, learning_path FROM students WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(student)
    }
}
