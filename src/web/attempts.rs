//! Delivery surface: start/resume, auto-save, submission and grading.

use crate::domain::error::EngineError;
use crate::domain::model::{AnswerMap, AnswerValue, Attempt, AttemptState, Questionnaire, Student};
use crate::domain::{grading, session};
use crate::state::SharedState;
use crate::store::{AttemptStore, StudentDirectory};
use crate::web::error::{ApiError, ApiResult};
use crate::web::identity::{InstructorIdentity, StudentIdentity};
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/questionnaires/:questionnaire_id/attempts", post(start))
        .route("/attempts/:attempt_id", get(fetch))
        .route("/attempts/:attempt_id/answers", put(record_answer))
        .route("/attempts/:attempt_id/submit", post(submit))
        .route("/attempts/:attempt_id/grading", get(grading_view))
        .route("/attempts/:attempt_id/grade", post(grade))
        .with_state(state)
}

/// Attempt plus the advisory countdown the client renders. The server
/// recomputes the deadline from `started_at` on every mutating call.
#[derive(Serialize)]
struct AttemptView {
    #[serde(flatten)]
    attempt: Attempt,
    state: AttemptState,
    time_remaining_seconds: Option<i64>,
}

fn attempt_view(questionnaire: &Questionnaire, attempt: Attempt) -> AttemptView {
    let time_remaining_seconds = if attempt.is_submitted() {
        None
    } else {
        session::time_remaining(questionnaire, &attempt, Utc::now())
    };
    AttemptView {
        state: attempt.state(),
        time_remaining_seconds,
        attempt,
    }
}

async fn load_owned_attempt(
    state: &SharedState,
    attempt_id: Uuid,
    student_id: Uuid,
) -> Result<(Questionnaire, Attempt), ApiError> {
    let attempt = state
        .store
        .find_attempt(attempt_id)
        .await?
        .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;
    // Someone else's attempt is invisible, not forbidden.
    if attempt.student_id != student_id {
        return Err(EngineError::not_found("attempt", attempt_id).into());
    }
    let questionnaire = state
        .store
        .find_questionnaire(attempt.questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", attempt.questionnaire_id))?;
    Ok((questionnaire, attempt))
}

async fn start(
    StudentIdentity(student_id): StudentIdentity,
    State(state): State<SharedState>,
    Path(questionnaire_id): Path<Uuid>,
) -> ApiResult<Json<AttemptView>> {
    let attempt = session::start(&state.store, questionnaire_id, student_id, Utc::now()).await?;
    let questionnaire = state
        .store
        .find_questionnaire(questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", questionnaire_id))?;
    Ok(Json(attempt_view(&questionnaire, attempt)))
}

async fn fetch(
    StudentIdentity(student_id): StudentIdentity,
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<Json<AttemptView>> {
    let (questionnaire, attempt) = load_owned_attempt(&state, attempt_id, student_id).await?;
    Ok(Json(attempt_view(&questionnaire, attempt)))
}

#[derive(Deserialize)]
struct RecordAnswerPayload {
    question_id: String,
    value: AnswerValue,
}

/// Auto-save. Fire-and-forget from the student's point of view; the client
/// retries transient failures before dropping a local edit.
async fn record_answer(
    StudentIdentity(student_id): StudentIdentity,
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<RecordAnswerPayload>,
) -> ApiResult<Json<AttemptView>> {
    let (questionnaire, _) = load_owned_attempt(&state, attempt_id, student_id).await?;
    let attempt = session::record_answer(
        &state.store,
        attempt_id,
        &payload.question_id,
        payload.value,
        Utc::now(),
    )
    .await?;
    Ok(Json(attempt_view(&questionnaire, attempt)))
}

#[derive(Deserialize)]
struct SubmitPayload {
    #[serde(default)]
    answers: AnswerMap,
    /// Set by the client when the countdown reached zero; skips the
    /// required-question check.
    #[serde(default)]
    auto: bool,
}

async fn submit(
    StudentIdentity(student_id): StudentIdentity,
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<SubmitPayload>,
) -> ApiResult<Json<AttemptView>> {
    let (questionnaire, _) = load_owned_attempt(&state, attempt_id, student_id).await?;
    let attempt = session::submit(
        &state.store,
        attempt_id,
        payload.answers,
        payload.auto,
        Utc::now(),
    )
    .await?;
    Ok(Json(attempt_view(&questionnaire, attempt)))
}

#[derive(Serialize)]
struct GradingView {
    #[serde(flatten)]
    attempt: Attempt,
    state: AttemptState,
    /// Auto-computed percentage, offered as a starting value only.
    suggested_score: f64,
    /// Denormalized for display in the grading screen.
    student: Option<Student>,
}

async fn grading_view(
    InstructorIdentity(_): InstructorIdentity,
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<Json<GradingView>> {
    let attempt = state
        .store
        .find_attempt(attempt_id)
        .await?
        .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;
    let questionnaire = state
        .store
        .find_questionnaire(attempt.questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", attempt.questionnaire_id))?;
    let student = state.store.find_student(attempt.student_id).await?;

    Ok(Json(GradingView {
        suggested_score: grading::suggested_score(&questionnaire, &attempt),
        state: attempt.state(),
        student,
        attempt,
    }))
}

#[derive(Deserialize)]
struct GradePayload {
    score: f64,
    feedback: Option<String>,
}

async fn grade(
    InstructorIdentity(grader_id): InstructorIdentity,
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<GradePayload>,
) -> ApiResult<Json<Attempt>> {
    let attempt = grading::apply_manual_grade(
        &state.store,
        attempt_id,
        grader_id,
        payload.score,
        payload.feedback,
        Utc::now(),
    )
    .await?;
    Ok(Json(attempt))
}
