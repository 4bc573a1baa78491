//! Authoring surface: drafts, edits and publishing.

use crate::domain::error::{EngineError, ValidationError};
use crate::domain::model::{QuestionDefinition, Questionnaire, Targeting};
use crate::domain::validate;
use crate::state::SharedState;
use crate::store::AttemptStore;
use crate::web::error::ApiResult;
use crate::web::identity::InstructorIdentity;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/questionnaires", post(create).get(list))
        .route("/questionnaires/:questionnaire_id", get(fetch).put(update))
        .route("/questionnaires/:questionnaire_id/publish", post(publish))
        .with_state(state)
}

#[derive(Deserialize)]
struct QuestionnairePayload {
    title: String,
    description: Option<String>,
    #[serde(default)]
    questions: Vec<QuestionDefinition>,
    targeting: Option<Targeting>,
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    allow_late_submission: bool,
    #[serde(default)]
    show_correct_answers: bool,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    time_limit_minutes: Option<u32>,
}

fn default_max_attempts() -> u32 {
    1
}

/// Drafts may be saved while still failing validation; the failures come
/// back as warnings so authoring can be incremental. Publishing is the
/// blocking gate.
#[derive(Serialize)]
struct QuestionnaireResponse {
    #[serde(flatten)]
    questionnaire: Questionnaire,
    warnings: Vec<ValidationError>,
}

async fn create(
    InstructorIdentity(instructor_id): InstructorIdentity,
    State(state): State<SharedState>,
    Json(payload): Json<QuestionnairePayload>,
) -> ApiResult<Json<QuestionnaireResponse>> {
    let now = Utc::now();
    let questionnaire = Questionnaire {
        id: Uuid::new_v4(),
        title: payload.title,
        description: payload.description,
        questions: payload.questions,
        targeting: payload.targeting,
        due_date: payload.due_date,
        allow_late_submission: payload.allow_late_submission,
        show_correct_answers: payload.show_correct_answers,
        max_attempts: payload.max_attempts,
        time_limit_minutes: payload.time_limit_minutes,
        is_published: false,
        created_by: instructor_id,
        created_at: now,
        updated_at: now,
    };

    let warnings = validate::validate(&questionnaire);
    state.store.insert_questionnaire(&questionnaire).await?;
    tracing::info!(questionnaire = %questionnaire.id, "draft created");

    Ok(Json(QuestionnaireResponse {
        questionnaire,
        warnings,
    }))
}

async fn list(
    InstructorIdentity(_): InstructorIdentity,
    State(state): State<SharedState>,
) -> ApiResult<Json<Vec<Questionnaire>>> {
    Ok(Json(state.store.list_questionnaires().await?))
}

async fn fetch(
    InstructorIdentity(_): InstructorIdentity,
    State(state): State<SharedState>,
    Path(questionnaire_id): Path<Uuid>,
) -> ApiResult<Json<Questionnaire>> {
    let questionnaire = state
        .store
        .find_questionnaire(questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", questionnaire_id))?;
    Ok(Json(questionnaire))
}

/// Edits are allowed even after publication; they never re-grade attempts
/// that already exist (those keep the max score snapshotted at submit
/// time). An edit that would leave a *published* questionnaire invalid is
/// refused.
async fn update(
    InstructorIdentity(_): InstructorIdentity,
    State(state): State<SharedState>,
    Path(questionnaire_id): Path<Uuid>,
    Json(payload): Json<QuestionnairePayload>,
) -> ApiResult<Json<QuestionnaireResponse>> {
    let mut questionnaire = state
        .store
        .find_questionnaire(questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", questionnaire_id))?;

    questionnaire.title = payload.title;
    questionnaire.description = payload.description;
    questionnaire.questions = payload.questions;
    questionnaire.targeting = payload.targeting;
    questionnaire.due_date = payload.due_date;
    questionnaire.allow_late_submission = payload.allow_late_submission;
    questionnaire.show_correct_answers = payload.show_correct_answers;
    questionnaire.max_attempts = payload.max_attempts;
    questionnaire.time_limit_minutes = payload.time_limit_minutes;
    questionnaire.updated_at = Utc::now();

    let warnings = validate::validate(&questionnaire);
    if questionnaire.is_published && !warnings.is_empty() {
        return Err(EngineError::Validation(warnings).into());
    }

    state.store.update_questionnaire(&questionnaire).await?;
    Ok(Json(QuestionnaireResponse {
        questionnaire,
        warnings,
    }))
}

async fn publish(
    InstructorIdentity(_): InstructorIdentity,
    State(state): State<SharedState>,
    Path(questionnaire_id): Path<Uuid>,
) -> ApiResult<Json<Questionnaire>> {
    let mut questionnaire = state
        .store
        .find_questionnaire(questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", questionnaire_id))?;

    let errors = validate::validate(&questionnaire);
    if !errors.is_empty() {
        return Err(EngineError::Validation(errors).into());
    }

    questionnaire.is_published = true;
    questionnaire.updated_at = Utc::now();
    state.store.update_questionnaire(&questionnaire).await?;
    tracing::info!(questionnaire = %questionnaire.id, "published");
    Ok(Json(questionnaire))
}
