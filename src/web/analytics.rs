//! Reporting surface: summary stats and the flat CSV export.

use crate::domain::analytics::{self, QuestionnaireStats};
use crate::domain::error::EngineError;
use crate::state::SharedState;
use crate::store::{AttemptStore, StudentDirectory};
use crate::web::error::ApiResult;
use crate::web::identity::InstructorIdentity;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/questionnaires/:questionnaire_id/stats", get(stats))
        .route("/questionnaires/:questionnaire_id/export", get(export))
        .with_state(state)
}

async fn load_report_inputs(
    state: &SharedState,
    questionnaire_id: Uuid,
) -> ApiResult<(
    Vec<crate::domain::model::Attempt>,
    Vec<crate::domain::model::Student>,
)> {
    let questionnaire = state
        .store
        .find_questionnaire(questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", questionnaire_id))?;

    let attempts = state.store.list_attempts(questionnaire_id).await?;
    let roster = match &questionnaire.targeting {
        Some(targeting) => state.store.resolve_roster(targeting).await?,
        None => Vec::new(),
    };
    Ok((attempts, roster))
}

async fn stats(
    InstructorIdentity(_): InstructorIdentity,
    State(state): State<SharedState>,
    Path(questionnaire_id): Path<Uuid>,
) -> ApiResult<Json<QuestionnaireStats>> {
    let (attempts, roster) = load_report_inputs(&state, questionnaire_id).await?;
    Ok(Json(analytics::summarize(&attempts, roster.len())))
}

async fn export(
    InstructorIdentity(_): InstructorIdentity,
    State(state): State<SharedState>,
    Path(questionnaire_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let (attempts, roster) = load_report_inputs(&state, questionnaire_id).await?;
    let csv = analytics::export_csv(&attempts, &roster);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"responses.csv\"",
            ),
        ],
        csv,
    ))
}
