//! Objective auto-scoring plus the manual grade-entry path for subjective
//! question types.

use crate::domain::error::EngineError;
use crate::domain::model::{AnswerMap, AnswerValue, Attempt, QuestionKind, Questionnaire};
use crate::store::AttemptStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub raw_score: u32,
    pub max_score: u32,
}

/// Score the objective questions of an attempt against a definition.
///
/// Deterministic: the same definition and answer map always yields the same
/// breakdown. Subjective kinds earn 0 raw points but still count toward
/// `max_score`, so any attempt containing one needs a manual pass to reach a
/// final score.
pub fn auto_score(definition: &Questionnaire, answers: &AnswerMap) -> ScoreBreakdown {
    let mut raw_score = 0u32;
    let mut max_score = 0u32;

    for question in &definition.questions {
        if !question.is_graded() {
            continue;
        }
        max_score += question.points;

        let Some(answer) = answers.get(&question.id) else {
            continue;
        };

        match (&question.kind, answer) {
            (QuestionKind::MultipleChoice { options }, AnswerValue::Text(selected)) => {
                if options.iter().any(|o| o.is_correct && o.id == *selected) {
                    raw_score += question.points;
                }
            }
            // All-or-nothing: the submitted set must equal the correct set
            // exactly. Partial selections earn no credit.
            (QuestionKind::Checkbox { options }, AnswerValue::Selected(selected)) => {
                let correct: BTreeSet<&str> = options
                    .iter()
                    .filter(|o| o.is_correct)
                    .map(|o| o.id.as_str())
                    .collect();
                let picked: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
                if picked == correct {
                    raw_score += question.points;
                }
            }
            // Subjective kinds, or an answer whose shape does not match the
            // question, earn nothing here.
            _ => {}
        }
    }

    ScoreBreakdown {
        raw_score,
        max_score,
    }
}

/// Normalize a raw breakdown to a 0-100 percentage.
pub fn percentage(raw_score: u32, max_score: u32) -> f64 {
    if max_score == 0 {
        0.0
    } else {
        f64::from(raw_score) / f64::from(max_score) * 100.0
    }
}

/// The auto-computed percentage offered to a grader as a starting value for
/// attempts that need a manual pass.
pub fn suggested_score(definition: &Questionnaire, attempt: &Attempt) -> f64 {
    let breakdown = auto_score(definition, &attempt.answers);
    percentage(breakdown.raw_score, breakdown.max_score)
}

/// Manually grade a submitted attempt.
///
/// The entered score replaces any auto-computed one. Score and feedback are
/// written together in one update; an out-of-range score writes nothing.
/// Re-grading an already graded attempt overwrites the previous pass.
pub async fn apply_manual_grade<S>(
    store: &S,
    attempt_id: Uuid,
    grader_id: Uuid,
    score: f64,
    feedback: Option<String>,
    now: DateTime<Utc>,
) -> Result<Attempt, EngineError>
where
    S: AttemptStore + ?Sized,
{
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(EngineError::validation(
            "score",
            "score must be between 0 and 100",
        ));
    }

    let mut attempt = store
        .find_attempt(attempt_id)
        .await?
        .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;

    if !attempt.is_submitted() {
        return Err(EngineError::validation(
            "attempt",
            "attempt has not been submitted yet",
        ));
    }

    attempt.score = Some(score);
    attempt.feedback = feedback;
    attempt.is_graded = true;
    attempt.graded_by = Some(grader_id);
    attempt.graded_at = Some(now);

    store.update_attempt(&attempt).await?;
    tracing::info!(
        attempt = %attempt.id,
        grader = %grader_id,
        score,
        "manual grade recorded"
    );
    Ok(attempt)
}
