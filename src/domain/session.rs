//! The attempt/session state machine: start, auto-save, resume, timer
//! expiry and submission for one student's attempt at one questionnaire.
//!
//! All state lives in the attempt store; these functions are the only
//! writers. Time is passed in by the caller so the web layer stays the one
//! place that reads the wall clock.

use crate::domain::error::{EngineError, ValidationError};
use crate::domain::grading;
use crate::domain::model::{
    AnswerMap, AnswerValue, Attempt, QuestionKind, Questionnaire,
};
use crate::store::{AttemptStore, StoreError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Start a new attempt, or resume the open one.
///
/// Returning the existing in-progress attempt instead of creating a
/// duplicate is the core idempotency guarantee: two `start` calls in a row
/// hand back the same attempt id.
pub async fn start<S>(
    store: &S,
    questionnaire_id: Uuid,
    student_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Attempt, EngineError>
where
    S: AttemptStore + ?Sized,
{
    let questionnaire = store
        .find_questionnaire(questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", questionnaire_id))?;

    // Drafts are not delivered; students cannot see them.
    if !questionnaire.is_published {
        return Err(EngineError::not_found("questionnaire", questionnaire_id));
    }

    if let Some(existing) = store.find_in_progress(questionnaire_id, student_id).await? {
        return Ok(existing);
    }

    if past_due(&questionnaire, now) && !questionnaire.allow_late_submission {
        return Err(EngineError::Overdue);
    }

    let prior = store.count_attempts(questionnaire_id, student_id).await?;
    if prior >= questionnaire.max_attempts {
        return Err(EngineError::AttemptBudgetExhausted);
    }

    let attempt = Attempt {
        id: Uuid::new_v4(),
        questionnaire_id,
        student_id,
        attempt_number: prior as i32 + 1,
        answers: BTreeMap::new(),
        started_at: now,
        submitted_at: None,
        time_spent_seconds: None,
        late: false,
        score: None,
        max_score: None,
        is_graded: false,
        graded_by: None,
        graded_at: None,
        feedback: None,
    };

    match store.insert_attempt(&attempt).await {
        Ok(()) => {
            tracing::info!(
                attempt = %attempt.id,
                questionnaire = %questionnaire_id,
                student = %student_id,
                number = attempt.attempt_number,
                "attempt started"
            );
            Ok(attempt)
        }
        // Raced another start for the same pair; the winner's row is the
        // one to resume.
        Err(StoreError::Conflict) => store
            .find_in_progress(questionnaire_id, student_id)
            .await?
            .ok_or(EngineError::Store(StoreError::Conflict)),
        Err(err) => Err(err.into()),
    }
}

/// Auto-save a single answer. Merges into the attempt's answer map and
/// persists the whole map, so recovery after a client crash is just a read
/// of the latest persisted state.
pub async fn record_answer<S>(
    store: &S,
    attempt_id: Uuid,
    question_id: &str,
    value: AnswerValue,
    now: DateTime<Utc>,
) -> Result<Attempt, EngineError>
where
    S: AttemptStore + ?Sized,
{
    let mut attempt = store
        .find_attempt(attempt_id)
        .await?
        .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;

    if attempt.is_submitted() {
        return Err(EngineError::validation(
            "attempt",
            "attempt has already been submitted",
        ));
    }

    let questionnaire = store
        .find_questionnaire(attempt.questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", attempt.questionnaire_id))?;

    // Expiry is enforced lazily, here and at submit; there is no ticking
    // process on the server.
    if (deadline_exceeded(&questionnaire, &attempt, now) || past_due(&questionnaire, now))
        && !questionnaire.allow_late_submission
    {
        return Err(EngineError::Overdue);
    }

    validate_answer(&questionnaire, question_id, &value)?;

    attempt.answers.insert(question_id.to_string(), value);
    store.save_answers(attempt.id, &attempt.answers).await?;
    Ok(attempt)
}

/// Seconds left on the attempt's timer, clamped at zero. `None` when the
/// questionnaire has no time limit. Advisory for the client countdown; the
/// server recomputes it at submit time.
pub fn time_remaining(
    questionnaire: &Questionnaire,
    attempt: &Attempt,
    now: DateTime<Utc>,
) -> Option<i64> {
    questionnaire.time_limit_minutes.map(|limit| {
        let elapsed = (now - attempt.started_at).num_seconds();
        (i64::from(limit) * 60 - elapsed).max(0)
    })
}

/// Submit the attempt with its final answer map.
///
/// `auto` marks a timer-expiry submission fired by the client countdown; it
/// bypasses the required-question check since the student ran out of time.
/// The deadline itself is always recomputed server-side from `started_at`,
/// never taken from the client.
pub async fn submit<S>(
    store: &S,
    attempt_id: Uuid,
    answers: AnswerMap,
    auto: bool,
    now: DateTime<Utc>,
) -> Result<Attempt, EngineError>
where
    S: AttemptStore + ?Sized,
{
    let mut attempt = store
        .find_attempt(attempt_id)
        .await?
        .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;

    if attempt.is_submitted() {
        return Err(EngineError::validation(
            "attempt",
            "attempt has already been submitted",
        ));
    }

    let questionnaire = store
        .find_questionnaire(attempt.questionnaire_id)
        .await?
        .ok_or_else(|| EngineError::not_found("questionnaire", attempt.questionnaire_id))?;

    for (question_id, value) in answers {
        validate_answer(&questionnaire, &question_id, &value)?;
        attempt.answers.insert(question_id, value);
    }

    let mut late = false;
    if deadline_exceeded(&questionnaire, &attempt, now) || past_due(&questionnaire, now) {
        if questionnaire.allow_late_submission {
            late = true;
        } else {
            return Err(EngineError::Overdue);
        }
    }

    if !auto {
        let missing: Vec<ValidationError> = questionnaire
            .questions
            .iter()
            .filter(|q| q.required)
            .filter(|q| attempt.answers.get(&q.id).map_or(true, AnswerValue::is_empty))
            .map(|q| ValidationError::new(&q.id, "required question is unanswered"))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Validation(missing));
        }
    }

    attempt.submitted_at = Some(now);
    attempt.time_spent_seconds = Some((now - attempt.started_at).num_seconds());
    attempt.late = late;
    // Snapshot the score basis against the definition as it is right now;
    // later edits to the questionnaire never re-grade this attempt.
    attempt.max_score = Some(i64::from(questionnaire.graded_points_total()));

    if questionnaire.is_fully_auto_gradable() {
        let breakdown = grading::auto_score(&questionnaire, &attempt.answers);
        attempt.score = Some(grading::percentage(breakdown.raw_score, breakdown.max_score));
        attempt.is_graded = true;
        attempt.graded_at = Some(now);
    }

    store.update_attempt(&attempt).await?;
    tracing::info!(
        attempt = %attempt.id,
        auto,
        late,
        graded = attempt.is_graded,
        "attempt submitted"
    );
    Ok(attempt)
}

fn past_due(questionnaire: &Questionnaire, now: DateTime<Utc>) -> bool {
    questionnaire.due_date.map_or(false, |due| now > due)
}

fn deadline_exceeded(
    questionnaire: &Questionnaire,
    attempt: &Attempt,
    now: DateTime<Utc>,
) -> bool {
    questionnaire.time_limit_minutes.map_or(false, |limit| {
        (now - attempt.started_at).num_seconds() > i64::from(limit) * 60
    })
}

/// Check one answer against its question definition: the question must
/// exist and the value's shape must match the question kind.
fn validate_answer(
    questionnaire: &Questionnaire,
    question_id: &str,
    value: &AnswerValue,
) -> Result<(), EngineError> {
    let Some(question) = questionnaire.question(question_id) else {
        return Err(EngineError::validation(question_id, "unknown question"));
    };

    match (&question.kind, value) {
        (QuestionKind::MultipleChoice { options }, AnswerValue::Text(selected)) => {
            if !options.iter().any(|o| o.id == *selected) {
                return Err(EngineError::validation(
                    question_id,
                    format!("unknown option {selected}"),
                ));
            }
        }
        (QuestionKind::Checkbox { options }, AnswerValue::Selected(selected)) => {
            for id in selected {
                if !options.iter().any(|o| o.id == *id) {
                    return Err(EngineError::validation(
                        question_id,
                        format!("unknown option {id}"),
                    ));
                }
            }
        }
        (QuestionKind::ShortAnswer | QuestionKind::LongAnswer, AnswerValue::Text(_)) => {}
        (QuestionKind::Rating, AnswerValue::Scale(v)) => {
            if !(1..=5).contains(v) {
                return Err(EngineError::validation(
                    question_id,
                    format!("rating {v} outside 1-5"),
                ));
            }
        }
        (
            QuestionKind::LinearScale {
                min_value,
                max_value,
                ..
            },
            AnswerValue::Scale(v),
        ) => {
            if v < min_value || v > max_value {
                return Err(EngineError::validation(
                    question_id,
                    format!("value {v} outside {min_value}-{max_value}"),
                ));
            }
        }
        _ => {
            return Err(EngineError::validation(
                question_id,
                format!(
                    "answer shape does not match {} question",
                    question.kind.label()
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{AnswerOption, QuestionDefinition, Targeting};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn option(id: &str, correct: bool) -> AnswerOption {
        AnswerOption {
            id: id.to_string(),
            text: format!("option {id}"),
            is_correct: correct,
        }
    }

    fn multiple_choice(id: &str, points: u32, required: bool) -> QuestionDefinition {
        QuestionDefinition {
            id: id.to_string(),
            prompt: "Pick one".to_string(),
            description: None,
            required,
            points,
            kind: QuestionKind::MultipleChoice {
                options: vec![option("A", false), option("B", true)],
            },
        }
    }

    fn long_answer(id: &str, points: u32, required: bool) -> QuestionDefinition {
        QuestionDefinition {
            id: id.to_string(),
            prompt: "Explain".to_string(),
            description: None,
            required,
            points,
            kind: QuestionKind::LongAnswer,
        }
    }

    fn questionnaire(questions: Vec<QuestionDefinition>) -> Questionnaire {
        Questionnaire {
            id: Uuid::new_v4(),
            title: "Session fixture".to_string(),
            description: None,
            questions,
            targeting: Some(Targeting::StudentIds(BTreeSet::from([Uuid::new_v4()]))),
            due_date: None,
            allow_late_submission: false,
            show_correct_answers: false,
            max_attempts: 3,
            time_limit_minutes: None,
            is_published: true,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn store_with(questionnaire: &Questionnaire) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_questionnaire(questionnaire).await.unwrap();
        store
    }

    fn text(value: &str) -> AnswerValue {
        AnswerValue::Text(value.to_string())
    }

    #[tokio::test]
    async fn start_creates_first_attempt() {
        let q = questionnaire(vec![multiple_choice("q1", 10, true)]);
        let store = store_with(&q).await;
        let student = Uuid::new_v4();
        let now = Utc::now();

        let attempt = start(&store, q.id, student, now).await.unwrap();
        assert_eq!(attempt.attempt_number, 1);
        assert_eq!(attempt.started_at, now);
        assert!(attempt.answers.is_empty());
        assert_eq!(attempt.state(), crate::domain::model::AttemptState::InProgress);
    }

    #[tokio::test]
    async fn start_twice_resumes_the_same_attempt() {
        let q = questionnaire(vec![multiple_choice("q1", 10, true)]);
        let store = store_with(&q).await;
        let student = Uuid::new_v4();

        let first = start(&store, q.id, student, Utc::now()).await.unwrap();
        let second = start(&store, q.id, student, Utc::now()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn start_refuses_unpublished_questionnaire() {
        let mut q = questionnaire(vec![multiple_choice("q1", 10, true)]);
        q.is_published = false;
        let store = store_with(&q).await;

        let err = start(&store, q.id, Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn start_refuses_overdue_questionnaire() {
        let mut q = questionnaire(vec![multiple_choice("q1", 10, true)]);
        q.due_date = Some(Utc::now() - Duration::days(1));
        let store = store_with(&q).await;

        let err = start(&store, q.id, Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Overdue));
    }

    #[tokio::test]
    async fn start_past_due_allowed_when_late_submission_permitted() {
        let mut q = questionnaire(vec![multiple_choice("q1", 10, true)]);
        q.due_date = Some(Utc::now() - Duration::days(1));
        q.allow_late_submission = true;
        let store = store_with(&q).await;

        assert!(start(&store, q.id, Uuid::new_v4(), Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn attempt_numbers_are_gapless() {
        let q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        let store = store_with(&q).await;
        let student = Uuid::new_v4();

        for expected in 1..=3 {
            let attempt = start(&store, q.id, student, Utc::now()).await.unwrap();
            assert_eq!(attempt.attempt_number, expected);
            submit(&store, attempt.id, BTreeMap::new(), false, Utc::now())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn budget_exhausted_after_max_attempts() {
        let mut q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        q.max_attempts = 1;
        let store = store_with(&q).await;
        let student = Uuid::new_v4();

        let attempt = start(&store, q.id, student, Utc::now()).await.unwrap();
        submit(&store, attempt.id, BTreeMap::new(), false, Utc::now())
            .await
            .unwrap();

        let err = start(&store, q.id, student, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EngineError::AttemptBudgetExhausted));
    }

    #[tokio::test]
    async fn recorded_answers_survive_a_fresh_read() {
        let q = questionnaire(vec![
            multiple_choice("q1", 10, true),
            long_answer("q2", 0, false),
        ]);
        let store = store_with(&q).await;
        let student = Uuid::new_v4();

        let attempt = start(&store, q.id, student, Utc::now()).await.unwrap();
        record_answer(&store, attempt.id, "q1", text("B"), Utc::now())
            .await
            .unwrap();
        record_answer(&store, attempt.id, "q2", text("draft thoughts"), Utc::now())
            .await
            .unwrap();
        // Overwrite merges, last writer wins.
        record_answer(&store, attempt.id, "q2", text("final thoughts"), Utc::now())
            .await
            .unwrap();

        let reread = store.find_attempt(attempt.id).await.unwrap().unwrap();
        assert_eq!(reread.answers.len(), 2);
        assert_eq!(reread.answers["q1"], text("B"));
        assert_eq!(reread.answers["q2"], text("final thoughts"));

        let resumed = start(&store, q.id, student, Utc::now()).await.unwrap();
        assert_eq!(resumed.id, attempt.id);
        assert_eq!(resumed.answers, reread.answers);
    }

    #[tokio::test]
    async fn record_answer_rejects_bad_shapes() {
        let mut questions = vec![multiple_choice("q1", 10, true)];
        questions.push(QuestionDefinition {
            id: "q2".to_string(),
            prompt: "Rate it".to_string(),
            description: None,
            required: false,
            points: 0,
            kind: QuestionKind::Rating,
        });
        questions.push(QuestionDefinition {
            id: "q3".to_string(),
            prompt: "Scale it".to_string(),
            description: None,
            required: false,
            points: 0,
            kind: QuestionKind::LinearScale {
                min_value: 1,
                max_value: 10,
                min_label: None,
                max_label: None,
            },
        });
        let q = questionnaire(questions);
        let store = store_with(&q).await;
        let attempt = start(&store, q.id, Uuid::new_v4(), Utc::now()).await.unwrap();

        // Unknown question id.
        let err = record_answer(&store, attempt.id, "nope", text("B"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Unknown option id.
        assert!(record_answer(&store, attempt.id, "q1", text("Z"), Utc::now())
            .await
            .is_err());

        // Scale answers outside their bounds.
        assert!(
            record_answer(&store, attempt.id, "q2", AnswerValue::Scale(6), Utc::now())
                .await
                .is_err()
        );
        assert!(
            record_answer(&store, attempt.id, "q3", AnswerValue::Scale(11), Utc::now())
                .await
                .is_err()
        );

        // Set answer for a single-choice question.
        let err = record_answer(
            &store,
            attempt.id,
            "q1",
            AnswerValue::Selected(BTreeSet::from(["B".to_string()])),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn record_answer_refused_after_submission() {
        let q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        let store = store_with(&q).await;
        let attempt = start(&store, q.id, Uuid::new_v4(), Utc::now()).await.unwrap();
        submit(&store, attempt.id, BTreeMap::new(), false, Utc::now())
            .await
            .unwrap();

        let err = record_answer(&store, attempt.id, "q1", text("B"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_requires_answers_to_required_questions() {
        let q = questionnaire(vec![
            multiple_choice("q1", 10, true),
            long_answer("q2", 5, true),
        ]);
        let store = store_with(&q).await;
        let attempt = start(&store, q.id, Uuid::new_v4(), Utc::now()).await.unwrap();

        let answers = BTreeMap::from([("q1".to_string(), text("B"))]);
        let err = submit(&store, attempt.id, answers.clone(), false, Utc::now())
            .await
            .unwrap_err();
        let EngineError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "q2");

        // A whitespace-only answer is still empty.
        let mut with_blank = answers.clone();
        with_blank.insert("q2".to_string(), text("   "));
        assert!(submit(&store, attempt.id, with_blank, false, Utc::now())
            .await
            .is_err());

        // Timer-expiry auto-submit bypasses the check.
        let submitted = submit(&store, attempt.id, answers, true, Utc::now())
            .await
            .unwrap();
        assert!(submitted.is_submitted());
    }

    #[tokio::test]
    async fn submit_auto_grades_objective_questionnaires() {
        let q = questionnaire(vec![multiple_choice("q1", 10, true)]);
        let store = store_with(&q).await;
        let started = Utc::now();
        let attempt = start(&store, q.id, Uuid::new_v4(), started).await.unwrap();

        let submitted_at = started + Duration::minutes(7);
        let answers = BTreeMap::from([("q1".to_string(), text("B"))]);
        let submitted = submit(&store, attempt.id, answers, false, submitted_at)
            .await
            .unwrap();

        assert!(submitted.is_graded);
        assert_eq!(submitted.score, Some(100.0));
        assert_eq!(submitted.max_score, Some(10));
        assert_eq!(submitted.time_spent_seconds, Some(7 * 60));
        assert_eq!(submitted.graded_at, Some(submitted_at));
        assert!(!submitted.late);
        assert_eq!(submitted.state(), crate::domain::model::AttemptState::Graded);
    }

    #[tokio::test]
    async fn mixed_questionnaire_waits_for_manual_grading() {
        let q = questionnaire(vec![
            multiple_choice("q1", 10, true),
            long_answer("q2", 5, true),
        ]);
        let store = store_with(&q).await;
        let attempt = start(&store, q.id, Uuid::new_v4(), Utc::now()).await.unwrap();

        let answers = BTreeMap::from([
            ("q1".to_string(), text("B")),
            ("q2".to_string(), text("an essay")),
        ]);
        let submitted = submit(&store, attempt.id, answers, false, Utc::now())
            .await
            .unwrap();

        assert!(!submitted.is_graded);
        assert_eq!(submitted.score, None);
        assert_eq!(submitted.max_score, Some(15));

        // The auto score is only a suggestion for the grader.
        let suggested = grading::suggested_score(&q, &submitted);
        assert!((suggested - 10.0 / 15.0 * 100.0).abs() < 1e-9);

        let grader = Uuid::new_v4();
        let graded = grading::apply_manual_grade(
            &store,
            submitted.id,
            grader,
            88.0,
            Some("solid essay".to_string()),
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(graded.is_graded);
        assert_eq!(graded.score, Some(88.0));
        assert_eq!(graded.graded_by, Some(grader));
        assert_eq!(graded.feedback.as_deref(), Some("solid essay"));
    }

    #[tokio::test]
    async fn manual_grade_rejects_out_of_range_scores() {
        let q = questionnaire(vec![long_answer("q1", 5, true)]);
        let store = store_with(&q).await;
        let attempt = start(&store, q.id, Uuid::new_v4(), Utc::now()).await.unwrap();
        let answers = BTreeMap::from([("q1".to_string(), text("essay"))]);
        let submitted = submit(&store, attempt.id, answers, false, Utc::now())
            .await
            .unwrap();

        let err =
            grading::apply_manual_grade(&store, submitted.id, Uuid::new_v4(), 101.0, None, Utc::now())
                .await
                .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Nothing was written.
        let reread = store.find_attempt(submitted.id).await.unwrap().unwrap();
        assert!(!reread.is_graded);
        assert_eq!(reread.score, None);
    }

    #[tokio::test]
    async fn manual_grade_refused_before_submission() {
        let q = questionnaire(vec![long_answer("q1", 5, false)]);
        let store = store_with(&q).await;
        let attempt = start(&store, q.id, Uuid::new_v4(), Utc::now()).await.unwrap();

        let err =
            grading::apply_manual_grade(&store, attempt.id, Uuid::new_v4(), 50.0, None, Utc::now())
                .await
                .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn double_submit_is_refused() {
        let q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        let store = store_with(&q).await;
        let attempt = start(&store, q.id, Uuid::new_v4(), Utc::now()).await.unwrap();
        submit(&store, attempt.id, BTreeMap::new(), false, Utc::now())
            .await
            .unwrap();

        let err = submit(&store, attempt.id, BTreeMap::new(), false, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn timer_expiry_rejects_submit_unless_late_allowed() {
        let mut q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        q.time_limit_minutes = Some(30);
        let store = store_with(&q).await;
        let started = Utc::now() - Duration::minutes(45);
        let attempt = start(&store, q.id, Uuid::new_v4(), started).await.unwrap();

        let err = submit(&store, attempt.id, BTreeMap::new(), true, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Overdue));

        // Same timing with late submission allowed: accepted and flagged.
        let mut late_q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        late_q.time_limit_minutes = Some(30);
        late_q.allow_late_submission = true;
        let store = store_with(&late_q).await;
        let attempt = start(&store, late_q.id, Uuid::new_v4(), started).await.unwrap();
        let submitted = submit(&store, attempt.id, BTreeMap::new(), true, Utc::now())
            .await
            .unwrap();
        assert!(submitted.late);
    }

    #[tokio::test]
    async fn expired_timer_blocks_auto_save_when_late_disallowed() {
        let mut q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        q.time_limit_minutes = Some(10);
        let store = store_with(&q).await;
        let started = Utc::now() - Duration::minutes(20);
        let attempt = start(&store, q.id, Uuid::new_v4(), started).await.unwrap();

        let err = record_answer(&store, attempt.id, "q1", text("B"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Overdue));
    }

    #[tokio::test]
    async fn time_remaining_counts_down_and_clamps() {
        let mut q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        q.time_limit_minutes = Some(30);
        let store = store_with(&q).await;
        let started = Utc::now();
        let attempt = start(&store, q.id, Uuid::new_v4(), started).await.unwrap();

        assert_eq!(
            time_remaining(&q, &attempt, started + Duration::minutes(10)),
            Some(20 * 60)
        );
        assert_eq!(
            time_remaining(&q, &attempt, started + Duration::hours(2)),
            Some(0)
        );

        q.time_limit_minutes = None;
        assert_eq!(time_remaining(&q, &attempt, started), None);
    }

    #[tokio::test]
    async fn store_refuses_second_in_progress_attempt() {
        let q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        let store = store_with(&q).await;
        let student = Uuid::new_v4();
        let first = start(&store, q.id, student, Utc::now()).await.unwrap();

        // Bypass the engine to hit the store invariant directly, as a raced
        // second writer would.
        let mut duplicate = first.clone();
        duplicate.id = Uuid::new_v4();
        duplicate.attempt_number = 2;
        let err = store.insert_attempt(&duplicate).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn overdue_submit_with_late_allowed_is_flagged() {
        let mut q = questionnaire(vec![multiple_choice("q1", 10, false)]);
        q.due_date = Some(Utc::now() - Duration::hours(1));
        q.allow_late_submission = true;
        let store = store_with(&q).await;
        let attempt = start(&store, q.id, Uuid::new_v4(), Utc::now()).await.unwrap();

        let submitted = submit(&store, attempt.id, BTreeMap::new(), false, Utc::now())
            .await
            .unwrap();
        assert!(submitted.late);
    }
}
