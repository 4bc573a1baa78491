//! Definition validation. A draft may be saved with these surfaced as
//! warnings; publishing is refused while any remain.

use crate::domain::error::ValidationError;
use crate::domain::model::{QuestionDefinition, QuestionKind, Questionnaire};
use std::collections::HashSet;

/// Run every check against a definition and collect what failed. An empty
/// vec means the definition is publishable.
pub fn validate(questionnaire: &Questionnaire) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if questionnaire.title.trim().is_empty() {
        errors.push(ValidationError::new("title", "title must not be empty"));
    }

    if questionnaire.questions.is_empty() {
        errors.push(ValidationError::new(
            "questions",
            "questionnaire must have at least one question",
        ));
    }

    if questionnaire.max_attempts < 1 {
        errors.push(ValidationError::new(
            "max_attempts",
            "max_attempts must be at least 1",
        ));
    }

    if let Some(limit) = questionnaire.time_limit_minutes {
        if limit == 0 {
            errors.push(ValidationError::new(
                "time_limit_minutes",
                "time limit must be a positive number of minutes",
            ));
        }
    }

    match &questionnaire.targeting {
        Some(targeting) if targeting.is_empty() => {
            errors.push(ValidationError::new(
                "targeting",
                "targeting must name at least one learning path or student",
            ));
        }
        Some(_) => {}
        None => {
            errors.push(ValidationError::new(
                "targeting",
                "a published questionnaire must target someone",
            ));
        }
    }

    let mut seen_ids = HashSet::new();
    for question in &questionnaire.questions {
        if question.id.trim().is_empty() {
            errors.push(ValidationError::new("questions", "question id is empty"));
            continue;
        }
        if !seen_ids.insert(question.id.as_str()) {
            errors.push(ValidationError::new(
                &question.id,
                "duplicate question id",
            ));
            continue;
        }
        validate_question(question, &mut errors);
    }

    errors
}

fn validate_question(question: &QuestionDefinition, errors: &mut Vec<ValidationError>) {
    if question.prompt.trim().is_empty() {
        errors.push(ValidationError::new(&question.id, "prompt must not be empty"));
    }

    match &question.kind {
        QuestionKind::MultipleChoice { options } => {
            validate_options(question, options, errors);
            // A graded multiple_choice has exactly one correct option;
            // survey-only ones need none.
            let correct = options.iter().filter(|o| o.is_correct).count();
            if question.is_graded() && correct != 1 {
                errors.push(ValidationError::new(
                    &question.id,
                    format!(
                        "graded multiple_choice must mark exactly one correct option, found {correct}"
                    ),
                ));
            }
        }
        QuestionKind::Checkbox { options } => {
            // Zero-or-more correct options is fine for checkbox.
            validate_options(question, options, errors);
        }
        QuestionKind::LinearScale {
            min_value,
            max_value,
            ..
        } => {
            if min_value >= max_value {
                errors.push(ValidationError::new(
                    &question.id,
                    format!("linear_scale bounds invalid: {min_value} >= {max_value}"),
                ));
            }
        }
        QuestionKind::ShortAnswer | QuestionKind::LongAnswer | QuestionKind::Rating => {}
    }
}

fn validate_options(
    question: &QuestionDefinition,
    options: &[crate::domain::model::AnswerOption],
    errors: &mut Vec<ValidationError>,
) {
    if options.len() < 2 {
        errors.push(ValidationError::new(
            &question.id,
            format!("{} needs at least 2 options", question.kind.label()),
        ));
    }

    let mut seen = HashSet::new();
    for option in options {
        if option.id.trim().is_empty() {
            errors.push(ValidationError::new(&question.id, "option id is empty"));
        } else if !seen.insert(option.id.as_str()) {
            errors.push(ValidationError::new(
                &question.id,
                format!("duplicate option id {}", option.id),
            ));
        }
    }
}
