use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// One selectable option of a multiple-choice or checkbox question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// The type-specific half of a question definition.
///
/// Keeping the variant payloads inside the tag (rather than scattering
/// optional fields across every question) lets the grading engine match
/// exhaustively on the kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<AnswerOption>,
    },
    Checkbox {
        options: Vec<AnswerOption>,
    },
    ShortAnswer,
    LongAnswer,
    /// Fixed 1-5 integer scale.
    Rating,
    LinearScale {
        min_value: i64,
        max_value: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_label: Option<String>,
    },
}

impl QuestionKind {
    pub fn label(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice { .. } => "multiple_choice",
            QuestionKind::Checkbox { .. } => "checkbox",
            QuestionKind::ShortAnswer => "short_answer",
            QuestionKind::LongAnswer => "long_answer",
            QuestionKind::Rating => "rating",
            QuestionKind::LinearScale { .. } => "linear_scale",
        }
    }

    pub fn options(&self) -> Option<&[AnswerOption]> {
        match self {
            QuestionKind::MultipleChoice { options } | QuestionKind::Checkbox { options } => {
                Some(options)
            }
            _ => None,
        }
    }

    /// Objective kinds the grading engine can score without a human.
    pub fn is_auto_gradable(&self) -> bool {
        matches!(
            self,
            QuestionKind::MultipleChoice { .. } | QuestionKind::Checkbox { .. }
        )
    }
}

/// A single question of a questionnaire. Immutable once the owning
/// questionnaire is published, except by re-editing a draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionDefinition {
    /// Stable within the questionnaire; answer maps key on it.
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// `0` means the question is ungraded (survey-only).
    #[serde(default)]
    pub points: u32,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl QuestionDefinition {
    /// Graded questions count toward the attempt's max score.
    pub fn is_graded(&self) -> bool {
        self.points > 0
    }
}

/// Who a questionnaire is delivered to. The two modes are mutually
/// exclusive per the student directory, hence a sum type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Targeting {
    LearningPaths(BTreeSet<String>),
    StudentIds(BTreeSet<Uuid>),
}

impl Targeting {
    pub fn is_empty(&self) -> bool {
        match self {
            Targeting::LearningPaths(paths) => paths.is_empty(),
            Targeting::StudentIds(ids) => ids.is_empty(),
        }
    }
}

/// The instructor-authored definition: questions, targeting and policy
/// flags. Identity is immutable once an attempt references it; later edits
/// never re-grade existing attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Questionnaire {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub questions: Vec<QuestionDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting: Option<Targeting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allow_late_submission: bool,
    #[serde(default)]
    pub show_correct_answers: bool,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
    #[serde(default)]
    pub is_published: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Questionnaire {
    pub fn question(&self, question_id: &str) -> Option<&QuestionDefinition> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Sum of points across graded questions.
    pub fn graded_points_total(&self) -> u32 {
        self.questions
            .iter()
            .filter(|q| q.is_graded())
            .map(|q| q.points)
            .sum()
    }

    /// True when every graded question is objective, i.e. the attempt can
    /// reach its final score at submit time without a manual pass.
    pub fn is_fully_auto_gradable(&self) -> bool {
        self.questions
            .iter()
            .filter(|q| q.is_graded())
            .all(|q| q.kind.is_auto_gradable())
    }
}

/// A student's answer to one question. The JSON shape depends on the
/// question kind: an option id for multiple_choice, a set of option ids for
/// checkbox, free text for short/long answer, an integer for rating and
/// linear_scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AnswerValue {
    Scale(i64),
    Text(String),
    Selected(BTreeSet<String>),
}

impl AnswerValue {
    /// An empty answer does not satisfy a `required` question.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Scale(_) => false,
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Selected(ids) => ids.is_empty(),
        }
    }
}

/// Answer maps key on question id.
pub type AnswerMap = BTreeMap<String, AnswerValue>;

/// Lifecycle of one attempt. `NotStarted` is the absence of a row; the
/// stored states only ever move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    InProgress,
    Submitted,
    Graded,
}

/// One student's single try at a questionnaire; the unit the session state
/// machine manages. Attempts are append-only records, there is no delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub questionnaire_id: Uuid,
    pub student_id: Uuid,
    /// 1-based, gapless per (questionnaire, student).
    pub attempt_number: i32,
    pub answers: AnswerMap,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_spent_seconds: Option<i64>,
    /// Submitted after the computed deadline, allowed by policy.
    pub late: bool,
    /// Normalized 0-100 score; only present once `is_graded` is set.
    pub score: Option<f64>,
    /// Graded points total, snapshotted against the definition at submit
    /// time. Later definition edits do not touch it.
    pub max_score: Option<i64>,
    pub is_graded: bool,
    pub graded_by: Option<Uuid>,
    pub graded_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
}

impl Attempt {
    pub fn state(&self) -> AttemptState {
        if self.is_graded {
            AttemptState::Graded
        } else if self.submitted_at.is_some() {
            AttemptState::Submitted
        } else {
            AttemptState::InProgress
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

/// Profile row from the external student directory. Referenced by id only;
/// the engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub learning_path: Option<String>,
}
