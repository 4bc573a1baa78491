//! Read-side reporting over the attempt set of one questionnaire. Pure
//! computations; the web layer resolves the roster and loads the attempts.

use crate::domain::model::{Attempt, Student};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireStats {
    pub roster_size: usize,
    pub submitted_count: usize,
    pub graded_count: usize,
    /// submitted / roster, 0 when the roster is empty.
    pub submission_rate: f64,
    /// Mean score over graded attempts; absent until something is graded.
    pub average_score: Option<f64>,
    /// Mean time-on-task over submitted attempts, in whole minutes.
    pub average_time_spent_minutes: Option<i64>,
}

pub fn summarize(attempts: &[Attempt], roster_size: usize) -> QuestionnaireStats {
    let submitted: Vec<&Attempt> = attempts.iter().filter(|a| a.is_submitted()).collect();

    let submission_rate = if roster_size == 0 {
        0.0
    } else {
        submitted.len() as f64 / roster_size as f64
    };

    let scores: Vec<f64> = attempts
        .iter()
        .filter(|a| a.is_graded)
        .filter_map(|a| a.score)
        .collect();
    let average_score = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    let times: Vec<i64> = submitted.iter().filter_map(|a| a.time_spent_seconds).collect();
    let average_time_spent_minutes = if times.is_empty() {
        None
    } else {
        let mean_seconds = times.iter().sum::<i64>() as f64 / times.len() as f64;
        Some((mean_seconds / 60.0).round() as i64)
    };

    QuestionnaireStats {
        roster_size,
        submitted_count: submitted.len(),
        graded_count: scores.len(),
        submission_rate,
        average_score,
        average_time_spent_minutes,
    }
}

/// Flat export of submitted attempts, most recent first. Pending attempts
/// are excluded; an ungraded score renders as `N/A`.
pub fn export_csv(attempts: &[Attempt], roster: &[Student]) -> String {
    let by_id: HashMap<Uuid, &Student> = roster.iter().map(|s| (s.id, s)).collect();

    let mut submitted: Vec<&Attempt> = attempts.iter().filter(|a| a.is_submitted()).collect();
    submitted.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

    let mut out = String::from("Student Name,Email,Submitted At,Score,Time Spent (min),Graded\n");
    for attempt in submitted {
        let (name, email) = match by_id.get(&attempt.student_id) {
            Some(student) => (student.name.as_str(), student.email.as_str()),
            // Student dropped off the roster after submitting; keep the row.
            None => ("unknown", ""),
        };
        let submitted_at = attempt
            .submitted_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_default();
        let score = match (attempt.is_graded, attempt.score) {
            (true, Some(score)) => format!("{score:.1}"),
            _ => "N/A".to_string(),
        };
        let minutes = attempt
            .time_spent_seconds
            .map(|secs| ((secs as f64) / 60.0).round() as i64)
            .unwrap_or(0);
        let graded = if attempt.is_graded { "yes" } else { "no" };

        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_field(name),
            csv_field(email),
            csv_field(&submitted_at),
            score,
            minutes,
            graded
        ));
    }
    out
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn student(name: &str, email: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            learning_path: Some("backend".to_string()),
        }
    }

    fn attempt(student_id: Uuid) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            questionnaire_id: Uuid::new_v4(),
            student_id,
            attempt_number: 1,
            answers: BTreeMap::new(),
            started_at: Utc::now() - Duration::minutes(30),
            submitted_at: None,
            time_spent_seconds: None,
            late: false,
            score: None,
            max_score: None,
            is_graded: false,
            graded_by: None,
            graded_at: None,
            feedback: None,
        }
    }

    fn submitted(student_id: Uuid, minutes_ago: i64, time_spent_seconds: i64) -> Attempt {
        let mut a = attempt(student_id);
        a.submitted_at = Some(Utc::now() - Duration::minutes(minutes_ago));
        a.time_spent_seconds = Some(time_spent_seconds);
        a
    }

    fn graded(student_id: Uuid, minutes_ago: i64, score: f64) -> Attempt {
        let mut a = submitted(student_id, minutes_ago, 600);
        a.score = Some(score);
        a.max_score = Some(10);
        a.is_graded = true;
        a.graded_at = a.submitted_at;
        a
    }

    #[test]
    fn summary_over_mixed_attempt_set() {
        // 10 students, 6 submitted, 4 of those graded with 80/90/70/60.
        let mut attempts = vec![
            graded(Uuid::new_v4(), 10, 80.0),
            graded(Uuid::new_v4(), 11, 90.0),
            graded(Uuid::new_v4(), 12, 70.0),
            graded(Uuid::new_v4(), 13, 60.0),
            submitted(Uuid::new_v4(), 14, 600),
            submitted(Uuid::new_v4(), 15, 600),
        ];
        attempts.push(attempt(Uuid::new_v4())); // still in progress

        let stats = summarize(&attempts, 10);
        assert_eq!(stats.roster_size, 10);
        assert_eq!(stats.submitted_count, 6);
        assert_eq!(stats.graded_count, 4);
        assert!((stats.submission_rate - 0.6).abs() < f64::EPSILON);
        assert_eq!(stats.average_score, Some(75.0));
        assert_eq!(stats.average_time_spent_minutes, Some(10));
    }

    #[test]
    fn empty_roster_yields_zero_rate() {
        let stats = summarize(&[], 0);
        assert_eq!(stats.submission_rate, 0.0);
        assert_eq!(stats.average_score, None);
        assert_eq!(stats.average_time_spent_minutes, None);
    }

    #[test]
    fn time_on_task_is_rounded_to_whole_minutes() {
        let attempts = vec![
            submitted(Uuid::new_v4(), 5, 100), // 1.67 min
            submitted(Uuid::new_v4(), 6, 200), // 3.33 min
        ];
        // mean = 150s = 2.5 min, rounds away from zero
        let stats = summarize(&attempts, 2);
        assert_eq!(stats.average_time_spent_minutes, Some(3));
    }

    #[test]
    fn export_excludes_pending_and_orders_most_recent_first() {
        let alice = student("Alice", "alice@example.com");
        let bob = student("Bob", "bob@example.com");
        let attempts = vec![
            graded(alice.id, 30, 82.5),
            submitted(bob.id, 5, 90),
            attempt(Uuid::new_v4()),
        ];
        let csv = export_csv(&attempts, &[alice, bob]);
        let lines: Vec<&str> = csv.trim_end().lines().collect();

        assert_eq!(
            lines[0],
            "Student Name,Email,Submitted At,Score,Time Spent (min),Graded"
        );
        assert_eq!(lines.len(), 3);
        // Bob submitted more recently, so his row comes first and is ungraded.
        assert!(lines[1].starts_with("Bob,bob@example.com,"));
        assert!(lines[1].contains(",N/A,"));
        assert!(lines[1].ends_with(",2,no"));
        assert!(lines[2].starts_with("Alice,alice@example.com,"));
        assert!(lines[2].contains(",82.5,"));
        assert!(lines[2].ends_with(",10,yes"));
    }

    #[test]
    fn export_quotes_fields_containing_commas() {
        let tricky = student("Doe, Jane", "jane@example.com");
        let attempts = vec![submitted(tricky.id, 1, 60)];
        let csv = export_csv(&attempts, &[tricky]);
        assert!(csv.contains("\"Doe, Jane\",jane@example.com"));
    }

    #[test]
    fn export_keeps_rows_for_students_missing_from_roster() {
        let attempts = vec![submitted(Uuid::new_v4(), 1, 60)];
        let csv = export_csv(&attempts, &[]);
        assert!(csv.lines().nth(1).unwrap().starts_with("unknown,,"));
    }
}
