use crate::assessment::Assessment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The attempt record created by the server on submit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attempt_number: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_spent: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub passed: bool,
    #[serde(default)]
    pub grade: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradedResponse {
    pub question_id: String,
    pub is_correct: bool,
    #[serde(default)]
    pub points_earned: f64,
    #[serde(default)]
    pub correct_answer: Option<Value>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Server flags saying what a result view may reveal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResultVisibility {
    #[serde(default)]
    pub show_correct_answers: bool,
    #[serde(default)]
    pub show_feedback: bool,
}

impl From<&Assessment> for ResultVisibility {
    fn from(assessment: &Assessment) -> Self {
        ResultVisibility {
            show_correct_answers: assessment.show_correct_answers,
            show_feedback: assessment.show_feedback,
        }
    }
}

/// Body of the submit endpoint's answer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    #[serde(default)]
    pub attempt: AttemptRecord,
    pub results: ScoreSummary,
    #[serde(default)]
    pub responses: Vec<GradedResponse>,
    #[serde(default)]
    pub feedback: Option<Value>,
    /// Present when the server sends its own flags along with the result.
    #[serde(default)]
    pub show_correct_answers: Option<bool>,
    #[serde(default)]
    pub show_feedback: Option<bool>,
}

/// One row of the rendered result.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionFeedback {
    pub question_id: String,
    pub is_correct: bool,
    pub points_earned: f64,
    pub correct_answer: Option<Value>,
    pub feedback: Option<String>,
}

/// What the user gets to see about a scored attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    pub passed: bool,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub questions: Vec<QuestionFeedback>,
    pub feedback: Option<String>,
}

impl ResultView {
    /// Builds the view, hiding whatever the server did not allow to show.
    ///
    /// Flags sent with the result win over the assessment's own flags.
    pub fn present(result: &AssessmentResult, fallback: ResultVisibility) -> ResultView {
        let visibility = ResultVisibility {
            show_correct_answers: result
                .show_correct_answers
                .unwrap_or(fallback.show_correct_answers),
            show_feedback: result.show_feedback.unwrap_or(fallback.show_feedback),
        };

        let questions = result
            .responses
            .iter()
            .map(|r| QuestionFeedback {
                question_id: r.question_id.clone(),
                is_correct: r.is_correct,
                points_earned: r.points_earned,
                correct_answer: if visibility.show_correct_answers {
                    r.correct_answer.clone()
                } else {
                    None
                },
                feedback: if visibility.show_feedback {
                    r.feedback.clone()
                } else {
                    None
                },
            })
            .collect();

        let feedback = if visibility.show_feedback {
            result.feedback.as_ref().and_then(feedback_text)
        } else {
            None
        };

        ResultView {
            passed: result.results.passed,
            total_score: result.results.total_score,
            max_score: result.results.max_score,
            percentage: result.results.percentage,
            questions,
            feedback,
        }
    }

    pub fn correct_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_correct).count()
    }
}

// Overall feedback is either a string or an object with a `message`/`summary`.
fn feedback_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => ["message", "summary", "text"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(String::from),
        _ => None,
    }
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} / {} ({:.1}%)",
            if self.passed { "PASSED" } else { "FAILED" },
            self.total_score,
            self.max_score,
            self.percentage
        )?;
        writeln!(
            f,
            "{} of {} correct",
            self.correct_count(),
            self.questions.len()
        )?;
        for (index, q) in self.questions.iter().enumerate() {
            write!(
                f,
                "{:>3}. {} ({} pts)",
                index + 1,
                if q.is_correct { "correct" } else { "wrong" },
                q.points_earned
            )?;
            if let Some(answer) = &q.correct_answer {
                write!(f, " answer: {}", answer)?;
            }
            if let Some(feedback) = &q.feedback {
                write!(f, " - {}", feedback)?;
            }
            writeln!(f)?;
        }
        if let Some(feedback) = &self.feedback {
            writeln!(f, "{}", feedback)?;
        }
        Ok(())
    }
}
