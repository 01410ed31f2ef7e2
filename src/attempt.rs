use crate::answer::{ResponsePayload, ResponseValue};
use crate::assessment::Assessment;
use crate::error::{ApiError, ValidationError};
use crate::eduhub::EduHub;
use crate::mutation::PendingFlag;
use crate::result::{AssessmentResult, ResultView, ResultVisibility};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Body of the submit endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub responses: Vec<ResponsePayload>,
    /// Whole attempt duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_spent: Option<u64>,
}

/// Local, unsent state of one attempt.
///
/// Created empty when the attempt starts and discarded once the server has
/// accepted the submission.
#[derive(Debug, Clone)]
pub struct AttemptDraft {
    exam_body_id: String,
    assessment: Assessment,
    responses: HashMap<String, ResponseValue>,
    time_spent: HashMap<String, Duration>,
    focused: Option<(String, Instant)>,
    started: Instant,
    started_at: DateTime<Utc>,
    submitted: bool,
}

impl AttemptDraft {
    pub fn new(exam_body_id: impl Into<String>, assessment: Assessment) -> Self {
        AttemptDraft {
            exam_body_id: exam_body_id.into(),
            assessment,
            responses: HashMap::new(),
            time_spent: HashMap::new(),
            focused: None,
            started: Instant::now(),
            started_at: Utc::now(),
            submitted: false,
        }
    }

    /// The assessment being attempted.
    pub fn assessment(&self) -> &Assessment {
        &self.assessment
    }

    pub fn exam_body_id(&self) -> &str {
        &self.exam_body_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the server accepted the submission.
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Overwrites the response of one question after checking its shape.
    pub fn set_response(
        &mut self,
        question_id: &str,
        value: ResponseValue,
    ) -> Result<(), ValidationError> {
        if self.submitted {
            return Err(ValidationError::AlreadySubmitted);
        }
        let question = self
            .assessment
            .question(question_id)
            .ok_or_else(|| ValidationError::UnknownQuestion(question_id.to_string()))?;
        value.check_shape(question)?;
        self.responses.insert(question_id.to_string(), value);
        Ok(())
    }

    /// Removes the response of a question, returning it.
    pub fn clear_response(&mut self, question_id: &str) -> Option<ResponseValue> {
        self.responses.remove(question_id)
    }

    /// The stored response of a question, empty ones included.
    pub fn response(&self, question_id: &str) -> Option<&ResponseValue> {
        self.responses.get(question_id)
    }

    fn is_answered(&self, question_id: &str) -> bool {
        self.responses
            .get(question_id)
            .map_or(false, |value| !value.is_empty())
    }

    /// Questions with a non-empty response.
    pub fn answered_count(&self) -> usize {
        self.assessment
            .questions
            .iter()
            .filter(|q| self.is_answered(&q.id))
            .count()
    }

    /// Required questions without a non-empty response, in question order.
    pub fn unanswered_required(&self) -> Vec<String> {
        self.assessment
            .ordered_questions()
            .into_iter()
            .filter(|q| q.is_required && !self.is_answered(&q.id))
            .map(|q| q.id.clone())
            .collect()
    }

    /// Starts counting time for `question_id`, closing the previous question.
    pub fn focus_question(&mut self, question_id: &str) {
        self.unfocus();
        self.focused = Some((question_id.to_string(), Instant::now()));
    }

    /// Stops the running focus and adds its time to the question.
    pub fn unfocus(&mut self) {
        if let Some((id, since)) = self.focused.take() {
            *self.time_spent.entry(id).or_default() += since.elapsed();
        }
    }

    /// The question whose time is currently being counted.
    pub fn focused_question(&self) -> Option<&str> {
        self.focused.as_ref().map(|(id, _)| id.as_str())
    }

    /// Time spent on one question, including the running focus.
    pub fn time_spent_on(&self, question_id: &str) -> Duration {
        let mut spent = self
            .time_spent
            .get(question_id)
            .copied()
            .unwrap_or_default();
        if let Some((id, since)) = &self.focused {
            if id == question_id {
                spent += since.elapsed();
            }
        }
        spent
    }

    /// Time since the attempt started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the limit, `None` for untimed assessments.
    pub fn remaining_time(&self) -> Option<Duration> {
        if self.assessment.duration == 0 {
            return None;
        }
        let limit = Duration::from_secs(u64::from(self.assessment.duration) * 60);
        Some(limit.saturating_sub(self.elapsed()))
    }

    /// The time limit has run out. Submission is still allowed.
    pub fn is_expired(&self) -> bool {
        self.remaining_time() == Some(Duration::ZERO)
    }

    /// Assembles the payload, refusing when required questions are unanswered.
    pub fn build_submission(&self) -> Result<SubmissionPayload, ValidationError> {
        if self.submitted {
            return Err(ValidationError::AlreadySubmitted);
        }
        let unanswered = self.unanswered_required();
        if !unanswered.is_empty() {
            return Err(ValidationError::UnansweredRequired(unanswered));
        }

        let responses = self
            .assessment
            .ordered_questions()
            .into_iter()
            .filter_map(|q| {
                self.responses
                    .get(&q.id)
                    .filter(|value| !value.is_empty())
                    .map(|value| {
                        ResponsePayload::from_value(&q.id, value, self.time_spent_on(&q.id).as_secs())
                    })
            })
            .collect();

        Ok(SubmissionPayload {
            responses,
            time_spent: Some(self.elapsed().as_secs()),
        })
    }

    // The server result is the record from now on.
    fn discard(&mut self) {
        self.responses.clear();
        self.time_spent.clear();
        self.focused = None;
        self.submitted = true;
    }
}

/// Owns an attempt draft and performs its single submission.
///
/// All methods take `&self`, so the orchestrator can be shared between the
/// threads driving a UI; the pending flag keeps at most one submission in
/// flight.
pub struct AttemptOrchestrator<'a> {
    hub: &'a EduHub,
    draft: Mutex<AttemptDraft>,
    pending: PendingFlag,
    result: Mutex<Option<AssessmentResult>>,
}

impl<'a> AttemptOrchestrator<'a> {
    /// Starts a new attempt. `attempts_used` is the number of attempts the
    /// user already made on this assessment.
    pub fn start(
        hub: &'a EduHub,
        exam_body_id: &str,
        assessment: Assessment,
        attempts_used: u32,
    ) -> Result<Self, ApiError> {
        let max = assessment.max_attempts;
        if max > 0 && attempts_used >= max {
            return Err(ValidationError::AttemptsExhausted {
                used: attempts_used,
                max,
            }
            .into());
        }
        info!(
            "Starting attempt {} on assessment {} ({} questions)",
            attempts_used + 1,
            assessment.id,
            assessment.questions.len()
        );
        Ok(AttemptOrchestrator {
            hub,
            draft: Mutex::new(AttemptDraft::new(exam_body_id, assessment)),
            pending: PendingFlag::new(),
            result: Mutex::new(None),
        })
    }

    fn with_draft<R>(&self, f: impl FnOnce(&mut AttemptDraft) -> R) -> R {
        let mut draft = self.draft.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut draft)
    }

    /// Stores the answer of one question.
    ///
    /// Arguments:
    /// - `question_id`: id of a question of the assessment.
    /// - `value`: answer of the shape the question's type expects.
    ///
    /// Returns:
    /// - `ApiError::Validation` for unknown questions, unknown options or a
    ///   mismatched shape; the previous response is then kept.
    pub fn set_response(&self, question_id: &str, value: ResponseValue) -> Result<(), ApiError> {
        self.with_draft(|draft| draft.set_response(question_id, value))
            .map_err(ApiError::from)
    }

    /// Removes the answer of a question.
    pub fn clear_response(&self, question_id: &str) -> Option<ResponseValue> {
        self.with_draft(|draft| draft.clear_response(question_id))
    }

    /// Copy of the current answer of a question.
    pub fn response(&self, question_id: &str) -> Option<ResponseValue> {
        self.with_draft(|draft| draft.response(question_id).cloned())
    }

    /// Starts counting time for `question_id`.
    pub fn focus_question(&self, question_id: &str) {
        self.with_draft(|draft| draft.focus_question(question_id))
    }

    /// See `AttemptDraft::focused_question`.
    pub fn focused_question(&self) -> Option<String> {
        self.with_draft(|draft| draft.focused_question().map(String::from))
    }

    pub fn answered_count(&self) -> usize {
        self.with_draft(|draft| draft.answered_count())
    }

    /// Required questions still blocking the submission.
    pub fn unanswered_required(&self) -> Vec<String> {
        self.with_draft(|draft| draft.unanswered_required())
    }

    /// Time left, `None` for untimed assessments.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.with_draft(|draft| draft.remaining_time())
    }

    pub fn is_expired(&self) -> bool {
        self.with_draft(|draft| draft.is_expired())
    }

    /// The payload `submit` would send. Leaves the draft untouched; the
    /// running focus is counted without being stopped.
    pub fn build_submission(&self) -> Result<SubmissionPayload, ApiError> {
        self.with_draft(|draft| draft.build_submission())
            .map_err(ApiError::from)
    }

    /// A submission is in flight.
    pub fn is_pending(&self) -> bool {
        self.pending.is_pending()
    }

    /// Sends the attempt once.
    ///
    /// A call made while another submission is in flight fails with
    /// `ApiError::SubmissionPending` before any request. On failure the
    /// responses stay in place so the user can retry.
    pub fn submit(&self) -> Result<AssessmentResult, ApiError> {
        let _guard = self.pending.begin()?;

        let (exam_body_id, assessment_id) = self.with_draft(|draft| {
            (
                draft.exam_body_id().to_string(),
                draft.assessment().id.clone(),
            )
        });
        let payload = self.build_submission()?;

        match self
            .hub
            .submit_assessment(&exam_body_id, &assessment_id, &payload)
        {
            Ok(result) => {
                info!(
                    "Assessment {} submitted: {}/{} ({})",
                    assessment_id,
                    result.results.total_score,
                    result.results.max_score,
                    if result.results.passed { "passed" } else { "failed" }
                );
                self.with_draft(|draft| draft.discard());
                *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
                Ok(result)
            }
            Err(e) => {
                warn!("Submission of assessment {} failed: {}", assessment_id, e);
                Err(e)
            }
        }
    }

    /// The server result of a successful submission.
    pub fn result(&self) -> Option<AssessmentResult> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The result as it may be shown, honoring the assessment's flags.
    pub fn result_view(&self) -> Option<ResultView> {
        let visibility = self.with_draft(|draft| ResultVisibility::from(draft.assessment()));
        self.result()
            .map(|result| ResultView::present(&result, visibility))
    }

    pub fn is_submitted(&self) -> bool {
        self.with_draft(|draft| draft.is_submitted())
    }
}
