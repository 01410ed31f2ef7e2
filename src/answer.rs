use crate::assessment::{Question, QuestionType};
use crate::error::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One left/right pair of a matching question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

impl MatchPair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        MatchPair {
            left: left.into(),
            right: right.into(),
        }
    }

    fn encode(&self) -> String {
        format!("{}:{}", self.left, self.right)
    }
}

/// The answer given to one question, keyed by the kind of question it fits.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    /// Option ids for single choice, multiple choice and true/false.
    Choice(Vec<String>),
    /// Free text for short and long answers.
    Text(String),
    Numeric(f64),
    Date(NaiveDate),
    Matching(Vec<MatchPair>),
    /// Option ids in the chosen order.
    Ordering(Vec<String>),
    /// Reference (id or URL) of a file uploaded beforehand.
    FileReference(String),
}

impl ResponseValue {
    pub fn choice<S: Into<String>>(option_id: S) -> Self {
        ResponseValue::Choice(vec![option_id.into()])
    }

    pub fn choices<I, S>(option_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResponseValue::Choice(option_ids.into_iter().map(Into::into).collect())
    }

    pub fn text(text: impl Into<String>) -> Self {
        ResponseValue::Text(text.into())
    }

    /// An empty value counts as "not answered".
    pub fn is_empty(&self) -> bool {
        match self {
            ResponseValue::Choice(ids) | ResponseValue::Ordering(ids) => ids.is_empty(),
            ResponseValue::Text(text) | ResponseValue::FileReference(text) => {
                text.trim().is_empty()
            }
            ResponseValue::Matching(pairs) => pairs.is_empty(),
            ResponseValue::Numeric(_) | ResponseValue::Date(_) => false,
        }
    }

    /// Checks that the value has the shape the question's type demands.
    ///
    /// Only the shape is checked; correctness is for the server to decide.
    /// Empty values of the right kind are accepted.
    pub fn check_shape(&self, question: &Question) -> Result<(), ValidationError> {
        let mismatch = || ValidationError::ShapeMismatch {
            question_id: question.id.clone(),
            expected: question.question_type.expected_shape().to_string(),
        };
        let unknown_option = |option_id: &str| ValidationError::UnknownOption {
            question_id: question.id.clone(),
            option_id: option_id.to_string(),
        };

        match (question.question_type, self) {
            (kind, ResponseValue::Choice(ids)) if kind.is_choice() => {
                if kind.is_single_selection() && ids.len() > 1 {
                    return Err(mismatch());
                }
                if let Some(id) = ids.iter().find(|id| !question.has_option(id)) {
                    return Err(unknown_option(id));
                }
                if has_duplicates(ids) {
                    return Err(mismatch());
                }
                Ok(())
            }
            (QuestionType::ShortAnswer | QuestionType::LongAnswer, ResponseValue::Text(_)) => {
                Ok(())
            }
            (QuestionType::Numeric, ResponseValue::Numeric(n)) => {
                if n.is_finite() {
                    Ok(())
                } else {
                    Err(mismatch())
                }
            }
            (QuestionType::Date, ResponseValue::Date(_)) => Ok(()),
            (QuestionType::Matching, ResponseValue::Matching(pairs)) => {
                for pair in pairs {
                    if !question.has_option(&pair.left) {
                        return Err(unknown_option(&pair.left));
                    }
                    if !question.match_options.is_empty() && !question.has_match_option(&pair.right)
                    {
                        return Err(unknown_option(&pair.right));
                    }
                }
                let lefts: Vec<String> = pairs.iter().map(|p| p.left.clone()).collect();
                if has_duplicates(&lefts) {
                    return Err(mismatch());
                }
                Ok(())
            }
            (QuestionType::Ordering, ResponseValue::Ordering(ids)) => {
                if let Some(id) = ids.iter().find(|id| !question.has_option(id)) {
                    return Err(unknown_option(id));
                }
                if has_duplicates(ids) {
                    return Err(mismatch());
                }
                Ok(())
            }
            (QuestionType::FileUpload, ResponseValue::FileReference(_)) => Ok(()),
            _ => Err(mismatch()),
        }
    }
}

fn has_duplicates(ids: &[String]) -> bool {
    let mut seen: Vec<&String> = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.contains(&id) {
            return true;
        }
        seen.push(id);
    }
    false
}

/// A response as it is sent to the submit endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub question_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selected_options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub numeric_answer: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_answer: Option<NaiveDate>,
    /// Seconds spent on the question.
    pub time_spent: u64,
}

impl ResponsePayload {
    pub fn from_value(question_id: &str, value: &ResponseValue, time_spent: u64) -> Self {
        let mut payload = ResponsePayload {
            question_id: question_id.to_string(),
            time_spent,
            ..ResponsePayload::default()
        };
        match value {
            ResponseValue::Choice(ids) | ResponseValue::Ordering(ids) => {
                payload.selected_options = Some(ids.clone());
            }
            ResponseValue::Matching(pairs) => {
                payload.selected_options = Some(pairs.iter().map(MatchPair::encode).collect());
            }
            ResponseValue::Text(text) => payload.text_answer = Some(text.trim().to_string()),
            ResponseValue::FileReference(reference) => {
                payload.text_answer = Some(reference.clone())
            }
            ResponseValue::Numeric(n) => payload.numeric_answer = Some(*n),
            ResponseValue::Date(date) => payload.date_answer = Some(*date),
        }
        payload
    }
}
