use serde_json::Value;
use std::fmt;

/// Message shown for any 401 answer from the backend.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again";

/// Errors detected locally, before any request leaves the process.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Required questions that have no (or an empty) response.
    UnansweredRequired(Vec<String>),
    /// The value does not fit the declared type of the question.
    ShapeMismatch {
        question_id: String,
        expected: String,
    },
    /// An option id that is not part of the question.
    UnknownOption {
        question_id: String,
        option_id: String,
    },
    UnknownQuestion(String),
    UnknownStudent(String),
    /// Students of the roster that still have no status.
    IncompleteRoster(Vec<String>),
    /// Nothing differs from the previously submitted snapshot.
    NoChanges,
    AttemptsExhausted {
        used: u32,
        max: u32,
    },
    AlreadySubmitted,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnansweredRequired(ids) => {
                write!(f, "Please answer all required questions: {}", ids.join(", "))
            }
            ValidationError::ShapeMismatch {
                question_id,
                expected,
            } => write!(
                f,
                "Answer for question {} must be {}",
                question_id, expected
            ),
            ValidationError::UnknownOption {
                question_id,
                option_id,
            } => write!(
                f,
                "Option {} does not belong to question {}",
                option_id, question_id
            ),
            ValidationError::UnknownQuestion(id) => write!(f, "Unknown question {}", id),
            ValidationError::UnknownStudent(id) => {
                write!(f, "Student {} is not on the class roster", id)
            }
            ValidationError::IncompleteRoster(ids) => write!(
                f,
                "Attendance is not marked for {} student(s): {}",
                ids.len(),
                ids.join(", ")
            ),
            ValidationError::NoChanges => {
                write!(f, "No changes since the last submitted attendance")
            }
            ValidationError::AttemptsExhausted { used, max } => write!(
                f,
                "Maximum number of attempts reached ({} of {})",
                used, max
            ),
            ValidationError::AlreadySubmitted => write!(f, "This attempt was already submitted"),
        }
    }
}

/// Error type returned by every operation of the crate.
///
/// The variants follow the way the backend answers are presented to a user:
/// validation problems never reach the network, 401/403/404 get their own
/// variants, and everything else keeps the server message verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    Validation(ValidationError),
    // 401
    Unauthorized,
    // 403
    Forbidden(String),
    // 404
    NotFound(String),
    Server { status: u16, message: String },
    Network(String),
    Decode(String),
    /// A submission for the same draft is already in flight.
    SubmissionPending,
    Credentials(String),
    /// An interactive terminal prompt could not be shown or read.
    Prompt(String),
}

impl ApiError {
    /// Builds the error for a non-success HTTP answer.
    pub fn from_status(status: u16, body: &str) -> ApiError {
        let message = extract_server_message(body)
            .unwrap_or_else(|| format!("Request failed with status code {}", status));
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            _ => ApiError::Server { status, message },
        }
    }

    /// Whether the user can simply try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_)
                | ApiError::Server { .. }
                | ApiError::Decode(_)
                | ApiError::SubmissionPending
        )
    }

    /// HTTP status behind the error, `None` for errors raised locally.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(e) => write!(f, "{}", e),
            ApiError::Unauthorized => write!(f, "{}", SESSION_EXPIRED_MESSAGE),
            ApiError::Forbidden(msg) => {
                write!(f, "You do not have permission to perform this action: {}", msg)
            }
            ApiError::NotFound(msg) => write!(f, "The requested resource was not found: {}", msg),
            ApiError::Server { message, .. } => write!(f, "{}", message),
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Decode(msg) => write!(f, "Unexpected response from server: {}", msg),
            ApiError::SubmissionPending => write!(f, "A submission is already in progress"),
            ApiError::Credentials(msg) => write!(f, "Credentials error: {}", msg),
            ApiError::Prompt(msg) => write!(f, "Terminal prompt failed: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl From<dialoguer::Error> for ApiError {
    fn from(err: dialoguer::Error) -> Self {
        ApiError::Prompt(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Pulls a human readable message out of an error body.
///
/// The backend answers with `{"message": "..."}`, `{"message": ["...", "..."]}`
/// or `{"error": "..."}`. Non-JSON bodies are returned as they are.
pub(crate) fn extract_server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let json: Value = match serde_json::from_str(trimmed) {
        Ok(json) => json,
        Err(_) => return Some(trimmed.to_string()),
    };
    for key in ["message", "error"] {
        match &json[key] {
            Value::String(s) if !s.is_empty() => return Some(s.clone()),
            Value::Array(items) if !items.is_empty() => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect();
                if !parts.is_empty() {
                    return Some(parts.join(", "));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert_eq!(ApiError::from_status(401, ""), ApiError::Unauthorized);
        assert!(matches!(
            ApiError::from_status(403, r#"{"message":"Teachers only"}"#),
            ApiError::Forbidden(m) if m == "Teachers only"
        ));
        assert!(matches!(
            ApiError::from_status(404, ""),
            ApiError::NotFound(_)
        ));
        assert_eq!(
            ApiError::from_status(422, r#"{"message":["date must be a date","class_id missing"]}"#),
            ApiError::Server {
                status: 422,
                message: "date must be a date, class_id missing".to_string()
            }
        );
    }

    #[test]
    fn unauthorized_reads_as_session_expired() {
        assert_eq!(ApiError::Unauthorized.to_string(), SESSION_EXPIRED_MESSAGE);
    }

    #[test]
    fn server_message_is_kept_verbatim() {
        let err = ApiError::from_status(500, r#"{"error":"Assessment is closed"}"#);
        assert_eq!(err.to_string(), "Assessment is closed");
        assert!(err.is_retryable());

        let plain = ApiError::from_status(502, "Bad Gateway");
        assert_eq!(plain.to_string(), "Bad Gateway");
    }

    #[test]
    fn validation_message_names_questions() {
        let err: ApiError =
            ValidationError::UnansweredRequired(vec!["q4".to_string()]).into();
        assert!(err.to_string().contains("q4"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn failed_prompt_is_not_a_network_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "not a terminal");
        let err = ApiError::from(dialoguer::Error::IO(io));

        assert!(matches!(err, ApiError::Prompt(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.status(), None);
    }
}
