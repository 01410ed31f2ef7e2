//! # EduHub API Client Library
//!
//! This Rust library provides typed access to the EduHub school management backend.
//! It covers two flows: taking a CBT assessment (fetching questions, answering them,
//! submitting the attempt once and presenting the scored result) and marking the
//! daily attendance of a class.
//! HTTP requests go through a blocking `reqwest` client, bounded by a process-wide semaphore.
//!
//! ## Core Features
//!
//! - **Authentication and Configuration:** Loads the API URL and token from environment
//!   variables, a config file or the system keyring.
//! - **Assessment Catalog:** Lists exam bodies and their assessments, with cached reads.
//! - **Attempts:** Keeps the local draft of responses, validates answer shapes and
//!   submits at most once at a time.
//! - **Results:** Shows score and pass/fail, revealing correct answers and feedback only
//!   when the server allows it.
//! - **Attendance:** Marks each student of a roster and creates or updates the session.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! eduhub_connector = "0.1"
//! ```
//!
//! ### Examples
//!
//! Taking an assessment:
//! ```no_run
//! use eduhub_connector::{AttemptOrchestrator, EduHub, ResponseValue};
//!
//! let hub = EduHub::from_stored_credentials()?;
//! let assessment = hub.load_assessment("waec", "maths-2021")?;
//! let attempt = AttemptOrchestrator::start(&hub, "waec", assessment, 0)?;
//! attempt.set_response("q1", ResponseValue::choice("o2"))?;
//! attempt.submit()?;
//! if let Some(view) = attempt.result_view() {
//!     println!("{}", view);
//! }
//! # Ok::<(), eduhub_connector::ApiError>(())
//! ```
//!
//! Marking attendance:
//! ```no_run
//! use chrono::NaiveDate;
//! use eduhub_connector::{AttendanceController, EduHub};
//!
//! let hub = EduHub::from_stored_credentials()?;
//! let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
//! let attendance = AttendanceController::open(&hub, "class-1", date)?;
//! attendance.mark_all_present();
//! attendance.submit()?;
//! # Ok::<(), eduhub_connector::ApiError>(())
//! ```
mod answer; // Answer values and their wire form.
pub mod assessment;
mod attempt; // Local draft of an attempt and its submission.
pub mod attendance;
pub mod cache;
mod connection; // Transport to the EduHub API.
pub mod credentials; // Handles the storage and retrieval of API credentials.
pub mod eduhub;
mod error;
mod mutation;
mod result;

#[cfg(test)]
mod testing;

// Exports key structures for external use.
pub use answer::{MatchPair, ResponsePayload, ResponseValue};
pub use assessment::{Assessment, CatalogScope, ExamBody, Question, QuestionOption, QuestionType};
pub use attempt::{AttemptDraft, AttemptOrchestrator, SubmissionPayload};
pub use attendance::{
    AttendanceController, AttendanceReceipt, AttendanceRecordPayload, AttendanceRoute,
    AttendanceSheet, AttendanceStatus, AttendanceSubmission, ExistingAttendance, ProgressStats,
    RosterStudent,
};
pub use cache::{query_key, QueryCache, QueryKey, DEFAULT_STALE_TIME};
pub use connection::{ApiRequest, ApiResponse, HttpMethod, HttpTransport, Transport};
pub use credentials::ApiCredentials;
pub use eduhub::EduHub;
pub use error::{ApiError, ValidationError, SESSION_EXPIRED_MESSAGE};
pub use mutation::{PendingFlag, PendingGuard};
pub use result::{
    AssessmentResult, AttemptRecord, GradedResponse, QuestionFeedback, ResultView,
    ResultVisibility, ScoreSummary,
};
