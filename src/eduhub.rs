use crate::assessment::{Assessment, CatalogScope, ExamBody, Question};
use crate::attempt::SubmissionPayload;
use crate::attendance::{
    AttendanceReceipt, AttendanceRoute, AttendanceSheet, AttendanceSubmission, ExistingAttendance,
    RosterStudent,
};
use crate::cache::{query_key, QueryCache, QueryKey};
use crate::connection::{decode_payload, segment, ApiRequest, HttpTransport, Transport};
use crate::credentials::ApiCredentials;
use crate::error::ApiError;
use crate::result::AssessmentResult;
use chrono::NaiveDate;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Page size used when listing assessments.
pub const PAGE_LIMIT: usize = 50;

/// Hard stop for listings whose backend keeps answering full pages.
pub const MAX_PAGES: u32 = 100;

// The questions endpoint answers either a bare list or `{"questions": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionList {
    List(Vec<Question>),
    Keyed { questions: Vec<Question> },
}

// One page of the assessment listing: a bare list, or a keyed list with the
// paging information the backend may add.
#[derive(Deserialize)]
#[serde(untagged)]
enum AssessmentPage {
    List(Vec<Assessment>),
    Paged {
        #[serde(alias = "data", alias = "items")]
        assessments: Vec<Assessment>,
        #[serde(default)]
        total: Option<usize>,
        #[serde(default)]
        pagination: Option<Pagination>,
    },
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    total_pages: Option<u32>,
}

impl AssessmentPage {
    fn decode(value: Value) -> Result<AssessmentPage, ApiError> {
        match serde_json::from_value::<AssessmentPage>(value.clone()) {
            Ok(page) => Ok(page),
            Err(_) => decode_payload(value),
        }
    }

    fn into_parts(self) -> (Vec<Assessment>, Option<usize>, Option<u32>) {
        match self {
            AssessmentPage::List(assessments) => (assessments, None, None),
            AssessmentPage::Paged {
                assessments,
                total,
                pagination,
            } => {
                let pagination = pagination.unwrap_or_default();
                (assessments, total.or(pagination.total), pagination.total_pages)
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StudentList {
    List(Vec<RosterStudent>),
    Keyed { students: Vec<RosterStudent> },
}

/// Main interface to the EduHub backend.
///
/// Holds the transport and the query cache. Reads go through the cache,
/// mutations invalidate the keys they affect.
///
/// Example:
/// ```no_run
/// use eduhub_connector::{CatalogScope, EduHub};
///
/// let hub = EduHub::from_stored_credentials()?;
/// for assessment in hub.fetch_assessments(&CatalogScope::exam_body("waec").year(2021))? {
///     println!("{}", assessment.title);
/// }
/// # Ok::<(), eduhub_connector::ApiError>(())
/// ```
pub struct EduHub {
    transport: Arc<dyn Transport>,
    cache: QueryCache,
}

impl EduHub {
    /// Creates a hub talking HTTP to the API described by `credentials`.
    ///
    /// Arguments:
    /// - `credentials`: base URL and bearer token.
    ///
    /// Returns:
    /// - A hub with an empty cache using `DEFAULT_STALE_TIME`.
    pub fn new(credentials: ApiCredentials) -> Self {
        EduHub::with_transport(Arc::new(HttpTransport::new(credentials)))
    }

    /// Uses the stored credentials, asking for them when there are none.
    pub fn from_stored_credentials() -> Result<Self, ApiError> {
        Ok(EduHub::new(ApiCredentials::credentials()?))
    }

    /// Creates a hub on top of any `Transport`, e.g. a recorded one.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        EduHub {
            transport,
            cache: QueryCache::default(),
        }
    }

    /// Replaces the cache with one using `stale_time`.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.cache = QueryCache::new(stale_time);
        self
    }

    /// The query cache shared by all reads of this hub.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn send_json(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let response = self.transport.send(request)?.error_for_status()?;
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&response.body)?)
    }

    fn cached<T: DeserializeOwned>(&self, key: QueryKey, request: ApiRequest) -> Result<T, ApiError> {
        let value = self.cache.get_or_fetch(key, || self.send_json(&request))?;
        decode_payload(value)
    }

    /// Lists the exam bodies whose past questions can be explored.
    pub fn fetch_exam_bodies(&self) -> Result<Vec<ExamBody>, ApiError> {
        self.cached(
            query_key(["explore", "exam-bodies"]),
            ApiRequest::get("explore/exam-bodies"),
        )
    }

    /// Lists every assessment of the scope.
    ///
    /// Follows `page`/`limit` paging and stops on the first of: an empty or
    /// short page, a page that brings no new assessment, the total or page
    /// count announced by the backend, or `MAX_PAGES` pages.
    ///
    /// Arguments:
    /// - `scope`: exam body plus the optional subject, topic and year filters.
    ///
    /// Returns:
    /// - The assessments in server order, without duplicates.
    pub fn fetch_assessments(&self, scope: &CatalogScope) -> Result<Vec<Assessment>, ApiError> {
        let mut key = query_key(["explore", scope.exam_body_id.as_str(), "assessments"]);
        key.extend(scope.params().into_iter().map(|(k, v)| format!("{}={}", k, v)));

        let value = self.cache.get_or_fetch(key, || -> Result<Value, ApiError> {
            let path = format!(
                "explore/exam-bodies/{}/assessments",
                segment(&scope.exam_body_id)
            );
            let mut all_assessments: Vec<Assessment> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            let mut page: u32 = 1;
            loop {
                let mut request = ApiRequest::get(path.as_str());
                request.params = scope.params();
                let request = request.param("page", page).param("limit", PAGE_LIMIT);

                let (assessments, total, total_pages) =
                    AssessmentPage::decode(self.send_json(&request)?)?.into_parts();
                let count = assessments.len();
                let before = all_assessments.len();
                all_assessments.extend(assessments.into_iter().filter(|a| seen.insert(a.id.clone())));
                let added = all_assessments.len() - before;
                debug!(
                    "Page {} of {} returned {} assessments ({} new)",
                    page, path, count, added
                );

                if count < PAGE_LIMIT || added == 0 {
                    break;
                }
                if total.map_or(false, |total| all_assessments.len() >= total)
                    || total_pages.map_or(false, |pages| page >= pages)
                {
                    break;
                }
                if page >= MAX_PAGES {
                    warn!(
                        "Stopped listing {} after {} pages ({} assessments)",
                        path,
                        page,
                        all_assessments.len()
                    );
                    break;
                }
                page += 1;
            }
            Ok(serde_json::to_value(&all_assessments)?)
        })?;
        decode_payload(value)
    }

    /// Assessment metadata, without its questions.
    pub fn fetch_assessment(
        &self,
        exam_body_id: &str,
        assessment_id: &str,
    ) -> Result<Assessment, ApiError> {
        self.cached(
            query_key(["explore", exam_body_id, assessment_id]),
            ApiRequest::get(format!(
                "explore/exam-bodies/{}/assessments/{}",
                segment(exam_body_id),
                segment(assessment_id)
            )),
        )
    }

    /// Questions of an assessment. Correct answers are never part of them.
    pub fn fetch_questions(
        &self,
        exam_body_id: &str,
        assessment_id: &str,
    ) -> Result<Vec<Question>, ApiError> {
        let list: QuestionList = self.cached(
            query_key(["explore", exam_body_id, assessment_id, "questions"]),
            ApiRequest::get(format!(
                "explore/exam-bodies/{}/assessments/{}/questions",
                segment(exam_body_id),
                segment(assessment_id)
            )),
        )?;
        Ok(match list {
            QuestionList::List(questions) | QuestionList::Keyed { questions } => questions,
        })
    }

    /// The assessment with its questions, ready for an attempt.
    pub fn load_assessment(
        &self,
        exam_body_id: &str,
        assessment_id: &str,
    ) -> Result<Assessment, ApiError> {
        let mut assessment = self.fetch_assessment(exam_body_id, assessment_id)?;
        assessment.questions = self.fetch_questions(exam_body_id, assessment_id)?;
        if assessment.exam_body_id.is_none() {
            assessment.exam_body_id = Some(exam_body_id.to_string());
        }
        Ok(assessment)
    }

    /// Submits an attempt. Sent exactly once, never retried.
    ///
    /// Arguments:
    /// - `exam_body_id`, `assessment_id`: the assessment being answered.
    /// - `payload`: responses built by the attempt draft.
    ///
    /// Returns:
    /// - The scored result. Cached queries of the assessment are dropped.
    pub fn submit_assessment(
        &self,
        exam_body_id: &str,
        assessment_id: &str,
        payload: &SubmissionPayload,
    ) -> Result<AssessmentResult, ApiError> {
        let request = ApiRequest::post(
            format!(
                "explore/exam-bodies/{}/assessments/{}/submit",
                segment(exam_body_id),
                segment(assessment_id)
            ),
            serde_json::to_value(payload)?,
        );
        let result = decode_payload(self.send_json(&request)?)?;
        self.cache
            .invalidate(&query_key(["explore", exam_body_id, assessment_id]));
        Ok(result)
    }

    /// Interactive menu over the assessments of a scope. `None` when the user picks EXIT.
    pub fn choose_assessment(&self, scope: &CatalogScope) -> Result<Option<Assessment>, ApiError> {
        println!("Fetching assessments...");
        let assessments = self.fetch_assessments(scope)?;

        let mut menu_str: Vec<String> = assessments
            .iter()
            .map(|a| match a.year {
                Some(year) => format!("{} ({})", a.title, year),
                None => a.title.clone(),
            })
            .collect();
        menu_str.push("EXIT".to_string());

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Choose an assessment")
            .items(&menu_str)
            .default(0)
            .interact()?;

        match assessments.get(selection) {
            Some(chosen) => self
                .load_assessment(&scope.exam_body_id, &chosen.id)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Students enrolled in a class.
    pub fn fetch_class_roster(&self, class_id: &str) -> Result<Vec<RosterStudent>, ApiError> {
        let list: StudentList = self.cached(
            query_key(["roster", class_id]),
            ApiRequest::get(format!("teachers/classes/{}/students", segment(class_id))),
        )?;
        Ok(match list {
            StudentList::List(students) | StudentList::Keyed { students } => students,
        })
    }

    /// Attendance already recorded for the class and date, `None` if nothing was taken yet.
    pub fn fetch_attendance(
        &self,
        class_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ExistingAttendance>, ApiError> {
        let day = date.format("%Y-%m-%d").to_string();
        let request = ApiRequest::get(format!(
            "teachers/attendance/classes/{}/date/{}",
            segment(class_id),
            day
        ));
        let value = match self.cache.get_or_fetch(
            query_key(["attendance", class_id, day.as_str()]),
            || self.send_json(&request),
        ) {
            Ok(value) => value,
            Err(ApiError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let empty = match &value {
            Value::Null => true,
            Value::Object(map) => map.get("data").map_or(false, Value::is_null),
            _ => false,
        };
        if empty {
            return Ok(None);
        }
        let existing: ExistingAttendance = decode_payload(value)?;
        Ok(Some(existing).filter(ExistingAttendance::is_submitted))
    }

    /// Fetches the roster and what was already recorded, then builds the sheet.
    pub fn open_attendance_sheet(
        &self,
        class_id: &str,
        date: NaiveDate,
    ) -> Result<AttendanceSheet, ApiError> {
        let roster = self.fetch_class_roster(class_id)?;
        let existing = self.fetch_attendance(class_id, date)?;
        info!(
            "Opened attendance of class {} on {}: {} students, {}",
            class_id,
            date,
            roster.len(),
            if existing.is_some() {
                "already taken"
            } else {
                "not taken yet"
            }
        );
        Ok(AttendanceSheet::new(class_id, date, roster, existing))
    }

    /// Creates or updates the attendance session, depending on `session_id`.
    ///
    /// Arguments:
    /// - `submission`: the full record set of the class and date.
    ///
    /// Returns:
    /// - The receipt (empty when the server answered without a body). Cached
    ///   attendance of the class is dropped.
    pub fn submit_attendance(
        &self,
        submission: &AttendanceSubmission,
    ) -> Result<AttendanceReceipt, ApiError> {
        let body = serde_json::to_value(submission)?;
        let request = match submission.route() {
            AttendanceRoute::Create => ApiRequest::post("teachers/attendance/submit", body),
            AttendanceRoute::Update => ApiRequest::patch("teachers/attendance/update", body),
        };
        let value = self.send_json(&request)?;
        let receipt = if value.is_null() {
            AttendanceReceipt::default()
        } else {
            decode_payload(value)?
        };
        self.cache
            .invalidate(&query_key(["attendance", submission.class_id.as_str()]));
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn hub(transport: &Arc<ScriptedTransport>) -> EduHub {
        EduHub::with_transport(transport.clone())
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    #[test]
    fn exam_bodies_are_served_from_cache() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "GET",
            "explore/exam-bodies",
            200,
            r#"{"data":[{"id":"waec","name":"West African Examinations Council"}]}"#,
        );
        let hub = hub(&transport);

        let first = hub.fetch_exam_bodies().unwrap();
        let second = hub.fetch_exam_bodies().unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].id, "waec");
        assert_eq!(transport.count("GET", "explore/exam-bodies"), 1);
    }

    #[test]
    fn assessments_follow_pages_until_short_page() {
        let path = "explore/exam-bodies/waec/assessments";
        let full_page: Vec<Value> = (0..PAGE_LIMIT)
            .map(|i| json!({"id": format!("a{}", i), "title": "Maths"}))
            .collect();
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("GET", path, 200, &Value::Array(full_page).to_string());
        transport.respond("GET", path, 200, r#"[{"id":"last","title":"English"}]"#);
        let hub = hub(&transport);

        let scope = CatalogScope::exam_body("waec").subject("math").year(2021);
        let assessments = hub.fetch_assessments(&scope).unwrap();

        assert_eq!(assessments.len(), PAGE_LIMIT + 1);
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1]
            .params
            .contains(&("page".to_string(), "2".to_string())));
        assert!(requests[0]
            .params
            .contains(&("subjectId".to_string(), "math".to_string())));
    }

    fn page_of(first: usize, count: usize) -> Value {
        Value::Array(
            (first..first + count)
                .map(|i| json!({"id": format!("a{}", i), "title": "Maths"}))
                .collect(),
        )
    }

    #[test]
    fn listing_stops_when_pages_repeat() {
        let path = "explore/exam-bodies/waec/assessments";
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("GET", path, 200, &page_of(0, 60).to_string());
        let hub = hub(&transport);

        let assessments = hub
            .fetch_assessments(&CatalogScope::exam_body("waec"))
            .unwrap();

        assert_eq!(assessments.len(), 60);
        assert_eq!(transport.count("GET", path), 2);
    }

    #[test]
    fn listing_honours_announced_total() {
        let path = "explore/exam-bodies/waec/assessments";
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "GET",
            path,
            200,
            &json!({"data": page_of(0, PAGE_LIMIT), "total": PAGE_LIMIT}).to_string(),
        );
        transport.respond("GET", path, 200, &page_of(PAGE_LIMIT, PAGE_LIMIT).to_string());
        let hub = hub(&transport);

        let assessments = hub
            .fetch_assessments(&CatalogScope::exam_body("waec"))
            .unwrap();

        assert_eq!(assessments.len(), PAGE_LIMIT);
        assert_eq!(transport.count("GET", path), 1);
    }

    #[test]
    fn listing_is_capped_at_max_pages() {
        let path = "explore/exam-bodies/waec/assessments";
        let transport = Arc::new(ScriptedTransport::new());
        for page in 0..MAX_PAGES as usize + 3 {
            transport.respond("GET", path, 200, &page_of(page * PAGE_LIMIT, PAGE_LIMIT).to_string());
        }
        let hub = hub(&transport);

        let assessments = hub
            .fetch_assessments(&CatalogScope::exam_body("waec"))
            .unwrap();

        assert_eq!(transport.count("GET", path), MAX_PAGES as usize);
        assert_eq!(assessments.len(), MAX_PAGES as usize * PAGE_LIMIT);
    }

    #[test]
    fn load_assessment_combines_metadata_and_questions() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "GET",
            "explore/exam-bodies/waec/assessments/a1",
            200,
            r#"{"id":"a1","title":"Mathematics 2021","duration":30}"#,
        );
        transport.respond(
            "GET",
            "explore/exam-bodies/waec/assessments/a1/questions",
            200,
            r#"{"data":{"questions":[{"id":"q1","type":"NUMERIC"}]}}"#,
        );
        let hub = hub(&transport);

        let assessment = hub.load_assessment("waec", "a1").unwrap();

        assert_eq!(assessment.questions.len(), 1);
        assert_eq!(assessment.exam_body_id.as_deref(), Some("waec"));
    }

    #[test]
    fn failed_reads_map_status_to_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "GET",
            "explore/exam-bodies/waec/assessments/a1/questions",
            401,
            r#"{"message":"jwt expired"}"#,
        );
        let hub = hub(&transport);

        assert_eq!(
            hub.fetch_questions("waec", "a1").unwrap_err(),
            ApiError::Unauthorized
        );
        assert!(hub.cache().is_empty());
    }

    #[test]
    fn missing_attendance_is_none() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "GET",
            "teachers/attendance/classes/c1/date/2024-05-02",
            404,
            r#"{"message":"Not found"}"#,
        );
        let hub = hub(&transport);

        assert_eq!(hub.fetch_attendance("c1", date()).unwrap(), None);
    }

    #[test]
    fn open_sheet_loads_existing_records() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "GET",
            "teachers/classes/c1/students",
            200,
            r#"{"students":[{"id":"s1","first_name":"Ada","last_name":"Obi"},{"id":"s2","name":"Tunde Bello"}]}"#,
        );
        transport.respond(
            "GET",
            "teachers/attendance/classes/c1/date/2024-05-02",
            200,
            &json!({"data": {"session_id": "sess-9", "records": [
                {"student_id": "s1", "status": "PRESENT"},
                {"student_id": "s2", "status": "LATE"}
            ]}})
            .to_string(),
        );
        let hub = hub(&transport);

        let sheet = hub.open_attendance_sheet("c1", date()).unwrap();

        assert_eq!(sheet.session_id(), Some("sess-9"));
        assert!(sheet.is_complete());
        assert!(!sheet.can_submit());
        assert_eq!(sheet.roster()[0].display_name(), "Obi, Ada");
        assert_eq!(sheet.roster()[1].display_name(), "Tunde Bello");
    }

    #[test]
    fn attendance_submit_invalidates_class_queries() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("POST", "teachers/attendance/submit", 201, "");
        let hub = hub(&transport);
        hub.cache()
            .insert(query_key(["attendance", "c1", "2024-05-02"]), json!(null));
        hub.cache().insert(query_key(["roster", "c1"]), json!([]));

        let submission = AttendanceSubmission {
            class_id: "c1".to_string(),
            date: date(),
            attendance_records: vec![],
            notes: None,
            session_id: None,
        };
        let receipt = hub.submit_attendance(&submission).unwrap();

        assert_eq!(receipt, AttendanceReceipt::default());
        assert_eq!(hub.cache().len(), 1);
    }

    #[test]
    fn network_failure_on_submit_is_reported_as_retryable() {
        let transport = Arc::new(ScriptedTransport::new());
        let submit = "explore/exam-bodies/waec/assessments/a1/submit";
        transport.fail("POST", submit, ApiError::Network("connection reset".to_string()));
        let hub = hub(&transport);

        let err = hub
            .submit_assessment("waec", "a1", &SubmissionPayload::default())
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(transport.count("POST", submit), 1);
    }
}
