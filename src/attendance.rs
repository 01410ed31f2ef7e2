use crate::eduhub::EduHub;
use crate::error::{ApiError, ValidationError};
use crate::mutation::PendingFlag;
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Status of one student on one day. `None` in the sheet means unmarked.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    /// Only ever set by the server.
    Excused,
    Late,
}

/// A student enrolled in the class.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RosterStudent {
    #[serde(alias = "student_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, alias = "full_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub admission_number: Option<String>,
}

impl RosterStudent {
    /// "Last, First" when both parts are known, else the best available name.
    pub fn display_name(&self) -> String {
        match (&self.last_name, &self.first_name, &self.name) {
            (Some(last), Some(first), _) => format!("{}, {}", last, first),
            (_, _, Some(name)) => name.clone(),
            (Some(last), None, None) => last.clone(),
            (None, Some(first), None) => first.clone(),
            (None, None, None) => self.id.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttendanceRecordPayload {
    pub student_id: String,
    pub status: AttendanceStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub remarks: Option<String>,
}

/// What the server already holds for a class and date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ExistingAttendance {
    #[serde(default, alias = "id")]
    pub session_id: Option<String>,
    #[serde(default, alias = "records")]
    pub attendance_records: Vec<AttendanceRecordPayload>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExistingAttendance {
    /// Whether the server actually holds a session or records.
    pub fn is_submitted(&self) -> bool {
        self.session_id.is_some() || !self.attendance_records.is_empty()
    }
}

/// Which endpoint a submission goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceRoute {
    Create,
    Update,
}

/// Body of the attendance submit and update endpoints.
///
/// Always the full record set, never a delta.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttendanceSubmission {
    pub class_id: String,
    pub date: NaiveDate,
    pub attendance_records: Vec<AttendanceRecordPayload>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
}

impl AttendanceSubmission {
    /// Update when the session already exists, create otherwise.
    pub fn route(&self) -> AttendanceRoute {
        if self.session_id.is_some() {
            AttendanceRoute::Update
        } else {
            AttendanceRoute::Create
        }
    }
}

/// Server answer to a submission.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AttendanceReceipt {
    #[serde(default, alias = "id")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressStats {
    pub marked: usize,
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    /// Share of marked students, rounded to a whole percent.
    pub percentage: u32,
}

/// Attendance of one class on one date, as edited by the teacher.
#[derive(Debug, Clone)]
pub struct AttendanceSheet {
    class_id: String,
    date: NaiveDate,
    roster: Vec<RosterStudent>,
    statuses: HashMap<String, Option<AttendanceStatus>>,
    snapshot: Option<HashMap<String, AttendanceStatus>>,
    session_id: Option<String>,
    notes: Option<String>,
    saved_notes: Option<String>,
}

impl AttendanceSheet {
    /// Builds the sheet from the roster and, when present, what the server
    /// already holds. Every roster student gets exactly one entry.
    pub fn new(
        class_id: impl Into<String>,
        date: NaiveDate,
        roster: Vec<RosterStudent>,
        existing: Option<ExistingAttendance>,
    ) -> Self {
        let mut statuses: HashMap<String, Option<AttendanceStatus>> =
            roster.iter().map(|s| (s.id.clone(), None)).collect();

        let mut snapshot = None;
        let mut session_id = None;
        let mut notes = None;
        if let Some(existing) = existing.filter(ExistingAttendance::is_submitted) {
            let mut saved = HashMap::new();
            for record in existing.attendance_records {
                match statuses.get_mut(&record.student_id) {
                    Some(entry) => {
                        *entry = Some(record.status);
                        saved.insert(record.student_id, record.status);
                    }
                    None => warn!(
                        "Ignoring attendance of student {} who is not on the roster",
                        record.student_id
                    ),
                }
            }
            snapshot = Some(saved);
            session_id = existing.session_id;
            notes = existing.notes;
        }

        AttendanceSheet {
            class_id: class_id.into(),
            date,
            roster,
            statuses,
            snapshot,
            session_id,
            saved_notes: notes.clone(),
            notes,
        }
    }

    /// Class the sheet belongs to.
    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    /// Day being marked.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn roster(&self) -> &[RosterStudent] {
        &self.roster
    }

    /// Server session of this class and date, once one exists.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether the server already held attendance when the sheet was built
    /// or a submission has since succeeded.
    pub fn has_prior_submission(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Sets the free-text notes sent with the submission. Blank notes clear them.
    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes.filter(|n| !n.trim().is_empty());
    }

    /// Current status of a student, `None` when unmarked or not on the roster.
    pub fn status(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.statuses.get(student_id).copied().flatten()
    }

    /// Clicking a control: sets `status`, or unmarks the student when it is
    /// already the current status. Returns the new status.
    pub fn toggle(
        &mut self,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<Option<AttendanceStatus>, ValidationError> {
        let entry = self
            .statuses
            .get_mut(student_id)
            .ok_or_else(|| ValidationError::UnknownStudent(student_id.to_string()))?;
        *entry = if *entry == Some(status) {
            None
        } else {
            Some(status)
        };
        Ok(*entry)
    }

    /// Overwrites every student, excused ones included.
    pub fn mark_all(&mut self, status: AttendanceStatus) {
        for entry in self.statuses.values_mut() {
            *entry = Some(status);
        }
    }

    /// Bulk action: everyone PRESENT.
    pub fn mark_all_present(&mut self) {
        self.mark_all(AttendanceStatus::Present);
    }

    /// Bulk action: everyone ABSENT.
    pub fn mark_all_absent(&mut self) {
        self.mark_all(AttendanceStatus::Absent);
    }

    /// Back to what the server holds (or all unmarked).
    pub fn reset(&mut self) {
        for (id, entry) in self.statuses.iter_mut() {
            *entry = self
                .snapshot
                .as_ref()
                .and_then(|saved| saved.get(id).copied());
        }
        self.notes = self.saved_notes.clone();
    }

    /// Roster students without a status, in roster order.
    pub fn unmarked_students(&self) -> Vec<String> {
        self.roster
            .iter()
            .filter(|s| self.status(&s.id).is_none())
            .map(|s| s.id.clone())
            .collect()
    }

    /// Every roster student has a status.
    pub fn is_complete(&self) -> bool {
        self.statuses.values().all(Option::is_some)
    }

    /// Students whose status differs from the submitted snapshot.
    pub fn changed_students(&self) -> Vec<String> {
        self.roster
            .iter()
            .filter(|s| {
                let saved = self
                    .snapshot
                    .as_ref()
                    .and_then(|saved| saved.get(&s.id).copied());
                saved != self.status(&s.id)
            })
            .map(|s| s.id.clone())
            .collect()
    }

    /// Always true before the first submission; afterwards, whether any
    /// status differs from the snapshot.
    pub fn has_changes(&self) -> bool {
        match &self.snapshot {
            None => true,
            Some(_) => !self.changed_students().is_empty(),
        }
    }

    /// Everyone marked, and either nothing was submitted yet or something changed.
    pub fn can_submit(&self) -> bool {
        self.is_complete() && self.has_changes()
    }

    /// Counts for the progress bar.
    ///
    /// Returns:
    /// - `marked` and `total` over the roster, `present`/`absent` for those two
    ///   statuses only, and the rounded share of marked students (0 for an
    ///   empty roster).
    pub fn progress_stats(&self) -> ProgressStats {
        let total = self.roster.len();
        let mut stats = ProgressStats {
            total,
            ..ProgressStats::default()
        };
        for student in &self.roster {
            match self.status(&student.id) {
                Some(AttendanceStatus::Present) => stats.present += 1,
                Some(AttendanceStatus::Absent) => stats.absent += 1,
                _ => {}
            }
            if self.status(&student.id).is_some() {
                stats.marked += 1;
            }
        }
        if total > 0 {
            stats.percentage = ((stats.marked as f64 * 100.0) / total as f64).round() as u32;
        }
        stats
    }

    /// The full record set, in roster order.
    pub fn build_submission(&self) -> Result<AttendanceSubmission, ValidationError> {
        let unmarked = self.unmarked_students();
        if !unmarked.is_empty() {
            return Err(ValidationError::IncompleteRoster(unmarked));
        }
        if !self.has_changes() {
            return Err(ValidationError::NoChanges);
        }
        let attendance_records = self
            .roster
            .iter()
            .filter_map(|s| {
                self.status(&s.id).map(|status| AttendanceRecordPayload {
                    student_id: s.id.clone(),
                    status,
                    remarks: None,
                })
            })
            .collect();

        Ok(AttendanceSubmission {
            class_id: self.class_id.clone(),
            date: self.date,
            attendance_records,
            notes: self.notes.clone(),
            session_id: self.session_id.clone(),
        })
    }

    /// Replaces marks, snapshot, session id and notes with the server state.
    ///
    /// Students missing from `existing` end up unmarked.
    pub fn sync(&mut self, existing: ExistingAttendance) {
        let mut saved = HashMap::new();
        for record in existing.attendance_records {
            if self.statuses.contains_key(&record.student_id) {
                saved.insert(record.student_id, record.status);
            }
        }
        for (id, entry) in self.statuses.iter_mut() {
            *entry = saved.get(id).copied();
        }
        self.snapshot = Some(saved);
        if existing.session_id.is_some() {
            self.session_id = existing.session_id;
        }
        self.notes = existing.notes;
        self.saved_notes = self.notes.clone();
    }

    /// The submitted state becomes the new snapshot.
    ///
    /// Keeps the current session id when the receipt carries none.
    pub fn accept(&mut self, receipt: &AttendanceReceipt) {
        let saved = self
            .statuses
            .iter()
            .filter_map(|(id, status)| status.map(|s| (id.clone(), s)))
            .collect();
        self.snapshot = Some(saved);
        self.saved_notes = self.notes.clone();
        if receipt.session_id.is_some() {
            self.session_id = receipt.session_id.clone();
        }
    }
}

/// Shares an attendance sheet and submits it at most once at a time.
pub struct AttendanceController<'a> {
    hub: &'a EduHub,
    sheet: Mutex<AttendanceSheet>,
    pending: PendingFlag,
}

impl<'a> AttendanceController<'a> {
    /// Wraps an already built sheet.
    pub fn new(hub: &'a EduHub, sheet: AttendanceSheet) -> Self {
        AttendanceController {
            hub,
            sheet: Mutex::new(sheet),
            pending: PendingFlag::new(),
        }
    }

    /// Fetches the roster and existing state, then wraps them.
    pub fn open(hub: &'a EduHub, class_id: &str, date: NaiveDate) -> Result<Self, ApiError> {
        let sheet = hub.open_attendance_sheet(class_id, date)?;
        Ok(AttendanceController::new(hub, sheet))
    }

    /// Runs `f` with the sheet locked.
    pub fn with_sheet<R>(&self, f: impl FnOnce(&mut AttendanceSheet) -> R) -> R {
        let mut sheet = self.sheet.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut sheet)
    }

    /// Toggles one student, see `AttendanceSheet::toggle`.
    pub fn toggle(
        &self,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<Option<AttendanceStatus>, ApiError> {
        self.with_sheet(|sheet| sheet.toggle(student_id, status))
            .map_err(ApiError::from)
    }

    pub fn mark_all_present(&self) {
        self.with_sheet(AttendanceSheet::mark_all_present)
    }

    pub fn mark_all_absent(&self) {
        self.with_sheet(AttendanceSheet::mark_all_absent)
    }

    /// No submission in flight and the sheet itself can be submitted.
    pub fn can_submit(&self) -> bool {
        !self.pending.is_pending() && self.with_sheet(|sheet| sheet.can_submit())
    }

    pub fn progress_stats(&self) -> ProgressStats {
        self.with_sheet(|sheet| sheet.progress_stats())
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_pending()
    }

    // A create answered without a session id: read the session back so the
    // next save goes to the update endpoint.
    fn refresh_session(&self, class_id: &str, date: NaiveDate) {
        match self.hub.fetch_attendance(class_id, date) {
            Ok(Some(existing)) => self.with_sheet(|sheet| sheet.sync(existing)),
            Ok(None) => warn!(
                "Attendance for class {} on {} was saved but cannot be read back",
                class_id, date
            ),
            Err(e) => warn!(
                "Reading back attendance for class {} on {} failed: {}",
                class_id, date, e
            ),
        }
    }

    /// Sends the full record set to the create or update endpoint.
    ///
    /// A call made while another submission is in flight fails with
    /// `ApiError::SubmissionPending` before any request. When the create
    /// answer carries no session id, the saved attendance is fetched again
    /// so later saves update the same session.
    ///
    /// Returns:
    /// - The server receipt; the sheet's snapshot then matches what was sent.
    pub fn submit(&self) -> Result<AttendanceReceipt, ApiError> {
        let _guard = self.pending.begin()?;
        let submission = self.with_sheet(|sheet| sheet.build_submission())?;

        match self.hub.submit_attendance(&submission) {
            Ok(receipt) => {
                info!(
                    "Attendance for class {} on {} saved ({} records)",
                    submission.class_id,
                    submission.date,
                    submission.attendance_records.len()
                );
                let session_known = self.with_sheet(|sheet| {
                    sheet.accept(&receipt);
                    sheet.session_id().is_some()
                });
                if !session_known {
                    self.refresh_session(&submission.class_id, submission.date);
                }
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    "Attendance for class {} on {} failed: {}",
                    submission.class_id, submission.date, e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    const CREATE: &str = "teachers/attendance/submit";
    const UPDATE: &str = "teachers/attendance/update";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    fn roster() -> Vec<RosterStudent> {
        ["s1", "s2", "s3"]
            .iter()
            .map(|id| RosterStudent {
                id: id.to_string(),
                ..RosterStudent::default()
            })
            .collect()
    }

    fn existing() -> ExistingAttendance {
        ExistingAttendance {
            session_id: Some("sess-9".to_string()),
            attendance_records: vec![
                AttendanceRecordPayload {
                    student_id: "s1".to_string(),
                    status: AttendanceStatus::Present,
                    remarks: None,
                },
                AttendanceRecordPayload {
                    student_id: "s2".to_string(),
                    status: AttendanceStatus::Excused,
                    remarks: None,
                },
                AttendanceRecordPayload {
                    student_id: "s3".to_string(),
                    status: AttendanceStatus::Absent,
                    remarks: None,
                },
            ],
            notes: None,
        }
    }

    #[test]
    fn toggling_the_active_status_unmarks() {
        let mut sheet = AttendanceSheet::new("c1", date(), roster(), None);

        assert_eq!(
            sheet.toggle("s1", AttendanceStatus::Present),
            Ok(Some(AttendanceStatus::Present))
        );
        assert_eq!(
            sheet.toggle("s1", AttendanceStatus::Absent),
            Ok(Some(AttendanceStatus::Absent))
        );
        assert_eq!(sheet.toggle("s1", AttendanceStatus::Absent), Ok(None));
        assert_eq!(sheet.status("s1"), None);
        assert_eq!(
            sheet.toggle("nobody", AttendanceStatus::Present),
            Err(ValidationError::UnknownStudent("nobody".to_string()))
        );
    }

    #[test]
    fn cannot_submit_with_unmarked_students() {
        let mut sheet = AttendanceSheet::new("c1", date(), roster(), None);
        sheet.toggle("s1", AttendanceStatus::Present).unwrap();
        sheet.toggle("s2", AttendanceStatus::Absent).unwrap();

        assert!(!sheet.can_submit());
        assert_eq!(
            sheet.build_submission(),
            Err(ValidationError::IncompleteRoster(vec!["s3".to_string()]))
        );
    }

    #[test]
    fn progress_stats_for_full_roster() {
        let mut sheet = AttendanceSheet::new("c1", date(), roster(), None);
        sheet.toggle("s1", AttendanceStatus::Present).unwrap();
        sheet.toggle("s2", AttendanceStatus::Present).unwrap();
        sheet.toggle("s3", AttendanceStatus::Absent).unwrap();

        assert_eq!(
            sheet.progress_stats(),
            ProgressStats {
                marked: 3,
                total: 3,
                present: 2,
                absent: 1,
                percentage: 100
            }
        );
        assert!(sheet.can_submit());
    }

    #[test]
    fn partial_progress_rounds_percentage() {
        let mut sheet = AttendanceSheet::new("c1", date(), roster(), None);
        sheet.toggle("s1", AttendanceStatus::Present).unwrap();
        assert_eq!(sheet.progress_stats().percentage, 33);

        let empty = AttendanceSheet::new("c1", date(), vec![], None);
        assert_eq!(empty.progress_stats().percentage, 0);
    }

    #[test]
    fn unchanged_snapshot_blocks_resubmission() {
        let mut sheet = AttendanceSheet::new("c1", date(), roster(), Some(existing()));

        assert!(sheet.is_complete());
        assert!(!sheet.can_submit());
        assert_eq!(sheet.build_submission(), Err(ValidationError::NoChanges));

        sheet.toggle("s3", AttendanceStatus::Present).unwrap();
        assert!(sheet.can_submit());
        assert_eq!(sheet.changed_students(), vec!["s3".to_string()]);

        sheet.toggle("s3", AttendanceStatus::Absent).unwrap();
        assert!(!sheet.can_submit());
    }

    #[test]
    fn bulk_action_overwrites_excused_students() {
        let mut sheet = AttendanceSheet::new("c1", date(), roster(), Some(existing()));
        sheet.mark_all_present();

        assert_eq!(sheet.status("s2"), Some(AttendanceStatus::Present));
        assert_eq!(sheet.progress_stats().present, 3);

        sheet.reset();
        assert_eq!(sheet.status("s2"), Some(AttendanceStatus::Excused));
    }

    #[test]
    fn empty_server_state_starts_unmarked() {
        let sheet = AttendanceSheet::new("c1", date(), roster(), Some(ExistingAttendance::default()));
        assert!(!sheet.has_prior_submission());
        assert_eq!(sheet.unmarked_students().len(), 3);
    }

    #[test]
    fn first_submission_creates_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("POST", CREATE, 201, r#"{"data":{"session_id":"sess-1"}}"#);
        let hub = EduHub::with_transport(transport.clone());
        let controller =
            AttendanceController::new(&hub, AttendanceSheet::new("c1", date(), roster(), None));
        controller.mark_all_present();
        controller.toggle("s3", AttendanceStatus::Absent).unwrap();

        let receipt = controller.submit().unwrap();

        assert_eq!(receipt.session_id.as_deref(), Some("sess-1"));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].body().unwrap(),
            &json!({
                "class_id": "c1",
                "date": "2024-05-02",
                "attendance_records": [
                    {"student_id": "s1", "status": "PRESENT"},
                    {"student_id": "s2", "status": "PRESENT"},
                    {"student_id": "s3", "status": "ABSENT"}
                ]
            })
        );
        assert!(!controller.can_submit());
        assert_eq!(
            controller.with_sheet(|sheet| sheet.session_id().map(String::from)),
            Some("sess-1".to_string())
        );
    }

    #[test]
    fn existing_session_goes_to_update_with_full_records() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("PATCH", UPDATE, 200, r#"{"message":"updated"}"#);
        let hub = EduHub::with_transport(transport.clone());
        let controller = AttendanceController::new(
            &hub,
            AttendanceSheet::new("c1", date(), roster(), Some(existing())),
        );
        controller.toggle("s3", AttendanceStatus::Present).unwrap();

        controller.submit().unwrap();

        assert_eq!(transport.count("PATCH", UPDATE), 1);
        assert_eq!(transport.count("POST", CREATE), 0);
        let requests = transport.requests();
        let body = requests[0].body().unwrap();
        assert_eq!(body["session_id"], json!("sess-9"));
        assert_eq!(body["attendance_records"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn failed_submission_keeps_marks() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("POST", CREATE, 403, r#"{"message":"Not your class"}"#);
        let hub = EduHub::with_transport(transport.clone());
        let controller =
            AttendanceController::new(&hub, AttendanceSheet::new("c1", date(), roster(), None));
        controller.mark_all_absent();

        let err = controller.submit().unwrap_err();

        assert_eq!(err, ApiError::Forbidden("Not your class".to_string()));
        assert_eq!(controller.progress_stats().absent, 3);
        assert!(controller.can_submit());
    }

    #[test]
    fn create_without_session_id_reads_session_back() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("POST", CREATE, 201, "");
        transport.respond(
            "GET",
            "teachers/attendance/classes/c1/date/2024-05-02",
            200,
            &json!({"session_id": "sess-3", "attendance_records": [
                {"student_id": "s1", "status": "PRESENT"},
                {"student_id": "s2", "status": "PRESENT"},
                {"student_id": "s3", "status": "PRESENT"}
            ]})
            .to_string(),
        );
        transport.respond("PATCH", UPDATE, 200, "{}");
        let hub = EduHub::with_transport(transport.clone());
        let controller =
            AttendanceController::new(&hub, AttendanceSheet::new("c1", date(), roster(), None));
        controller.mark_all_present();

        controller.submit().unwrap();
        assert!(!controller.can_submit());

        controller.toggle("s2", AttendanceStatus::Absent).unwrap();
        controller.submit().unwrap();

        assert_eq!(transport.count("POST", CREATE), 1);
        assert_eq!(transport.count("PATCH", UPDATE), 1);
        let requests = transport.requests();
        let update = requests.last().unwrap().body().unwrap();
        assert_eq!(update["session_id"], json!("sess-3"));
        assert_eq!(update["attendance_records"][1]["status"], json!("ABSENT"));
    }

    #[test]
    fn second_attendance_submit_while_pending_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::gated());
        transport.respond("POST", CREATE, 201, r#"{"session_id":"sess-1"}"#);
        let hub = EduHub::with_transport(transport.clone());
        let controller =
            AttendanceController::new(&hub, AttendanceSheet::new("c1", date(), roster(), None));
        controller.mark_all_present();

        std::thread::scope(|scope| {
            let first = scope.spawn(|| controller.submit());
            transport.entered();

            assert!(controller.is_pending());
            assert!(!controller.can_submit());
            assert_eq!(controller.submit().unwrap_err(), ApiError::SubmissionPending);

            transport.release();
            assert!(first.join().unwrap().is_ok());
        });

        assert_eq!(transport.count("POST", CREATE), 1);
        assert!(!controller.is_pending());
    }

    #[test]
    fn sync_replaces_marks_with_server_state() {
        let mut sheet = AttendanceSheet::new("c1", date(), roster(), None);
        sheet.mark_all_absent();

        sheet.sync(existing());

        assert_eq!(sheet.session_id(), Some("sess-9"));
        assert_eq!(sheet.status("s2"), Some(AttendanceStatus::Excused));
        assert!(!sheet.has_changes());
    }
}
