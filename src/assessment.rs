use serde::{Deserialize, Serialize};
use std::fmt;

/// An external examination authority whose past questions can be explored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamBody {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "code")]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Which assessments of an exam body to list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogScope {
    pub exam_body_id: String,
    pub subject_id: Option<String>,
    pub topic_id: Option<String>,
    pub year: Option<u16>,
}

impl CatalogScope {
    pub fn exam_body(exam_body_id: impl Into<String>) -> Self {
        CatalogScope {
            exam_body_id: exam_body_id.into(),
            ..CatalogScope::default()
        }
    }

    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn topic(mut self, topic_id: impl Into<String>) -> Self {
        self.topic_id = Some(topic_id.into());
        self
    }

    pub fn year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    /// Query parameters of the listing endpoint, without paging.
    pub(crate) fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(subject_id) = &self.subject_id {
            params.push(("subjectId".to_string(), subject_id.clone()));
        }
        if let Some(topic_id) = &self.topic_id {
            params.push(("topicId".to_string(), topic_id.clone()));
        }
        if let Some(year) = self.year {
            params.push(("year".to_string(), year.to_string()));
        }
        params
    }
}

/// Declared type of a question. Decides which answer shape it accepts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    #[serde(alias = "MULTIPLE_CHOICE_SINGLE")]
    SingleChoice,
    #[serde(alias = "MULTIPLE_CHOICE_MULTIPLE")]
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    #[serde(alias = "ESSAY")]
    LongAnswer,
    Numeric,
    Date,
    Matching,
    Ordering,
    FileUpload,
}

impl QuestionType {
    /// Types answered by picking option ids.
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::TrueFalse
        )
    }

    /// Types that take exactly one option.
    pub fn is_single_selection(&self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::TrueFalse)
    }

    /// Human readable description of the expected answer.
    pub fn expected_shape(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice | QuestionType::TrueFalse => "exactly one option",
            QuestionType::MultipleChoice => "a list of options",
            QuestionType::ShortAnswer | QuestionType::LongAnswer => "a text answer",
            QuestionType::Numeric => "a finite number",
            QuestionType::Date => "a date",
            QuestionType::Matching => "a list of matched pairs",
            QuestionType::Ordering => "an ordered list of options",
            QuestionType::FileUpload => "a reference to an uploaded file",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuestionType::SingleChoice => "single choice",
            QuestionType::MultipleChoice => "multiple choice",
            QuestionType::TrueFalse => "true/false",
            QuestionType::ShortAnswer => "short answer",
            QuestionType::LongAnswer => "long answer",
            QuestionType::Numeric => "numeric",
            QuestionType::Date => "date",
            QuestionType::Matching => "matching",
            QuestionType::Ordering => "ordering",
            QuestionType::FileUpload => "file upload",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: String,
    #[serde(alias = "optionText", default)]
    pub text: String,
    #[serde(default)]
    pub order: u32,
}

/// A question as served to the client. Never carries the correct answer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(rename = "type", alias = "questionType")]
    pub question_type: QuestionType,
    #[serde(alias = "questionText", alias = "question", default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// Right-hand column of a matching question.
    #[serde(default)]
    pub match_options: Vec<QuestionOption>,
    #[serde(default)]
    pub order: u32,
    #[serde(default = "default_points")]
    pub points: f64,
    #[serde(default = "default_required")]
    pub is_required: bool,
}

fn default_points() -> f64 {
    1.0
}

fn default_required() -> bool {
    true
}

impl Question {
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }

    pub fn has_match_option(&self, option_id: &str) -> bool {
        self.match_options.iter().any(|o| o.id == option_id)
    }
}

/// Assessment metadata plus its questions once loaded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub exam_body_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    /// Time limit in minutes, 0 when untimed.
    #[serde(default)]
    pub duration: u32,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default)]
    pub passing_score: f64,
    #[serde(default)]
    pub total_points: f64,
    #[serde(default)]
    pub show_correct_answers: bool,
    #[serde(default)]
    pub show_feedback: bool,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Assessment {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Questions sorted by their `order`, ties broken by id.
    pub fn ordered_questions(&self) -> Vec<&Question> {
        let mut questions: Vec<&Question> = self.questions.iter().collect();
        questions.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        questions
    }

    /// Total points, computed from the questions when the server sent none.
    pub fn max_points(&self) -> f64 {
        if self.total_points > 0.0 {
            self.total_points
        } else {
            self.questions.iter().map(|q| q.points).sum()
        }
    }
}
