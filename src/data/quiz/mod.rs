use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::resp::problem::Problem;
use crate::store::Model;
use crate::util;

pub mod db;

pub const SUBJECT_COLLECTION_NAME: &str = "quiz.subjects";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// A quiz subject: the unit of authorship holding topics and their questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub name: String,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub created_by: Uuid,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Model for Subject {
    const COLLECTION: &'static str = SUBJECT_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Subject {
    pub fn new(name: impl ToString, created_by: Uuid) -> Subject {
        let now = util::now();
        Subject {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_by,
            topics: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn topic(&self, id: Uuid) -> Option<&Topic> {
        self.topics.iter().find(|it| it.id == id)
    }

    pub fn topic_mut(&mut self, id: Uuid) -> Option<&mut Topic> {
        self.topics.iter_mut().find(|it| it.id == id)
    }

    pub fn touch(&mut self) {
        self.updated_at = util::now();
    }
}

/// Short listing entry for subjects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectListResponse {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub topic_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<Subject> for SubjectListResponse {
    fn from(value: Subject) -> Self {
        Self {
            id: value.id,
            name: value.name,
            created_by: value.created_by,
            topic_count: value.topics.len(),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionData {
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

impl QuestionData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.text.trim().is_empty() {
            return Err(problem::bad_question("Question text is required."));
        }
        if self.options.len() < 2 || self.options.iter().any(|it| it.trim().is_empty()) {
            return Err(problem::bad_question(
                "A question needs at least two non-empty options.",
            ));
        }
        if !self.options.contains(&self.correct_answer) {
            return Err(problem::bad_question(
                "The correct answer must be one of the options.",
            ));
        }
        Ok(())
    }
}

impl From<QuestionData> for Question {
    fn from(data: QuestionData) -> Self {
        Question {
            id: Uuid::new_v4(),
            text: data.text,
            options: data.options,
            correct_answer: data.correct_answer,
        }
    }
}

/// Partial update of a single question.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QuestionPatch {
    pub id: Uuid,
    pub text: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
}

impl QuestionPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.options.is_none() && self.correct_answer.is_none()
    }

    /// Question as it would look after the patch, validated.
    pub fn apply_to(&self, question: &Question) -> Result<Question, Problem> {
        let data = QuestionData {
            text: self.text.clone().unwrap_or_else(|| question.text.clone()),
            options: self
                .options
                .clone()
                .unwrap_or_else(|| question.options.clone()),
            correct_answer: self
                .correct_answer
                .clone()
                .unwrap_or_else(|| question.correct_answer.clone()),
        };
        data.validate()?;

        Ok(Question {
            id: question.id,
            text: data.text,
            options: data.options,
            correct_answer: data.correct_answer,
        })
    }
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn subject_not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Subject not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn topic_not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Topic not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn question_not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Question not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn bad_question(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid question.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn name_required(what: &str) -> Problem {
        Problem::new_untyped(Status::BadRequest, format!("{} name is required.", what))
    }
}
