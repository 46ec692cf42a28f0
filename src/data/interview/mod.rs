use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::resp::problem::Problem;
use crate::store::Model;
use crate::util;

pub mod db;

pub const INTERVIEW_COLLECTION_NAME: &str = "interview.questions";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = Problem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(problem::bad_difficulty(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewQuestion {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

/// A set of interview questions for one subject and, optionally, one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSet {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub subject_name: String,
    #[serde(default)]
    pub topic_name: Option<String>,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub created_by: Uuid,
    #[serde(default)]
    pub questions: Vec<InterviewQuestion>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Model for InterviewSet {
    const COLLECTION: &'static str = INTERVIEW_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl InterviewSet {
    /// Keeps only questions of the given difficulty.
    pub fn retain_difficulty(&mut self, difficulty: Difficulty) -> &mut Self {
        self.questions.retain(|it| it.difficulty == difficulty);
        self
    }
}

fn validate_questions(questions: &[InterviewQuestion]) -> Result<(), Problem> {
    if questions.is_empty() {
        return Err(problem::no_questions());
    }
    if questions
        .iter()
        .any(|it| it.question.trim().is_empty() || it.answer.trim().is_empty())
    {
        return Err(problem::incomplete_question());
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewSetData {
    pub subject_name: String,
    #[serde(default)]
    pub topic_name: Option<String>,
    pub questions: Vec<InterviewQuestion>,
}

impl InterviewSetData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.subject_name.trim().is_empty() {
            return Err(problem::missing_subject());
        }
        validate_questions(&self.questions)
    }

    pub fn into_set(self, created_by: Uuid) -> InterviewSet {
        let now = util::now();
        InterviewSet {
            id: Uuid::new_v4(),
            subject_name: self.subject_name,
            topic_name: self.topic_name.filter(|it| !it.trim().is_empty()),
            created_by,
            questions: self.questions,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterviewSetUpdate {
    pub subject_name: Option<String>,
    pub topic_name: Option<String>,
    pub questions: Option<Vec<InterviewQuestion>>,
}

impl InterviewSetUpdate {
    pub fn apply_to(self, set: &mut InterviewSet) -> Result<(), Problem> {
        if let Some(subject_name) = self.subject_name {
            if subject_name.trim().is_empty() {
                return Err(problem::missing_subject());
            }
            set.subject_name = subject_name;
        }
        if let Some(topic_name) = self.topic_name {
            set.topic_name = Some(topic_name).filter(|it| !it.trim().is_empty());
        }
        if let Some(questions) = self.questions {
            validate_questions(&questions)?;
            set.questions = questions;
        }
        set.updated_at = util::now();
        Ok(())
    }
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Interview questions not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn missing_subject() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Subject name is required.")
    }

    #[inline]
    pub fn no_questions() -> Problem {
        Problem::new_untyped(Status::BadRequest, "At least one question is required.")
    }

    #[inline]
    pub fn incomplete_question() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid question.")
            .detail("Each question must have both question text and answer.")
            .to_owned()
    }

    #[inline]
    pub fn bad_difficulty(level: &str) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid difficulty level.")
            .insert_str("difficulty", level)
            .to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_parsing() {
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
        assert_eq!("extreme".parse::<Difficulty>().unwrap_err().code(), 400);
    }

    #[test]
    fn missing_difficulty_defaults_to_medium() {
        let question: InterviewQuestion = bson::from_document(bson::doc! {
            "question": "What is ownership?",
            "answer": "A set of rules governing memory.",
        })
        .unwrap();
        assert_eq!(question.difficulty, Difficulty::Medium);
    }

    #[test]
    fn updates_validate_questions() {
        let mut set = InterviewSetData {
            subject_name: "Rust".to_string(),
            topic_name: Some("".to_string()),
            questions: vec![InterviewQuestion {
                question: "What is a lifetime?".to_string(),
                answer: "A region of code a reference is valid for.".to_string(),
                difficulty: Difficulty::Hard,
            }],
        }
        .into_set(Uuid::new_v4());
        assert_eq!(set.topic_name, None);

        let result = InterviewSetUpdate {
            questions: Some(vec![]),
            ..Default::default()
        }
        .apply_to(&mut set);
        assert!(result.is_err());
        assert_eq!(set.questions.len(), 1);
    }
}
