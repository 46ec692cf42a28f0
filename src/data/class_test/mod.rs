use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::resp::problem::Problem;
use crate::store::Model;
use crate::util;

pub mod db;

pub const CLASS_TEST_COLLECTION_NAME: &str = "class.tests";
pub const SUBMISSION_COLLECTION_NAME: &str = "class.test.submissions";

fn default_marks() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestQuestion {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default = "default_marks")]
    pub marks: u32,
}

impl TestQuestion {
    /// Answers are compared trimmed and case-insensitively.
    pub fn accepts(&self, answer: &str) -> bool {
        self.correct_answer.trim().to_lowercase() == answer.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTopic {
    pub topic_name: String,
    #[serde(default)]
    pub questions: Vec<TestQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassTest {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub class_id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub created_by: Uuid,
    pub name: String,
    pub subject_name: String,
    pub description: String,
    #[serde(default)]
    pub selected_questions: Vec<TestTopic>,
    pub total_points: u32,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub test_date: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Model for ClassTest {
    const COLLECTION: &'static str = CLASS_TEST_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl ClassTest {
    pub fn questions(&self) -> impl Iterator<Item = &TestQuestion> {
        self.selected_questions
            .iter()
            .flat_map(|topic| topic.questions.iter())
    }

    /// `None` when the marks do not fit in a `u32`.
    pub fn sum_of_marks(&self) -> Option<u32> {
        self.questions()
            .try_fold(0u32, |total, it| total.checked_add(it.marks))
    }

    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at <= self.end_time
    }

    /// Checks the invariants every stored test satisfies.
    pub fn validate(&self) -> Result<(), Problem> {
        for (field, value) in [
            ("name", &self.name),
            ("subject_name", &self.subject_name),
            ("description", &self.description),
        ] {
            if value.trim().is_empty() {
                return Err(problem::missing_field(field));
            }
        }
        if self.duration_minutes == 0 {
            return Err(problem::bad_duration());
        }
        if self.end_time <= self.start_time {
            return Err(problem::bad_window());
        }
        if self.sum_of_marks().is_none() {
            return Err(problem::marks_overflow());
        }
        for topic in &self.selected_questions {
            if topic.topic_name.trim().is_empty() {
                return Err(problem::missing_field("topic_name"));
            }
            for question in &topic.questions {
                if question.text.trim().is_empty() || question.correct_answer.trim().is_empty() {
                    return Err(problem::bad_question(question.id));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestQuestionData {
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub marks: Option<u32>,
}

impl From<TestQuestionData> for TestQuestion {
    fn from(data: TestQuestionData) -> Self {
        TestQuestion {
            id: Uuid::new_v4(),
            text: data.text,
            options: data.options,
            correct_answer: data.correct_answer,
            marks: data.marks.unwrap_or_else(default_marks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestTopicData {
    pub topic_name: String,
    pub questions: Vec<TestQuestionData>,
}

impl From<TestTopicData> for TestTopic {
    fn from(data: TestTopicData) -> Self {
        TestTopic {
            topic_name: data.topic_name,
            questions: data.questions.into_iter().map(TestQuestion::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassTestData {
    pub class_id: Uuid,
    pub name: String,
    pub subject_name: String,
    pub description: String,
    pub selected_questions: Vec<TestTopicData>,
    /// Sum of question marks when absent.
    #[serde(default)]
    pub total_points: Option<u32>,
    pub test_date: DateTime<Utc>,
    pub duration_minutes: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ClassTestData {
    pub fn into_test(self, created_by: Uuid) -> ClassTest {
        let now = util::now();
        let mut test = ClassTest {
            id: Uuid::new_v4(),
            class_id: self.class_id,
            created_by,
            name: self.name,
            subject_name: self.subject_name,
            description: self.description,
            selected_questions: self
                .selected_questions
                .into_iter()
                .map(TestTopic::from)
                .collect(),
            total_points: 0,
            test_date: self.test_date,
            duration_minutes: self.duration_minutes,
            start_time: self.start_time,
            end_time: self.end_time,
            created_at: now,
            updated_at: now,
        };
        test.total_points = self
            .total_points
            .unwrap_or_else(|| test.sum_of_marks().unwrap_or(u32::MAX));
        test
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassTestUpdate {
    pub name: Option<String>,
    pub subject_name: Option<String>,
    pub description: Option<String>,
    pub selected_questions: Option<Vec<TestTopicData>>,
    pub total_points: Option<u32>,
    pub test_date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ClassTestUpdate {
    /// Merges the update into `test`. Replacing the questions without giving
    /// new total points recomputes them from the marks.
    pub fn apply_to(self, test: &mut ClassTest) {
        if let Some(name) = self.name {
            test.name = name;
        }
        if let Some(subject_name) = self.subject_name {
            test.subject_name = subject_name;
        }
        if let Some(description) = self.description {
            test.description = description;
        }
        let questions_replaced = self.selected_questions.is_some();
        if let Some(topics) = self.selected_questions {
            test.selected_questions = topics.into_iter().map(TestTopic::from).collect();
        }
        match self.total_points {
            Some(points) => test.total_points = points,
            None if questions_replaced => {
                test.total_points = test.sum_of_marks().unwrap_or(u32::MAX)
            }
            None => {}
        }
        if let Some(date) = self.test_date {
            test.test_date = date;
        }
        if let Some(duration) = self.duration_minutes {
            test.duration_minutes = duration;
        }
        if let Some(start) = self.start_time {
            test.start_time = start;
        }
        if let Some(end) = self.end_time {
            test.end_time = end;
        }
        test.updated_at = util::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAnswer {
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub question_id: Uuid,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSubmission {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub test_id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub class_id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub student_id: Uuid,
    #[serde(default)]
    pub answers: Vec<TestAnswer>,
    pub score: u32,
    pub max_score: u32,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub submitted_at: DateTime<Utc>,
}

impl Model for TestSubmission {
    const COLLECTION: &'static str = SUBMISSION_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl TestSubmission {
    /// Grades `answers` against `test`. Unknown question ids score nothing.
    pub fn grade(
        test: &ClassTest,
        student_id: Uuid,
        answers: Vec<TestAnswer>,
        submitted_at: DateTime<Utc>,
    ) -> TestSubmission {
        let score = test
            .questions()
            .filter(|question| {
                answers
                    .iter()
                    .find(|it| it.question_id == question.id)
                    .map_or(false, |it| question.accepts(&it.answer))
            })
            .fold(0u32, |total, question| total.saturating_add(question.marks));

        TestSubmission {
            id: Uuid::new_v4(),
            test_id: test.id,
            class_id: test.class_id,
            student_id,
            answers,
            score,
            max_score: test.total_points,
            submitted_at,
        }
    }
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Class test not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn missing_field(field: &str) -> Problem {
        Problem::new_untyped(Status::BadRequest, "All fields are required.")
            .insert_str("field", field)
            .to_owned()
    }

    #[inline]
    pub fn bad_window() -> Problem {
        Problem::new_untyped(Status::BadRequest, "End time must be after start time.")
    }

    #[inline]
    pub fn bad_duration() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid test duration.")
            .detail("Duration must be a positive number of minutes.")
            .to_owned()
    }

    #[inline]
    pub fn bad_question(id: Uuid) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid question.")
            .detail("Each question needs text and a correct answer.")
            .insert("id", id.to_string())
            .to_owned()
    }

    #[inline]
    pub fn marks_overflow() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid question marks.")
            .detail("The marks of all questions add up to more than the test can hold.")
            .to_owned()
    }

    #[inline]
    pub fn not_open() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Test is not open.")
            .detail("Submissions are accepted between the start and end time.")
            .to_owned()
    }

    #[inline]
    pub fn already_submitted() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Test already submitted.")
    }

    #[inline]
    pub fn not_enrolled() -> Problem {
        Problem::new_untyped(Status::Forbidden, "Not authorized.")
            .detail("Only approved students of the class can submit.")
            .to_owned()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn sample_data(class_id: Uuid) -> ClassTestData {
        let start = util::now() + Duration::hours(1);
        ClassTestData {
            class_id,
            name: "Midterm".to_string(),
            subject_name: "Geography".to_string(),
            description: "Capitals".to_string(),
            selected_questions: vec![TestTopicData {
                topic_name: "Europe".to_string(),
                questions: vec![
                    TestQuestionData {
                        text: "Capital of Croatia?".to_string(),
                        options: vec!["Zagreb".to_string(), "Split".to_string()],
                        correct_answer: "Zagreb".to_string(),
                        marks: Some(3),
                    },
                    TestQuestionData {
                        text: "Capital of Austria?".to_string(),
                        options: vec![],
                        correct_answer: "Vienna".to_string(),
                        marks: None,
                    },
                ],
            }],
            total_points: None,
            test_date: start,
            duration_minutes: 45,
            start_time: start,
            end_time: start + Duration::minutes(45),
        }
    }

    #[test]
    fn total_points_default_to_marks() {
        let test = sample_data(Uuid::new_v4()).into_test(Uuid::new_v4());
        assert_eq!(test.total_points, 4);
        assert!(test.validate().is_ok());
    }

    #[test]
    fn merged_window_is_validated() {
        let mut test = sample_data(Uuid::new_v4()).into_test(Uuid::new_v4());
        ClassTestUpdate {
            end_time: Some(test.start_time),
            ..Default::default()
        }
        .apply_to(&mut test);

        let problem = test.validate().unwrap_err();
        assert_eq!(problem.title, "End time must be after start time.");
    }

    #[test]
    fn oversized_marks_are_rejected() {
        let mut data = sample_data(Uuid::new_v4());
        for question in &mut data.selected_questions[0].questions {
            question.marks = Some(u32::MAX);
        }
        let test = data.into_test(Uuid::new_v4());

        assert_eq!(test.sum_of_marks(), None);
        assert_eq!(test.total_points, u32::MAX);
        assert_eq!(test.validate().unwrap_err().title, "Invalid question marks.");

        let ids: Vec<Uuid> = test.questions().map(|it| it.id).collect();
        let answers = ids
            .iter()
            .zip(["Zagreb", "Vienna"])
            .map(|(id, answer)| TestAnswer {
                question_id: *id,
                answer: answer.to_string(),
            })
            .collect();
        let submission = TestSubmission::grade(&test, Uuid::new_v4(), answers, util::now());
        assert_eq!(submission.score, u32::MAX);
    }

    #[test]
    fn grading_ignores_case_and_whitespace() {
        let test = sample_data(Uuid::new_v4()).into_test(Uuid::new_v4());
        let ids: Vec<Uuid> = test.questions().map(|it| it.id).collect();
        let submission = TestSubmission::grade(
            &test,
            Uuid::new_v4(),
            vec![
                TestAnswer {
                    question_id: ids[0],
                    answer: "  zagreb ".to_string(),
                },
                TestAnswer {
                    question_id: ids[1],
                    answer: "Graz".to_string(),
                },
            ],
            util::now(),
        );
        assert_eq!(submission.score, 3);
        assert_eq!(submission.max_score, 4);
    }
}
