use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::Model;
use crate::util;

pub mod db;

pub const WEEKLY_QUIZ_COLLECTION_NAME: &str = "weekly.quizzes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub student_id: Uuid,
    pub score: u32,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyQuiz {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub title: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub week_start: DateTime<Utc>,
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl Model for WeeklyQuiz {
    const COLLECTION: &'static str = WEEKLY_QUIZ_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl WeeklyQuiz {
    pub fn new(title: impl ToString, week_start: DateTime<Utc>) -> WeeklyQuiz {
        WeeklyQuiz {
            id: Uuid::new_v4(),
            title: title.to_string(),
            week_start,
            leaderboard: vec![],
        }
    }

    /// Keeps the best score per student. Returns whether the board changed.
    pub fn record(&mut self, student_id: Uuid, score: u32) -> bool {
        match self
            .leaderboard
            .iter_mut()
            .find(|it| it.student_id == student_id)
        {
            Some(entry) if entry.score >= score => false,
            Some(entry) => {
                entry.score = score;
                entry.recorded_at = util::now();
                true
            }
            None => {
                self.leaderboard.push(LeaderboardEntry {
                    student_id,
                    score,
                    recorded_at: util::now(),
                });
                true
            }
        }
    }

    /// Entries by score, best first; ties go to whoever got there first.
    pub fn standings(&self) -> Vec<LeaderboardEntry> {
        let mut entries = self.leaderboard.clone();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.recorded_at.cmp(&b.recorded_at))
        });
        entries
    }
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Weekly quiz not found.")
            .insert("id", id.to_string())
            .clone()
    }
}
