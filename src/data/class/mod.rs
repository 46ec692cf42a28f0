use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::Model;
use crate::util::{self, uuid_list};

pub mod db;

pub const CLASS_COLLECTION_NAME: &str = "classes";

/// Which member list of a class a user is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassRole {
    Mentor,
    Student,
}

impl ClassRole {
    pub fn field(self) -> &'static str {
        match self {
            ClassRole::Mentor => "mentors",
            ClassRole::Student => "students",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub topic: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub join_code: String,

    #[serde(default, with = "uuid_list")]
    pub mentors: Vec<Uuid>,
    /// Approved and pending students alike; approval is recorded on the user.
    #[serde(default, with = "uuid_list")]
    pub students: Vec<Uuid>,

    #[serde(default)]
    pub logo: Option<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Model for Class {
    const COLLECTION: &'static str = CLASS_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Class {
    pub fn new(topic: impl ToString, name: impl ToString, join_code: impl ToString) -> Class {
        Class {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            name: name.to_string(),
            description: String::new(),
            join_code: join_code.to_string(),
            mentors: vec![],
            students: vec![],
            logo: None,
            created_at: util::now(),
        }
    }

    pub fn is_mentor(&self, user: Uuid) -> bool {
        self.mentors.contains(&user)
    }

    pub fn is_student(&self, user: Uuid) -> bool {
        self.students.contains(&user)
    }

    pub fn role_of(&self, user: Uuid) -> Option<ClassRole> {
        if self.is_mentor(user) {
            Some(ClassRole::Mentor)
        } else if self.is_student(user) {
            Some(ClassRole::Student)
        } else {
            None
        }
    }

    pub fn members(&self) -> Vec<Uuid> {
        self.mentors
            .iter()
            .chain(self.students.iter())
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassCreateData {
    pub topic: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Generated when absent.
    #[serde(default)]
    pub join_code: Option<String>,
    #[serde(default)]
    pub mentors: Vec<Uuid>,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub enum LogoChange {
    #[default]
    Keep,
    Replace(String),
    Remove,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassUpdateData {
    pub topic: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub join_code: Option<String>,
    /// Replaces the full mentor list when present.
    pub mentors: Option<Vec<Uuid>>,
    #[serde(default)]
    pub logo: LogoChange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassUpdated {
    pub class: Class,
    /// Logo path that is no longer referenced.
    pub replaced_logo: Option<String>,
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Class not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn code_not_found(code: &str) -> Problem {
        Problem::new_untyped(Status::NotFound, "Class not found.")
            .insert_str("join_code", code)
            .to_owned()
    }

    #[inline]
    pub fn duplicate_code(code: &str) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Join code must be unique.")
            .insert_str("join_code", code)
            .to_owned()
    }

    #[inline]
    pub fn invalid_mentors(missing: &[Uuid]) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Invalid mentors data.")
            .detail("Some mentors not found or not valid mentors.")
            .insert(
                "mentors",
                missing.iter().map(Uuid::to_string).collect::<Vec<_>>(),
            )
            .to_owned()
    }

    #[inline]
    pub fn already_member() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Already in this class.")
    }

    #[inline]
    pub fn not_class_mentor() -> Problem {
        Problem::new_untyped(Status::Forbidden, "Not authorized.")
            .detail("Only mentors of this class can do that.")
            .to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_roles() {
        let mentor = Uuid::new_v4();
        let student = Uuid::new_v4();
        let mut class = Class::new("Maths", "Algebra I", "ALG101");
        class.mentors.push(mentor);
        class.students.push(student);

        assert_eq!(class.role_of(mentor), Some(ClassRole::Mentor));
        assert_eq!(class.role_of(student), Some(ClassRole::Student));
        assert_eq!(class.role_of(Uuid::new_v4()), None);
        assert_eq!(class.members(), vec![mentor, student]);
    }

    #[test]
    fn class_round_trips_through_bson() {
        let mut class = Class::new("Physics", "Mechanics", "PHY1");
        class.mentors.push(Uuid::new_v4());
        let document = bson::to_document(&class).unwrap();
        assert!(document.contains_key("_id"));
        let back: Class = bson::from_document(document).unwrap();
        assert_eq!(back, class);
    }
}
