use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Mentor,
    Admin,
}

impl From<Role> for u8 {
    fn from(role: Role) -> u8 {
        match role {
            Role::Student => 0u8,
            Role::Mentor => 1u8,
            Role::Admin => 2u8,
        }
    }
}

impl Role {
    /// Indicates whether user with role can author quiz content
    pub fn can_author(self) -> bool {
        self >= Role::Mentor
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    /// Value the role is stored as in user documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Mentor => "mentor",
            Role::Admin => "admin",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "mentor" => Ok(Role::Mentor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::Admin > Role::Mentor);
        assert!(Role::Mentor > Role::Student);
        assert!(Role::Mentor.can_author());
        assert!(!Role::Student.can_author());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let value = bson::to_bson(&Role::Mentor).expect("serializable");
        assert_eq!(value, bson::Bson::String("mentor".to_string()));
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("teacher".parse::<Role>().is_err());
    }
}
