use std::iter::repeat;
use std::path::{Path, PathBuf};

use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use chrono::{DateTime, SubsecRound, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// BSON value an id field is stored as. Filters must use this to match
/// fields serialized through [uuid_list] or `uuid_1_as_binary`.
#[inline]
pub fn uuid_bson(id: Uuid) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.as_bytes().to_vec(),
    })
}

pub fn uuid_array(ids: &[Uuid]) -> Bson {
    Bson::Array(ids.iter().copied().map(uuid_bson).collect())
}

/// Current time at the precision BSON datetimes keep.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn bson_datetime(at: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_chrono(at))
}

pub fn random_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Serializes `Vec<Uuid>` as an array of BSON binary subtype 4 values.
pub mod uuid_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(ids: &[Uuid], serializer: S) -> Result<S::Ok, S::Error> {
        let binaries: Vec<bson::Binary> = ids
            .iter()
            .map(|id| bson::Binary::from_uuid(bson::Uuid::from(*id)))
            .collect();
        binaries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Uuid>, D::Error> {
        let ids = Vec::<bson::Uuid>::deserialize(deserializer)?;
        Ok(ids.into_iter().map(Uuid::from).collect())
    }
}

/// Serializes `Option<Uuid>` as BSON binary subtype 4 or null.
pub mod uuid_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(id: &Option<Uuid>, serializer: S) -> Result<S::Ok, S::Error> {
        id.map(|id| bson::Binary::from_uuid(bson::Uuid::from(id)))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Uuid>, D::Error> {
        Ok(Option::<bson::Uuid>::deserialize(deserializer)?.map(Uuid::from))
    }
}

/// Serializes `Option<DateTime<Utc>>` as a BSON datetime or null.
pub mod datetime_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        at: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        at.map(bson::DateTime::from_chrono).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<bson::DateTime>::deserialize(deserializer)?.map(bson::DateTime::to_chrono))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Members {
        #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
        owner: Uuid,
        #[serde(with = "uuid_list")]
        ids: Vec<Uuid>,
        #[serde(default, with = "uuid_option")]
        maybe: Option<Uuid>,
    }

    #[test]
    fn uuid_helpers_match_filter_values() {
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let members = Members {
            owner,
            ids: vec![id],
            maybe: None,
        };

        let doc = bson::to_document(&members).expect("serializable");
        assert_eq!(doc.get("owner"), Some(&uuid_bson(owner)));
        assert_eq!(doc.get("ids"), Some(&uuid_array(&[id])));

        let back: Members = bson::from_document(doc).expect("deserializable");
        assert_eq!(back, members);
    }

    #[test]
    fn random_codes_have_requested_length() {
        let code = random_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
