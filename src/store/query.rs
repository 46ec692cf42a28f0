//! Evaluation of MongoDB filter and update documents against in-memory
//! documents. Covers the subset of the query language the data layer emits.

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::RegexBuilder;

use super::{StoreError, StoreResult};

/// Checks whether `document` satisfies `filter`.
pub fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$or" => {
                let mut any = false;
                for alternative in sub_filters(condition)? {
                    if matches(document, alternative)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for part in sub_filters(condition)? {
                    if !matches(document, part)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            op if op.starts_with('$') => {
                return Err(StoreError::UnsupportedOperator(op.to_string()));
            }
            path => matches_condition(&lookup(document, path), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn sub_filters(condition: &Bson) -> StoreResult<Vec<&Document>> {
    let alternatives = condition
        .as_array()
        .ok_or(StoreError::Malformed("logical operator argument"))?;
    alternatives
        .iter()
        .map(|it| it.as_document().ok_or(StoreError::Malformed("logical operator clause")))
        .collect()
}

/// Values reachable through a dotted path. Arrays of sub-documents are
/// traversed element-wise, the way MongoDB resolves `a.b` over `a: [{b}]`.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = parts.split_first() {
        if let Some(value) = document.get(*head) {
            descend(value, rest, &mut out);
        }
    }
    out
}

fn descend<'a>(value: &'a Bson, path: &[&str], out: &mut Vec<&'a Bson>) {
    match path.split_first() {
        None => out.push(value),
        Some((head, rest)) => match value {
            Bson::Document(document) => {
                if let Some(value) = document.get(*head) {
                    descend(value, rest, out);
                }
            }
            Bson::Array(items) => {
                for item in items {
                    if let Bson::Document(_) = item {
                        descend(item, path, out);
                    }
                }
            }
            _ => {}
        },
    }
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(document)
            if document.keys().next().map_or(false, |k| k.starts_with('$')) =>
        {
            Some(document)
        }
        _ => None,
    }
}

fn matches_condition(values: &[&Bson], condition: &Bson) -> StoreResult<bool> {
    let operators = match is_operator_document(condition) {
        Some(operators) => operators,
        None => return Ok(values.iter().any(|value| value_eq(value, condition))),
    };

    for (op, argument) in operators {
        let satisfied = match op.as_str() {
            "$eq" => values.iter().any(|value| value_eq(value, argument)),
            "$ne" => !values.iter().any(|value| value_eq(value, argument)),
            "$in" => {
                let candidates = argument
                    .as_array()
                    .ok_or(StoreError::Malformed("$in argument"))?;
                values
                    .iter()
                    .any(|value| candidates.iter().any(|c| value_eq(value, c)))
            }
            "$nin" => {
                let candidates = argument
                    .as_array()
                    .ok_or(StoreError::Malformed("$nin argument"))?;
                !values
                    .iter()
                    .any(|value| candidates.iter().any(|c| value_eq(value, c)))
            }
            "$gt" => any_ordered(values, argument, |o| o == Ordering::Greater),
            "$gte" => any_ordered(values, argument, |o| o != Ordering::Less),
            "$lt" => any_ordered(values, argument, |o| o == Ordering::Less),
            "$lte" => any_ordered(values, argument, |o| o != Ordering::Greater),
            "$exists" => {
                let wanted = argument
                    .as_bool()
                    .ok_or(StoreError::Malformed("$exists argument"))?;
                values.is_empty() != wanted
            }
            "$regex" => {
                let pattern = argument
                    .as_str()
                    .ok_or(StoreError::Malformed("$regex argument"))?;
                let options = operators.get_str("$options").unwrap_or("");
                matches_regex(values, pattern, options)
            }
            "$options" => true,
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn matches_regex(values: &[&Bson], pattern: &str, options: &str) -> bool {
    let regex = match RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .build()
    {
        Ok(regex) => regex,
        Err(e) => {
            tracing::warn!("invalid $regex pattern '{}': {}", pattern, e);
            return false;
        }
    };

    values.iter().any(|value| match value {
        Bson::String(s) => regex.is_match(s),
        Bson::Array(items) => items
            .iter()
            .any(|item| item.as_str().map_or(false, |s| regex.is_match(s))),
        _ => false,
    })
}

fn any_ordered(values: &[&Bson], argument: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    values.iter().any(|value| match value {
        Bson::Array(items) => items
            .iter()
            .any(|item| compare(item, argument).map_or(false, &accept)),
        other => compare(other, argument).map_or(false, &accept),
    })
}

/// Equality as MongoDB applies it: arrays match when they contain the value.
pub fn value_eq(value: &Bson, condition: &Bson) -> bool {
    if numeric_eq(value, condition) {
        return true;
    }
    match value {
        Bson::Array(items) if !matches!(condition, Bson::Array(_)) => {
            items.iter().any(|item| numeric_eq(item, condition))
        }
        _ => false,
    }
}

fn numeric_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

pub fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Applies an update document in place.
pub fn apply_update(document: &mut Document, update: &Document) -> StoreResult<()> {
    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or(StoreError::Malformed("update operator argument"))?;

        for (path, argument) in fields {
            match op.as_str() {
                "$set" => set_path(document, path, argument.clone())?,
                "$unset" => unset_path(document, path),
                "$inc" => increment(document, path, argument)?,
                "$push" => {
                    let items = array_field(document, path)?;
                    items.extend(each_values(argument));
                }
                "$addToSet" => {
                    let items = array_field(document, path)?;
                    for value in each_values(argument) {
                        if !items.contains(&value) {
                            items.push(value);
                        }
                    }
                }
                "$pull" => {
                    if let Some(Bson::Array(items)) = document.get_mut(path) {
                        let mut kept = Vec::with_capacity(items.len());
                        for item in items.drain(..) {
                            if !pull_matches(&item, argument)? {
                                kept.push(item);
                            }
                        }
                        *items = kept;
                    }
                }
                other => return Err(StoreError::UnsupportedOperator(other.to_string())),
            }
        }
    }

    Ok(())
}

fn each_values(argument: &Bson) -> Vec<Bson> {
    match argument {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => modifiers
            .get_array("$each")
            .map(|items| items.clone())
            .unwrap_or_default(),
        other => vec![other.clone()],
    }
}

fn array_field<'a>(document: &'a mut Document, field: &str) -> StoreResult<&'a mut Vec<Bson>> {
    if !document.contains_key(field) {
        document.insert(field, Bson::Array(Vec::new()));
    }
    match document.get_mut(field) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(StoreError::Malformed("array update on non-array field")),
    }
}

fn pull_matches(item: &Bson, condition: &Bson) -> StoreResult<bool> {
    if is_operator_document(condition).is_some() {
        return matches_condition(&[item], condition);
    }
    match (item, condition) {
        (Bson::Document(item), Bson::Document(condition)) => matches(item, condition),
        _ => Ok(numeric_eq(item, condition)),
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(StoreError::Malformed("$set path through non-document")),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn increment(document: &mut Document, field: &str, by: &Bson) -> StoreResult<()> {
    let current = document.get(field).cloned().unwrap_or(Bson::Int32(0));
    let next = match (&current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => Bson::Int32(a + b),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(*a as i64 + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
        _ => match (as_f64(&current), as_f64(by)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => return Err(StoreError::Malformed("$inc on non-numeric value")),
        },
    };
    document.insert(field, next);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn member_doc() -> Document {
        doc! {
            "_id": 1,
            "name": "Algebra",
            "mentors": ["ana", "ben"],
            "students": [],
            "shared_with": [ { "user_id": "cid", "can_edit": true } ],
            "starts": bson::DateTime::from_millis(2_000),
        }
    }

    #[test]
    fn equality_matches_array_members() {
        let document = member_doc();
        assert!(matches(&document, &doc! { "mentors": "ana" }).unwrap());
        assert!(!matches(&document, &doc! { "students": "ana" }).unwrap());
        assert!(matches(
            &document,
            &doc! { "$or": [ { "students": "ana" }, { "mentors": "ana" } ] }
        )
        .unwrap());
    }

    #[test]
    fn dotted_paths_traverse_sub_document_arrays() {
        let document = member_doc();
        assert!(matches(&document, &doc! { "shared_with.user_id": "cid" }).unwrap());
        assert!(!matches(&document, &doc! { "shared_with.user_id": "dan" }).unwrap());
    }

    #[test]
    fn comparison_and_regex_operators() {
        let document = member_doc();
        assert!(matches(
            &document,
            &doc! { "starts": { "$gt": bson::DateTime::from_millis(1_000) } }
        )
        .unwrap());
        assert!(!matches(
            &document,
            &doc! { "starts": { "$lte": bson::DateTime::from_millis(1_000) } }
        )
        .unwrap());
        assert!(matches(
            &document,
            &doc! { "name": { "$regex": "alg", "$options": "i" } }
        )
        .unwrap());
        assert!(matches(&document, &doc! { "missing": { "$exists": false } }).unwrap());
        assert!(matches(&document, &doc! { "_id": { "$in": [3, 1] } }).unwrap());
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let document = member_doc();
        assert!(matches(&document, &doc! { "$where": "true" }).is_err());
        assert!(matches(&document, &doc! { "name": { "$near": 1 } }).is_err());
    }

    #[test]
    fn array_updates() {
        let mut document = member_doc();
        apply_update(
            &mut document,
            &doc! {
                "$addToSet": { "mentors": { "$each": ["ben", "cid"] } },
                "$push": { "students": "dan" },
                "$pull": { "shared_with": { "user_id": "cid" } },
            },
        )
        .unwrap();

        assert_eq!(
            document.get_array("mentors").unwrap(),
            &vec![Bson::from("ana"), Bson::from("ben"), Bson::from("cid")]
        );
        assert_eq!(document.get_array("students").unwrap(), &vec![Bson::from("dan")]);
        assert!(document.get_array("shared_with").unwrap().is_empty());

        apply_update(
            &mut document,
            &doc! { "$pull": { "mentors": { "$in": ["ana", "cid"] } } },
        )
        .unwrap();
        assert_eq!(document.get_array("mentors").unwrap(), &vec![Bson::from("ben")]);
    }

    #[test]
    fn set_unset_and_increment() {
        let mut document = member_doc();
        apply_update(
            &mut document,
            &doc! {
                "$set": { "meta.level": "hard" },
                "$inc": { "views": 2 },
                "$unset": { "name": "" },
            },
        )
        .unwrap();

        assert_eq!(
            document.get_document("meta").unwrap().get_str("level").unwrap(),
            "hard"
        );
        assert_eq!(document.get_i32("views").unwrap(), 2);
        assert!(!document.contains_key("name"));
    }
}
