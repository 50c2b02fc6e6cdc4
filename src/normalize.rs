//! Normalization of backend user records.
//!
//! The backend is not consistent about field names (`user_id` vs `id`,
//! `full_name` vs `name`, ...). Records are mapped once, at the API boundary,
//! into a fixed [`UserProfile`] shape. Each field has a precedence list; the
//! first key holding a usable value wins.
//!
//! | Field | Keys, in order |
//! |-------|----------------|
//! | `user_id` | `user_id`, `id`, `userId` |
//! | `full_name` | `full_name`, `name`, `fullName`, then `first_name` + `last_name` |
//! | `email` | `email`, `mail` |
//! | `role` | `role`, `user_role`, `role_name` |
//!
//! Keys not consumed above are kept in [`UserProfile::extra`].

use serde_json::{Map, Value};

pub const USER_ID_KEYS: &[&str] = &["user_id", "id", "userId"];
pub const FULL_NAME_KEYS: &[&str] = &["full_name", "name", "fullName"];
pub const EMAIL_KEYS: &[&str] = &["email", "mail"];
pub const ROLE_KEYS: &[&str] = &["role", "user_role", "role_name"];

/// A user record in the internal shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub user_id: Option<i64>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub extra: Map<String, Value>,
}

/// Normalizes a raw backend record.
///
/// Anything that is not a JSON object yields an empty profile.
pub fn normalize_user(raw: &Value) -> UserProfile {
    let Value::Object(record) = raw else {
        return UserProfile::default();
    };

    let user_id = USER_ID_KEYS.iter().find_map(|k| record.get(*k).and_then(as_id));
    let full_name = FULL_NAME_KEYS
        .iter()
        .find_map(|k| record.get(*k).and_then(as_text))
        .or_else(|| joined_name(record));
    let email = EMAIL_KEYS.iter().find_map(|k| record.get(*k).and_then(as_text));
    let role = ROLE_KEYS.iter().find_map(|k| record.get(*k).and_then(as_role));

    let consumed = |key: &str| {
        USER_ID_KEYS.contains(&key)
            || FULL_NAME_KEYS.contains(&key)
            || EMAIL_KEYS.contains(&key)
            || ROLE_KEYS.contains(&key)
            // tokens are never kept inside the profile
            || key == "access_token"
            || key == "refresh_token"
    };
    let extra = record
        .iter()
        .filter(|(k, _)| !consumed(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    UserProfile {
        user_id,
        full_name,
        email,
        role,
        extra,
    }
}

fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Roles arrive either as a string or as `{ "name": "..." }`.
fn as_role(value: &Value) -> Option<String> {
    as_text(value).or_else(|| value.get("name").and_then(as_text))
}

fn joined_name(record: &Map<String, Value>) -> Option<String> {
    let first = record.get("first_name").and_then(as_text);
    let last = record.get("last_name").and_then(as_text);
    match (first, last) {
        (Some(f), Some(l)) => Some(format!("{f} {l}")),
        (Some(name), None) | (None, Some(name)) => Some(name),
        (None, None) => None,
    }
}
