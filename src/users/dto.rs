use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::users::repo::User;

/// Request body for registration.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub age: Option<i64>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response for register and login: the redacted user plus the freshly
/// minted session token.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: PublicUser,
    pub token: String,
}

/// Public part of the user returned to clients.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub age: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            age: user.age,
            created_at: user.created_at,
        }
    }
}

/// One updatable field. PATCH bodies are parsed into this closed set before
/// any I/O; a key outside it rejects the whole request.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Name(String),
    Email(String),
    Password(String),
    Age(i64),
}

impl FieldUpdate {
    pub fn parse_all(body: &Map<String, Value>) -> Result<Vec<FieldUpdate>, ApiError> {
        let mut updates = Vec::with_capacity(body.len());
        for (key, value) in body {
            let update = match key.as_str() {
                "name" => FieldUpdate::Name(expect_string(key, value)?),
                "email" => FieldUpdate::Email(expect_string(key, value)?),
                "password" => FieldUpdate::Password(expect_string(key, value)?),
                "age" => FieldUpdate::Age(
                    value
                        .as_i64()
                        .ok_or_else(|| ApiError::Validation("age must be an integer".into()))?,
                ),
                _ => return Err(ApiError::Validation("invalid update field".into())),
            };
            updates.push(update);
        }
        Ok(updates)
    }
}

fn expect_string(key: &str, value: &Value) -> Result<String, ApiError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ApiError::Validation(format!("{key} must be a string")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn parse_all_accepts_every_allowed_field() {
        let updates = FieldUpdate::parse_all(&body(json!({
            "name": "B",
            "email": "b@x.com",
            "password": "longenough",
            "age": 41,
        })))
        .unwrap();
        assert_eq!(updates.len(), 4);
        assert!(updates.contains(&FieldUpdate::Age(41)));
        assert!(updates.contains(&FieldUpdate::Name("B".into())));
    }

    #[test]
    fn parse_all_rejects_unknown_field_wholesale() {
        let err = FieldUpdate::parse_all(&body(json!({
            "name": "B",
            "isAdmin": true,
        })))
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(msg) if msg == "invalid update field"));
    }

    #[test]
    fn parse_all_rejects_wrong_value_types() {
        assert!(FieldUpdate::parse_all(&body(json!({ "age": "forty" }))).is_err());
        assert!(FieldUpdate::parse_all(&body(json!({ "name": 7 }))).is_err());
    }

    #[test]
    fn session_response_never_contains_password() {
        let response = SessionResponse {
            user: PublicUser {
                id: Uuid::new_v4(),
                name: "A".into(),
                email: "a@x.com".into(),
                age: 0,
                created_at: OffsetDateTime::UNIX_EPOCH,
            },
            token: "tok".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        let user = json.get("user").unwrap().as_object().unwrap();
        assert!(user.get("password").is_none());
        assert!(user.get("password_hash").is_none());
        assert!(user.get("tokens").is_none());
        assert_eq!(json.get("token").unwrap(), "tok");
    }
}
