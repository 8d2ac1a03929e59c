use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::errors::ApiError;
use crate::users::dto::{CreateUserRequest, FieldUpdate, LoginRequest};
use crate::users::repo::User;

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if !is_valid_email(email) {
        return Err(ApiError::Validation("invalid email".into()));
    }
    Ok(())
}

fn validate_password(plain: &str) -> Result<(), ApiError> {
    if plain.len() < 7 {
        return Err(ApiError::Validation("password too short".into()));
    }
    if plain.to_lowercase().contains("password") {
        return Err(ApiError::Validation(
            "password must not contain \"password\"".into(),
        ));
    }
    Ok(())
}

fn validate_age(age: i64) -> Result<(), ApiError> {
    if age < 0 {
        return Err(ApiError::Validation(
            "age must be a non-negative integer".into(),
        ));
    }
    Ok(())
}

/// Create the account, then mint its first session token and persist it on
/// the token list.
pub async fn register(
    db: &PgPool,
    keys: &JwtKeys,
    req: CreateUserRequest,
) -> Result<(User, String), ApiError> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    let age = req.age.unwrap_or(0);

    validate_name(&name)?;
    validate_email(&email)?;
    validate_password(&req.password)?;
    validate_age(age)?;

    // Precheck; the unique constraint on users.email backstops the race.
    if User::find_by_email(db, &email).await?.is_some() {
        return Err(ApiError::Validation("email already registered".into()));
    }

    let hash = hash_password(&req.password)?;
    let mut user = User::insert(db, &name, &email, &hash, age).await?;

    let token = keys.sign(user.id)?;
    user.tokens.0.push(token.clone());
    let user = user.save(db).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((user, token))
}

/// Credential login. Unknown email and wrong password produce the same
/// failure; a success appends a new token without touching existing ones.
pub async fn login(
    db: &PgPool,
    keys: &JwtKeys,
    req: LoginRequest,
) -> Result<(User, String), ApiError> {
    let email = req.email.trim().to_lowercase();

    let mut user = User::find_by_email(db, &email)
        .await?
        .ok_or(ApiError::Authentication)?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::Authentication);
    }

    let token = keys.sign(user.id)?;
    user.tokens.0.push(token.clone());
    let user = user.save(db).await?;

    info!(user_id = %user.id, "user logged in");
    Ok((user, token))
}

/// Drop the presented token from the session list; every equal copy goes,
/// other sessions stay valid. Idempotent when the token is already absent.
pub async fn logout_current(db: &PgPool, mut user: User, presented: &str) -> Result<(), ApiError> {
    user.tokens.0.retain(|t| t != presented);
    user.save(db).await?;
    info!(user_id = %user.id, "session logged out");
    Ok(())
}

/// Revoke every session. Idempotent on an already-empty list.
pub async fn logout_all(db: &PgPool, mut user: User) -> Result<(), ApiError> {
    user.tokens.0.clear();
    user.save(db).await?;
    info!(user_id = %user.id, "all sessions logged out");
    Ok(())
}

pub async fn get_by_id(db: &PgPool, id: Uuid) -> Result<User, ApiError> {
    User::find_by_id(db, id).await?.ok_or(ApiError::NotFound)
}

/// Apply an already-parsed set of field updates. The caller has validated the
/// key set, so nothing here can touch a disallowed field; a validation
/// failure aborts before the single save, leaving the row untouched.
pub async fn update(db: &PgPool, id: Uuid, updates: Vec<FieldUpdate>) -> Result<User, ApiError> {
    let mut user = User::find_by_id(db, id).await?.ok_or(ApiError::NotFound)?;

    for update in updates {
        match update {
            FieldUpdate::Name(v) => user.name = v.trim().to_string(),
            FieldUpdate::Email(v) => user.email = v.trim().to_lowercase(),
            FieldUpdate::Password(v) => {
                validate_password(&v)?;
                user.password_hash = hash_password(&v)?;
            }
            FieldUpdate::Age(v) => user.age = v,
        }
    }

    validate_name(&user.name)?;
    validate_email(&user.email)?;
    validate_age(user.age)?;

    if let Some(existing) = User::find_by_email(db, &user.email).await? {
        if existing.id != user.id {
            return Err(ApiError::Validation("email already registered".into()));
        }
    }

    let user = user.save(db).await?;
    info!(user_id = %user.id, "user updated");
    Ok(user)
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<User, ApiError> {
    let user = User::delete_by_id(db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(user_id = %user.id, "user deleted");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_plain_addresses() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
    }

    #[test]
    fn email_regex_rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("two@@x.com"));
        assert!(!is_valid_email("spaced @x.com"));
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("myPassword123").is_err());
        assert!(validate_password("PASSWORD-repeated").is_err());
    }

    #[test]
    fn age_must_be_non_negative() {
        assert!(validate_age(0).is_ok());
        assert!(validate_age(130).is_ok());
        assert!(validate_age(-1).is_err());
    }

    #[test]
    fn name_must_be_non_empty() {
        assert!(validate_name("Ada").is_ok());
        assert!(validate_name("").is_err());
    }
}
