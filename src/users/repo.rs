use serde::Serialize;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. `password_hash` and `tokens` never serialize;
/// responses go through `dto::PublicUser` on top of that.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub age: i64,
    /// Active session tokens, insertion-ordered, newest last. Duplicates are
    /// kept as-is.
    #[serde(skip_serializing)]
    pub tokens: Json<Vec<String>>,
    pub created_at: OffsetDateTime,
}

impl User {
    pub async fn insert(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
        age: i64,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, age)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password_hash, age, tokens, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(age)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, age, tokens, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, age, tokens, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Write every mutable column back, token list included. Concurrent saves
    /// of the same row are last-writer-wins; there is no optimistic locking.
    pub async fn save(&self, db: &PgPool) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = $2, email = $3, password_hash = $4, age = $5, tokens = $6
            WHERE id = $1
            RETURNING id, name, email, password_hash, age, tokens, created_at
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.email)
        .bind(&self.password_hash)
        .bind(self.age)
        .bind(&self.tokens)
        .fetch_one(db)
        .await
    }

    /// Atomic find-and-delete, returning the row as it was before deletion.
    pub async fn delete_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            DELETE FROM users
            WHERE id = $1
            RETURNING id, name, email, password_hash, age, tokens, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@x.com".into(),
            password_hash: "$argon2id$fake".into(),
            age: 30,
            tokens: Json(vec!["tok-1".into(), "tok-2".into()]),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn serialized_user_redacts_secrets() {
        let value = serde_json::to_value(sample_user()).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.get("password_hash").is_none());
        assert!(obj.get("password").is_none());
        assert!(obj.get("tokens").is_none());
        assert!(obj.get("email").is_some());
    }

    #[test]
    fn token_list_keeps_insertion_order_and_duplicates() {
        let mut user = sample_user();
        user.tokens.0.push("tok-1".into());
        assert_eq!(user.tokens.0, vec!["tok-1", "tok-2", "tok-1"]);
    }
}
