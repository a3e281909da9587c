//! Verification token queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vic_shop_core::{TokenId, TokenKind, UserId};

use super::PgUnitOfWork;
use crate::db::{RepositoryError, TokenRepository};
use crate::models::{NewToken, VerificationToken};

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: TokenId,
    value: String,
    user_id: UserId,
    kind: TokenKind,
    expires_at: DateTime<Utc>,
    used: bool,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for VerificationToken {
    fn from(r: TokenRow) -> Self {
        Self {
            id: r.id,
            value: r.value,
            user_id: r.user_id,
            kind: r.kind,
            expires_at: r.expires_at,
            used: r.used,
            created_at: r.created_at,
        }
    }
}

#[async_trait]
impl TokenRepository for PgUnitOfWork {
    async fn find_active_token(
        &mut self,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r"
            SELECT id, value, user_id, kind, expires_at, used, created_at
            FROM shop.verification_token
            WHERE user_id = $1 AND kind = $2 AND NOT used AND expires_at >= $3
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(user_id)
        .bind(kind)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(VerificationToken::from))
    }

    async fn insert_token(
        &mut self,
        token: NewToken,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        // ON CONFLICT keeps the transaction alive on a value collision.
        let row = sqlx::query_as::<_, TokenRow>(
            r"
            INSERT INTO shop.verification_token (value, user_id, kind, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            ON CONFLICT (kind, value) DO NOTHING
            RETURNING id, value, user_id, kind, expires_at, used, created_at
            ",
        )
        .bind(&token.value)
        .bind(token.user_id)
        .bind(token.kind)
        .bind(token.expires_at)
        .bind(token.created_at)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(VerificationToken::from))
    }

    async fn lock_token(
        &mut self,
        value: &str,
        kind: TokenKind,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r"
            SELECT id, value, user_id, kind, expires_at, used, created_at
            FROM shop.verification_token
            WHERE value = $1 AND kind = $2
            FOR UPDATE
            ",
        )
        .bind(value)
        .bind(kind)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(VerificationToken::from))
    }

    async fn mark_token_used(&mut self, id: TokenId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE shop.verification_token SET used = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_expired_tokens(&mut self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM shop.verification_token WHERE NOT used AND expires_at < $1",
        )
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_used_tokens(&mut self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM shop.verification_token WHERE used AND expires_at < $1")
                .bind(now)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected())
    }
}
