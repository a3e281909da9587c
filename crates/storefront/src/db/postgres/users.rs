//! User queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vic_shop_core::{Email, UserId, UserRole};

use super::{PgUnitOfWork, conflict_on_unique};
use crate::db::{RepositoryError, UserRepository};
use crate::models::{NewUser, PostalAddress, User};

const SELECT_USER: &str = r"
    SELECT id, email, password_hash, first_name, last_name, phone,
           street, city, state, postal_code, country,
           role, email_verified, phone_verified, enabled,
           created_at, updated_at, last_login_at
    FROM shop.user";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: Email,
    password_hash: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    street: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
    role: UserRole,
    email_verified: bool,
    phone_verified: bool,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        // An address is stored only as a whole; a missing street means none.
        let address = match (r.street, r.city, r.state, r.postal_code) {
            (Some(street), Some(city), Some(state), Some(postal_code)) => Some(PostalAddress {
                street,
                city,
                state,
                postal_code,
                country: r.country,
            }),
            _ => None,
        };

        Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            first_name: r.first_name,
            last_name: r.last_name,
            phone: r.phone,
            address,
            role: r.role,
            email_verified: r.email_verified,
            phone_verified: r.phone_verified,
            enabled: r.enabled,
            created_at: r.created_at,
            updated_at: r.updated_at,
            last_login_at: r.last_login_at,
        }
    }
}

#[async_trait]
impl UserRepository for PgUnitOfWork {
    async fn get_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(User::from))
    }

    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(User::from))
    }

    async fn get_user_by_email(&mut self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE email = $1"))
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(User::from))
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO shop.user
                (email, password_hash, first_name, last_name, phone, role,
                 email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id, email, password_hash, first_name, last_name, phone,
                      street, city, state, postal_code, country,
                      role, email_verified, phone_verified, enabled,
                      created_at, updated_at, last_login_at
            ",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(user.role)
        .bind(user.email_verified)
        .bind(user.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        Ok(row.into())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let address = user.address.as_ref();
        let result = sqlx::query(
            r"
            UPDATE shop.user
            SET password_hash = $2, first_name = $3, last_name = $4, phone = $5,
                street = $6, city = $7, state = $8, postal_code = $9, country = $10,
                role = $11, email_verified = $12, phone_verified = $13, enabled = $14,
                updated_at = $15, last_login_at = $16
            WHERE id = $1
            ",
        )
        .bind(user.id)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(address.map(|a| a.street.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.state.as_str()))
        .bind(address.map(|a| a.postal_code.as_str()))
        .bind(address.and_then(|a| a.country.as_deref()))
        .bind(user.role)
        .bind(user.email_verified)
        .bind(user.phone_verified)
        .bind(user.enabled)
        .bind(user.updated_at)
        .bind(user.last_login_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&mut self, id: UserId) -> Result<bool, RepositoryError> {
        // Carts, tokens and orders cascade.
        let result = sqlx::query("DELETE FROM shop.user WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&mut self, role: Option<UserRole>) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_USER} WHERE ($1::shop.user_role IS NULL OR role = $1) ORDER BY id"
        ))
        .bind(role)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn lock_admins(&mut self) -> Result<Vec<UserId>, RepositoryError> {
        let ids: Vec<UserId> = sqlx::query_scalar(
            "SELECT id FROM shop.user WHERE role = 'admin' ORDER BY id FOR UPDATE",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }
}
