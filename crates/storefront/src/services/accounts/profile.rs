//! Profile and user administration.

use serde::Deserialize;

use vic_shop_core::{UserId, UserRole};

use super::{AccountService, hash_password, validate_password, verify_password};
use crate::db::{OrderRepository, UserRepository};
use crate::models::{PostalAddress, Principal, User};
use crate::services::{ServiceError, require_admin};

/// Partial profile update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// A blank string removes the phone number.
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
}

impl ProfileUpdate {
    fn apply_to(self, user: &mut User) -> Result<(), ServiceError> {
        if let Some(first_name) = self.first_name {
            user.first_name = non_blank("first name", &first_name)?;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = non_blank("last name", &last_name)?;
        }
        if let Some(phone) = self.phone {
            let phone = Some(phone.trim().to_owned()).filter(|p| !p.is_empty());
            if phone != user.phone {
                user.phone = phone;
                user.phone_verified = false;
            }
        }
        if let Some(address) = self.address {
            user.address = Some(address);
        }
        Ok(())
    }
}

fn non_blank(field: &str, value: &str) -> Result<String, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{field} cannot be blank")));
    }
    Ok(value.to_owned())
}

impl AccountService<'_> {
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the user doesn't exist.
    pub async fn profile(&self, user_id: UserId) -> Result<User, ServiceError> {
        let mut uow = self.store.begin().await?;
        uow.get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("user {user_id}")))
    }

    /// Change names, phone or address. A new phone number must be verified
    /// again.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the user doesn't exist.
    /// Returns `ServiceError::Validation` for a blank name.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        changes: ProfileUpdate,
    ) -> Result<User, ServiceError> {
        let mut uow = self.store.begin().await?;
        let mut user = uow
            .lock_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("user {user_id}")))?;

        changes.apply_to(&mut user)?;
        user.updated_at = self.clock.now();
        uow.update_user(&user).await?;
        uow.commit().await?;

        Ok(user)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::InvalidCredentials` if `current` is wrong.
    /// Returns `ServiceError::Validation` if `new_password` is too short.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        validate_password(new_password)?;

        let mut uow = self.store.begin().await?;
        let mut user = uow
            .lock_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("user {user_id}")))?;

        verify_password(current, &user.password_hash)?;
        user.password_hash = hash_password(new_password)?;
        user.updated_at = self.clock.now();
        uow.update_user(&user).await?;
        uow.commit().await?;

        tracing::info!(user_id = %user_id, "password changed");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    pub async fn list_users(
        &self,
        actor: &Principal,
        role: Option<UserRole>,
    ) -> Result<Vec<User>, ServiceError> {
        require_admin(actor, "list users")?;

        let mut uow = self.store.begin().await?;
        Ok(uow.list_users(role).await?)
    }

    /// Delete a user together with their cart, tokens and finished orders.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    /// Returns `ServiceError::NotFound` if the user doesn't exist.
    /// Returns `ServiceError::Conflict` if the user has orders that are not
    /// yet completed or cancelled, or is the last administrator.
    pub async fn delete_user(&self, actor: &Principal, user_id: UserId) -> Result<(), ServiceError> {
        require_admin(actor, "delete users")?;

        let mut uow = self.store.begin().await?;
        let target = uow
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("user {user_id}")))?;

        // Admin rows are locked before the target row so that two admins
        // deleting each other queue up on the same rows in the same order.
        if target.role.is_admin() && uow.lock_admins().await?.len() <= 1 {
            return Err(ServiceError::Conflict(
                "cannot delete the last administrator".to_owned(),
            ));
        }
        uow.lock_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("user {user_id}")))?;

        if uow.has_open_orders(user_id).await? {
            return Err(ServiceError::Conflict(
                "cannot delete a user with open orders".to_owned(),
            ));
        }

        uow.delete_user(user_id).await?;
        uow.commit().await?;

        tracing::info!(user_id = %user_id, actor = %actor.user_id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use vic_shop_core::Email;

    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(1),
            email: Email::parse("ada@example.com").unwrap(),
            password_hash: String::new(),
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            phone: Some("+15550100".to_owned()),
            address: None,
            role: UserRole::Customer,
            email_verified: true,
            phone_verified: true,
            enabled: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn test_new_phone_needs_verification() {
        let mut u = user();
        ProfileUpdate {
            phone: Some("+15550199".to_owned()),
            ..ProfileUpdate::default()
        }
        .apply_to(&mut u)
        .unwrap();
        assert_eq!(u.phone.as_deref(), Some("+15550199"));
        assert!(!u.phone_verified);
    }

    #[test]
    fn test_same_phone_keeps_verification() {
        let mut u = user();
        ProfileUpdate {
            phone: Some(" +15550100 ".to_owned()),
            first_name: Some("Augusta".to_owned()),
            ..ProfileUpdate::default()
        }
        .apply_to(&mut u)
        .unwrap();
        assert!(u.phone_verified);
        assert_eq!(u.first_name, "Augusta");
    }

    #[test]
    fn test_blank_phone_removes_it() {
        let mut u = user();
        ProfileUpdate {
            phone: Some(String::new()),
            ..ProfileUpdate::default()
        }
        .apply_to(&mut u)
        .unwrap();
        assert_eq!(u.phone, None);
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let mut u = user();
        let result = ProfileUpdate {
            last_name: Some("  ".to_owned()),
            ..ProfileUpdate::default()
        }
        .apply_to(&mut u);
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }
}
