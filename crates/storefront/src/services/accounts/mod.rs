//! Accounts: registration, login, verification, password reset and admin
//! invitations. Profile management lives in [`profile`].
//!
//! Flows that send a token commit first and notify afterwards through
//! [`deliver_all`], so a mail outage never loses an account or a token.

mod password;
mod profile;

pub use password::{
    MIN_PASSWORD_LENGTH, generate_temporary_password, hash_password, validate_password,
    verify_password,
};
pub use profile::ProfileUpdate;

use serde::Deserialize;

use vic_shop_core::{Email, TokenKind, UserId, UserRole};

use super::notify::{Notification, Notifier, deliver_all};
use super::{Clock, ServiceError, TokenLedger, require_admin};
use crate::db::{RepositoryError, Store, TokenRepository, UnitOfWork, UserRepository};
use crate::models::{NewUser, PostalAddress, Principal, User};

/// Input for customer registration.
#[derive(Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<PostalAddress>,
}

/// Input for inviting an administrator.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminInvite {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Account lifecycle operations.
pub struct AccountService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
    base_url: &'a str,
}

impl<'a> AccountService<'a> {
    #[must_use]
    pub const fn new(
        store: &'a dyn Store,
        clock: &'a dyn Clock,
        notifier: &'a dyn Notifier,
        base_url: &'a str,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            base_url,
        }
    }

    const fn ledger(&self) -> TokenLedger<'a> {
        TokenLedger::new(self.clock)
    }

    async fn notify(&self, notifications: Vec<Notification>) {
        deliver_all(self.notifier, self.base_url, notifications).await;
    }

    /// Register a customer and send the email (and, with a phone, SMS)
    /// verification tokens.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a malformed email, a short
    /// password or a blank name.
    /// Returns `ServiceError::Conflict` if the email is already registered.
    pub async fn register(&self, input: Registration) -> Result<User, ServiceError> {
        let email = Email::parse(&input.email)?;
        validate_password(&input.password)?;
        validate_names(&input.first_name, &input.last_name)?;
        let phone = normalize_phone(input.phone);
        let password_hash = hash_password(&input.password)?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let mut user = insert_account(
            uow.as_mut(),
            NewUser {
                email,
                password_hash,
                first_name: input.first_name.trim().to_owned(),
                last_name: input.last_name.trim().to_owned(),
                phone,
                role: UserRole::Customer,
                email_verified: false,
                created_at: now,
            },
        )
        .await?;

        if let Some(address) = input.address {
            user.address = Some(address);
            uow.update_user(&user).await?;
        }

        let mut notifications = Vec::with_capacity(2);
        let token = self
            .ledger()
            .issue(uow.as_mut(), user.id, TokenKind::EmailVerification)
            .await?;
        notifications.push(Notification::EmailVerification {
            to: user.email.clone(),
            token: token.value,
        });

        if let Some(phone) = &user.phone {
            let code = self
                .ledger()
                .issue(uow.as_mut(), user.id, TokenKind::SmsVerification)
                .await?;
            notifications.push(Notification::PhoneVerification {
                phone: phone.clone(),
                code: code.value,
            });
        }

        uow.commit().await?;
        tracing::info!(user_id = %user.id, email = %user.email, "user registered");

        self.notify(notifications).await;
        Ok(user)
    }

    /// Check credentials and record the login.
    ///
    /// An unverified account is refused; if it has no active verification
    /// token a new one is issued and emailed first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidCredentials` for an unknown email or a
    /// wrong password.
    /// Returns `ServiceError::AccountDisabled` if the account is disabled.
    /// Returns `ServiceError::EmailNotVerified` if the email is unverified.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let email = Email::parse(email).map_err(|_| ServiceError::InvalidCredentials)?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let mut user = uow
            .get_user_by_email(&email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(password, &user.password_hash)?;

        if !user.enabled {
            return Err(ServiceError::AccountDisabled);
        }

        if !user.email_verified {
            // Held until commit, so a concurrent login sees the token issued here.
            uow.lock_user(user.id).await?;
            let active = uow
                .find_active_token(user.id, TokenKind::EmailVerification, now)
                .await?;
            if active.is_none() {
                let token = self
                    .ledger()
                    .issue(uow.as_mut(), user.id, TokenKind::EmailVerification)
                    .await?;
                uow.commit().await?;
                self.notify(vec![Notification::EmailVerification {
                    to: user.email.clone(),
                    token: token.value,
                }])
                .await;
            }
            return Err(ServiceError::EmailNotVerified);
        }

        user.last_login_at = Some(now);
        uow.update_user(&user).await?;
        uow.commit().await?;

        tracing::info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    /// Redeem an email verification token.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown email or token, and
    /// the token errors of [`TokenLedger::redeem`].
    pub async fn verify_email(&self, email: &str, token: &str) -> Result<User, ServiceError> {
        self.redeem_for(email, token, TokenKind::EmailVerification, |user| {
            user.email_verified = true;
        })
        .await
    }

    /// Send a fresh SMS verification code to the user's phone.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the user doesn't exist.
    /// Returns `ServiceError::Validation` if the account has no phone.
    /// Returns `ServiceError::Conflict` if the phone is already verified or a
    /// code is still active.
    pub async fn send_sms_verification(&self, user_id: UserId) -> Result<(), ServiceError> {
        let mut uow = self.store.begin().await?;
        let user = uow
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("user {user_id}")))?;

        let Some(phone) = user.phone else {
            return Err(ServiceError::Validation(
                "no phone number on this account".to_owned(),
            ));
        };
        if user.phone_verified {
            return Err(ServiceError::Conflict(
                "phone number is already verified".to_owned(),
            ));
        }

        let code = self
            .ledger()
            .issue(uow.as_mut(), user_id, TokenKind::SmsVerification)
            .await?;
        uow.commit().await?;

        self.notify(vec![Notification::PhoneVerification {
            phone,
            code: code.value,
        }])
        .await;
        Ok(())
    }

    /// Redeem an SMS verification code.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown email or code, and the
    /// token errors of [`TokenLedger::redeem`].
    pub async fn verify_phone(&self, email: &str, code: &str) -> Result<User, ServiceError> {
        self.redeem_for(email, code, TokenKind::SmsVerification, |user| {
            user.phone_verified = true;
        })
        .await
    }

    /// Email a password reset token.
    ///
    /// Succeeds silently for unknown emails and when a reset token is already
    /// active, so the response never reveals whether an account exists.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a malformed email.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let email = Email::parse(email)?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let Some(user) = uow.get_user_by_email(&email).await? else {
            tracing::debug!(email = %email, "password reset for unknown email");
            return Ok(());
        };

        uow.lock_user(user.id).await?;
        if uow
            .find_active_token(user.id, TokenKind::PasswordReset, now)
            .await?
            .is_some()
        {
            tracing::debug!(user_id = %user.id, "password reset already pending");
            return Ok(());
        }

        let token = self
            .ledger()
            .issue(uow.as_mut(), user.id, TokenKind::PasswordReset)
            .await?;
        uow.commit().await?;

        self.notify(vec![Notification::PasswordReset {
            to: user.email,
            token: token.value,
        }])
        .await;
        Ok(())
    }

    /// Set a new password with a reset token.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` if the new password is too short.
    /// Returns `ServiceError::NotFound` for an unknown email or token, and
    /// the token errors of [`TokenLedger::redeem`].
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        validate_password(new_password)?;
        let password_hash = hash_password(new_password)?;

        self.redeem_for(email, token, TokenKind::PasswordReset, |user| {
            user.password_hash = password_hash;
        })
        .await?;
        Ok(())
    }

    /// Create an administrator with a temporary password and email them an
    /// invitation.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authorization` unless `actor` is an admin.
    /// Returns `ServiceError::Validation` for a malformed email or blank name.
    /// Returns `ServiceError::Conflict` if the email is already registered.
    pub async fn invite_admin(
        &self,
        actor: &Principal,
        invite: AdminInvite,
    ) -> Result<User, ServiceError> {
        require_admin(actor, "invite administrators")?;
        let email = Email::parse(&invite.email)?;
        validate_names(&invite.first_name, &invite.last_name)?;

        let temporary_password = generate_temporary_password();
        let password_hash = hash_password(&temporary_password)?;

        let mut uow = self.store.begin().await?;
        let user = insert_account(
            uow.as_mut(),
            NewUser {
                email,
                password_hash,
                first_name: invite.first_name.trim().to_owned(),
                last_name: invite.last_name.trim().to_owned(),
                phone: None,
                role: UserRole::Admin,
                email_verified: false,
                created_at: self.clock.now(),
            },
        )
        .await?;

        let token = self
            .ledger()
            .issue(uow.as_mut(), user.id, TokenKind::AdminInvitation)
            .await?;
        uow.commit().await?;

        tracing::info!(user_id = %user.id, invited_by = %actor.user_id, "administrator invited");
        self.notify(vec![Notification::AdminInvitation {
            to: user.email.clone(),
            token: token.value,
            temporary_password,
        }])
        .await;
        Ok(user)
    }

    /// Redeem an admin invitation, which also verifies the email address.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown email or token, and
    /// the token errors of [`TokenLedger::redeem`].
    pub async fn accept_invitation(&self, email: &str, token: &str) -> Result<User, ServiceError> {
        self.redeem_for(email, token, TokenKind::AdminInvitation, |user| {
            user.email_verified = true;
        })
        .await
    }

    /// Create a verified administrator directly. For operator bootstrap.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for malformed input.
    /// Returns `ServiceError::Conflict` if the email is already registered.
    pub async fn create_admin_account(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, ServiceError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        validate_names(first_name, last_name)?;
        let password_hash = hash_password(password)?;

        let mut uow = self.store.begin().await?;
        let user = insert_account(
            uow.as_mut(),
            NewUser {
                email,
                password_hash,
                first_name: first_name.trim().to_owned(),
                last_name: last_name.trim().to_owned(),
                phone: None,
                role: UserRole::Admin,
                email_verified: true,
                created_at: self.clock.now(),
            },
        )
        .await?;
        uow.commit().await?;

        tracing::info!(user_id = %user.id, "administrator created");
        Ok(user)
    }

    /// Redeem `value` as a `kind` token of the account `email`, apply
    /// `effect` to the user and commit both together.
    async fn redeem_for(
        &self,
        email: &str,
        value: &str,
        kind: TokenKind,
        effect: impl FnOnce(&mut User) + Send,
    ) -> Result<User, ServiceError> {
        let email = Email::parse(email)?;

        let mut uow = self.store.begin().await?;
        let user = uow
            .get_user_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::not_found("user"))?;
        self.ledger()
            .redeem(uow.as_mut(), value, kind, user.id)
            .await?;

        let mut user = uow
            .lock_user(user.id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user"))?;
        effect(&mut user);
        user.updated_at = self.clock.now();
        uow.update_user(&user).await?;
        uow.commit().await?;

        tracing::info!(user_id = %user.id, kind = %kind, "token redeemed");
        Ok(user)
    }
}

async fn insert_account(uow: &mut dyn UnitOfWork, user: NewUser) -> Result<User, ServiceError> {
    uow.insert_user(user).await.map_err(|e| match e {
        RepositoryError::Conflict(_) => {
            ServiceError::Conflict("email already registered".to_owned())
        }
        other => ServiceError::Repository(other),
    })
}

fn validate_names(first_name: &str, last_name: &str) -> Result<(), ServiceError> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(ServiceError::Validation(
            "first and last name are required".to_owned(),
        ));
    }
    Ok(())
}

/// Blank phone numbers count as none.
fn normalize_phone(phone: Option<String>) -> Option<String> {
    phone
        .map(|p| p.trim().to_owned())
        .filter(|p| !p.is_empty())
}
