//! Verification token ledger.
//!
//! A token is `ACTIVE` until it is redeemed (`USED`) or its expiry passes
//! (`EXPIRED`). Expiry is observed lazily at redemption; expired rows stay
//! until [`TokenLedger::sweep_expired`] removes them, after which they redeem
//! as not found. Used rows are kept until [`TokenLedger::purge_used`] drops
//! them after their own expiry, which keeps the 6-digit SMS code space from
//! filling up under the `(kind, value)` key.
//!
//! Issue and redeem run inside the caller's unit of work so that a redemption
//! commits together with whatever it unlocks.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;

use vic_shop_core::{TokenKind, UserId};

use super::{Clock, ServiceError};
use crate::db::{Store, TokenRepository, UnitOfWork, UserRepository};
use crate::models::{NewToken, VerificationToken};

/// Random bytes in an opaque token value.
const TOKEN_BYTES: usize = 32;

/// Attempts at finding an unused value before giving up.
const MAX_ISSUE_ATTEMPTS: u32 = 5;

/// Issues, redeems and sweeps verification tokens.
pub struct TokenLedger<'a> {
    clock: &'a dyn Clock,
}

impl<'a> TokenLedger<'a> {
    #[must_use]
    pub const fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    /// Issue a new token of `kind` to `user_id`.
    ///
    /// Locks the user row first, so concurrent issues for one user queue up
    /// and the active-token check cannot race.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the user doesn't exist.
    /// Returns `ServiceError::Conflict` if an active token of this kind exists.
    pub async fn issue(
        &self,
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
        kind: TokenKind,
    ) -> Result<VerificationToken, ServiceError> {
        uow.lock_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("user {user_id}")))?;

        let now = self.clock.now();
        if uow.find_active_token(user_id, kind, now).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "an active {kind} token already exists for this account"
            )));
        }

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let token = NewToken {
                value: generate_value(kind),
                user_id,
                kind,
                expires_at: now + kind.ttl(),
                created_at: now,
            };

            if let Some(token) = uow.insert_token(token).await? {
                tracing::debug!(user_id = %user_id, kind = %kind, token_id = %token.id, "token issued");
                return Ok(token);
            }
            tracing::debug!(attempt, kind = %kind, "token value collision");
        }

        Err(ServiceError::Conflict(format!(
            "could not generate a unique {kind} token"
        )))
    }

    /// Redeem the token `value` of `kind` on behalf of `expected_user`.
    ///
    /// The token row stays locked until the unit of work ends; marking it used
    /// under that lock is what makes a redemption single-use.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if no token matches.
    /// Returns `ServiceError::TokenExpired` if the token is past its expiry.
    /// Returns `ServiceError::TokenAlreadyUsed` if it was redeemed before.
    /// Returns `ServiceError::TokenMismatch` if it belongs to another user.
    pub async fn redeem(
        &self,
        uow: &mut dyn UnitOfWork,
        value: &str,
        kind: TokenKind,
        expected_user: UserId,
    ) -> Result<VerificationToken, ServiceError> {
        let token = uow
            .lock_token(value, kind)
            .await?
            .ok_or_else(|| ServiceError::not_found(format_args!("{kind} token")))?;

        if token.is_expired(self.clock.now()) {
            return Err(ServiceError::TokenExpired);
        }
        if token.used {
            return Err(ServiceError::TokenAlreadyUsed);
        }
        if token.user_id != expected_user {
            tracing::warn!(
                token_id = %token.id,
                owner = %token.user_id,
                presented_by = %expected_user,
                "token presented by another account"
            );
            return Err(ServiceError::TokenMismatch);
        }

        uow.mark_token_used(token.id).await?;
        tracing::debug!(token_id = %token.id, kind = %kind, "token redeemed");

        Ok(VerificationToken {
            used: true,
            ..token
        })
    }

    /// Delete every unused token past its expiry. Safe to run repeatedly.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the delete fails.
    pub async fn sweep_expired(&self, store: &dyn Store) -> Result<u64, ServiceError> {
        let mut uow = store.begin().await?;
        let removed = uow.delete_expired_tokens(self.clock.now()).await?;
        uow.commit().await?;

        tracing::info!(removed, "expired tokens swept");
        Ok(removed)
    }

    /// Delete used tokens whose expiry has passed.
    ///
    /// A used token keeps answering "already used" until it expires; after
    /// that its value is free for reissue.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the delete fails.
    pub async fn purge_used(&self, store: &dyn Store) -> Result<u64, ServiceError> {
        let mut uow = store.begin().await?;
        let purged = uow.delete_used_tokens(self.clock.now()).await?;
        uow.commit().await?;

        tracing::info!(purged, "used tokens purged");
        Ok(purged)
    }
}

/// A fresh token value: a 6-digit code for SMS, otherwise 32 random bytes in
/// URL-safe base64.
fn generate_value(kind: TokenKind) -> String {
    let mut rng = rand::rng();
    if kind.is_numeric_code() {
        format!("{:06}", rng.random_range(0..1_000_000))
    } else {
        let mut bytes = [0u8; TOKEN_BYTES];
        rng.fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
