//! Verification token lifecycle.

#![allow(clippy::unwrap_used)]

use chrono::TimeDelta;

use vic_shop_core::{ErrorKind, TokenKind};
use vic_shop_integration_tests::{TestShop, registration};
use vic_shop_storefront::db::Store;
use vic_shop_storefront::models::User;
use vic_shop_storefront::services::{Clock, ServiceError};
use vic_shop_storefront::services::accounts::AdminInvite;

async fn registered(shop: &TestShop, email: &str) -> User {
    shop.accounts()
        .register(registration(email, None))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_second_active_token_of_a_kind_is_refused() {
    let shop = TestShop::new();
    let user = registered(&shop, "sam@vic.test").await;

    let mut uow = shop.store.begin().await.unwrap();
    let err = shop
        .tokens()
        .issue(uow.as_mut(), user.id, TokenKind::EmailVerification)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Other kinds are independent.
    let reset = shop
        .tokens()
        .issue(uow.as_mut(), user.id, TokenKind::PasswordReset)
        .await
        .unwrap();
    assert_eq!(reset.expires_at, shop.clock.now() + TimeDelta::hours(24));
    uow.commit().await.unwrap();

    assert_eq!(shop.store.tokens_for(user.id).await.len(), 2);
}

#[tokio::test]
async fn test_token_can_be_reissued_after_redemption_or_expiry() {
    let shop = TestShop::new();
    let user = registered(&shop, "sam@vic.test").await;
    let token = shop
        .active_token(user.id, TokenKind::EmailVerification)
        .await
        .unwrap();
    shop.accounts()
        .verify_email("sam@vic.test", &token)
        .await
        .unwrap();

    let mut uow = shop.store.begin().await.unwrap();
    let second = shop
        .tokens()
        .issue(uow.as_mut(), user.id, TokenKind::EmailVerification)
        .await
        .unwrap();
    uow.commit().await.unwrap();
    assert_ne!(second.value, token);

    shop.clock.advance(TimeDelta::hours(25));
    let mut uow = shop.store.begin().await.unwrap();
    assert!(
        shop.tokens()
            .issue(uow.as_mut(), user.id, TokenKind::EmailVerification)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_token_redeems_exactly_once() {
    let shop = TestShop::new();
    let user = registered(&shop, "sam@vic.test").await;
    let token = shop
        .active_token(user.id, TokenKind::EmailVerification)
        .await
        .unwrap();

    let verified = shop
        .accounts()
        .verify_email("sam@vic.test", &token)
        .await
        .unwrap();
    assert!(verified.email_verified);

    let err = shop
        .accounts()
        .verify_email("sam@vic.test", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TokenAlreadyUsed));

    let stored = shop.store.tokens_for(user.id).await;
    assert!(stored.iter().all(|t| t.used));
}

#[tokio::test]
async fn test_concurrent_redemptions_have_one_winner() {
    let shop = TestShop::new();
    let user = registered(&shop, "sam@vic.test").await;
    let token = shop
        .active_token(user.id, TokenKind::EmailVerification)
        .await
        .unwrap();

    let accounts = shop.accounts();
    let (a, b) = tokio::join!(
        accounts.verify_email("sam@vic.test", &token),
        accounts.verify_email("sam@vic.test", &token),
    );

    let kinds: Vec<_> = [a.as_ref().err(), b.as_ref().err()]
        .into_iter()
        .flatten()
        .map(ServiceError::kind)
        .collect();
    assert_eq!(kinds, vec![ErrorKind::TokenAlreadyUsed]);
    assert!(a.is_ok() || b.is_ok());
}

#[tokio::test]
async fn test_expired_token_is_rejected_before_used_check() {
    let shop = TestShop::new();
    let user = registered(&shop, "sam@vic.test").await;
    let token = shop
        .active_token(user.id, TokenKind::EmailVerification)
        .await
        .unwrap();

    shop.clock.advance(TimeDelta::hours(24));
    // Still valid at exactly the expiry instant.
    shop.accounts()
        .verify_email("sam@vic.test", &token)
        .await
        .unwrap();

    shop.clock.advance(TimeDelta::seconds(1));
    let err = shop
        .accounts()
        .verify_email("sam@vic.test", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TokenExpired));
}

#[tokio::test]
async fn test_expired_token_leaves_account_unverified() {
    let shop = TestShop::new();
    let user = registered(&shop, "sam@vic.test").await;
    let token = shop
        .active_token(user.id, TokenKind::EmailVerification)
        .await
        .unwrap();

    shop.clock.advance(TimeDelta::hours(25));
    let err = shop
        .accounts()
        .verify_email("sam@vic.test", &token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenExpired);

    let profile = shop.accounts().profile(user.id).await.unwrap();
    assert!(!profile.email_verified);
}

#[tokio::test]
async fn test_token_of_another_account_is_a_mismatch() {
    let shop = TestShop::new();
    let owner = registered(&shop, "owner@vic.test").await;
    registered(&shop, "thief@vic.test").await;
    let token = shop
        .active_token(owner.id, TokenKind::EmailVerification)
        .await
        .unwrap();

    let err = shop
        .accounts()
        .verify_email("thief@vic.test", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TokenMismatch));

    // The failed attempt did not consume the token.
    let user = shop
        .accounts()
        .verify_email("owner@vic.test", &token)
        .await
        .unwrap();
    assert!(user.email_verified);
}

#[tokio::test]
async fn test_unknown_token_and_wrong_kind_are_not_found() {
    let shop = TestShop::new();
    let user = registered(&shop, "sam@vic.test").await;
    let token = shop
        .active_token(user.id, TokenKind::EmailVerification)
        .await
        .unwrap();

    let err = shop
        .accounts()
        .verify_email("sam@vic.test", "no-such-token")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = shop
        .accounts()
        .reset_password("sam@vic.test", &token, "another long password")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_token_value_formats() {
    let shop = TestShop::new();
    let user = shop
        .accounts()
        .register(registration("sam@vic.test", Some("+61400000000")))
        .await
        .unwrap();

    let email_token = shop
        .active_token(user.id, TokenKind::EmailVerification)
        .await
        .unwrap();
    assert_eq!(email_token.len(), 43);
    assert!(
        email_token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    );

    let code = shop
        .active_token(user.id, TokenKind::SmsVerification)
        .await
        .unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn test_invitation_lives_seven_days() {
    let shop = TestShop::new();
    let admin = shop.admin("admin@vic.test").await;

    let invited = shop
        .accounts()
        .invite_admin(
            &admin.principal(),
            AdminInvite {
                email: "new@vic.test".to_owned(),
                first_name: "Nova".to_owned(),
                last_name: "Admin".to_owned(),
            },
        )
        .await
        .unwrap();
    let token = shop
        .active_token(invited.id, TokenKind::AdminInvitation)
        .await
        .unwrap();

    shop.clock.advance(TimeDelta::days(6));
    let accepted = shop
        .accounts()
        .accept_invitation("new@vic.test", &token)
        .await
        .unwrap();
    assert!(accepted.email_verified);

    let late = shop
        .accounts()
        .invite_admin(
            &admin.principal(),
            AdminInvite {
                email: "late@vic.test".to_owned(),
                first_name: "Lat".to_owned(),
                last_name: "Admin".to_owned(),
            },
        )
        .await
        .unwrap();
    let token = shop
        .active_token(late.id, TokenKind::AdminInvitation)
        .await
        .unwrap();
    shop.clock.advance(TimeDelta::days(8));
    let err = shop
        .accounts()
        .accept_invitation("late@vic.test", &token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenExpired);
}

#[tokio::test]
async fn test_sweep_removes_only_expired_unused_tokens() {
    let shop = TestShop::new();
    shop.customer("verified@vic.test").await;
    registered(&shop, "pending@vic.test").await;
    assert_eq!(shop.store.token_count().await, 2);

    assert_eq!(shop.tokens().sweep_expired(&shop.store).await.unwrap(), 0);

    shop.clock.advance(TimeDelta::hours(25));
    assert_eq!(shop.tokens().sweep_expired(&shop.store).await.unwrap(), 1);
    assert_eq!(shop.store.token_count().await, 1);

    assert_eq!(shop.tokens().sweep_expired(&shop.store).await.unwrap(), 0);
}

#[tokio::test]
async fn test_used_tokens_are_purged_after_expiry() {
    let shop = TestShop::new();
    let verified = shop.customer("verified@vic.test").await;
    registered(&shop, "pending@vic.test").await;

    // Until expiry a used token still answers as used.
    assert_eq!(shop.tokens().purge_used(&shop.store).await.unwrap(), 0);

    shop.clock.advance(TimeDelta::hours(23));
    shop.accounts()
        .request_password_reset(verified.email.as_str())
        .await
        .unwrap();
    let reset = shop
        .active_token(verified.id, TokenKind::PasswordReset)
        .await
        .unwrap();
    shop.accounts()
        .reset_password(verified.email.as_str(), &reset, "a brand new secret")
        .await
        .unwrap();
    assert_eq!(shop.store.token_count().await, 3);

    shop.clock.advance(TimeDelta::hours(2));
    // Only the used verification token is past expiry; the pending one is
    // unused and the reset token is still inside its window.
    assert_eq!(shop.tokens().purge_used(&shop.store).await.unwrap(), 1);
    assert_eq!(shop.store.token_count().await, 2);
    let err = shop
        .accounts()
        .reset_password(verified.email.as_str(), &reset, "another new secret")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenAlreadyUsed);

    assert_eq!(shop.tokens().sweep_expired(&shop.store).await.unwrap(), 1);
    assert_eq!(shop.tokens().purge_used(&shop.store).await.unwrap(), 0);
    assert_eq!(shop.store.token_count().await, 1);
}
