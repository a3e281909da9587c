//! HTTP route handlers for the storefront API.
//!
//! Every endpoint speaks JSON. Errors use the body
//! `{"error": "<kind>", "message": "<text>"}` (see [`crate::error`]); malformed
//! bodies, paths and query strings are reported the same way through
//! [`crate::extract`].
//!
//! # Route Structure
//!
//! ```text
//! # Auth (rate limited)
//! POST   /auth/register              - Create a customer account
//! POST   /auth/login                 - Log in, start a session
//! POST   /auth/logout                - End the session
//! POST   /auth/verify-email          - Redeem an email verification token
//! POST   /auth/verify-phone          - Redeem an SMS code
//! POST   /auth/sms-verification      - Send an SMS code (requires auth)
//! POST   /auth/password-reset        - Request a reset link
//! POST   /auth/password-reset/confirm - Set a new password with a reset token
//! POST   /auth/accept-invitation     - Redeem an admin invitation
//!
//! # Catalog
//! GET    /products                   - Product listing (?category, ?sort, ?page, ?size)
//! GET    /products/search            - Name/description search (?query, ?page, ?size)
//! GET    /products/{id}              - Product detail
//!
//! # Cart (requires auth)
//! GET    /cart                       - Cart with subtotal and item count
//! DELETE /cart                       - Remove every line
//! POST   /cart/items                 - Add a product
//! PATCH  /cart/items/{id}            - Change a line's quantity
//! DELETE /cart/items/{id}            - Remove a line
//!
//! # Orders (requires auth)
//! POST   /checkout                   - Turn the cart into an order
//! POST   /orders                     - Place an order from explicit lines
//! GET    /orders                     - Own orders, newest first
//! GET    /orders/{id}                - Order detail
//! POST   /orders/{id}/cancel         - Cancel a pending order
//!
//! # Account (requires auth)
//! GET    /account                    - Profile
//! PATCH  /account                    - Update profile
//! POST   /account/password           - Change password
//!
//! # Admin (requires admin)
//! GET    /admin/orders               - All orders (?status)
//! PUT    /admin/orders/{id}/status   - Change order status
//! POST   /admin/products             - Create a product
//! PATCH  /admin/products/{id}        - Update a product
//! DELETE /admin/products/{id}        - Delete a product
//! POST   /admin/products/{id}/stock  - Adjust stock by a delta
//! GET    /admin/users                - Users (?role)
//! DELETE /admin/users/{id}           - Delete a user
//! POST   /admin/invitations          - Invite an administrator
//! GET    /admin/reports/sales        - Sales report (?start, ?end)
//! GET    /admin/reports/inventory    - Inventory report
//! POST   /admin/tokens/sweep         - Delete expired tokens
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod orders;
pub mod products;

use axum::Router;

use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// All storefront routes, without rate limiting.
pub fn routes() -> Router<AppState> {
    with_auth(auth::router())
}

/// All storefront routes with the `/auth` rate limiter applied.
///
/// The limiter keys on the client address, so the server must be started
/// with `into_make_service_with_connect_info`.
pub fn rate_limited_routes() -> Router<AppState> {
    with_auth(auth::router().layer(auth_rate_limiter()))
}

fn with_auth(auth: Router<AppState>) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth)
        .nest("/products", products::router())
        .nest("/cart", cart::router())
        .merge(orders::router())
        .nest("/account", account::router())
        .nest("/admin", admin::router())
}
