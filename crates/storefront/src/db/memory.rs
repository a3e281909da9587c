//! In-process store.
//!
//! A unit of work holds the store-wide lock for its whole lifetime and works
//! on a private copy of the state. Commit swaps the copy in; drop discards it.
//! Units of work therefore run one at a time, which makes the store a
//! serializable reference backend for tests and local development.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use vic_shop_core::{
    CartId, CartItemId, Email, OrderId, OrderItemId, OrderStatus, ProductId, TokenId, TokenKind,
    UserId, UserRole,
};

use super::{
    CartRepository, OrderRepository, ProductRepository, RepositoryError, Store, TokenRepository,
    UnitOfWork, UserRepository,
};
use crate::models::{
    Cart, CartItem, NewCartItem, NewOrder, NewProduct, NewToken, NewUser, Order, OrderItem, Page,
    Product, ProductSort, User, VerificationToken,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    sequence: i32,
    users: BTreeMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    carts: BTreeMap<UserId, Cart>,
    orders: BTreeMap<OrderId, Order>,
    tokens: BTreeMap<TokenId, VerificationToken>,
}

impl MemoryState {
    const fn next_id(&mut self) -> i32 {
        self.sequence += 1;
        self.sequence
    }

    fn cart_by_id(&mut self, cart_id: CartId) -> Result<&mut Cart, RepositoryError> {
        self.carts
            .values_mut()
            .find(|cart| cart.id == cart_id)
            .ok_or(RepositoryError::NotFound)
    }
}

/// In-memory [`Store`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every token issued to `user_id`, oldest first.
    ///
    /// Waits for any open unit of work to finish.
    pub async fn tokens_for(&self, user_id: UserId) -> Vec<VerificationToken> {
        let state = self.state.lock().await;
        state
            .tokens
            .values()
            .filter(|token| token.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Total number of stored tokens.
    pub async fn token_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Unit of work over a [`MemoryStore`].
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryUnitOfWork {
    async fn get_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.get_user(id).await
    }

    async fn get_user_by_email(&mut self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .working
            .users
            .values()
            .find(|user| &user.email == email)
            .cloned())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, RepositoryError> {
        if self.working.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let user = User {
            id: UserId::new(self.working.next_id()),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            address: None,
            role: user.role,
            email_verified: user.email_verified,
            phone_verified: false,
            enabled: true,
            created_at: user.created_at,
            updated_at: user.created_at,
            last_login_at: None,
        };
        self.working.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let stored = self
            .working
            .users
            .get_mut(&user.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = user.clone();
        Ok(())
    }

    async fn delete_user(&mut self, id: UserId) -> Result<bool, RepositoryError> {
        let state = &mut self.working;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.carts.remove(&id);
        state.tokens.retain(|_, token| token.user_id != id);
        state.orders.retain(|_, order| order.user_id != id);
        Ok(true)
    }

    async fn list_users(&mut self, role: Option<UserRole>) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .working
            .users
            .values()
            .filter(|user| role.is_none_or(|r| user.role == r))
            .cloned()
            .collect())
    }

    async fn lock_admins(&mut self) -> Result<Vec<UserId>, RepositoryError> {
        Ok(self
            .working
            .users
            .values()
            .filter(|user| user.role == UserRole::Admin)
            .map(|user| user.id)
            .collect())
    }
}

#[async_trait]
impl ProductRepository for MemoryUnitOfWork {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.get_product(id).await
    }

    async fn list_products(
        &mut self,
        category: Option<&str>,
        sort: ProductSort,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut matching: Vec<Product> = self
            .working
            .products
            .values()
            .filter(|p| category.is_none_or(|c| p.category.as_deref() == Some(c)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| sort.compare(a, b));
        Ok(page.slice(matching))
    }

    async fn search_products(
        &mut self,
        query: &str,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        let needle = query.to_lowercase();
        let matching = self
            .working
            .products
            .values()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        Ok(page.slice(matching))
    }

    async fn all_products(&mut self) -> Result<Vec<Product>, RepositoryError> {
        Ok(self.working.products.values().cloned().collect())
    }

    async fn insert_product(
        &mut self,
        product: NewProduct,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Product, RepositoryError> {
        let product = Product {
            id: ProductId::new(self.working.next_id()),
            name: product.name,
            description: product.description,
            price: product.price,
            stock_quantity: product.stock_quantity,
            image_url: product.image_url,
            category: product.category,
            size: product.size,
            created_by: Some(created_by),
            created_at: now,
            updated_at: now,
        };
        self.working.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), RepositoryError> {
        if product.stock_quantity < 0 {
            return Err(RepositoryError::Conflict(format!(
                "product {} stock cannot be negative",
                product.id
            )));
        }
        let stored = self
            .working
            .products
            .get_mut(&product.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = product.clone();
        Ok(())
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<bool, RepositoryError> {
        let state = &mut self.working;
        let referenced = state
            .orders
            .values()
            .any(|order| order.items.iter().any(|item| item.product_id == id));
        if referenced {
            return Err(RepositoryError::Conflict(format!(
                "product {id} is referenced by orders"
            )));
        }

        if state.products.remove(&id).is_none() {
            return Ok(false);
        }
        for cart in state.carts.values_mut() {
            cart.items.retain(|item| item.product_id != id);
        }
        Ok(true)
    }
}

#[async_trait]
impl CartRepository for MemoryUnitOfWork {
    async fn get_cart(&mut self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.working.carts.get(&user_id).cloned())
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        self.get_cart(user_id).await
    }

    async fn create_cart(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Cart, RepositoryError> {
        if let Some(cart) = self.working.carts.get(&user_id) {
            return Ok(cart.clone());
        }

        let cart = Cart {
            id: CartId::new(self.working.next_id()),
            user_id,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.working.carts.insert(user_id, cart.clone());
        Ok(cart)
    }

    async fn insert_cart_item(
        &mut self,
        cart_id: CartId,
        item: NewCartItem,
        now: DateTime<Utc>,
    ) -> Result<CartItem, RepositoryError> {
        let id = CartItemId::new(self.working.next_id());
        let cart = self.working.cart_by_id(cart_id)?;
        if cart.item_for_product(item.product_id).is_some() {
            return Err(RepositoryError::Conflict(
                "cart line for this product already exists".to_owned(),
            ));
        }

        let item = CartItem {
            id,
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
        };
        cart.items.push(item.clone());
        cart.updated_at = now;
        Ok(item)
    }

    async fn update_cart_item(
        &mut self,
        cart_id: CartId,
        item: &CartItem,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let cart = self.working.cart_by_id(cart_id)?;
        let stored = cart
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = item.clone();
        cart.updated_at = now;
        Ok(())
    }

    async fn delete_cart_item(
        &mut self,
        cart_id: CartId,
        item_id: CartItemId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let cart = self.working.cart_by_id(cart_id)?;
        let before = cart.items.len();
        cart.items.retain(|item| item.id != item_id);
        cart.updated_at = now;
        Ok(cart.items.len() < before)
    }

    async fn clear_cart(
        &mut self,
        cart_id: CartId,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let cart = self.working.cart_by_id(cart_id)?;
        let removed = cart.items.len();
        cart.items.clear();
        cart.updated_at = now;
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

/// Newest first, ties broken by id.
fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

#[async_trait]
impl OrderRepository for MemoryUnitOfWork {
    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.get_order(id).await
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError> {
        let state = &mut self.working;
        if state
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(RepositoryError::Conflict(
                "order number already exists".to_owned(),
            ));
        }

        let id = OrderId::new(state.next_id());
        let items = order
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: OrderItemId::new(state.next_id()),
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal,
            })
            .collect();

        let order = Order {
            id,
            order_number: order.order_number,
            user_id: order.user_id,
            items,
            total_amount: order.total_amount,
            status: order.status,
            shipping_address: order.shipping_address,
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn order_number_taken(&mut self, order_number: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .working
            .orders
            .values()
            .any(|order| order.order_number == order_number))
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let order = self
            .working
            .orders
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        order.status = status;
        order.updated_at = now;
        Ok(())
    }

    async fn list_orders_for_user(
        &mut self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self
            .working
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        Ok(page.slice(newest_first(orders)))
    }

    async fn list_orders(
        &mut self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self
            .working
            .orders
            .values()
            .filter(|order| status.is_none_or(|s| order.status == s))
            .cloned()
            .collect();
        Ok(page.slice(newest_first(orders)))
    }

    async fn orders_created_between(
        &mut self,
        status: OrderStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.status == status && o.created_at >= from && o.created_at < to)
            .cloned()
            .collect())
    }

    async fn has_open_orders(&mut self, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self
            .working
            .orders
            .values()
            .any(|order| order.user_id == user_id && !order.status.is_terminal()))
    }
}

#[async_trait]
impl TokenRepository for MemoryUnitOfWork {
    async fn find_active_token(
        &mut self,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        Ok(self
            .working
            .tokens
            .values()
            .rev()
            .find(|t| t.user_id == user_id && t.kind == kind && t.is_active(now))
            .cloned())
    }

    async fn insert_token(
        &mut self,
        token: NewToken,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        let state = &mut self.working;
        if state
            .tokens
            .values()
            .any(|t| t.kind == token.kind && t.value == token.value)
        {
            return Ok(None);
        }

        let token = VerificationToken {
            id: TokenId::new(state.next_id()),
            value: token.value,
            user_id: token.user_id,
            kind: token.kind,
            expires_at: token.expires_at,
            used: false,
            created_at: token.created_at,
        };
        state.tokens.insert(token.id, token.clone());
        Ok(Some(token))
    }

    async fn lock_token(
        &mut self,
        value: &str,
        kind: TokenKind,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        Ok(self
            .working
            .tokens
            .values()
            .find(|t| t.kind == kind && t.value == value)
            .cloned())
    }

    async fn mark_token_used(&mut self, id: TokenId) -> Result<(), RepositoryError> {
        let token = self
            .working
            .tokens
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        token.used = true;
        Ok(())
    }

    async fn delete_expired_tokens(&mut self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let before = self.working.tokens.len();
        self.working
            .tokens
            .retain(|_, t| t.used || t.expires_at >= now);
        let removed = before - self.working.tokens.len();
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn delete_used_tokens(&mut self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let before = self.working.tokens.len();
        self.working
            .tokens
            .retain(|_, t| !t.used || t.expires_at >= now);
        let removed = before - self.working.tokens.len();
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vic_shop_core::Price;

    use super::*;

    fn new_product(stock: i32) -> NewProduct {
        NewProduct {
            name: "Tee".to_owned(),
            description: None,
            price: Price::from_cents(1000).unwrap(),
            stock_quantity: stock,
            image_url: None,
            category: Some("shirts".to_owned()),
            size: None,
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let product = uow
            .insert_product(new_product(3), UserId::new(1), Utc::now())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let found = uow.get_product(product.id).await.unwrap();
        assert_eq!(found.map(|p| p.stock_quantity), Some(3));
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_product(new_product(3), UserId::new(1), Utc::now())
                .await
                .unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        assert!(uow.all_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_stock_is_rejected() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut product = uow
            .insert_product(new_product(1), UserId::new(1), Utc::now())
            .await
            .unwrap();
        product.stock_quantity = -1;
        assert!(matches!(
            uow.update_product(&product).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_token_value_collision_returns_none() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let now = Utc::now();
        let token = NewToken {
            value: "123456".to_owned(),
            user_id: UserId::new(1),
            kind: TokenKind::SmsVerification,
            expires_at: now,
            created_at: now,
        };
        assert!(uow.insert_token(token.clone()).await.unwrap().is_some());
        assert!(uow.insert_token(token.clone()).await.unwrap().is_none());

        let other_kind = NewToken {
            kind: TokenKind::PasswordReset,
            ..token
        };
        assert!(uow.insert_token(other_kind).await.unwrap().is_some());
    }
}
