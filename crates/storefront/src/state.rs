//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::Store;
use crate::services::{
    AccountService, CartService, CatalogService, Clock, Notifier, OrderService, ReportService,
    TokenLedger,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Handlers build the service
/// they need per request from the borrowed store and clock.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                clock,
                notifier,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the backing store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    #[must_use]
    pub fn accounts(&self) -> AccountService<'_> {
        AccountService::new(
            self.store(),
            self.clock(),
            self.inner.notifier.as_ref(),
            &self.inner.config.base_url,
        )
    }

    #[must_use]
    pub fn catalog(&self) -> CatalogService<'_> {
        CatalogService::new(self.store(), self.clock())
    }

    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(self.store(), self.clock())
    }

    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(self.store(), self.clock())
    }

    #[must_use]
    pub fn reports(&self) -> ReportService<'_> {
        ReportService::new(self.store(), self.clock())
    }

    #[must_use]
    pub fn tokens(&self) -> TokenLedger<'_> {
        TokenLedger::new(self.clock())
    }
}
