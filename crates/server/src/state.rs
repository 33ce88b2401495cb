//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::services::auth::AuthService;
use crate::services::cart::CartService;
use crate::services::catalog::CatalogService;
use crate::services::checkout::CheckoutService;
use crate::services::events::EventHub;
use crate::services::payments::PaymentProvider;
use crate::services::session_cache::{MokaCacheStore, SessionCache};
use crate::services::tokens::{TokenCodec, TokenLifecycle};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the services and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    store: Arc<dyn Store>,
    auth: AuthService,
    catalog: CatalogService,
    carts: CartService,
    checkout: CheckoutService,
    events: EventHub,
}

impl AppState {
    /// Wire the services over a store and a payment provider.
    ///
    /// The session cache is an in-process `moka` cache sized and timed by
    /// `config.auth`.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        let auth_config = &config.auth;
        let cache = SessionCache::new(
            Arc::new(MokaCacheStore::new(auth_config.session_cache_capacity)),
            auth_config.access_token_ttl,
            auth_config.session_cache_ttl,
        );
        let codec = Arc::new(TokenCodec::new(
            auth_config.token_secret.clone(),
            auth_config.access_token_ttl,
            auth_config.refresh_token_ttl,
        ));
        let tokens = TokenLifecycle::new(store.clone(), codec, cache);
        let auth = AuthService::new(store.clone(), tokens, auth_config.password_min_length);

        let events = EventHub::new();
        let catalog = CatalogService::new(store.clone());
        let carts = CartService::new(store.clone(), events.clone());
        let checkout = CheckoutService::new(store.clone(), payments, config.payments.currency);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                auth,
                catalog,
                carts,
                checkout,
                events,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.inner.events
    }
}
