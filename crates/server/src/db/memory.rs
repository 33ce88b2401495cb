//! In-process store.
//!
//! Keeps every table in a `BTreeMap` behind a single async mutex. A
//! transaction holds the mutex for its whole lifetime and works on a copy of
//! the tables, so transactions are fully serialized and an uncommitted
//! transaction leaves no trace. Unique constraints and cascades of the SQL
//! schema are enforced by hand.
//!
//! Failures can be injected per operation with [`MemoryStore::fail`].

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use marketstall_core::{
    CartId, CartItemId, CartStatus, CheckoutId, Email, ProductId, Role, TokenId, TokenKind, UserId,
};

use super::{
    CartRepo, CheckoutRepo, ProductRepo, RepoResult, RepositoryError, Store, StoreTx, TokenRepo,
    UserRepo,
};
use crate::models::{
    CartItem, CartLine, CartRow, CheckoutRecord, NewCartItem, NewCheckout, NewProduct, NewToken,
    Product, TokenRecord, User,
};

/// An operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Begin,
    Commit,
    FindToken,
    InsertToken,
    DeleteToken,
    DeleteCartItems,
    LockCheckoutLines,
    InsertCheckout,
}

impl Fault {
    const fn name(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Commit => "commit",
            Self::FindToken => "find_token",
            Self::InsertToken => "insert_token",
            Self::DeleteToken => "delete_token",
            Self::DeleteCartItems => "delete_cart_items",
            Self::LockCheckoutLines => "lock_checkout_lines",
            Self::InsertCheckout => "insert_checkout",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Faults(Arc<Mutex<HashSet<Fault>>>);

impl Faults {
    fn check(&self, fault: Fault) -> RepoResult<()> {
        let armed = self.0.lock().is_ok_and(|set| set.contains(&fault));
        if armed {
            return Err(RepositoryError::Injected(fault.name()));
        }
        Ok(())
    }

    fn set(&self, fault: Fault, armed: bool) {
        if let Ok(mut set) = self.0.lock() {
            if armed {
                set.insert(fault);
            } else {
                set.remove(&fault);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    last_id: i32,
    users: BTreeMap<UserId, StoredUser>,
    tokens: BTreeMap<TokenId, TokenRecord>,
    products: BTreeMap<ProductId, Product>,
    carts: BTreeMap<CartId, CartRow>,
    cart_items: BTreeMap<CartItemId, CartItem>,
    checkouts: BTreeMap<CheckoutId, CheckoutRecord>,
}

impl Tables {
    /// One sequence shared by every table; ids are unique across tables.
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn line(&self, item: &CartItem) -> Option<CartLine> {
        self.products.get(&item.product_id).map(|product| CartLine {
            item: *item,
            product: product.clone(),
        })
    }
}

/// Store that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Faults,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `fault` fail until [`MemoryStore::heal`] is called.
    pub fn fail(&self, fault: Fault) {
        self.faults.set(fault, true);
    }

    pub fn heal(&self, fault: Fault) {
        self.faults.set(fault, false);
    }
}

/// A serialized in-memory transaction.
pub struct MemoryTx {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Faults,
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> RepoResult<Box<dyn StoreTx>> {
        self.faults.check(Fault::Begin)?;
        let committed = Arc::clone(&self.tables).lock_owned().await;
        let working = committed.clone();
        Ok(Box::new(MemoryTx {
            committed,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn health_check(&self) -> RepoResult<()> {
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> RepoResult<()> {
        self.faults.check(Fault::Commit)?;
        let Self {
            mut committed,
            working,
            ..
        } = *self;
        *committed = working;
        Ok(())
    }
}

#[async_trait]
impl UserRepo for MemoryTx {
    async fn create_user(
        &mut self,
        email: &Email,
        password_hash: &str,
        role: Role,
    ) -> RepoResult<User> {
        let t = &mut self.working;
        if t.users.values().any(|u| &u.user.email == email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(t.next_id()),
            email: email.clone(),
            role,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_owned(),
            },
        );
        Ok(user)
    }

    async fn user_by_id(&mut self, id: UserId) -> RepoResult<Option<User>> {
        Ok(self.working.users.get(&id).map(|u| u.user.clone()))
    }

    async fn password_hash_by_email(
        &mut self,
        email: &Email,
    ) -> RepoResult<Option<(User, String)>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| &u.user.email == email)
            .map(|u| (u.user.clone(), u.password_hash.clone())))
    }

    async fn password_hash_by_id(&mut self, id: UserId) -> RepoResult<Option<String>> {
        Ok(self.working.users.get(&id).map(|u| u.password_hash.clone()))
    }

    async fn update_password(&mut self, id: UserId, password_hash: &str) -> RepoResult<()> {
        let stored = self
            .working
            .users
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        password_hash.clone_into(&mut stored.password_hash);
        stored.user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TokenRepo for MemoryTx {
    async fn insert_token(&mut self, token: NewToken<'_>) -> RepoResult<TokenRecord> {
        self.faults.check(Fault::InsertToken)?;
        let t = &mut self.working;

        if (token.kind == TokenKind::Access) != token.paired_token_id.is_some() {
            return Err(RepositoryError::Conflict(
                "access tokens must be paired, refresh tokens must not".to_owned(),
            ));
        }
        let duplicate = t.tokens.values().any(|r| {
            r.token_hash == token.token_hash
                || (token.paired_token_id.is_some() && r.paired_token_id == token.paired_token_id)
        });
        if duplicate {
            return Err(RepositoryError::Conflict(
                "token already stored or already paired".to_owned(),
            ));
        }
        if let Some(paired) = token.paired_token_id
            && !t.tokens.contains_key(&paired)
        {
            return Err(RepositoryError::Conflict(format!(
                "paired token {paired} does not exist"
            )));
        }

        let record = TokenRecord {
            id: TokenId::new(t.next_id()),
            user_id: token.user_id,
            kind: token.kind,
            token_hash: token.token_hash.to_owned(),
            paired_token_id: token.paired_token_id,
            created_at: Utc::now(),
        };
        t.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_token(
        &mut self,
        user_id: UserId,
        kind: TokenKind,
        token_hash: &str,
    ) -> RepoResult<Option<TokenRecord>> {
        self.faults.check(Fault::FindToken)?;
        Ok(self
            .working
            .tokens
            .values()
            .find(|r| r.user_id == user_id && r.kind == kind && r.token_hash == token_hash)
            .cloned())
    }

    async fn tokens_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<TokenRecord>> {
        Ok(self
            .working
            .tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_access_tokens_paired_to(
        &mut self,
        refresh_id: TokenId,
    ) -> RepoResult<Vec<TokenRecord>> {
        self.faults.check(Fault::DeleteToken)?;
        let t = &mut self.working;
        let ids: Vec<TokenId> = t
            .tokens
            .values()
            .filter(|r| r.kind == TokenKind::Access && r.paired_token_id == Some(refresh_id))
            .map(|r| r.id)
            .collect();
        Ok(ids.iter().filter_map(|id| t.tokens.remove(id)).collect())
    }

    async fn delete_token(&mut self, id: TokenId) -> RepoResult<Option<TokenRecord>> {
        self.faults.check(Fault::DeleteToken)?;
        let t = &mut self.working;
        let removed = t.tokens.remove(&id);
        if removed.is_some() {
            t.tokens.retain(|_, r| r.paired_token_id != Some(id));
        }
        Ok(removed)
    }

    async fn delete_tokens_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<TokenRecord>> {
        self.faults.check(Fault::DeleteToken)?;
        let t = &mut self.working;
        let ids: Vec<TokenId> = t
            .tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.id)
            .collect();
        Ok(ids.iter().filter_map(|id| t.tokens.remove(id)).collect())
    }
}

#[async_trait]
impl ProductRepo for MemoryTx {
    async fn create_product(&mut self, product: &NewProduct) -> RepoResult<Product> {
        let t = &mut self.working;
        let created = Product {
            id: ProductId::new(t.next_id()),
            name: product.name.clone(),
            description: product.description.clone(),
            image: product.image.clone(),
            unit_price: product.unit_price,
            created_at: Utc::now(),
        };
        t.products.insert(created.id, created.clone());
        Ok(created)
    }

    async fn products_by_ids(&mut self, ids: &[ProductId]) -> RepoResult<Vec<Product>> {
        Ok(self
            .working
            .products
            .values()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn list_products(&mut self, limit: u32, offset: u32) -> RepoResult<Vec<Product>> {
        Ok(self
            .working
            .products
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CartRepo for MemoryTx {
    async fn active_cart(&mut self, user_id: UserId) -> RepoResult<Option<CartRow>> {
        Ok(self
            .working
            .carts
            .values()
            .find(|c| c.user_id == user_id && c.status == CartStatus::Active)
            .copied())
    }

    async fn lock_or_create_active_cart(&mut self, user_id: UserId) -> RepoResult<CartRow> {
        if let Some(cart) = self.active_cart(user_id).await? {
            return Ok(cart);
        }
        let t = &mut self.working;
        let cart = CartRow {
            id: CartId::new(t.next_id()),
            user_id,
            status: CartStatus::Active,
        };
        t.carts.insert(cart.id, cart);
        Ok(cart)
    }

    async fn cart_items_by_ids(
        &mut self,
        user_id: UserId,
        ids: &[CartItemId],
    ) -> RepoResult<Vec<CartItem>> {
        Ok(self
            .working
            .cart_items
            .values()
            .filter(|i| i.user_id == user_id && ids.contains(&i.id))
            .copied()
            .collect())
    }

    async fn cart_items(&mut self, cart_id: CartId) -> RepoResult<Vec<CartItem>> {
        Ok(self
            .working
            .cart_items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .copied()
            .collect())
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> RepoResult<Vec<CartLine>> {
        let t = &self.working;
        Ok(t.cart_items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .filter_map(|i| t.line(i))
            .collect())
    }

    async fn delete_cart_items(&mut self, ids: &[CartItemId]) -> RepoResult<u64> {
        self.faults.check(Fault::DeleteCartItems)?;
        let removed = ids
            .iter()
            .filter(|id| self.working.cart_items.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn insert_cart_item(&mut self, item: NewCartItem) -> RepoResult<CartItem> {
        let t = &mut self.working;
        if item.quantity == 0 {
            return Err(RepositoryError::Conflict(
                "quantity must be positive".to_owned(),
            ));
        }
        if !t.products.contains_key(&item.product_id) || !t.carts.contains_key(&item.cart_id) {
            return Err(RepositoryError::Conflict(
                "cart item references a missing row".to_owned(),
            ));
        }
        let duplicate = t.cart_items.values().any(|i| {
            (i.cart_id == item.cart_id && i.product_id == item.product_id) || Some(i.id) == item.id
        });
        if duplicate {
            return Err(RepositoryError::Conflict("product already in cart".to_owned()));
        }

        let id = match item.id {
            Some(id) => id,
            None => CartItemId::new(t.next_id()),
        };
        let stored = CartItem {
            id,
            cart_id: item.cart_id,
            product_id: item.product_id,
            quantity: item.quantity,
            user_id: item.user_id,
        };
        t.cart_items.insert(id, stored);
        Ok(stored)
    }

    async fn lock_checkout_lines(
        &mut self,
        user_id: UserId,
        ids: &[CartItemId],
    ) -> RepoResult<Vec<CartLine>> {
        self.faults.check(Fault::LockCheckoutLines)?;
        let t = &self.working;
        Ok(t.cart_items
            .values()
            .filter(|i| i.user_id == user_id && ids.contains(&i.id))
            .filter_map(|i| t.line(i))
            .collect())
    }
}

#[async_trait]
impl CheckoutRepo for MemoryTx {
    async fn insert_checkout(&mut self, checkout: &NewCheckout) -> RepoResult<CheckoutRecord> {
        self.faults.check(Fault::InsertCheckout)?;
        let t = &mut self.working;
        if t
            .checkouts
            .values()
            .any(|c| c.payment_intent_id == checkout.payment_intent_id)
        {
            return Err(RepositoryError::Conflict(
                "payment intent already recorded".to_owned(),
            ));
        }

        let record = CheckoutRecord {
            id: CheckoutId::new(t.next_id()),
            user_id: checkout.user_id,
            total_price: checkout.total_price,
            currency: checkout.currency,
            status: checkout.status,
            products: checkout.products.clone(),
            payment_intent_id: checkout.payment_intent_id.clone(),
            client_secret: checkout.client_secret.clone(),
            created_at: Utc::now(),
        };
        t.checkouts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn checkouts_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<CheckoutRecord>> {
        Ok(self
            .working
            .checkouts
            .values()
            .rev()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }
}
