//! Store traits.
//!
//! Every repository method runs on a [`StoreTx`]. A transaction that is
//! dropped without [`StoreTx::commit`] is rolled back, so `?` inside a
//! transactional scope is enough to undo partial work.

use async_trait::async_trait;

use marketstall_core::{CartId, CartItemId, Email, ProductId, Role, TokenId, TokenKind, UserId};

use super::RepoResult;
use crate::models::{
    CartItem, CartLine, CartRow, CheckoutRecord, NewCartItem, NewCheckout, NewProduct, NewToken,
    Product, TokenRecord, User,
};

/// Entry point to a persistence backend.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Start a transaction.
    async fn begin(&self) -> RepoResult<Box<dyn StoreTx>>;

    /// Check backend connectivity.
    async fn health_check(&self) -> RepoResult<()>;
}

/// An open transaction exposing every repository.
#[async_trait]
pub trait StoreTx: UserRepo + TokenRepo + ProductRepo + CartRepo + CheckoutRepo + Send {
    /// Make all writes of this transaction durable.
    async fn commit(self: Box<Self>) -> RepoResult<()>;
}

/// User accounts and password hashes.
#[async_trait]
pub trait UserRepo: Send {
    /// Insert a user and its password hash.
    ///
    /// Fails with `Conflict` if the email is taken.
    async fn create_user(
        &mut self,
        email: &Email,
        password_hash: &str,
        role: Role,
    ) -> RepoResult<User>;

    async fn user_by_id(&mut self, id: UserId) -> RepoResult<Option<User>>;

    /// Look up a user together with its password hash.
    async fn password_hash_by_email(&mut self, email: &Email)
    -> RepoResult<Option<(User, String)>>;

    async fn password_hash_by_id(&mut self, id: UserId) -> RepoResult<Option<String>>;

    /// Replace a user's password hash. Fails with `NotFound` for unknown users.
    async fn update_password(&mut self, id: UserId, password_hash: &str) -> RepoResult<()>;
}

/// Token records (the credential store).
#[async_trait]
pub trait TokenRepo: Send {
    /// Insert a token record.
    ///
    /// Fails with `Conflict` if the hash is already stored or the paired
    /// refresh record already has an access token.
    async fn insert_token(&mut self, token: NewToken<'_>) -> RepoResult<TokenRecord>;

    async fn find_token(
        &mut self,
        user_id: UserId,
        kind: TokenKind,
        token_hash: &str,
    ) -> RepoResult<Option<TokenRecord>>;

    async fn tokens_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<TokenRecord>>;

    /// Delete the access records paired with `refresh_id`, returning them.
    async fn delete_access_tokens_paired_to(
        &mut self,
        refresh_id: TokenId,
    ) -> RepoResult<Vec<TokenRecord>>;

    /// Delete one record by id, returning it if it existed.
    async fn delete_token(&mut self, id: TokenId) -> RepoResult<Option<TokenRecord>>;

    /// Delete every record of a user, returning them.
    async fn delete_tokens_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<TokenRecord>>;
}

/// Catalogue.
#[async_trait]
pub trait ProductRepo: Send {
    async fn create_product(&mut self, product: &NewProduct) -> RepoResult<Product>;

    /// Products among `ids` that exist and are not soft-deleted.
    async fn products_by_ids(&mut self, ids: &[ProductId]) -> RepoResult<Vec<Product>>;

    async fn list_products(&mut self, limit: u32, offset: u32) -> RepoResult<Vec<Product>>;
}

/// Carts and cart items.
#[async_trait]
pub trait CartRepo: Send {
    /// The user's active cart, without locking.
    async fn active_cart(&mut self, user_id: UserId) -> RepoResult<Option<CartRow>>;

    /// Lock the user's active cart for update, creating it first if missing.
    ///
    /// Concurrent callers for the same user serialize here and all observe
    /// the same cart.
    async fn lock_or_create_active_cart(&mut self, user_id: UserId) -> RepoResult<CartRow>;

    /// Items among `ids` owned by `user_id`.
    async fn cart_items_by_ids(
        &mut self,
        user_id: UserId,
        ids: &[CartItemId],
    ) -> RepoResult<Vec<CartItem>>;

    async fn cart_items(&mut self, cart_id: CartId) -> RepoResult<Vec<CartItem>>;

    /// Items of a cart joined with their products, ordered by item id.
    async fn cart_lines(&mut self, cart_id: CartId) -> RepoResult<Vec<CartLine>>;

    async fn delete_cart_items(&mut self, ids: &[CartItemId]) -> RepoResult<u64>;

    /// Insert a cart item. Fails with `Conflict` if the product is already
    /// in the cart.
    async fn insert_cart_item(&mut self, item: NewCartItem) -> RepoResult<CartItem>;

    /// Lock the user's items among `ids` against concurrent checkout or
    /// mutation, returning them joined with their products.
    async fn lock_checkout_lines(
        &mut self,
        user_id: UserId,
        ids: &[CartItemId],
    ) -> RepoResult<Vec<CartLine>>;
}

/// Checkout records.
#[async_trait]
pub trait CheckoutRepo: Send {
    /// Fails with `Conflict` if the payment intent is already recorded.
    async fn insert_checkout(&mut self, checkout: &NewCheckout) -> RepoResult<CheckoutRecord>;

    /// Checkouts of a user, newest first.
    async fn checkouts_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<CheckoutRecord>>;
}
