//! Cart aggregate.
//!
//! A user has at most one ACTIVE cart. [`CartService::add_to_cart`] replaces
//! its contents with a desired item set: items missing from the set are
//! deleted, items carrying an id are rewritten under that id, and entries
//! without an id become new items.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use marketstall_core::{CartItemId, ProductId, UserId};

use crate::db::{RepositoryError, Store, StoreTx};
use crate::models::{Cart, DesiredCartItem, NewCartItem};
use crate::services::events::{CART_UPDATED, EventHub};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("{0}")]
    Invalid(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("cart item {0} not found")]
    ItemNotFound(CartItemId),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CartError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

/// Cart reads and merges.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    events: EventHub,
}

impl CartService {
    #[must_use]
    pub const fn new(store: Arc<dyn Store>, events: EventHub) -> Self {
        Self { store, events }
    }

    /// The user's active cart with product details.
    ///
    /// Returns an empty, unsaved cart when the user has none; reading never
    /// creates a row.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart, CartError> {
        let mut tx = self.store.begin().await?;
        let Some(row) = tx.active_cart(user_id).await? else {
            return Ok(Cart::empty(user_id));
        };
        let items = tx.cart_lines(row.id).await?;

        Ok(Cart {
            id: Some(row.id),
            user_id,
            status: row.status,
            items,
        })
    }

    /// Replace the active cart's contents with `desired`.
    ///
    /// Referenced products and item ids are validated up front. The merge
    /// itself runs with the active cart locked, so concurrent merges for the
    /// same user serialize and never create a second active cart. Item ids
    /// are checked again under the lock, since a checkout may consume them
    /// in between. Emits `cart.updated` after commit.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Invalid` for a zero quantity or a repeated item
    /// id, `CartError::Conflict` for a repeated product,
    /// `CartError::ProductNotFound`/`CartError::ItemNotFound` for unknown
    /// references.
    #[instrument(skip(self, desired), fields(items = desired.len()))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        desired: &[DesiredCartItem],
    ) -> Result<Cart, CartError> {
        self.validate(user_id, desired).await?;

        let mut tx = self.store.begin().await?;
        let merged = Self::merge(tx.as_mut(), user_id, desired).await?;
        tx.commit().await?;

        self.events.emit_to_user(user_id, CART_UPDATED, &merged);
        tracing::info!(items = merged.items.len(), "Cart updated");
        Ok(merged)
    }

    /// Lock the active cart and replace its items.
    async fn merge(
        tx: &mut dyn StoreTx,
        user_id: UserId,
        desired: &[DesiredCartItem],
    ) -> Result<Cart, CartError> {
        let cart = tx.lock_or_create_active_cart(user_id).await?;

        let current: Vec<CartItemId> = tx
            .cart_items(cart.id)
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect();
        if let Some(gone) = desired
            .iter()
            .filter_map(|d| d.id)
            .find(|id| !current.contains(id))
        {
            return Err(CartError::ItemNotFound(gone));
        }
        tx.delete_cart_items(&current).await?;

        for item in desired {
            tx.insert_cart_item(NewCartItem {
                id: item.id,
                cart_id: cart.id,
                product_id: item.product_id,
                quantity: item.quantity,
                user_id,
            })
            .await?;
        }

        let items = tx.cart_lines(cart.id).await?;
        Ok(Cart {
            id: Some(cart.id),
            user_id,
            status: cart.status,
            items,
        })
    }

    async fn validate(
        &self,
        user_id: UserId,
        desired: &[DesiredCartItem],
    ) -> Result<(), CartError> {
        let mut products = HashSet::new();
        let mut item_ids = HashSet::new();
        for item in desired {
            if item.quantity == 0 {
                return Err(CartError::Invalid(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                )));
            }
            if !products.insert(item.product_id) {
                return Err(CartError::Conflict(format!(
                    "product {} appears more than once",
                    item.product_id
                )));
            }
            if let Some(id) = item.id
                && !item_ids.insert(id)
            {
                return Err(CartError::Invalid(format!(
                    "cart item {id} appears more than once"
                )));
            }
        }

        let mut tx = self.store.begin().await?;

        let product_ids: Vec<ProductId> = products.into_iter().collect();
        let found: HashSet<ProductId> = tx
            .products_by_ids(&product_ids)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if let Some(missing) = product_ids.iter().find(|id| !found.contains(id)) {
            return Err(CartError::ProductNotFound(*missing));
        }

        let item_ids: Vec<CartItemId> = item_ids.into_iter().collect();
        let owned: HashSet<CartItemId> = tx
            .cart_items_by_ids(user_id, &item_ids)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();
        if let Some(missing) = item_ids.iter().find(|id| !owned.contains(id)) {
            return Err(CartError::ItemNotFound(*missing));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use marketstall_core::{CartStatus, Email, Role};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewProduct, Product};

    struct Fixture {
        store: MemoryStore,
        carts: CartService,
        events: EventHub,
        user: UserId,
        mug: Product,
        tea: Product,
        pot: Product,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx
            .create_user(&Email::parse("u@test.com").unwrap(), "hash", Role::Customer)
            .await
            .unwrap()
            .id;
        let mut products = Vec::new();
        for (name, cents) in [("Mug", 900), ("Tea", 450), ("Pot", 3000)] {
            products.push(
                tx.create_product(&NewProduct {
                    name: name.to_owned(),
                    description: String::new(),
                    image: None,
                    unit_price: Decimal::new(cents, 2),
                })
                .await
                .unwrap(),
            );
        }
        tx.commit().await.unwrap();

        let events = EventHub::new();
        let carts = CartService::new(Arc::new(store.clone()), events.clone());
        let pot = products.pop().unwrap();
        let tea = products.pop().unwrap();
        let mug = products.pop().unwrap();
        Fixture {
            store,
            carts,
            events,
            user,
            mug,
            tea,
            pot,
        }
    }

    fn new_item(product: &Product, quantity: u32) -> DesiredCartItem {
        DesiredCartItem {
            id: None,
            product_id: product.id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_get_cart_without_cart_creates_nothing() {
        let f = fixture().await;
        let cart = f.carts.get_cart(f.user).await.unwrap();
        assert_eq!(cart, Cart::empty(f.user));

        let mut tx = f.store.begin().await.unwrap();
        assert!(tx.active_cart(f.user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_diffs_by_item_id() {
        let f = fixture().await;
        let cart = f
            .carts
            .add_to_cart(f.user, &[new_item(&f.mug, 1), new_item(&f.tea, 2)])
            .await
            .unwrap();
        let a = cart
            .items
            .iter()
            .find(|l| l.item.product_id == f.mug.id)
            .unwrap()
            .item;

        let merged = f
            .carts
            .add_to_cart(
                f.user,
                &[
                    DesiredCartItem {
                        id: Some(a.id),
                        product_id: f.mug.id,
                        quantity: 1,
                    },
                    new_item(&f.pot, 5),
                ],
            )
            .await
            .unwrap();

        assert_eq!(merged.id, cart.id);
        assert_eq!(merged.items.len(), 2);
        let kept = merged.items.iter().find(|l| l.item.id == a.id).unwrap();
        assert_eq!(kept.item, a);
        let created = merged
            .items
            .iter()
            .find(|l| l.item.product_id == f.pot.id)
            .unwrap();
        assert_eq!(created.item.quantity, 5);
        assert_eq!(created.product.name, "Pot");
        assert!(merged.items.iter().all(|l| l.item.product_id != f.tea.id));
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_input_without_side_effects() {
        let f = fixture().await;

        assert!(matches!(
            f.carts.add_to_cart(f.user, &[new_item(&f.mug, 0)]).await,
            Err(CartError::Invalid(_))
        ));
        assert!(matches!(
            f.carts
                .add_to_cart(f.user, &[new_item(&f.mug, 1), new_item(&f.mug, 2)])
                .await,
            Err(CartError::Conflict(_))
        ));
        assert!(matches!(
            f.carts
                .add_to_cart(
                    f.user,
                    &[DesiredCartItem {
                        id: None,
                        product_id: ProductId::new(9999),
                        quantity: 1
                    }]
                )
                .await,
            Err(CartError::ProductNotFound(_))
        ));
        assert!(matches!(
            f.carts
                .add_to_cart(
                    f.user,
                    &[DesiredCartItem {
                        id: Some(CartItemId::new(9999)),
                        product_id: f.mug.id,
                        quantity: 1
                    }]
                )
                .await,
            Err(CartError::ItemNotFound(_))
        ));

        let mut tx = f.store.begin().await.unwrap();
        assert!(tx.active_cart(f.user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_merges_share_one_active_cart() {
        let f = fixture().await;
        let mugs = [new_item(&f.mug, 1)];
        let teas = [new_item(&f.tea, 1)];
        let (a, b) = tokio::join!(
            f.carts.add_to_cart(f.user, &mugs),
            f.carts.add_to_cart(f.user, &teas),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.id, b.id);
        assert_eq!(a.status, CartStatus::Active);

        let cart = f.carts.get_cart(f.user).await.unwrap();
        assert_eq!(cart.id, a.id);
        assert_eq!(cart.items.len(), 1);
    }

    #[tokio::test]
    async fn test_item_consumed_after_validation_is_not_resurrected() {
        let f = fixture().await;
        let cart = f
            .carts
            .add_to_cart(f.user, &[new_item(&f.mug, 1)])
            .await
            .unwrap();
        let line = cart.items[0].item;

        // A checkout consumes the line after validation saw it.
        let mut tx = f.store.begin().await.unwrap();
        tx.delete_cart_items(&[line.id]).await.unwrap();
        let stale = [DesiredCartItem {
            id: Some(line.id),
            product_id: f.mug.id,
            quantity: 2,
        }];
        assert!(matches!(
            CartService::merge(tx.as_mut(), f.user, &stale).await,
            Err(CartError::ItemNotFound(id)) if id == line.id
        ));
        drop(tx);

        let mut tx = f.store.begin().await.unwrap();
        tx.delete_cart_items(&[line.id]).await.unwrap();
        tx.commit().await.unwrap();
        assert!(matches!(
            f.carts.add_to_cart(f.user, &stale).await,
            Err(CartError::ItemNotFound(_))
        ));
        assert!(f.carts.get_cart(f.user).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_merge_emits_cart_updated() {
        let f = fixture().await;
        let mut events = f.events.subscribe(f.user);

        let cart = f
            .carts
            .add_to_cart(f.user, &[new_item(&f.mug, 3)])
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event, CART_UPDATED);
        assert_eq!(event.payload, serde_json::to_value(&cart).unwrap());
    }
}
